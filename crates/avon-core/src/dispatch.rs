//! Per-interface dispatch table
//!
//! Each interface type owns a row of optional accessor callbacks
//! (data, cmd, cfg) and optional formatters that turn the accessor's
//! [`Sample`] into JSON. A missing entry is a legal state: it only becomes
//! an error, [`DispatchError::CapabilityAbsent`], when a client asks for it.
//!
//! `H` is the backend's model handle type. The table never creates or
//! inspects handles, it only passes them to the callbacks.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::codec::CodecError;
use crate::model::{Command, InterfaceType, Sample};

/// Failure reported by a backend accessor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AccessorError(pub String);

impl AccessorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type DataGetFn<H> = Box<dyn Fn(&H) -> Result<Sample, AccessorError>>;
pub type CmdSetFn<H> = Box<dyn Fn(&H, &Command) -> Result<(), AccessorError>>;
pub type CfgGetFn<H> = Box<dyn Fn(&H) -> Result<Sample, AccessorError>>;
pub type CfgSetFn<H> = Box<dyn Fn(&H, &Sample) -> Result<(), AccessorError>>;
pub type Formatter = Box<dyn Fn(&Sample) -> Result<Value, CodecError>>;

/// Interface-specific capability a client can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    DataGet,
    CmdSet,
    CfgGet,
    CfgSet,
    DataFormat,
    CfgFormat,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DataGet => "data accessor",
            Self::CmdSet => "cmd accessor",
            Self::CfgGet => "cfg accessor",
            Self::CfgSet => "cfg setter",
            Self::DataFormat => "data formatter",
            Self::CfgFormat => "cfg formatter",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No {capability} installed for interface {interface}")]
    CapabilityAbsent {
        interface: InterfaceType,
        capability: Capability,
    },
    #[error("Accessor failed: {0}")]
    Accessor(#[from] AccessorError),
    #[error("Formatting failed: {0}")]
    Codec(#[from] CodecError),
}

/// Accessor callbacks for one interface type
pub struct InterfaceCallbacks<H> {
    pub data_get: Option<DataGetFn<H>>,
    pub cmd_set: Option<CmdSetFn<H>>,
    pub cfg_get: Option<CfgGetFn<H>>,
    pub cfg_set: Option<CfgSetFn<H>>,
}

impl<H> Default for InterfaceCallbacks<H> {
    fn default() -> Self {
        Self {
            data_get: None,
            cmd_set: None,
            cfg_get: None,
            cfg_set: None,
        }
    }
}

impl<H> InterfaceCallbacks<H> {
    pub fn with_data_get(mut self, f: impl Fn(&H) -> Result<Sample, AccessorError> + 'static) -> Self {
        self.data_get = Some(Box::new(f));
        self
    }

    pub fn with_cmd_set(
        mut self,
        f: impl Fn(&H, &Command) -> Result<(), AccessorError> + 'static,
    ) -> Self {
        self.cmd_set = Some(Box::new(f));
        self
    }

    pub fn with_cfg_get(mut self, f: impl Fn(&H) -> Result<Sample, AccessorError> + 'static) -> Self {
        self.cfg_get = Some(Box::new(f));
        self
    }

    pub fn with_cfg_set(
        mut self,
        f: impl Fn(&H, &Sample) -> Result<(), AccessorError> + 'static,
    ) -> Self {
        self.cfg_set = Some(Box::new(f));
        self
    }
}

struct DispatchRow<H> {
    callbacks: InterfaceCallbacks<H>,
    data_formatter: Option<Formatter>,
    cfg_formatter: Option<Formatter>,
}

impl<H> Default for DispatchRow<H> {
    fn default() -> Self {
        Self {
            callbacks: InterfaceCallbacks::default(),
            data_formatter: None,
            cfg_formatter: None,
        }
    }
}

/// Mapping from interface type to its accessors and formatters
pub struct DispatchTable<H> {
    rows: HashMap<InterfaceType, DispatchRow<H>>,
}

impl<H> Default for DispatchTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> DispatchTable<H> {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Replace the accessor callbacks of an interface type
    pub fn install_callbacks(&mut self, interface: InterfaceType, callbacks: InterfaceCallbacks<H>) {
        debug!(
            interface = %interface,
            data_get = callbacks.data_get.is_some(),
            cmd_set = callbacks.cmd_set.is_some(),
            cfg_get = callbacks.cfg_get.is_some(),
            cfg_set = callbacks.cfg_set.is_some(),
            "Installed interface callbacks"
        );
        self.rows.entry(interface).or_default().callbacks = callbacks;
    }

    /// Replace the data and cfg formatters of an interface type
    pub fn install_formatters(
        &mut self,
        interface: InterfaceType,
        data_formatter: Option<Formatter>,
        cfg_formatter: Option<Formatter>,
    ) {
        debug!(
            interface = %interface,
            data = data_formatter.is_some(),
            cfg = cfg_formatter.is_some(),
            "Installed interface formatters"
        );
        let row = self.rows.entry(interface).or_default();
        row.data_formatter = data_formatter;
        row.cfg_formatter = cfg_formatter;
    }

    /// Whether a capability is installed for an interface type
    pub fn resolve(&self, interface: InterfaceType, capability: Capability) -> bool {
        let Some(row) = self.rows.get(&interface) else {
            return false;
        };
        match capability {
            Capability::DataGet => row.callbacks.data_get.is_some(),
            Capability::CmdSet => row.callbacks.cmd_set.is_some(),
            Capability::CfgGet => row.callbacks.cfg_get.is_some(),
            Capability::CfgSet => row.callbacks.cfg_set.is_some(),
            Capability::DataFormat => row.data_formatter.is_some(),
            Capability::CfgFormat => row.cfg_formatter.is_some(),
        }
    }

    /// Read and format the data of a model
    pub fn render_data(&self, interface: InterfaceType, handle: &H) -> Result<Value, DispatchError> {
        let row = self.rows.get(&interface);
        let get = row
            .and_then(|r| r.callbacks.data_get.as_ref())
            .ok_or(DispatchError::CapabilityAbsent {
                interface,
                capability: Capability::DataGet,
            })?;
        let format = row
            .and_then(|r| r.data_formatter.as_ref())
            .ok_or(DispatchError::CapabilityAbsent {
                interface,
                capability: Capability::DataFormat,
            })?;
        Ok(format(&get(handle)?)?)
    }

    /// Read and format the configuration of a model
    pub fn render_cfg(&self, interface: InterfaceType, handle: &H) -> Result<Value, DispatchError> {
        let row = self.rows.get(&interface);
        let get = row
            .and_then(|r| r.callbacks.cfg_get.as_ref())
            .ok_or(DispatchError::CapabilityAbsent {
                interface,
                capability: Capability::CfgGet,
            })?;
        let format = row
            .and_then(|r| r.cfg_formatter.as_ref())
            .ok_or(DispatchError::CapabilityAbsent {
                interface,
                capability: Capability::CfgFormat,
            })?;
        Ok(format(&get(handle)?)?)
    }

    /// Pass a command to a model.
    ///
    /// No HTTP route reaches this: data POST is read-only. It lets a
    /// backend drive its own `cmd_set` accessors through the same table.
    pub fn send_cmd(
        &self,
        interface: InterfaceType,
        handle: &H,
        cmd: &Command,
    ) -> Result<(), DispatchError> {
        let set = self
            .rows
            .get(&interface)
            .and_then(|r| r.callbacks.cmd_set.as_ref())
            .ok_or(DispatchError::CapabilityAbsent {
                interface,
                capability: Capability::CmdSet,
            })?;
        Ok(set(handle, cmd)?)
    }

    /// Apply a configuration to a model.
    ///
    /// Backend-facing like [`DispatchTable::send_cmd`]: cfg POST is read-only.
    pub fn apply_cfg(
        &self,
        interface: InterfaceType,
        handle: &H,
        cfg: &Sample,
    ) -> Result<(), DispatchError> {
        let set = self
            .rows
            .get(&interface)
            .and_then(|r| r.callbacks.cfg_set.as_ref())
            .ok_or(DispatchError::CapabilityAbsent {
                interface,
                capability: Capability::CfgSet,
            })?;
        Ok(set(handle, cfg)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::model::{Payload, RangerData, RangerTransducerData};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ranger_sample(range: &f64) -> Result<Sample, AccessorError> {
        Ok(Sample {
            time: 10,
            interface: InterfaceType::Ranger,
            payload: Payload::RangerData(RangerData {
                transducers: vec![RangerTransducerData {
                    pose: [0.0; 6],
                    samples: vec![[0.0, 0.0, *range, 1.0]],
                }],
            }),
        })
    }

    #[test]
    fn test_render_data_with_accessor_and_formatter() {
        let mut table: DispatchTable<f64> = DispatchTable::new();
        table.install_callbacks(
            InterfaceType::Ranger,
            InterfaceCallbacks::default().with_data_get(ranger_sample),
        );
        table.install_formatters(
            InterfaceType::Ranger,
            Some(Box::new(codec::format_ranger_data)),
            None,
        );

        let json = table.render_data(InterfaceType::Ranger, &2.5).unwrap();
        assert_eq!(json["transducers"][0]["samples"][0], json!([0.0, 0.0, 2.5, 1.0]));
        assert!(table.resolve(InterfaceType::Ranger, Capability::DataGet));
        assert!(!table.resolve(InterfaceType::Ranger, Capability::CfgFormat));
    }

    #[test]
    fn test_missing_pieces_are_capability_absent() {
        let mut table: DispatchTable<f64> = DispatchTable::new();

        // Nothing installed at all
        assert!(matches!(
            table.render_data(InterfaceType::Generic, &0.0),
            Err(DispatchError::CapabilityAbsent {
                interface: InterfaceType::Generic,
                capability: Capability::DataGet
            })
        ));

        // Accessor but no formatter
        table.install_callbacks(
            InterfaceType::Ranger,
            InterfaceCallbacks::default().with_data_get(ranger_sample),
        );
        assert!(matches!(
            table.render_data(InterfaceType::Ranger, &1.0),
            Err(DispatchError::CapabilityAbsent {
                capability: Capability::DataFormat,
                ..
            })
        ));

        // Formatter but no accessor
        table.install_formatters(
            InterfaceType::Fiducial,
            None,
            Some(Box::new(codec::format_raw)),
        );
        assert!(matches!(
            table.render_cfg(InterfaceType::Fiducial, &1.0),
            Err(DispatchError::CapabilityAbsent {
                capability: Capability::CfgGet,
                ..
            })
        ));
    }

    #[test]
    fn test_last_install_wins() {
        let mut table: DispatchTable<f64> = DispatchTable::new();
        table.install_callbacks(
            InterfaceType::Ranger,
            InterfaceCallbacks::default()
                .with_data_get(|_| Err(AccessorError::new("first"))),
        );
        table.install_callbacks(
            InterfaceType::Ranger,
            InterfaceCallbacks::default().with_data_get(ranger_sample),
        );
        table.install_formatters(
            InterfaceType::Ranger,
            Some(Box::new(codec::format_raw)),
            None,
        );
        table.install_formatters(
            InterfaceType::Ranger,
            Some(Box::new(codec::format_ranger_data)),
            None,
        );

        assert!(table.render_data(InterfaceType::Ranger, &3.0).is_ok());
    }

    #[test]
    fn test_accessor_failure_propagates() {
        let mut table: DispatchTable<f64> = DispatchTable::new();
        table.install_callbacks(
            InterfaceType::Fiducial,
            InterfaceCallbacks::default()
                .with_cfg_get(|_| Err(AccessorError::new("sensor offline"))),
        );
        table.install_formatters(InterfaceType::Fiducial, None, Some(Box::new(codec::format_raw)));

        match table.render_cfg(InterfaceType::Fiducial, &0.0) {
            Err(DispatchError::Accessor(e)) => assert_eq!(e.to_string(), "sensor offline"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_cmd_and_cfg_setters() {
        let received: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();

        let mut table: DispatchTable<u32> = DispatchTable::new();
        table.install_callbacks(
            InterfaceType::Position2d,
            InterfaceCallbacks::default().with_cmd_set(move |handle, cmd| {
                sink.borrow_mut().push(json!({"handle": handle, "cmd": cmd.payload}));
                Ok(())
            }),
        );

        let cmd = Command {
            time: 1,
            interface: InterfaceType::Position2d,
            payload: json!({"vx": 0.5}),
        };
        table.send_cmd(InterfaceType::Position2d, &7, &cmd).unwrap();
        assert_eq!(received.borrow()[0], json!({"handle": 7, "cmd": {"vx": 0.5}}));

        let cfg = Sample {
            time: 1,
            interface: InterfaceType::Position2d,
            payload: Payload::Json(json!({})),
        };
        assert!(matches!(
            table.apply_cfg(InterfaceType::Position2d, &7, &cfg),
            Err(DispatchError::CapabilityAbsent {
                capability: Capability::CfgSet,
                ..
            })
        ));
    }
}
