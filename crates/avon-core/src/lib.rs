//! Avon Core - Model registry, interface dispatch and wire codec
//!
//! This crate provides the pieces of the Avon server that do not depend on
//! the HTTP transport:
//! - Model types (pose/velocity/acceleration, geometry, ranger payloads)
//! - The registry: a named tree of models rooted at `sim`
//! - The per-interface dispatch table of accessor callbacks and formatters
//! - The generic pose/geometry callbacks shared by every model
//! - The canonical JSON encoding of all of the above

pub mod codec;
pub mod dispatch;
pub mod generic;
pub mod model;
pub mod registry;

pub use codec::CodecError;
pub use dispatch::{AccessorError, Capability, DispatchError, DispatchTable, Formatter, InterfaceCallbacks};
pub use generic::{ClockFn, GenericCallbacks};
pub use model::{
    Bounds, Command, Geom, InterfaceType, ModelId, Payload, Pva, RangerCfg, RangerData,
    RangerTransducerData, Sample, Transducer,
};
pub use registry::{Node, Registry, RegistryError, TreeView, ROOT_ID};
