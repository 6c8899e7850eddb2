//! Model types exchanged between the simulator backend and the server

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::registry::RegistryError;

/// Maximum number of transducers in a single ranger model
pub const RANGER_TRANSDUCERS_MAX: usize = 64;
/// Maximum number of samples a single ranger transducer may report
pub const RANGER_SAMPLES_MAX: usize = 1024;

/// Unique, path-safe identifier of a registered model
///
/// The id doubles as the first segment of every resource path bound for
/// the model (`/<id>/pva`), so it is restricted to characters that need no
/// escaping in a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(pub(crate) String);

impl ModelId {
    /// Validate and wrap a model name
    pub fn new(name: impl Into<String>) -> Result<Self, RegistryError> {
        let name = name.into();
        if name.is_empty()
            || name.chars().all(|c| c == '.')
            || !name.chars().all(is_path_safe)
        {
            return Err(RegistryError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_path_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '~')
}

impl TryFrom<String> for ModelId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0
    }
}

impl FromStr for ModelId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a model, selecting which dispatch row applies to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    /// The simulation itself (root of the tree)
    Sim,
    /// A model with no interface-specific data
    Generic,
    /// A planar mobile base
    Position2d,
    /// A range sensor (sonar, lidar, IR)
    Ranger,
    /// A fiducial/landmark detector
    Fiducial,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Generic => "generic",
            Self::Position2d => "position2d",
            Self::Ranger => "ranger",
            Self::Fiducial => "fiducial",
        }
    }
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" => Ok(Self::Sim),
            "generic" => Ok(Self::Generic),
            "position2d" => Ok(Self::Position2d),
            "ranger" => Ok(Self::Ranger),
            "fiducial" => Ok(Self::Fiducial),
            other => Err(format!("unknown interface type: {}", other)),
        }
    }
}

/// Pose in the parent's coordinate system, velocity and acceleration in
/// local coordinates, all in six axes (x, y, z, roll, pitch, yaw)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pva {
    /// Simulation time in microseconds
    pub time: u64,
    pub p: [f64; 6],
    pub v: [f64; 6],
    pub a: [f64; 6],
}

/// Transformation into local object coordinates and object size
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geom {
    /// Simulation time in microseconds
    pub time: u64,
    /// 6dof pose
    pub pose: [f64; 6],
    /// Size of the bounding box in the local frame
    pub extent: [f64; 3],
}

/// Bounds of a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

/// Readings from one ranger transducer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangerTransducerData {
    /// Origin of the beams in local coordinates
    pub pose: [f64; 6],
    /// Samples in spherical coordinates: bearing, azimuth, range, intensity.
    /// An intensity of 0 means no reflection was detected.
    pub samples: Vec<[f64; 4]>,
}

/// Readings from a ranger model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangerData {
    pub transducers: Vec<RangerTransducerData>,
}

/// Static description of one ranger transducer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transducer {
    pub geom: Geom,
    /// Field of view: bearing, azimuth, range
    pub fov: [Bounds; 3],
}

/// Configuration of a ranger model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangerCfg {
    pub transducers: Vec<Transducer>,
}

/// Interface-specific content carried by a [`Sample`]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    RangerData(RangerData),
    RangerCfg(RangerCfg),
    /// Backend-produced JSON for interfaces without a typed payload
    Json(serde_json::Value),
}

/// Timestamped data or configuration snapshot produced by an accessor
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: u64,
    pub interface: InterfaceType,
    pub payload: Payload,
}

/// A command addressed to a model
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub time: u64,
    pub interface: InterfaceType,
    pub payload: serde_json::Value,
}
