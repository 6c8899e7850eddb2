//! Avon - a lightweight HTTP server for robots and robot simulators
//!
//! A simulator backend creates an [`Avon`] context, installs its clock,
//! generic pose/geometry callbacks and per-interface accessors, registers
//! its models, then calls [`Avon::startup`]. The returned [`RunningAvon`]
//! is pumped from the backend's own loop with [`RunningAvon::wait`] or
//! [`RunningAvon::check`].

pub mod config;
pub mod error;
pub mod router;
pub mod server;
pub mod transport;

pub use config::{load_config, Config, ServerConfig, DEFAULT_PORT};
pub use error::{ConfigError, RequestError};
pub use router::{Reply, Resource, Router, CLOCK_PATH, TREE_PATH};
pub use server::{Avon, RunningAvon, Service};
pub use transport::{build_router, Inbound, Transport};
