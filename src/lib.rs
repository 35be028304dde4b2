pub mod calibration;
pub mod channel;
pub mod codec;
pub mod config;
pub mod device;
pub mod energy;
pub mod error;
pub mod geometry;
pub mod link;
pub mod protocol;
pub mod trajectory;
pub mod worker;

pub use calibration::{CalibrationSession, CalibrationState, Recipe};
pub use channel::Channel;
pub use config::DeviceConfig;
pub use device::{Device, DeviceError};
pub use energy::{CaseGeometry, LaunchEnergyModel, ProjectileSpec, SpringSpec};
pub use error::{CalibrationError, GeometryError, WireError};
pub use link::{Envelope, Link, LinkError, MemoryLink};
pub use protocol::{Command, Message};
pub use trajectory::{ImpactData, Prediction, ShotInput, Tuning};
pub use worker::{Latest, SimulationWorker};
