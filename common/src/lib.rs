pub mod config;
pub mod controller;
pub mod form;
pub mod gree;
pub mod preset;
pub mod scheduler;
pub mod sensor;
pub mod state;
pub mod types;

pub use config::{IrHardwareConfig, NetworkConfig, RuntimeConfig, SensorConfig};
pub use controller::{Command, CommandError, CommandOutcome, LoadOutcome, RemoteController};
pub use form::FormParams;
pub use gree::{GreeFrame, IrSink};
pub use preset::{
    DirStorage, MemoryStorage, PresetError, PresetName, PresetRecord, PresetStorage, PresetStore,
};
pub use scheduler::{TransmitScheduler, TransmitState};
pub use sensor::{ClimateSensor, SensorReading};
pub use state::DeviceState;
pub use types::{AcMode, AcStatePayload, FanSpeed, SensorPayload, SwingPosition};
