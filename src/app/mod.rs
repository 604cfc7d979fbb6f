//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the feeding rules: FSM orchestration, anomaly
//! evaluation, activity fusion, and PI regulation of the feeder output.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;

pub use commands::AppCommand;
pub use events::{AppEvent, CycleRecord, StatusReport};
pub use service::{ControllerStatus, FeederService};
