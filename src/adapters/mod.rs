//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter           | Implements  | Connects to                     |
//! |-------------------|-------------|---------------------------------|
//! | `log_sink`        | EventSink   | `log` facade (console)          |
//! | `csv_log`         | EventSink   | per-cycle CSV file              |
//! | `feature_channel` | EventSink   | JSON-lines feature stream       |
//! | `fanout`          | EventSink   | several sinks at once           |
//! | `config_file`     | ConfigPort  | JSON document on disk           |
//!
//! Camera and PWM adapters live in [`crate::camera`] and
//! [`crate::drivers`].

pub mod config_file;
pub mod csv_log;
pub mod fanout;
pub mod feature_channel;
pub mod log_sink;

pub use config_file::JsonFileConfig;
pub use csv_log::CsvCycleLog;
pub use fanout::MultiSink;
pub use feature_channel::FeatureChannelSink;
pub use log_sink::LogEventSink;
