//! NAN manager daemon
//!
//! Replays host commands and firmware indications against a single
//! [`nan_core::NanInterface`] backed by a simulated firmware, writing each
//! reply and notification as a JSON line.

pub mod config;
pub mod daemon;
pub mod error;
pub mod firmware;
pub mod output;
pub mod script;

pub use config::{DaemonConfig, NanmgrConfig, DEFAULT_CONFIG_PATH};
pub use daemon::{NanDaemon, RunStats};
pub use error::{NanmgrError, Result};
pub use firmware::SimulatedFirmware;
pub use output::{to_json_line, Output};
pub use script::{parse_line, Request};
