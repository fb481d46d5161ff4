//! WT Protocol - Wire protocol for the dashboard socket
//!
//! Messages exchanged between the `wtd` daemon and dashboard clients.
//! Each message is a single JSON object terminated by a newline.

pub mod message;
pub mod version;

pub use message::{ClientMessage, DaemonMessage, DashboardSnapshot, MessageType};
pub use version::{ProtocolVersion, VersionError};
