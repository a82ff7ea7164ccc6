//! Connection-loss detection and recovery.

pub mod monitor;
pub mod recovery;

pub use monitor::{ConnectionMonitor, ConnectionState};
pub use recovery::{RecoveryAction, recovery_action};
