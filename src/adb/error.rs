use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for ADB operations.
pub type AdbResult<T> = Result<T, AdbError>;

/// The error type for the device layer.
#[derive(Debug, Error)]
pub enum AdbError {
    #[error("Failed to list devices from the ADB server: {source}")]
    DeviceEnumerationFailed {
        #[from]
        source: adb_client::RustADBError,
    },

    #[error("No Android device is attached to the ADB server")]
    NoDevice,

    #[error("Failed to open device '{serial}': {source}")]
    ConnectionFailed {
        serial: String,
        source: adb_client::RustADBError,
    },

    #[error("Shell command '{command}' failed: {source}")]
    ShellCommandFailed {
        command: String,
        source: adb_client::RustADBError,
    },

    #[error("ADB connection dropped during '{command}': {description}")]
    Disconnected { command: String, description: String },

    #[error("Operation timed out after {duration:?}: {description}")]
    Timeout {
        duration: Duration,
        description: String,
    },

    #[error("Device task failed to complete: {source}")]
    JoinError {
        #[from]
        source: tokio::task::JoinError,
    },

    #[error("Could not parse screen size from 'wm size' output")]
    ScreenSizeParseFailed,

    #[error("Tap coordinates are out of bounds: x={x}, y={y}")]
    TapOutOfBounds { x: u32, y: u32 },
}

impl AdbError {
    /// Map an adb_client failure, recognising transport errors that mean the
    /// device has to be reconnected.
    pub fn from_shell_failure(command: String, source: adb_client::RustADBError) -> Self {
        let text = source.to_string();
        if is_disconnect_message(&text) {
            AdbError::Disconnected {
                command,
                description: text,
            }
        } else {
            AdbError::ShellCommandFailed { command, source }
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, AdbError::Disconnected { .. } | AdbError::Timeout { .. })
    }
}

fn is_disconnect_message(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    ["clse", "no write endpoint", "broken pipe", "connection reset", "device offline", "not found"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_messages_are_recognised() {
        assert!(is_disconnect_message("protocol error: CLSE received"));
        assert!(is_disconnect_message("device 'emulator-5554' not found"));
        assert!(!is_disconnect_message("exit status 1"));
    }

    #[test]
    fn test_timeouts_count_as_disconnects() {
        let err = AdbError::Timeout {
            duration: Duration::from_secs(5),
            description: "tap".into(),
        };
        assert!(err.is_disconnect());
        assert!(!AdbError::ScreenSizeParseFailed.is_disconnect());
    }
}
