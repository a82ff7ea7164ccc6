// Device access through the adb_client crate and the local ADB server

pub mod device;
pub mod error;

pub use device::AdbDevice;
pub use error::{AdbError, AdbResult};
