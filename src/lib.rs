pub mod adb;
pub mod app;
pub mod automation;
pub mod config;
pub mod connection;
pub mod error;
pub mod screen;
pub mod tasks;

pub use app::App;
pub use config::AppConfig;
