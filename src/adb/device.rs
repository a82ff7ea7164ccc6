// https://crates.io/crates/adb_client
use super::error::{AdbError, AdbResult};
use adb_client::{ADBDeviceExt, ADBServer, ADBServerDevice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One device reached through the local ADB server.
///
/// adb_client is blocking, so every shell call runs on the blocking pool and
/// is bounded by `command_timeout`; a hung transport surfaces as
/// [`AdbError::Timeout`] instead of stalling the caller.
pub struct AdbDevice {
    serial: String,
    device: Arc<Mutex<ADBServerDevice>>,
    screen_x: u32,
    screen_y: u32,
    command_timeout: Duration,
}

impl AdbDevice {
    /// Open `serial`, or the only attached device when no serial is given.
    pub async fn connect(serial: Option<&str>, command_timeout: Duration) -> AdbResult<Self> {
        let wanted = serial.map(str::to_string);
        let (serial, device) = tokio::task::spawn_blocking(move || -> AdbResult<(String, ADBServerDevice)> {
            let mut server = ADBServer::default();
            match wanted {
                Some(name) => server
                    .get_device_by_name(&name)
                    .map(|dev| (name.clone(), dev))
                    .map_err(|source| AdbError::ConnectionFailed {
                        serial: name,
                        source,
                    }),
                None => {
                    let first = server
                        .devices()?
                        .into_iter()
                        .next()
                        .map(|d| d.identifier)
                        .ok_or(AdbError::NoDevice)?;
                    server
                        .get_device()
                        .map(|dev| (first.clone(), dev))
                        .map_err(|source| AdbError::ConnectionFailed {
                            serial: first,
                            source,
                        })
                }
            }
        })
        .await??;

        let mut opened = AdbDevice {
            serial,
            device: Arc::new(Mutex::new(device)),
            screen_x: 0,
            screen_y: 0,
            command_timeout,
        };
        let size = opened.shell(&["wm", "size"]).await?;
        let (x, y) = parse_screen_size(&String::from_utf8_lossy(&size))
            .ok_or(AdbError::ScreenSizeParseFailed)?;
        opened.screen_x = x;
        opened.screen_y = y;
        log::info!("📱 Connected to '{}' ({}x{})", opened.serial, x, y);
        Ok(opened)
    }

    /// Run a shell command and collect its stdout.
    pub async fn shell(&self, args: &[&str]) -> AdbResult<Vec<u8>> {
        let command = args.join(" ");
        let owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let device = Arc::clone(&self.device);
        let description = command.clone();

        let call = tokio::task::spawn_blocking(move || -> AdbResult<Vec<u8>> {
            let mut out: Vec<u8> = Vec::new();
            let mut dev = device.blocking_lock();
            let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
            dev.shell_command(&refs, &mut out)
                .map_err(|source| AdbError::from_shell_failure(description, source))?;
            Ok(out)
        });

        match tokio::time::timeout(self.command_timeout, call).await {
            Ok(joined) => joined?,
            Err(_) => Err(AdbError::Timeout {
                duration: self.command_timeout,
                description: command,
            }),
        }
    }

    pub async fn screencap_png(&self) -> AdbResult<Vec<u8>> {
        let start = std::time::Instant::now();
        let bytes = self.shell(&["screencap", "-p"]).await?;
        log::debug!("📸 Captured {} bytes in {}ms", bytes.len(), start.elapsed().as_millis());
        Ok(bytes)
    }

    pub async fn tap(&self, x: u32, y: u32) -> AdbResult<()> {
        if x > self.screen_x || y > self.screen_y {
            return Err(AdbError::TapOutOfBounds { x, y });
        }
        let (xs, ys) = (x.to_string(), y.to_string());
        self.shell(&["input", "tap", &xs, &ys]).await?;
        Ok(())
    }

    pub async fn keyevent(&self, keycode: &str) -> AdbResult<()> {
        self.shell(&["input", "keyevent", keycode]).await?;
        Ok(())
    }
}

/// Parse `wm size` output, preferring an override size when one is set.
pub fn parse_screen_size(output: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    for line in output.lines() {
        let line = line.trim();
        let (is_override, rest) = if let Some(rest) = line.strip_prefix("Override size:") {
            (true, rest)
        } else if let Some(rest) = line.strip_prefix("Physical size:") {
            (false, rest)
        } else {
            continue;
        };
        if let Some((w, h)) = rest.trim().split_once('x')
            && let (Ok(w), Ok(h)) = (w.trim().parse::<u32>(), h.trim().parse::<u32>())
        {
            if is_override {
                return Some((w, h));
            }
            physical = Some((w, h));
        }
    }
    physical
}
