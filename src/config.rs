//! JSON configuration. Every section has defaults, so a partial file (or `{}`)
//! is valid; [`AppConfig::validate`] rejects combinations that cannot work.

use crate::error::ConfigError;
use crate::screen::{Point, SearchRegion};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub state: StateConfig,
    pub scheduler: SchedulerConfig,
    pub timers: TimerConfig,
    pub connection: ConnectionConfig,
    pub human: HumanConfig,
    pub backoff: BackoffConfig,
    pub ocr: OcrConfig,
    pub device: DeviceConfig,
    pub gathering: GatheringConfig,
    pub training: TrainingConfig,
    pub alliance: AllianceConfig,
    pub anti_afk: AntiAfkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub queue_file: PathBuf,
    pub timers_file: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            queue_file: PathBuf::from("task_queue.json"),
            timers_file: PathBuf::from("timers.json"),
        }
    }
}

impl StateConfig {
    /// Resolve relative state files against `dir`.
    pub fn in_dir(&self, dir: &Path) -> Self {
        let rebase = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                dir.join(p)
            }
        };
        Self {
            queue_file: rebase(&self.queue_file),
            timers_file: rebase(&self.timers_file),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub tick_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { tick_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub enabled: bool,
    pub poll_secs: u64,
    pub recovery_window_secs: u64,
    pub confirm_point: Point,
    pub disconnect_region: SearchRegion,
    /// Case-insensitive fragments of the disconnect dialog text.
    pub disconnect_patterns: Vec<String>,
    /// Restart delay for a gathering march interrupted mid-transit.
    pub marching_fallback_secs: u64,
    /// Re-losses tolerated inside one recovery before it is reported; `None`
    /// never complains.
    pub max_consecutive_losses: Option<u32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_secs: 5,
            recovery_window_secs: 120,
            confirm_point: Point::new(540, 1360),
            disconnect_region: SearchRegion::new(240, 980, 600, 160).named("disconnect"),
            disconnect_patterns: vec![
                "connection lost".into(),
                "disconnected".into(),
                "network error".into(),
                "reconnect".into(),
            ],
            marching_fallback_secs: 1800,
            max_consecutive_losses: None,
        }
    }
}

impl ConnectionConfig {
    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for HumanConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 400,
            max_delay_ms: 1200,
        }
    }
}

impl HumanConfig {
    pub fn bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffTier {
    /// Highest consecutive failure count this tier covers.
    pub up_to: u32,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub tiers: Vec<BackoffTier>,
    /// Delay once the failure count is past every tier.
    pub max_delay_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                BackoffTier { up_to: 2, delay_secs: 300 },
                BackoffTier { up_to: 4, delay_secs: 900 },
                BackoffTier { up_to: 6, delay_secs: 1800 },
            ],
            max_delay_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Reads per consensus vote.
    pub consensus_reads: usize,
    /// Votes taken before a read is given up on.
    pub max_read_attempts: u32,
    /// Template searches before a detection counts as failed.
    pub detection_attempts: u32,
    pub match_threshold: f32,
    pub templates_dir: PathBuf,
    pub popup_close_template: String,
    pub popup_region: Option<SearchRegion>,
    pub tesseract_bin: String,
    pub page_seg_mode: u8,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            consensus_reads: 3,
            max_read_attempts: 3,
            detection_attempts: 3,
            match_threshold: 0.8,
            templates_dir: PathBuf::from("templates"),
            popup_close_template: "popup_close.png".into(),
            popup_region: None,
            tesseract_bin: "tesseract".into(),
            page_seg_mode: 7,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// ADB serial; the first attached device when unset.
    pub serial: Option<String>,
    pub command_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            command_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommanderConfig {
    pub id: u32,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default = "default_resource")]
    pub resource: String,
    /// Commander portrait in the march dialog.
    pub slot: Option<Point>,
}

fn enabled() -> bool {
    true
}

fn default_resource() -> String {
    "food".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatheringConfig {
    pub enabled: bool,
    pub commanders: Vec<CommanderConfig>,
    pub search_template: String,
    pub gather_template: String,
    pub march_template: String,
    pub march_time_region: SearchRegion,
    pub gather_time_region: SearchRegion,
    pub max_march_secs: u64,
    pub default_march_secs: u64,
    pub max_gather_secs: u64,
    pub default_gather_secs: u64,
}

impl Default for GatheringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            commanders: Vec::new(),
            search_template: "resource_search.png".into(),
            gather_template: "gather_button.png".into(),
            march_template: "march_button.png".into(),
            march_time_region: SearchRegion::new(760, 1880, 220, 60).named("march_time"),
            gather_time_region: SearchRegion::new(620, 540, 260, 60).named("gather_time"),
            max_march_secs: 1800,
            default_march_secs: 300,
            max_gather_secs: 8 * 3600,
            default_gather_secs: 2 * 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingConfig {
    pub name: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
    pub point: Point,
    pub status_region: SearchRegion,
    pub timer_region: SearchRegion,
    /// Unit tier button to pick before training, if any.
    #[serde(default)]
    pub tier_point: Option<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub enabled: bool,
    pub buildings: Vec<BuildingConfig>,
    pub train_template: String,
    pub max_training_secs: u64,
    pub default_training_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buildings: Vec::new(),
            train_template: "train_button.png".into(),
            max_training_secs: 24 * 3600,
            default_training_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllianceConfig {
    pub enabled: bool,
    pub alliance_template: String,
    pub help_template: String,
    pub interval_secs: u64,
    pub jitter_secs: u64,
}

impl Default for AllianceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            alliance_template: "alliance_button.png".into(),
            help_template: "help_all.png".into(),
            interval_secs: 1800,
            jitter_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiAfkConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub key: Option<String>,
    pub tap_point: Option<Point>,
}

impl Default for AntiAfkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 240,
            key: Some("space".into()),
            tap_point: None,
        }
    }
}

impl AppConfig {
    /// Read and validate `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::info!("⚙️ Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.scheduler.tick_secs == 0 || self.timers.tick_secs == 0 {
            return invalid("tick periods must be at least one second".into());
        }
        if self.human.min_delay_ms > self.human.max_delay_ms {
            return invalid(format!(
                "human.min_delay_ms ({}) is larger than human.max_delay_ms ({})",
                self.human.min_delay_ms, self.human.max_delay_ms
            ));
        }
        if self.ocr.consensus_reads == 0
            || self.ocr.max_read_attempts == 0
            || self.ocr.detection_attempts == 0
        {
            return invalid("ocr read and detection counts must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.ocr.match_threshold) {
            return invalid(format!("ocr.match_threshold {} is outside 0..=1", self.ocr.match_threshold));
        }
        if self
            .backoff
            .tiers
            .windows(2)
            .any(|pair| pair[0].up_to >= pair[1].up_to)
        {
            return invalid("backoff tiers must have increasing up_to values".into());
        }

        let c = &self.connection;
        if c.enabled {
            if c.poll_secs == 0 {
                return invalid("connection.poll_secs must be at least one second".into());
            }
            if c.disconnect_patterns.iter().all(|p| p.trim().is_empty()) {
                return invalid("connection.disconnect_patterns is empty".into());
            }
            if !c.disconnect_region.is_valid() {
                return invalid("connection.disconnect_region has no area".into());
            }
        }

        let g = &self.gathering;
        if g.enabled {
            let mut seen = std::collections::HashSet::new();
            for commander in g.commanders.iter().filter(|c| c.enabled) {
                if !seen.insert(commander.id) {
                    return invalid(format!("commander {} is listed twice", commander.id));
                }
                if commander.slot.is_none() {
                    return invalid(format!("commander {} is enabled but has no slot point", commander.id));
                }
            }
            if g.default_gather_secs > g.max_gather_secs || g.default_march_secs > g.max_march_secs {
                return invalid("gathering defaults must not exceed their maximums".into());
            }
        }

        let t = &self.training;
        if t.enabled {
            let mut seen = std::collections::HashSet::new();
            for building in t.buildings.iter().filter(|b| b.enabled) {
                if !seen.insert(building.name.as_str()) {
                    return invalid(format!("building '{}' is listed twice", building.name));
                }
                if !building.status_region.is_valid() || !building.timer_region.is_valid() {
                    return invalid(format!("building '{}' has an empty OCR region", building.name));
                }
            }
            if t.default_training_secs > t.max_training_secs {
                return invalid("training.default_training_secs exceeds the maximum".into());
            }
        }

        if self.alliance.enabled && self.alliance.interval_secs == 0 {
            return invalid("alliance.interval_secs must be positive".into());
        }

        let a = &self.anti_afk;
        if a.enabled {
            if a.interval_secs == 0 {
                return invalid("anti_afk.interval_secs must be positive".into());
            }
            if a.key.is_none() && a.tap_point.is_none() {
                return invalid("anti_afk needs a key or a tap_point".into());
            }
        }
        Ok(())
    }
}
