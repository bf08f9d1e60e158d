use serde::Deserialize;
use std::path::PathBuf;

/// Complete warden configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WardenConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Performance monitor and freeze hysteresis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Signal value below which the system is considered critical
    #[serde(default = "default_critical_threshold")]
    pub critical_performance_threshold: f64,
    /// Freeze duration floor; hysteresis against flapping (seconds)
    #[serde(default = "default_min_freeze_duration")]
    pub min_freeze_duration_seconds: u64,
    /// Minimum spacing between surfaced warnings (seconds)
    #[serde(default = "default_notification_cooldown")]
    pub notification_cooldown_seconds: u64,
}

fn default_critical_threshold() -> f64 {
    15.0
}

fn default_min_freeze_duration() -> u64 {
    60
}

fn default_notification_cooldown() -> u64 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            critical_performance_threshold: default_critical_threshold(),
            min_freeze_duration_seconds: default_min_freeze_duration(),
            notification_cooldown_seconds: default_notification_cooldown(),
        }
    }
}

impl MonitorConfig {
    pub fn min_freeze_ms(&self) -> i64 {
        self.min_freeze_duration_seconds as i64 * 1_000
    }

    pub fn notification_cooldown_ms(&self) -> i64 {
        self.notification_cooldown_seconds as i64 * 1_000
    }
}

/// Scanner and density threshold configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Incremental scan budget per control tick
    #[serde(default = "default_regions_per_tick")]
    pub regions_per_tick: usize,
    /// Device count above which a region is flagged
    #[serde(default = "default_max_automation")]
    pub max_automation_threshold: u32,
    /// Non-operator entity count above which a region is flagged
    #[serde(default = "default_max_entities")]
    pub max_entity_threshold: u32,
    /// Automation-capable device kinds; fixed at startup, not reloadable
    #[serde(default = "default_automation_materials")]
    pub automation_materials: Vec<String>,
}

fn default_regions_per_tick() -> usize {
    3
}

fn default_max_automation() -> u32 {
    100
}

fn default_max_entities() -> u32 {
    100
}

fn default_automation_materials() -> Vec<String> {
    [
        "signal_wire",
        "relay",
        "comparator",
        "piston",
        "sticky_piston",
        "observer",
        "dispenser",
        "dropper",
        "conveyor",
        "signal_torch",
        "power_core",
        "lever",
        "stone_button",
        "wood_button",
        "tripwire_hook",
        "target_block",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            regions_per_tick: default_regions_per_tick(),
            max_automation_threshold: default_max_automation(),
            max_entity_threshold: default_max_entities(),
            automation_materials: default_automation_materials(),
        }
    }
}

/// Record retention configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Uncleared records older than this are dropped at load/save (hours)
    #[serde(default = "default_retention_window")]
    pub retention_window_hours: u64,
}

fn default_retention_window() -> u64 {
    24
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_window_hours: default_retention_window(),
        }
    }
}

impl RetentionConfig {
    pub fn retention_ms(&self) -> i64 {
        self.retention_window_hours as i64 * 3_600_000
    }
}

/// Record archive persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Archive file path
    #[serde(default = "default_archive_path")]
    pub path: PathBuf,
    /// Interval between autosaves (minutes)
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_minutes: u64,
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("/var/lib/warden/records.json.gz")
}

fn default_autosave_interval() -> u64 {
    5
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: default_archive_path(),
            autosave_interval_minutes: default_autosave_interval(),
        }
    }
}

impl PersistenceConfig {
    pub fn autosave_interval_ms(&self) -> i64 {
        self.autosave_interval_minutes as i64 * 60_000
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<WardenConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: WardenConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WardenConfig::default();
        assert_eq!(config.monitor.critical_performance_threshold, 15.0);
        assert_eq!(config.monitor.min_freeze_duration_seconds, 60);
        assert_eq!(config.scan.regions_per_tick, 3);
        assert_eq!(config.scan.max_automation_threshold, 100);
        assert_eq!(config.scan.max_entity_threshold, 100);
        assert_eq!(config.scan.automation_materials.len(), 16);
        assert_eq!(config.retention.retention_window_hours, 24);
        assert_eq!(config.persistence.autosave_interval_minutes, 5);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [monitor]
            critical_performance_threshold = 12.5
            min_freeze_duration_seconds = 120
            notification_cooldown_seconds = 30

            [scan]
            regions_per_tick = 8
            max_automation_threshold = 250
            max_entity_threshold = 80
            automation_materials = ["relay", "piston"]

            [retention]
            retention_window_hours = 48

            [persistence]
            path = "/tmp/warden/records.json.gz"
            autosave_interval_minutes = 10
        "#;

        let config: WardenConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.monitor.critical_performance_threshold, 12.5);
        assert_eq!(config.monitor.min_freeze_ms(), 120_000);
        assert_eq!(config.scan.regions_per_tick, 8);
        assert_eq!(config.scan.automation_materials, vec!["relay", "piston"]);
        assert_eq!(config.retention.retention_ms(), 48 * 3_600_000);
        assert_eq!(config.persistence.autosave_interval_ms(), 600_000);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [monitor]
            critical_performance_threshold = 10.0
        "#;

        let config: WardenConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.monitor.critical_performance_threshold, 10.0);
        assert_eq!(config.monitor.min_freeze_duration_seconds, 60); // Default
        assert_eq!(config.scan.regions_per_tick, 3); // Default
        assert_eq!(config.retention.retention_window_hours, 24); // Default
    }
}
