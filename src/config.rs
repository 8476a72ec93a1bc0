use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TemporaError;

/// Slowest master rate accepted (one cycle every 1000 s)
pub const MIN_MASTER_HZ: f64 = 0.001;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub kernel: KernelConfig,
    pub ledger: LedgerConfig,
    pub stream: StreamConfig,
    pub patterns: PatternConfig,
    pub intuition: IntuitionConfig,
    pub planning: PlanningConfig,
    pub storage: StorageConfig,
}

/// One processing loop and the rate it should run at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    pub id: String,
    pub target_hz: f64,
}

impl LoopSpec {
    pub fn new(id: impl Into<String>, target_hz: f64) -> Self {
        Self {
            id: id.into(),
            target_hz,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Merge rate of the orchestrator
    pub master_hz: f64,
    /// Below this measured master rate a cycle counts as degraded
    pub critical_hz: f64,
    /// Consecutive degraded cycles tolerated before RhythmDegraded fires
    pub degraded_after_cycles: u32,
    /// Fraction of the master period a loop step may take
    pub loop_deadline_ratio: f64,
    pub loops: Vec<LoopSpec>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            master_hz: 10.0,
            critical_hz: 7.0,
            degraded_after_cycles: 5,
            loop_deadline_ratio: 0.8,
            loops: vec![
                LoopSpec::new("awareness", 10.0),
                LoopSpec::new("structural", 5.0),
                LoopSpec::new("resonance", 2.0),
                LoopSpec::new("context", 1.0),
            ],
        }
    }
}

impl KernelConfig {
    /// Duration of one master cycle
    /// Saturates at `Duration::MAX` for rates `validate` would reject.
    pub fn master_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.master_hz).unwrap_or(Duration::MAX)
    }

    /// Per-cycle deadline handed to each loop step
    pub fn loop_deadline(&self) -> Duration {
        self.master_period().mul_f64(self.loop_deadline_ratio)
    }

    /// Check frequencies, deadline ratio and loop id uniqueness
    pub fn validate(&self) -> crate::error::Result<()> {
        positive("kernel.master_hz", self.master_hz)?;
        if self.master_hz < MIN_MASTER_HZ {
            return Err(config_error(format!(
                "kernel.master_hz must be >= {} (got {})",
                MIN_MASTER_HZ, self.master_hz
            )));
        }
        if !self.critical_hz.is_finite() || self.critical_hz < 0.0 {
            return Err(config_error("kernel.critical_hz must be >= 0"));
        }
        if !(self.loop_deadline_ratio > 0.0 && self.loop_deadline_ratio <= 1.0) {
            return Err(config_error("kernel.loop_deadline_ratio must be in (0, 1]"));
        }
        if self.loops.is_empty() {
            return Err(config_error("kernel.loops must name at least one loop"));
        }
        let mut seen = HashSet::new();
        for spec in &self.loops {
            positive(&format!("kernel.loops[{}].target_hz", spec.id), spec.target_hz)?;
            if !seen.insert(spec.id.as_str()) {
                return Err(config_error(format!("duplicate loop id: {}", spec.id)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub initial_balance: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Records older than this are evicted
    pub retention_ms: u64,
    /// Hard cap on held records; oldest go first
    pub max_records: usize,
    /// Ledger cost of one append
    pub signal_cost: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retention_ms: 300_000,
            max_records: 64,
            signal_cost: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// K: occurrences needed before a signature class becomes a pattern
    pub min_occurrences: usize,
    /// Occurrence count at which strength saturates at 1.0
    pub saturation_count: usize,
    /// Member records kept on a pattern
    pub member_cap: usize,
    /// Ledger cost of one deepening pass
    pub deepen_cost: f64,
    /// Run a deepening pass every this many pipeline passes (0 disables)
    pub deepen_interval_cycles: u64,
    /// Records examined for progression and sustained resonance
    pub progression_window: usize,
    /// Mean resonance above which sustained resonance is reported
    pub resonance_floor: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            saturation_count: 5,
            member_cap: 5,
            deepen_cost: 10.0,
            deepen_interval_cycles: 10,
            progression_window: 5,
            resonance_floor: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntuitionConfig {
    /// Minimum pattern strength for birth
    pub threshold: f64,
    /// confidence = strength * dampening
    pub dampening: f64,
    /// Birth cost per source record
    pub cost_per_record: f64,
    /// Reward on birth, scaled by confidence
    pub reward: f64,
    /// How long a deferred intuition stays available
    pub defer_window_ms: u64,
    pub max_deferred: usize,
}

impl Default for IntuitionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            dampening: 0.9,
            cost_per_record: 5.0,
            reward: 20.0,
            defer_window_ms: 60_000,
            max_deferred: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Activate plans as soon as they are built
    pub auto_activate: bool,
    /// Plan steps the pipeline advances per pass (0 leaves execution to the owner)
    pub steps_per_cycle: usize,
    /// Ledger cost of executing one action
    pub step_cost: f64,
    /// Completion reward per completed action, scaled by confidence
    pub reward_per_action: f64,
    /// Feed completed plans back into the signal stream
    pub wisdom_feedback: bool,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            auto_activate: true,
            steps_per_cycle: 1,
            step_cost: 3.0,
            reward_per_action: 5.0,
            wisdom_feedback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub plans_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            plans_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tempora"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            kernel: KernelConfig::default(),
            ledger: LedgerConfig::default(),
            stream: StreamConfig::default(),
            patterns: PatternConfig::default(),
            intuition: IntuitionConfig::default(),
            planning: PlanningConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn config_error(msg: impl Into<String>) -> TemporaError {
    TemporaError::Config(msg.into())
}

fn positive(name: &str, value: f64) -> crate::error::Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(config_error(format!("{} must be > 0 (got {})", name, value)))
    }
}

fn non_negative(name: &str, value: f64) -> crate::error::Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(config_error(format!("{} must be >= 0 (got {})", name, value)))
    }
}

fn unit(name: &str, value: f64) -> crate::error::Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(format!("{} must be within [0, 1] (got {})", name, value)))
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject configurations the kernel cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.kernel.validate()?;

        non_negative("ledger.initial_balance", self.ledger.initial_balance)?;

        if self.stream.retention_ms == 0 {
            return Err(config_error("stream.retention_ms must be > 0"));
        }
        if self.stream.max_records == 0 {
            return Err(config_error("stream.max_records must be > 0"));
        }
        non_negative("stream.signal_cost", self.stream.signal_cost)?;

        let p = &self.patterns;
        if p.min_occurrences == 0 {
            return Err(config_error("patterns.min_occurrences must be >= 1"));
        }
        if p.saturation_count == 0 {
            return Err(config_error("patterns.saturation_count must be >= 1"));
        }
        if p.member_cap == 0 {
            return Err(config_error("patterns.member_cap must be >= 1"));
        }
        non_negative("patterns.deepen_cost", p.deepen_cost)?;
        if p.progression_window < 2 {
            return Err(config_error("patterns.progression_window must be >= 2"));
        }
        unit("patterns.resonance_floor", p.resonance_floor)?;

        let i = &self.intuition;
        unit("intuition.threshold", i.threshold)?;
        unit("intuition.dampening", i.dampening)?;
        non_negative("intuition.cost_per_record", i.cost_per_record)?;
        non_negative("intuition.reward", i.reward)?;

        non_negative("planning.step_cost", self.planning.step_cost)?;
        non_negative("planning.reward_per_action", self.planning.reward_per_action)?;

        Ok(())
    }

    /// Effective configuration as YAML
    pub fn to_yaml(&self) -> crate::error::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kernel.loops.len(), 4);
        assert_eq!(config.patterns.min_occurrences, 3);
        assert_eq!(config.patterns.saturation_count, 5);
        assert_eq!(config.intuition.threshold, 0.7);
        assert_eq!(config.intuition.dampening, 0.9);
    }

    #[test]
    fn test_master_period_and_deadline() {
        let kernel = KernelConfig::default();
        assert_eq!(kernel.master_period(), Duration::from_millis(100));
        assert_eq!(kernel.loop_deadline(), Duration::from_millis(80));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let mut config = Config::default();
        config.kernel.loops[1].target_hz = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, TemporaError::Config(_)));
        assert!(err.to_string().contains("structural"));
    }

    #[test]
    fn test_negative_master_rejected() {
        let mut config = Config::default();
        config.kernel.master_hz = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tiny_master_rate_rejected_without_panic() {
        let mut config = Config::default();
        config.kernel.master_hz = 1e-20;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, TemporaError::Config(_)));
        assert!(err.to_string().contains("kernel.master_hz"));
        assert_eq!(config.kernel.master_period(), Duration::MAX);

        config.kernel.master_hz = MIN_MASTER_HZ;
        assert!(config.validate().is_ok());
        assert_eq!(config.kernel.master_period(), Duration::from_secs(1000));
    }

    #[test]
    fn test_duplicate_loop_ids_rejected() {
        let mut config = Config::default();
        config.kernel.loops.push(LoopSpec::new("awareness", 3.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate loop id: awareness"));
    }

    #[test]
    fn test_threshold_outside_unit_rejected() {
        let mut config = Config::default();
        config.intuition.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut config = Config::default();
        config.patterns.min_occurrences = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_yaml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tempora.yml");
        fs::write(
            &path,
            "kernel:\n  master_hz: 20.0\n  loops:\n    - id: solo\n      target_hz: 4.0\nintuition:\n  threshold: 0.6\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.kernel.master_hz, 20.0);
        assert_eq!(config.kernel.loops, vec![LoopSpec::new("solo", 4.0)]);
        assert_eq!(config.intuition.threshold, 0.6);
        assert_eq!(config.intuition.dampening, 0.9);
        assert_eq!(config.stream.retention_ms, 300_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/definitely/not/here/tempora.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = config.to_yaml().unwrap();
        let restored: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored.kernel.loops, config.kernel.loops);
        assert_eq!(restored.planning.step_cost, config.planning.step_cost);
    }
}
