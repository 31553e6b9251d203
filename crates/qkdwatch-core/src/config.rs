//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! valid configuration. Durations are integers in nanoseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cascade::CascadeConfig;
use crate::detector::{
    BASE_EFFICIENCY, DARK_COUNT_PROB, DEAD_TIME, DetectorConfig, INTRINSIC_FLIP_PROB,
    SATURATION_LIMIT,
};
use crate::stream::{DEFAULT_DEPOLARIZING_RATE, DEFAULT_TICK, StreamConfig};
use crate::window::DEFAULT_WINDOW_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub dead_time_ns: u64,
    pub tick_ns: u64,
    pub dark_count_prob: f64,
    pub base_efficiency: f64,
    pub intrinsic_flip_prob: f64,
    pub saturation_limit: f64,
    pub depolarizing_rate: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            dead_time_ns: DEAD_TIME.as_nanos() as u64,
            tick_ns: DEFAULT_TICK.as_nanos() as u64,
            dark_count_prob: DARK_COUNT_PROB,
            base_efficiency: BASE_EFFICIENCY,
            intrinsic_flip_prob: INTRINSIC_FLIP_PROB,
            saturation_limit: SATURATION_LIMIT,
            depolarizing_rate: DEFAULT_DEPOLARIZING_RATE,
        }
    }
}

impl PhysicsConfig {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            detector: DetectorConfig {
                dead_time: Duration::from_nanos(self.dead_time_ns),
                dark_count_prob: self.dark_count_prob,
                base_efficiency: self.base_efficiency,
                intrinsic_flip_prob: self.intrinsic_flip_prob,
                saturation_limit: self.saturation_limit,
            },
            depolarizing_rate: self.depolarizing_rate,
            tick: Duration::from_nanos(self.tick_ns),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Events per window.
    pub size: usize,
    /// Assess every `report_stride`-th new event once the window is full.
    pub report_stride: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_WINDOW_SIZE,
            report_stride: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdsConfig {
    pub physics: PhysicsConfig,
    pub window: WindowConfig,
    pub cascade: CascadeConfig,
}

fn check_probability(name: &str, p: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{name} = {p} is outside [0, 1]")))
    }
}

impl IdsConfig {
    /// Read a JSON file; absent fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.physics;
        check_probability("physics.dark_count_prob", p.dark_count_prob)?;
        check_probability("physics.base_efficiency", p.base_efficiency)?;
        check_probability("physics.intrinsic_flip_prob", p.intrinsic_flip_prob)?;
        check_probability("physics.depolarizing_rate", p.depolarizing_rate)?;
        check_probability("cascade.confidence_threshold", self.cascade.confidence_threshold)?;
        if !(self.cascade.novelty_nu > 0.0 && self.cascade.novelty_nu < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "cascade.novelty_nu = {} is outside (0, 1)",
                self.cascade.novelty_nu
            )));
        }
        if p.tick_ns == 0 {
            return Err(ConfigError::Invalid("physics.tick_ns must be positive".into()));
        }
        if p.saturation_limit.is_nan() || p.saturation_limit <= 0.0 {
            return Err(ConfigError::Invalid(
                "physics.saturation_limit must be positive".into(),
            ));
        }
        if self.window.size == 0 {
            return Err(ConfigError::Invalid("window.size must be positive".into()));
        }
        if self.window.report_stride == 0 {
            return Err(ConfigError::Invalid(
                "window.report_stride must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_physics_constants() {
        let c = IdsConfig::default();
        assert_eq!(c.window.size, 500);
        assert_eq!(c.window.report_stride, 1);
        assert_eq!(c.physics.dead_time_ns, 10_000);
        assert_eq!(c.physics.tick_ns, 1_000);
        assert_eq!(c.cascade.confidence_threshold, 0.70);
        let s = c.physics.stream_config();
        assert_eq!(s.detector.dead_time, Duration::from_micros(10));
        assert_eq!(s.depolarizing_rate, 0.04);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"window": {{"size": 200}}, "physics": {{"depolarizing_rate": 0.1}}}}"#).unwrap();
        let c = IdsConfig::load(file.path()).unwrap();
        assert_eq!(c.window.size, 200);
        assert_eq!(c.window.report_stride, 1);
        assert_eq!(c.physics.depolarizing_rate, 0.1);
        assert_eq!(c.physics.dark_count_prob, DARK_COUNT_PROB);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut c = IdsConfig::default();
        c.physics.base_efficiency = 1.5;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = IdsConfig::default();
        c.window.size = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = IdsConfig::default();
        c.physics.tick_ns = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = IdsConfig::default();
        c.cascade.novelty_nu = 0.0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reports_io_and_parse_errors() {
        assert!(matches!(
            IdsConfig::load(Path::new("/nonexistent/qkdwatch.json")),
            Err(ConfigError::Io(_))
        ));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ window: ").unwrap();
        assert!(matches!(IdsConfig::load(file.path()), Err(ConfigError::ParseJson(_))));
    }
}
