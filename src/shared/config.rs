/// Engine configuration
///
/// Loaded from a JSON file (every field optional, defaults below) and then
/// overridden by CLI flags. `validate()` is the fail-fast gate: nothing is
/// spawned until it passes.

use crate::shared::error::EngineError;
use crate::shared::types::{Quantity, SecSid};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    /// One entry per independent throttle pool; index = `assigned_throttle_tracker_index`
    pub throttles: Vec<ThrottleConfig>,
    pub matching: MatchingConfig,
    pub line_handler: LineHandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum requests forwarded to the line handler per cycle
    pub max_batch_size: usize,
    /// Period of the timeout sweep
    pub sweep_interval_ns: i64,
    /// Deadline given to requests submitted without one, relative to submission
    pub default_timeout_ns: i64,
    /// Capacity of the inbound request queue
    pub request_queue_capacity: usize,
    pub cpu_core: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            sweep_interval_ns: 1_000_000,
            default_timeout_ns: 5_000_000_000,
            request_queue_capacity: 4_096,
            cpu_core: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub window_ns: i64,
    pub capacity: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_ns: 1_000_000_000,
            capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Simulated exchange latency before an own order becomes matchable
    pub order_delay_ns: i64,
    /// Expire any quantity left unmatched once the order becomes matchable
    pub fill_or_kill: bool,
    /// Run matching on a dedicated consumer thread behind a ring buffer
    pub multi_threaded: bool,
    /// Must be a power of two
    pub ring_buffer_size: usize,
    pub consumer_cpu_core: Option<usize>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            order_delay_ns: 0,
            fill_or_kill: false,
            multi_threaded: false,
            ring_buffer_size: 1_024,
            consumer_cpu_core: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineHandlerConfig {
    /// Registry tag of the engine to build
    pub engine: String,
    /// Channel on which update events are sequenced
    pub channel_id: u32,
    pub dispatch_queue_capacity: usize,
    pub cpu_core: Option<usize>,
    pub simulated: SimulatedExchangeConfig,
}

impl Default for LineHandlerConfig {
    fn default() -> Self {
        Self {
            engine: "simulated".to_string(),
            channel_id: 1,
            dispatch_queue_capacity: 1_024,
            cpu_core: None,
            simulated: SimulatedExchangeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedExchangeConfig {
    /// Starting purchasing power in price-ticks × quantity
    pub purchasing_power: i64,
    pub positions: Vec<PositionConfig>,
}

impl Default for SimulatedExchangeConfig {
    fn default() -> Self {
        Self {
            purchasing_power: 1_000_000_000,
            positions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionConfig {
    pub sec_sid: SecSid,
    pub quantity: Quantity,
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            serde_json::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would fail at runtime
    pub fn validate(&self) -> Result<(), EngineError> {
        let executor = &self.executor;
        if executor.max_batch_size == 0 {
            return Err(EngineError::Config("executor.max_batch_size must be > 0".into()));
        }
        if executor.sweep_interval_ns < 0 {
            return Err(EngineError::Config("executor.sweep_interval_ns must be >= 0".into()));
        }
        if executor.default_timeout_ns <= 0 {
            return Err(EngineError::Config("executor.default_timeout_ns must be > 0".into()));
        }
        if executor.request_queue_capacity == 0 {
            return Err(EngineError::Config("executor.request_queue_capacity must be > 0".into()));
        }

        for (index, throttle) in self.throttles.iter().enumerate() {
            if throttle.window_ns <= 0 {
                return Err(EngineError::Config(format!("throttles[{}].window_ns must be > 0", index)));
            }
            if throttle.capacity == 0 {
                return Err(EngineError::Config(format!("throttles[{}].capacity must be > 0", index)));
            }
        }

        let matching = &self.matching;
        if matching.order_delay_ns < 0 {
            return Err(EngineError::Config("matching.order_delay_ns must be >= 0".into()));
        }
        if matching.ring_buffer_size < 2 || !matching.ring_buffer_size.is_power_of_two() {
            return Err(EngineError::InvalidRingBufferSize(matching.ring_buffer_size));
        }
        if matching.multi_threaded && !matching.fill_or_kill {
            return Err(EngineError::Config(
                "matching.multi_threaded requires matching.fill_or_kill".into(),
            ));
        }

        if self.line_handler.engine.is_empty() {
            return Err(EngineError::Config("line_handler.engine must be set".into()));
        }
        if self.line_handler.dispatch_queue_capacity == 0 {
            return Err(EngineError::Config(
                "line_handler.dispatch_queue_capacity must be > 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "throttles": [{ "window_ns": 1000, "capacity": 2 }],
                "matching": { "order_delay_ns": 50 },
                "line_handler": { "channel_id": 7 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.throttles, vec![ThrottleConfig { window_ns: 1000, capacity: 2 }]);
        assert_eq!(config.matching.order_delay_ns, 50);
        assert_eq!(config.matching.ring_buffer_size, 1_024);
        assert_eq!(config.line_handler.channel_id, 7);
        assert_eq!(config.line_handler.engine, "simulated");
        assert_eq!(config.executor.max_batch_size, 32);
    }

    #[test]
    fn test_bad_ring_size_is_fatal() {
        let mut config = EngineConfig::default();
        config.matching.ring_buffer_size = 1000;
        assert_eq!(config.validate(), Err(EngineError::InvalidRingBufferSize(1000)));
    }

    #[test]
    fn test_multi_threaded_requires_fill_or_kill() {
        let mut config = EngineConfig::default();
        config.matching.multi_threaded = true;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        config.matching.fill_or_kill = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_throttle_rejected() {
        let mut config = EngineConfig::default();
        config.throttles.push(ThrottleConfig { window_ns: 1, capacity: 0 });
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(EngineError::Config(_))
        ));
    }
}
