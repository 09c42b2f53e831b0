//! Configuration for inspectd

use inspect_cycle::CycleConfig;
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Detection cycle configuration
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Simulated line configuration
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inclusive latency range in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Simulated line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of triggers to run; 0 runs until interrupted
    #[serde(default = "default_cycles")]
    pub cycles: u64,

    /// Pause between triggers
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Request the 3D height pass
    #[serde(default = "default_true")]
    pub height_enabled: bool,

    /// Shielding interlock engaged
    #[serde(default)]
    pub shielded: bool,

    /// Run the triggers in system test mode
    #[serde(default)]
    pub system_test: bool,

    /// 2D optical pass latency
    #[serde(default = "default_channel_a_latency")]
    pub channel_a_latency: LatencyRange,

    /// 3D height pass latency
    #[serde(default = "default_channel_b_latency")]
    pub channel_b_latency: LatencyRange,

    /// Probability that a 2D result is lost
    #[serde(default = "default_drop_probability")]
    pub channel_a_drop_probability: f64,

    /// RNG seed; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            interval_ms: default_interval_ms(),
            height_enabled: true,
            shielded: false,
            system_test: false,
            channel_a_latency: default_channel_a_latency(),
            channel_b_latency: default_channel_b_latency(),
            channel_a_drop_probability: default_drop_probability(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), String> {
        for (name, range) in [
            ("channel_a_latency", self.channel_a_latency),
            ("channel_b_latency", self.channel_b_latency),
        ] {
            if range.min_ms > range.max_ms {
                return Err(format!("{name}: min_ms exceeds max_ms"));
            }
        }
        if !(0.0..=1.0).contains(&self.channel_a_drop_probability) {
            return Err("channel_a_drop_probability must be within 0.0..=1.0".into());
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_cycles() -> u64 {
    20
}

fn default_interval_ms() -> u64 {
    250
}

fn default_channel_a_latency() -> LatencyRange {
    LatencyRange::new(20, 120)
}

fn default_channel_b_latency() -> LatencyRange {
    LatencyRange::new(150, 600)
}

fn default_drop_probability() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `INSPECT__`-prefixed environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // e.g. INSPECT__CYCLE__TIMEOUT_GRACE_MS=1500
        builder = builder.add_source(
            config::Environment::with_prefix("INSPECT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
