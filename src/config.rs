use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROOMS: &[&str] = &["General's Quarters", "Major's Suite"];

/// Host configuration, read once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Journal appends that trigger a compaction.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    /// Deadline applied to each request; `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Catalog seeded into an empty store.
    pub rooms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value for {}: {:?}", self.key, self.value)
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            request_timeout: Some(Duration::from_secs(5)),
            rooms: DEFAULT_ROOMS.iter().map(|r| r.to_string()).collect(),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError { key, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(dir) = lookup("INNKEEP_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("INNKEEP_METRICS_PORT") {
            config.metrics_port = Some(parse("INNKEEP_METRICS_PORT", port)?);
        }
        if let Some(n) = lookup("INNKEEP_COMPACT_THRESHOLD") {
            config.compact_threshold = parse("INNKEEP_COMPACT_THRESHOLD", n)?;
        }
        if let Some(secs) = lookup("INNKEEP_COMPACT_INTERVAL_SECS") {
            let secs: u64 = parse("INNKEEP_COMPACT_INTERVAL_SECS", secs)?;
            if secs == 0 {
                return Err(ConfigError {
                    key: "INNKEEP_COMPACT_INTERVAL_SECS",
                    value: secs.to_string(),
                });
            }
            config.compact_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = lookup("INNKEEP_REQUEST_TIMEOUT_MS") {
            let ms: u64 = parse("INNKEEP_REQUEST_TIMEOUT_MS", ms)?;
            // 0 = no deadline
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(rooms) = lookup("INNKEEP_ROOMS") {
            config.rooms = rooms
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(config)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("innkeep.wal")
    }
}
