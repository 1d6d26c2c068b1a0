use crate::protocol::Framing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fallback reactor pool size when hardware parallelism cannot be determined.
pub const DEFAULT_THREAD_FALLBACK: usize = 10;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3333;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address
    pub bind_addr: String,

    /// Port to listen on
    pub port: u16,

    /// Number of reactor threads (0 = 2x detected CPUs)
    pub threads: usize,

    /// Message framing policy
    pub framing: Framing,

    /// Commands accepted by the fixed-length framing variant
    pub supported_commands: Vec<String>,

    /// Connection buffer size (per connection)
    pub connection_buffer_size: usize,

    /// TCP nodelay
    pub tcp_nodelay: bool,

    /// Capacity of the controller's work queue
    pub worker_queue_capacity: usize,

    /// How long command execution may block before it is reported failed,
    /// in milliseconds
    pub command_timeout_ms: u64,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            threads: 0,
            framing: Framing::default(),
            supported_commands: crate::protocol::DEFAULT_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            connection_buffer_size: 16 * 1024, // 16KB
            tcp_nodelay: true,
            worker_queue_capacity: 100,
            command_timeout_ms: 5_000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be > 0");
        }

        if self.connection_buffer_size < 1024 {
            anyhow::bail!("connection_buffer_size must be >= 1024");
        }

        if self.worker_queue_capacity == 0 {
            anyhow::bail!("worker_queue_capacity must be > 0");
        }

        match &self.framing {
            Framing::FixedLength { length } if *length == 0 => {
                anyhow::bail!("fixed-length framing requires length > 0");
            }
            Framing::Terminated { terminator } if terminator.is_empty() => {
                anyhow::bail!("terminated framing requires a non-empty terminator");
            }
            _ => {}
        }

        Ok(())
    }

    /// Number of reactor threads to spawn. A configured value of 0 means
    /// 2x the detected hardware parallelism, falling back to a fixed
    /// default when detection reports nothing usable.
    pub fn effective_threads(&self) -> usize {
        if self.threads != 0 {
            return self.threads;
        }

        let cpus = num_cpus::get();
        if cpus == 0 {
            DEFAULT_THREAD_FALLBACK
        } else {
            cpus * 2
        }
    }
}
