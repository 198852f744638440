//! Typed configuration shared by every process.
//!
//! A single JSON document describes the bus, the multicast channels, the
//! classifier tables, the session window and the log destination. Each process
//! validates the sections it depends on before starting any work.

use crate::backoff::BackoffConfig;
use crate::fs::FlushPolicy;
use crate::model::FeedKind;
use crate::session::{SessionWindow, WallClock};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors detected while loading or validating configuration.
///
/// All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Receiver interface address is required")]
    MissingInterface,

    #[error("Interface address {0} is not a unicast IPv4 address")]
    InvalidInterface(Ipv4Addr),

    #[error("Channel '{name}': group {group} is not an IPv4 multicast address")]
    NotMulticast { name: String, group: Ipv4Addr },

    #[error("Channel '{0}': port must be non-zero")]
    ZeroPort(String),

    #[error("Channel {group}:{port} is configured more than once")]
    DuplicateChannel { group: Ipv4Addr, port: u16 },

    #[error("Channels '{first}' and '{second}' use different groups on port {port}")]
    SharedPort {
        port: u16,
        first: String,
        second: String,
    },

    #[error("Bus endpoint '{0}' must start with tcp:// or ipc://")]
    InvalidEndpoint(String),

    #[error("Invalid session time '{0}', expected HH:MM or HH:MM:SS")]
    InvalidSessionTime(String),

    #[error("Session window is empty: open and close are both {0}")]
    EmptySessionWindow(NaiveTime),

    #[error("UTC offset of {0} minutes is out of range")]
    InvalidUtcOffset(i32),

    #[error("Invalid TR code '{0}', expected 5 ASCII characters")]
    InvalidTrCode(String),

    #[error("Invalid issue prefix '{0}', expected 6 ASCII alphanumeric characters")]
    InvalidPrefix(String),

    #[error("Failed to read prefix file {path}: {source}")]
    PrefixFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Log base directory is required")]
    MissingLogDir,

    #[error("Log base directory {path} is not writable: {source}")]
    LogDirUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("Backoff '{0}': initial delay exceeds the maximum")]
    InvalidBackoff(&'static str),
}

/// Message bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// ZMQ endpoint. The receiver binds it, subscribers connect to it.
    pub endpoint: String,
    /// Messages queued per subscriber before the publisher starts dropping.
    pub send_high_water_mark: i32,
    /// Messages queued inside each subscriber socket.
    pub receive_high_water_mark: i32,
    /// First reconnect delay of a subscriber.
    pub reconnect_interval_ms: i32,
    /// Cap of the subscriber's exponential reconnect delay.
    pub reconnect_interval_max_ms: i32,
    /// How long a closing publisher may keep flushing queued messages.
    pub linger_ms: i32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://127.0.0.1:5570".to_string(),
            send_high_water_mark: 100_000,
            receive_high_water_mark: 100_000,
            reconnect_interval_ms: 100,
            reconnect_interval_max_ms: 5_000,
            linger_ms: 1_000,
        }
    }
}

/// One multicast (group, port) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub group: Ipv4Addr,
    pub port: u16,
    pub kind: FeedKind,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, group: Ipv4Addr, port: u16, kind: FeedKind) -> Self {
        Self {
            name: name.into(),
            group,
            port,
            kind,
        }
    }

    /// The exchange's published channel layout.
    ///
    /// * futures: 233.38.231.92, ports 10302..=10310
    /// * call options: 233.38.231.96, ports 10322..=10328
    /// * put options: 233.38.231.97, ports 10331..=10337
    pub fn krx_defaults() -> Vec<ChannelConfig> {
        let futures = Ipv4Addr::new(233, 38, 231, 92);
        let calls = Ipv4Addr::new(233, 38, 231, 96);
        let puts = Ipv4Addr::new(233, 38, 231, 97);

        let mut channels = Vec::with_capacity(23);
        for i in 0..9u16 {
            channels.push(Self::new(format!("futures{}", i), futures, 10302 + i, FeedKind::Futures));
        }
        for i in 0..7u16 {
            channels.push(Self::new(format!("call{}", i), calls, 10322 + i, FeedKind::Call));
        }
        for i in 0..7u16 {
            channels.push(Self::new(format!("put{}", i), puts, 10331 + i, FeedKind::Put));
        }
        channels
    }
}

/// Multicast receiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Local address of the NIC the feed cable is attached to.
    pub interface: Option<Ipv4Addr>,
    /// Channels to join. Empty means the exchange's default layout.
    pub channels: Vec<ChannelConfig>,
    pub recv_buffer_bytes: usize,
    /// Capacity of the queue between the socket readers and the publisher.
    pub queue_capacity: usize,
    /// Publish unclassified packets on the diagnostic topic.
    pub publish_unclassified: bool,
    /// Consecutive re-join failures before a channel is reported as down.
    pub feed_down_after: u32,
    pub backoff: BackoffConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            interface: None,
            channels: Vec::new(),
            recv_buffer_bytes: 4 * 1024 * 1024,
            queue_capacity: 65_536,
            publish_unclassified: true,
            feed_down_after: 5,
            backoff: BackoffConfig::new(100, 30_000),
        }
    }
}

/// Classifier tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// TR codes that carry quotes or trades.
    pub tr_codes: Vec<String>,
    /// Issue prefixes (first 6 ISIN characters) of single-stock futures.
    pub stock_futures_prefixes: Vec<String>,
    /// Issue prefixes of single-stock options.
    pub stock_options_prefixes: Vec<String>,
    /// Optional file with more stock futures prefixes, one per line.
    pub stock_futures_prefix_file: Option<PathBuf>,
    /// Optional file with more stock options prefixes, one per line.
    pub stock_options_prefix_file: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tr_codes: crate::classifier::DEFAULT_TR_CODES
                .iter()
                .map(|code| code.to_string())
                .collect(),
            stock_futures_prefixes: Vec::new(),
            stock_options_prefixes: Vec::new(),
            stock_futures_prefix_file: None,
            stock_options_prefix_file: None,
        }
    }
}

/// Log saver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaverConfig {
    pub log_base_dir: Option<PathBuf>,
    pub flush_policy: FlushPolicy,
    /// How long a subscriber waits for a message before checking for shutdown.
    pub poll_interval_ms: u64,
    /// Retry schedule for a category whose file cannot be written.
    pub backoff: BackoffConfig,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            log_base_dir: None,
            flush_policy: FlushPolicy::EveryWrite,
            poll_interval_ms: 200,
            backoff: BackoffConfig::new(1_000, 60_000),
        }
    }
}

/// Trading session window and wall clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Window start, "HH:MM" or "HH:MM:SS" (inclusive).
    pub open: String,
    /// Window end, "HH:MM" or "HH:MM:SS" (exclusive).
    pub close: String,
    /// Fixed wall-clock offset from UTC. The host time zone is used when absent.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open: "08:40".to_string(),
            close: "15:50".to_string(),
            utc_offset_minutes: None,
        }
    }
}

impl SessionConfig {
    pub fn window(&self) -> Result<SessionWindow, ConfigError> {
        SessionWindow::parse(&self.open, &self.close)
    }

    pub fn wall_clock(&self) -> Result<WallClock, ConfigError> {
        WallClock::from_offset_minutes(self.utc_offset_minutes)
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub bus: BusConfig,
    pub receiver: ReceiverConfig,
    pub classifier: ClassifierConfig,
    pub saver: SaverConfig,
    pub session: SessionConfig,
    /// Period of the status line written by each process.
    pub stats_interval_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            receiver: ReceiverConfig::default(),
            classifier: ClassifierConfig::default(),
            saver: SaverConfig::default(),
            session: SessionConfig::default(),
            stats_interval_secs: 30,
        }
    }
}

impl FeedConfig {
    /// Loads a configuration document from disk.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the JSON file.
    ///
    /// # Returns
    ///
    /// * `Ok(FeedConfig)` on success. Missing sections take their defaults.
    /// * `Err` on IO or parse error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = std::io::BufReader::new(file);
        let mut config: Self =
            serde_json::from_reader(reader).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        // Prefix files are relative to the config file, not the working directory.
        if let Some(dir) = path.parent() {
            for file in [
                &mut config.classifier.stock_futures_prefix_file,
                &mut config.classifier.stock_options_prefix_file,
            ]
            .into_iter()
            .flatten()
            {
                if file.is_relative() {
                    *file = dir.join(&*file);
                }
            }
        }
        Ok(config)
    }

    /// Channels to join: the configured list, or the exchange defaults.
    pub fn channels(&self) -> Vec<ChannelConfig> {
        if self.receiver.channels.is_empty() {
            ChannelConfig::krx_defaults()
        } else {
            self.receiver.channels.clone()
        }
    }

    /// Checks the sections every process relies on.
    pub fn validate_common(&self) -> Result<(), ConfigError> {
        let endpoint = &self.bus.endpoint;
        if !(endpoint.starts_with("tcp://") || endpoint.starts_with("ipc://")) {
            return Err(ConfigError::InvalidEndpoint(endpoint.clone()));
        }
        if self.bus.send_high_water_mark <= 0 {
            return Err(ConfigError::Zero("bus.send_high_water_mark"));
        }
        if self.bus.receive_high_water_mark <= 0 {
            return Err(ConfigError::Zero("bus.receive_high_water_mark"));
        }
        if self.stats_interval_secs == 0 {
            return Err(ConfigError::Zero("stats_interval_secs"));
        }
        self.session.window()?;
        self.session.wall_clock()?;
        Ok(())
    }

    /// Checks everything the multicast receiver needs.
    pub fn validate_receiver(&self) -> Result<(), ConfigError> {
        self.validate_common()?;

        let interface = self.receiver.interface.ok_or(ConfigError::MissingInterface)?;
        if interface.is_unspecified() || interface.is_multicast() || interface.is_broadcast() {
            return Err(ConfigError::InvalidInterface(interface));
        }

        let mut ports: HashMap<u16, (String, Ipv4Addr)> = HashMap::new();
        for channel in self.channels() {
            if !channel.group.is_multicast() {
                return Err(ConfigError::NotMulticast {
                    name: channel.name,
                    group: channel.group,
                });
            }
            if channel.port == 0 {
                return Err(ConfigError::ZeroPort(channel.name));
            }
            match ports.get(&channel.port) {
                Some((_, group)) if *group == channel.group => {
                    return Err(ConfigError::DuplicateChannel {
                        group: channel.group,
                        port: channel.port,
                    });
                }
                Some((first, _)) => {
                    return Err(ConfigError::SharedPort {
                        port: channel.port,
                        first: first.clone(),
                        second: channel.name,
                    });
                }
                None => {
                    ports.insert(channel.port, (channel.name, channel.group));
                }
            }
        }

        if self.classifier.tr_codes.is_empty() {
            return Err(ConfigError::Zero("classifier.tr_codes"));
        }
        for code in &self.classifier.tr_codes {
            crate::classifier::parse_tr_code(code)?;
        }
        for prefix in self
            .classifier
            .stock_futures_prefixes
            .iter()
            .chain(&self.classifier.stock_options_prefixes)
        {
            crate::classifier::parse_prefix(prefix)?;
        }

        if self.receiver.queue_capacity == 0 {
            return Err(ConfigError::Zero("receiver.queue_capacity"));
        }
        if self.receiver.feed_down_after == 0 {
            return Err(ConfigError::Zero("receiver.feed_down_after"));
        }
        check_backoff("receiver.backoff", &self.receiver.backoff)?;
        Ok(())
    }

    /// Checks everything the log saver needs.
    pub fn validate_saver(&self) -> Result<(), ConfigError> {
        self.validate_common()?;

        if self.saver.log_base_dir.is_none() {
            return Err(ConfigError::MissingLogDir);
        }
        if self.saver.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("saver.poll_interval_ms"));
        }
        if let FlushPolicy::Batched { max_pending } = self.saver.flush_policy {
            if max_pending == 0 {
                return Err(ConfigError::Zero("saver.flush_policy.batched.max_pending"));
            }
        }
        check_backoff("saver.backoff", &self.saver.backoff)?;
        Ok(())
    }
}

fn check_backoff(name: &'static str, backoff: &BackoffConfig) -> Result<(), ConfigError> {
    if backoff.initial_ms == 0 {
        return Err(ConfigError::Zero(name));
    }
    if backoff.initial_ms > backoff.max_ms {
        return Err(ConfigError::InvalidBackoff(name));
    }
    Ok(())
}
