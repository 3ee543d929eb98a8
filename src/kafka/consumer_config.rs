use rdkafka::config::ClientConfig;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the read stream with sensible defaults.
///
/// The builder mirrors the subset of the native consumer configuration the
/// read path needs; anything else can be passed through with
/// [`custom_property`](Self::custom_property). Raw configuration text is
/// parsed and validated elsewhere; this type only carries normalized values.
///
/// # Examples
///
/// ```rust
/// use kafka_readstream::{ConsumerConfig, OffsetReset};
/// use std::time::Duration;
///
/// let config = ConsumerConfig::new("broker1:9092,broker2:9092", "my-group")
///     .client_id("reader-1")
///     .auto_offset_reset(OffsetReset::Latest)
///     .poll_timeout(Duration::from_millis(250));
/// assert_eq!(config.group_id(), "my-group");
/// ```
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    brokers: String,
    group_id: String,
    client_id: Option<String>,
    auto_offset_reset: OffsetReset,
    enable_auto_commit: bool,
    auto_commit_interval: Duration,
    session_timeout: Duration,
    heartbeat_interval: Duration,
    request_timeout: Duration,
    max_poll_records: usize,
    poll_timeout: Duration,
    custom: HashMap<String, String>,
}

/// Behavior when no committed offset exists for a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// Reset to the earliest available offset
    Earliest,
    /// Reset to the latest offset
    Latest,
    /// Raise an error if no initial offset exists
    None,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
            OffsetReset::None => "none",
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "default-group".to_string(),
            client_id: None,
            auto_offset_reset: OffsetReset::Earliest,
            enable_auto_commit: false,
            auto_commit_interval: Duration::from_secs(5),
            session_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            max_poll_records: 500,
            poll_timeout: Duration::from_millis(1000),
            custom: HashMap::new(),
        }
    }
}

impl ConsumerConfig {
    /// Creates a new config with brokers and group ID
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            ..Default::default()
        }
    }

    /// Sets the client ID
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the auto offset reset behavior
    pub fn auto_offset_reset(mut self, reset: OffsetReset) -> Self {
        self.auto_offset_reset = reset;
        self
    }

    /// Configures auto commit
    pub fn auto_commit(mut self, enable: bool, interval: Duration) -> Self {
        self.enable_auto_commit = enable;
        self.auto_commit_interval = interval;
        self
    }

    /// Sets session and heartbeat timeouts
    pub fn session_config(mut self, session_timeout: Duration, heartbeat_interval: Duration) -> Self {
        self.session_timeout = session_timeout;
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Sets the timeout used for blocking metadata and offset queries
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Caps the number of records collected in one poll cycle
    pub fn max_poll_records(mut self, max_records: usize) -> Self {
        self.max_poll_records = max_records;
        self
    }

    /// Sets the poll timeout for the underlying native consumer.
    ///
    /// Defaults to 1000 ms. A lower value makes the stream more responsive
    /// to control commands, because each poll blocks for a shorter period
    /// when no data is available, at the cost of more frequent polls against
    /// the broker.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Adds a raw configuration property passed through to the native client
    pub fn custom_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn request_timeout_duration(&self) -> Duration {
        self.request_timeout
    }

    pub fn max_poll_records_value(&self) -> usize {
        self.max_poll_records
    }

    pub fn poll_timeout_duration(&self) -> Duration {
        self.poll_timeout
    }

    /// Lowers this configuration into a native rdkafka `ClientConfig`
    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", self.auto_offset_reset.as_str())
            .set("enable.auto.commit", self.enable_auto_commit.to_string())
            .set(
                "auto.commit.interval.ms",
                self.auto_commit_interval.as_millis().to_string(),
            )
            .set(
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                self.heartbeat_interval.as_millis().to_string(),
            )
            .set("enable.partition.eof", "false");

        if let Some(client_id) = &self.client_id {
            config.set("client.id", client_id);
        }
        for (key, value) in &self.custom {
            config.set(key, value);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConsumerConfig::default();
        assert_eq!(config.brokers(), "localhost:9092");
        assert_eq!(config.group_id(), "default-group");
        assert_eq!(config.poll_timeout_duration(), Duration::from_millis(1000));
        assert_eq!(config.max_poll_records_value(), 500);
        assert_eq!(config.auto_offset_reset.as_str(), "earliest");
    }

    #[test]
    fn test_builder_pattern() {
        let config = ConsumerConfig::new("broker1:9092", "my-group")
            .client_id("reader-1")
            .auto_offset_reset(OffsetReset::Latest)
            .auto_commit(true, Duration::from_secs(10))
            .poll_timeout(Duration::from_millis(100))
            .custom_property("fetch.min.bytes", "1024");

        assert_eq!(config.brokers(), "broker1:9092");
        assert_eq!(config.group_id(), "my-group");
        assert_eq!(config.client_id, Some("reader-1".to_string()));
        assert_eq!(config.poll_timeout_duration(), Duration::from_millis(100));
        assert_eq!(config.custom.get("fetch.min.bytes").map(String::as_str), Some("1024"));
    }

    #[test]
    fn test_client_config_lowering() {
        let config = ConsumerConfig::new("b:9092", "g")
            .custom_property("isolation.level", "read_committed")
            .client_config();

        assert_eq!(config.get("bootstrap.servers"), Some("b:9092"));
        assert_eq!(config.get("group.id"), Some("g"));
        assert_eq!(config.get("isolation.level"), Some("read_committed"));
        assert_eq!(config.get("enable.partition.eof"), Some("false"));
    }
}
