use serde::{Deserialize, Serialize};
use std::fmt;

/// A topic name together with a partition index.
///
/// This is the key type used throughout the read stream: pause sets,
/// assignments, offset maps and seek targets are all expressed in terms of
/// `TopicPartition`. It is an immutable value and is cheap to hash and
/// compare.
///
/// # Examples
///
/// ```rust
/// use kafka_readstream::TopicPartition;
///
/// let tp = TopicPartition::new("orders", 3);
/// assert_eq!(tp.topic(), "orders");
/// assert_eq!(tp.partition(), 3);
/// assert_eq!(tp.to_string(), "orders-3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    topic: String,
    partition: i32,
}

impl TopicPartition {
    /// Creates a new topic partition value
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    /// Returns the topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the partition index
    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A committed offset together with its optional commit metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetAndMetadata {
    pub offset: i64,
    pub metadata: Option<String>,
}

impl OffsetAndMetadata {
    pub fn new(offset: i64) -> Self {
        Self {
            offset,
            metadata: None,
        }
    }

    pub fn with_metadata(offset: i64, metadata: impl Into<String>) -> Self {
        Self {
            offset,
            metadata: Some(metadata.into()),
        }
    }
}

/// The offset of the first record at or after a queried timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetAndTimestamp {
    pub offset: i64,
    pub timestamp: i64,
}

impl OffsetAndTimestamp {
    pub fn new(offset: i64, timestamp: i64) -> Self {
        Self { offset, timestamp }
    }
}

/// Metadata describing one partition of a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub topic: String,
    pub partition: i32,
}

impl PartitionInfo {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    /// The partition as a `TopicPartition` value
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_topic_partition_as_set_key() {
        let mut set = HashSet::new();
        set.insert(TopicPartition::new("orders", 0));
        set.insert(TopicPartition::new("orders", 0));
        set.insert(TopicPartition::new("orders", 1));

        assert_eq!(set.len(), 2);
        assert!(set.contains(&TopicPartition::new("orders", 1)));
    }

    #[test]
    fn test_display() {
        assert_eq!(TopicPartition::new("events", 12).to_string(), "events-12");
    }

    #[test]
    fn test_ordering() {
        let mut parts = vec![
            TopicPartition::new("b", 0),
            TopicPartition::new("a", 1),
            TopicPartition::new("a", 0),
        ];
        parts.sort();
        assert_eq!(parts[0], TopicPartition::new("a", 0));
        assert_eq!(parts[2], TopicPartition::new("b", 0));
    }

    #[test]
    fn test_partition_info_conversion() {
        let info = PartitionInfo::new("orders", 4);
        assert_eq!(info.topic_partition(), TopicPartition::new("orders", 4));
    }
}
