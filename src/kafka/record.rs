use crate::kafka::headers::Headers;
use crate::kafka::topic_partition::TopicPartition;
use std::collections::HashSet;

/// A fetched record with deserialized key and value.
///
/// Besides the typed key/value pair and headers, every record carries its
/// origin coordinates: topic, partition, offset and the broker timestamp
/// (when available).
#[derive(Debug, Clone)]
pub struct Record<K, V> {
    key: Option<K>,
    value: V,
    headers: Headers,
    topic: String,
    partition: i32,
    offset: i64,
    timestamp: Option<i64>,
}

impl<K, V> Record<K, V> {
    /// Creates a new record
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: Option<K>,
        value: V,
        headers: Headers,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        timestamp: Option<i64>,
    ) -> Self {
        Self {
            key,
            value,
            headers,
            topic: topic.into(),
            partition,
            offset,
            timestamp,
        }
    }

    /// Returns a reference to the record key
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// Returns a reference to the record value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns a reference to the record headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the topic this record was fetched from
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the partition index
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Returns the partition-local offset
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Returns the broker timestamp in milliseconds, when available
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// The origin partition as a `TopicPartition` value
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    /// Consumes the record and returns the owned key and value
    pub fn into_parts(self) -> (Option<K>, V) {
        (self.key, self.value)
    }

    /// Consumes the record and returns the owned value
    pub fn into_value(self) -> V {
        self.value
    }
}

/// The records returned by one poll cycle, in fetch order.
///
/// A batch is produced once per poll, handed to the batch handler as a whole
/// and then (if a record handler is registered) flowed record by record under
/// demand control. It is never retained beyond the cycle that produced it,
/// except for undelivered records held back by exhausted demand.
#[derive(Debug)]
pub struct RecordBatch<K, V> {
    records: Vec<Record<K, V>>,
}

impl<K, V> RecordBatch<K, V> {
    pub fn new(records: Vec<Record<K, V>>) -> Self {
        Self { records }
    }

    /// Number of records in the batch
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in the order they were fetched
    pub fn records(&self) -> &[Record<K, V>] {
        &self.records
    }

    /// The set of partitions with at least one record in this batch
    pub fn partitions(&self) -> HashSet<TopicPartition> {
        self.records.iter().map(|r| r.topic_partition()).collect()
    }

    /// Records belonging to one partition, preserving offset order
    pub fn records_for<'a>(
        &'a self,
        partition: &'a TopicPartition,
    ) -> impl Iterator<Item = &'a Record<K, V>> {
        self.records
            .iter()
            .filter(move |r| r.topic() == partition.topic() && r.partition() == partition.partition())
    }

    /// Consumes the batch and returns the owned records
    pub fn into_records(self) -> Vec<Record<K, V>> {
        self.records
    }
}

impl<K, V> IntoIterator for RecordBatch<K, V> {
    type Item = Record<K, V>;
    type IntoIter = std::vec::IntoIter<Record<K, V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
