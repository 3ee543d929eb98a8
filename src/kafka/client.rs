use crate::kafka::consumer_config::ConsumerConfig;
use crate::kafka::error::StreamError;
use crate::kafka::headers::Headers;
use crate::kafka::record::Record;
use crate::kafka::serialization::{Serde, SerializationError};
use crate::kafka::topic_partition::{
    OffsetAndMetadata, OffsetAndTimestamp, PartitionInfo, TopicPartition,
};
use rdkafka::client::ClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance};
use rdkafka::message::{BorrowedMessage, Message as RdMessage};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A consumer-group membership change observed during a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceEvent {
    Assigned(HashSet<TopicPartition>),
    Revoked(HashSet<TopicPartition>),
}

/// The outcome of one poll against the wrapped client: the records that
/// decoded cleanly plus any per-record failures, which the polling loop
/// routes to the exception handler without stopping.
pub struct Fetched<K, V> {
    pub records: Vec<Record<K, V>>,
    pub failures: Vec<StreamError>,
}

impl<K, V> Default for Fetched<K, V> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// The blocking broker client owned by the polling loop.
///
/// This is the single-writer resource the whole design exists to protect:
/// every method is called from exactly one thread, and nothing outside the
/// loop ever touches the implementation. The production implementation is
/// [`KafkaClient`]; tests drive the loop with an in-memory one.
pub trait ConsumerClient<K, V>: Send {
    fn subscribe(&mut self, topics: &[String]) -> Result<(), StreamError>;
    fn subscribe_pattern(&mut self, pattern: &str) -> Result<(), StreamError>;
    fn unsubscribe(&mut self) -> Result<(), StreamError>;
    fn subscription(&mut self) -> Result<HashSet<String>, StreamError>;
    fn assign(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError>;
    fn assignment(&mut self) -> Result<HashSet<TopicPartition>, StreamError>;
    fn seek(&mut self, partition: &TopicPartition, offset: i64) -> Result<(), StreamError>;
    fn seek_to_beginning(
        &mut self,
        partitions: &HashSet<TopicPartition>,
    ) -> Result<(), StreamError>;
    fn seek_to_end(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError>;
    fn pause(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError>;
    fn resume(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError>;
    fn commit(
        &mut self,
        offsets: Option<&HashMap<TopicPartition, OffsetAndMetadata>>,
    ) -> Result<HashMap<TopicPartition, OffsetAndMetadata>, StreamError>;
    fn committed(
        &mut self,
        partition: &TopicPartition,
    ) -> Result<Option<OffsetAndMetadata>, StreamError>;
    fn position(&mut self, partition: &TopicPartition) -> Result<i64, StreamError>;
    fn partitions_for(&mut self, topic: &str) -> Result<Vec<PartitionInfo>, StreamError>;
    fn list_topics(&mut self) -> Result<HashMap<String, Vec<PartitionInfo>>, StreamError>;
    fn beginning_offsets(
        &mut self,
        partitions: &HashSet<TopicPartition>,
    ) -> Result<HashMap<TopicPartition, i64>, StreamError>;
    fn end_offsets(
        &mut self,
        partitions: &HashSet<TopicPartition>,
    ) -> Result<HashMap<TopicPartition, i64>, StreamError>;
    fn offsets_for_times(
        &mut self,
        timestamps: &HashMap<TopicPartition, i64>,
    ) -> Result<HashMap<TopicPartition, OffsetAndTimestamp>, StreamError>;

    /// One bounded-timeout poll, decoding up to the configured record cap
    fn poll(&mut self, timeout: Duration) -> Result<Fetched<K, V>, StreamError>;

    /// Drains the rebalance notifications raised during recent polls
    fn take_rebalance_events(&mut self) -> Vec<RebalanceEvent>;
}

type SharedEvents = Arc<Mutex<Vec<RebalanceEvent>>>;

/// Consumer context that records rebalance callbacks for the polling loop.
///
/// The callbacks fire inside the client's poll call, on the polling thread;
/// the loop drains them after each poll and forwards them to the registered
/// handlers.
pub(crate) struct RebalanceContext {
    events: SharedEvents,
}

impl RebalanceContext {
    fn push(&self, event: RebalanceEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event);
    }
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(tpl) = rebalance {
            self.push(RebalanceEvent::Revoked(tpl_partitions(tpl)));
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => self.push(RebalanceEvent::Assigned(tpl_partitions(tpl))),
            Rebalance::Revoke(_) => {}
            _ => log::warn!("KafkaReadStream: rebalance failure reported by client"),
        }
    }
}

/// Distinguishes a timed-out blocking query from other broker failures
fn query_err(e: rdkafka::error::KafkaError) -> StreamError {
    match e.rdkafka_error_code() {
        Some(rdkafka::types::RDKafkaErrorCode::OperationTimedOut) => StreamError::Timeout,
        _ => StreamError::Kafka(e),
    }
}

fn tpl_partitions(tpl: &TopicPartitionList) -> HashSet<TopicPartition> {
    tpl.elements()
        .iter()
        .map(|e| TopicPartition::new(e.topic(), e.partition()))
        .collect()
}

fn to_tpl(partitions: &HashSet<TopicPartition>) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::with_capacity(partitions.len());
    for tp in partitions {
        tpl.add_partition(tp.topic(), tp.partition());
    }
    tpl
}

/// Production [`ConsumerClient`] backed by the blocking rdkafka
/// `BaseConsumer`, decoding keys and values with the configured serializers.
pub struct KafkaClient<K, V, KS, VS> {
    consumer: BaseConsumer<RebalanceContext>,
    key_serde: KS,
    value_serde: VS,
    max_poll_records: usize,
    request_timeout: Duration,
    events: SharedEvents,
    _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V, KS, VS> KafkaClient<K, V, KS, VS>
where
    KS: Serde<K>,
    VS: Serde<V>,
{
    pub fn from_config(
        config: &ConsumerConfig,
        key_serde: KS,
        value_serde: VS,
    ) -> Result<Self, StreamError> {
        let events: SharedEvents = Arc::new(Mutex::new(Vec::new()));
        let context = RebalanceContext {
            events: Arc::clone(&events),
        };
        let consumer: BaseConsumer<RebalanceContext> =
            config.client_config().create_with_context(context)?;

        Ok(Self {
            consumer,
            key_serde,
            value_serde,
            max_poll_records: config.max_poll_records_value(),
            request_timeout: config.request_timeout_duration(),
            events,
            _phantom: PhantomData,
        })
    }

    fn decode(&self, msg: &BorrowedMessage<'_>) -> Result<Record<K, V>, StreamError> {
        let payload = msg.payload().ok_or(SerializationError::EmptyPayload)?;
        let value = self.value_serde.deserialize(payload)?;
        let key = msg
            .key()
            .map(|k| self.key_serde.deserialize(k))
            .transpose()?;
        let headers = msg.headers().map(Headers::from_rdkafka).unwrap_or_default();
        let timestamp = match msg.timestamp() {
            rdkafka::Timestamp::CreateTime(t) | rdkafka::Timestamp::LogAppendTime(t) => Some(t),
            rdkafka::Timestamp::NotAvailable => None,
        };

        Ok(Record::new(
            key,
            value,
            headers,
            msg.topic(),
            msg.partition(),
            msg.offset(),
            timestamp,
        ))
    }

    fn watermarks(
        &self,
        partitions: &HashSet<TopicPartition>,
        end: bool,
    ) -> Result<HashMap<TopicPartition, i64>, StreamError> {
        let mut offsets = HashMap::with_capacity(partitions.len());
        for tp in partitions {
            let (low, high) = self
                .consumer
                .fetch_watermarks(tp.topic(), tp.partition(), self.request_timeout)
                .map_err(query_err)?;
            offsets.insert(tp.clone(), if end { high } else { low });
        }
        Ok(offsets)
    }
}

impl<K, V, KS, VS> ConsumerClient<K, V> for KafkaClient<K, V, KS, VS>
where
    KS: Serde<K> + Send,
    VS: Serde<V> + Send,
{
    fn subscribe(&mut self, topics: &[String]) -> Result<(), StreamError> {
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&refs)?;
        Ok(())
    }

    fn subscribe_pattern(&mut self, pattern: &str) -> Result<(), StreamError> {
        // librdkafka treats a topic starting with '^' as a regex
        // subscription; the caller supplies the pattern in that form.
        self.consumer.subscribe(&[pattern])?;
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), StreamError> {
        self.consumer.unsubscribe();
        Ok(())
    }

    fn subscription(&mut self) -> Result<HashSet<String>, StreamError> {
        let tpl = self.consumer.subscription()?;
        Ok(tpl
            .elements()
            .iter()
            .map(|e| e.topic().to_string())
            .collect())
    }

    fn assign(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError> {
        self.consumer.assign(&to_tpl(partitions))?;
        Ok(())
    }

    fn assignment(&mut self) -> Result<HashSet<TopicPartition>, StreamError> {
        Ok(tpl_partitions(&self.consumer.assignment()?))
    }

    fn seek(&mut self, partition: &TopicPartition, offset: i64) -> Result<(), StreamError> {
        self.consumer.seek(
            partition.topic(),
            partition.partition(),
            Offset::Offset(offset),
            self.request_timeout,
        )?;
        Ok(())
    }

    fn seek_to_beginning(
        &mut self,
        partitions: &HashSet<TopicPartition>,
    ) -> Result<(), StreamError> {
        for tp in partitions {
            self.consumer.seek(
                tp.topic(),
                tp.partition(),
                Offset::Beginning,
                self.request_timeout,
            )?;
        }
        Ok(())
    }

    fn seek_to_end(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError> {
        for tp in partitions {
            self.consumer
                .seek(tp.topic(), tp.partition(), Offset::End, self.request_timeout)?;
        }
        Ok(())
    }

    fn pause(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError> {
        self.consumer.pause(&to_tpl(partitions))?;
        Ok(())
    }

    fn resume(&mut self, partitions: &HashSet<TopicPartition>) -> Result<(), StreamError> {
        self.consumer.resume(&to_tpl(partitions))?;
        Ok(())
    }

    fn commit(
        &mut self,
        offsets: Option<&HashMap<TopicPartition, OffsetAndMetadata>>,
    ) -> Result<HashMap<TopicPartition, OffsetAndMetadata>, StreamError> {
        use rdkafka::consumer::CommitMode;

        let committed = match offsets {
            Some(offsets) => offsets.clone(),
            None => {
                // Commit the current positions of the assignment.
                let positions = self.consumer.position()?;
                positions
                    .elements()
                    .iter()
                    .filter_map(|e| {
                        e.offset().to_raw().map(|offset| {
                            (
                                TopicPartition::new(e.topic(), e.partition()),
                                OffsetAndMetadata::new(offset),
                            )
                        })
                    })
                    .collect()
            }
        };

        let mut tpl = TopicPartitionList::with_capacity(committed.len());
        for (tp, offset) in &committed {
            tpl.add_partition_offset(tp.topic(), tp.partition(), Offset::Offset(offset.offset))?;
        }
        self.consumer.commit(&tpl, CommitMode::Sync)?;
        Ok(committed)
    }

    fn committed(
        &mut self,
        partition: &TopicPartition,
    ) -> Result<Option<OffsetAndMetadata>, StreamError> {
        let mut tpl = TopicPartitionList::with_capacity(1);
        tpl.add_partition(partition.topic(), partition.partition());
        let result = self
            .consumer
            .committed_offsets(tpl, self.request_timeout)
            .map_err(query_err)?;
        Ok(result
            .elements()
            .first()
            .and_then(|e| e.offset().to_raw())
            .map(OffsetAndMetadata::new))
    }

    fn position(&mut self, partition: &TopicPartition) -> Result<i64, StreamError> {
        let positions = self.consumer.position()?;
        positions
            .elements()
            .iter()
            .find(|e| e.topic() == partition.topic() && e.partition() == partition.partition())
            .and_then(|e| e.offset().to_raw())
            .ok_or_else(|| StreamError::NotAssigned(partition.clone()))
    }

    fn partitions_for(&mut self, topic: &str) -> Result<Vec<PartitionInfo>, StreamError> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(topic), self.request_timeout)
            .map_err(query_err)?;
        Ok(metadata
            .topics()
            .iter()
            .filter(|t| t.name() == topic)
            .flat_map(|t| {
                t.partitions()
                    .iter()
                    .map(|p| PartitionInfo::new(t.name(), p.id()))
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    fn list_topics(&mut self) -> Result<HashMap<String, Vec<PartitionInfo>>, StreamError> {
        let metadata = self
            .consumer
            .fetch_metadata(None, self.request_timeout)
            .map_err(query_err)?;
        Ok(metadata
            .topics()
            .iter()
            .map(|t| {
                let partitions = t
                    .partitions()
                    .iter()
                    .map(|p| PartitionInfo::new(t.name(), p.id()))
                    .collect();
                (t.name().to_string(), partitions)
            })
            .collect())
    }

    fn beginning_offsets(
        &mut self,
        partitions: &HashSet<TopicPartition>,
    ) -> Result<HashMap<TopicPartition, i64>, StreamError> {
        self.watermarks(partitions, false)
    }

    fn end_offsets(
        &mut self,
        partitions: &HashSet<TopicPartition>,
    ) -> Result<HashMap<TopicPartition, i64>, StreamError> {
        self.watermarks(partitions, true)
    }

    fn offsets_for_times(
        &mut self,
        timestamps: &HashMap<TopicPartition, i64>,
    ) -> Result<HashMap<TopicPartition, OffsetAndTimestamp>, StreamError> {
        let mut query = TopicPartitionList::with_capacity(timestamps.len());
        for (tp, ts) in timestamps {
            query.add_partition_offset(tp.topic(), tp.partition(), Offset::Offset(*ts))?;
        }
        let result = self
            .consumer
            .offsets_for_times(query, self.request_timeout)
            .map_err(query_err)?;

        let mut offsets = HashMap::with_capacity(timestamps.len());
        for elem in result.elements() {
            let tp = TopicPartition::new(elem.topic(), elem.partition());
            if let (Some(offset), Some(ts)) = (elem.offset().to_raw(), timestamps.get(&tp)) {
                if offset >= 0 {
                    offsets.insert(tp, OffsetAndTimestamp::new(offset, *ts));
                }
            }
        }
        Ok(offsets)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Fetched<K, V>, StreamError> {
        let mut fetched = Fetched::default();
        // The first poll may block up to the timeout; the rest only drain
        // what the client already buffered.
        let mut wait = timeout;
        while fetched.records.len() < self.max_poll_records {
            match self.consumer.poll(wait) {
                Some(Ok(msg)) => match self.decode(&msg) {
                    Ok(record) => fetched.records.push(record),
                    Err(e) => fetched.failures.push(e),
                },
                Some(Err(e)) => {
                    if fetched.records.is_empty() && fetched.failures.is_empty() {
                        return Err(StreamError::Kafka(e));
                    }
                    fetched.failures.push(StreamError::Kafka(e));
                    break;
                }
                None => break,
            }
            wait = Duration::ZERO;
        }
        Ok(fetched)
    }

    fn take_rebalance_events(&mut self) -> Vec<RebalanceEvent> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *events)
    }
}
