use crate::kafka::client::{ConsumerClient, KafkaClient};
use crate::kafka::command::{Command, CommandChannel};
use crate::kafka::consumer_config::ConsumerConfig;
use crate::kafka::error::StreamError;
use crate::kafka::record::{Record, RecordBatch};
use crate::kafka::serialization::Serde;
use crate::kafka::topic_partition::{
    OffsetAndMetadata, OffsetAndTimestamp, PartitionInfo, TopicPartition,
};
use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Non-blocking, demand-controlled read stream over a Kafka consumer.
///
/// The blocking native consumer lives on a dedicated polling thread owned by
/// this stream; every method here enqueues a command for that thread and
/// resolves when the command has been executed. Commands complete strictly
/// in call order, and registered handlers all run on the polling thread, so
/// no two handlers ever execute concurrently.
///
/// Delivery is governed by demand: the stream starts in flowing mode,
/// [`pause`](Self::pause) halts record delivery without losing data,
/// [`fetch`](Self::fetch) grants a bounded delivery budget and
/// [`resume`](Self::resume) restores flowing mode. Whole partitions can be
/// muted independently with [`pause_partitions`](Self::pause_partitions).
///
/// # Examples
///
/// ```rust,no_run
/// use kafka_readstream::{ConsumerConfig, KafkaReadStream, StringSerializer};
///
/// # async fn run() -> Result<(), kafka_readstream::StreamError> {
/// let config = ConsumerConfig::new("localhost:9092", "my-group");
/// let stream: KafkaReadStream<String, String> =
///     KafkaReadStream::create(&config, StringSerializer, StringSerializer)?;
///
/// stream
///     .record_handler(|record| {
///         println!("{}: {}", record.topic_partition(), record.value());
///     })
///     .await?;
/// stream.subscribe(["my-topic"]).await?;
/// # Ok(())
/// # }
/// ```
pub struct KafkaReadStream<K, V> {
    channel: CommandChannel<K, V>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<K, V> KafkaReadStream<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Creates a stream backed by a native consumer built from `config`.
    ///
    /// The polling thread is started immediately but stays idle until a
    /// subscription or assignment is made.
    pub fn create<KS, VS>(
        config: &ConsumerConfig,
        key_serde: KS,
        value_serde: VS,
    ) -> Result<Self, StreamError>
    where
        KS: Serde<K> + Send + 'static,
        VS: Serde<V> + Send + 'static,
    {
        let client = KafkaClient::from_config(config, key_serde, value_serde)?;
        Self::from_client(client, config.poll_timeout_duration())
    }

    /// Creates a stream around an already-built client implementation
    pub fn from_client<C>(client: C, poll_timeout: Duration) -> Result<Self, StreamError>
    where
        C: ConsumerClient<K, V> + 'static,
    {
        let (channel, rx) = CommandChannel::pair();
        let poll_loop = crate::kafka::poll_loop::PollLoop::new(client, rx, poll_timeout);
        let thread = thread::Builder::new()
            .name("kafka-read-stream".to_string())
            .spawn(move || poll_loop.run())?;

        Ok(Self {
            channel,
            thread: Some(thread),
        })
    }

    /// Subscribes to the given topics as part of the consumer group
    pub async fn subscribe<I, S>(&self, topics: I) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        self.channel
            .submit(|reply| Command::Subscribe { topics, reply })
            .await
    }

    /// Subscribes to every topic matching a regex pattern.
    ///
    /// The pattern follows the native client's convention and must start
    /// with `^`.
    pub async fn subscribe_pattern(&self, pattern: impl Into<String>) -> Result<(), StreamError> {
        let pattern = pattern.into();
        self.channel
            .submit(|reply| Command::SubscribePattern { pattern, reply })
            .await
    }

    /// Drops the current subscription
    pub async fn unsubscribe(&self) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::Unsubscribe { reply })
            .await
    }

    /// The topics currently subscribed to
    pub async fn subscription(&self) -> Result<HashSet<String>, StreamError> {
        self.channel
            .submit(|reply| Command::Subscription { reply })
            .await
    }

    /// Manually assigns partitions, outside consumer-group management
    pub async fn assign(&self, partitions: HashSet<TopicPartition>) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::Assign { partitions, reply })
            .await
    }

    /// The partitions currently assigned to this consumer
    pub async fn assignment(&self) -> Result<HashSet<TopicPartition>, StreamError> {
        self.channel
            .submit(|reply| Command::Assignment { reply })
            .await
    }

    /// Repositions the next read of a partition to `offset`
    pub async fn seek(&self, partition: TopicPartition, offset: i64) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::Seek {
                partition,
                offset,
                reply,
            })
            .await
    }

    /// Repositions the given partitions to their first offset
    pub async fn seek_to_beginning(
        &self,
        partitions: HashSet<TopicPartition>,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SeekToBeginning { partitions, reply })
            .await
    }

    /// Repositions the given partitions to their last offset
    pub async fn seek_to_end(
        &self,
        partitions: HashSet<TopicPartition>,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SeekToEnd { partitions, reply })
            .await
    }

    /// Commits the current read positions, returning what was committed
    pub async fn commit(
        &self,
    ) -> Result<HashMap<TopicPartition, OffsetAndMetadata>, StreamError> {
        self.channel
            .submit(|reply| Command::Commit {
                offsets: None,
                reply,
            })
            .await
    }

    /// Commits explicit offsets, returning what was committed
    pub async fn commit_offsets(
        &self,
        offsets: HashMap<TopicPartition, OffsetAndMetadata>,
    ) -> Result<HashMap<TopicPartition, OffsetAndMetadata>, StreamError> {
        self.channel
            .submit(|reply| Command::Commit {
                offsets: Some(offsets),
                reply,
            })
            .await
    }

    /// The last committed offset for a partition, if any
    pub async fn committed(
        &self,
        partition: TopicPartition,
    ) -> Result<Option<OffsetAndMetadata>, StreamError> {
        self.channel
            .submit(|reply| Command::Committed { partition, reply })
            .await
    }

    /// The offset of the next record to be fetched from a partition
    pub async fn position(&self, partition: TopicPartition) -> Result<i64, StreamError> {
        self.channel
            .submit(|reply| Command::Position { partition, reply })
            .await
    }

    /// Metadata for the partitions of a topic
    pub async fn partitions_for(
        &self,
        topic: impl Into<String>,
    ) -> Result<Vec<PartitionInfo>, StreamError> {
        let topic = topic.into();
        self.channel
            .submit(|reply| Command::PartitionsFor { topic, reply })
            .await
    }

    /// Metadata for every topic the consumer is authorized to see
    pub async fn list_topics(
        &self,
    ) -> Result<HashMap<String, Vec<PartitionInfo>>, StreamError> {
        self.channel
            .submit(|reply| Command::ListTopics { reply })
            .await
    }

    /// The first available offset of each given partition
    pub async fn beginning_offsets(
        &self,
        partitions: HashSet<TopicPartition>,
    ) -> Result<HashMap<TopicPartition, i64>, StreamError> {
        self.channel
            .submit(|reply| Command::BeginningOffsets { partitions, reply })
            .await
    }

    /// The end offset of each given partition
    pub async fn end_offsets(
        &self,
        partitions: HashSet<TopicPartition>,
    ) -> Result<HashMap<TopicPartition, i64>, StreamError> {
        self.channel
            .submit(|reply| Command::EndOffsets { partitions, reply })
            .await
    }

    /// The earliest offset at or after the given timestamp, per partition.
    ///
    /// Partitions with no such offset are absent from the result.
    pub async fn offsets_for_times(
        &self,
        timestamps: HashMap<TopicPartition, i64>,
    ) -> Result<HashMap<TopicPartition, OffsetAndTimestamp>, StreamError> {
        self.channel
            .submit(|reply| Command::OffsetsForTimes { timestamps, reply })
            .await
    }

    /// Halts record delivery. Records already fetched stay buffered and are
    /// delivered after [`resume`](Self::resume) or [`fetch`](Self::fetch).
    pub async fn pause(&self) -> Result<(), StreamError> {
        self.channel.submit(|reply| Command::Pause { reply }).await
    }

    /// Restores unbounded record delivery
    pub async fn resume(&self) -> Result<(), StreamError> {
        self.channel.submit(|reply| Command::Resume { reply }).await
    }

    /// Grants a budget of `amount` additional record deliveries
    pub async fn fetch(&self, amount: u64) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::Fetch { amount, reply })
            .await
    }

    /// The current demand: `u64::MAX` when flowing, `0` when paused,
    /// otherwise the remaining fetch budget
    pub async fn demand(&self) -> Result<u64, StreamError> {
        self.channel.submit(|reply| Command::Demand { reply }).await
    }

    /// Stops fetching from the given partitions until resumed. Independent
    /// of [`pause`](Self::pause); both must be lifted for delivery to flow.
    pub async fn pause_partitions(
        &self,
        partitions: HashSet<TopicPartition>,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::PausePartitions { partitions, reply })
            .await
    }

    /// Resumes fetching from the given partitions
    pub async fn resume_partitions(
        &self,
        partitions: HashSet<TopicPartition>,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::ResumePartitions { partitions, reply })
            .await
    }

    /// The partitions paused with [`pause_partitions`](Self::pause_partitions)
    pub async fn paused(&self) -> Result<HashSet<TopicPartition>, StreamError> {
        self.channel.submit(|reply| Command::Paused { reply }).await
    }

    /// One direct poll against the consumer, bypassing demand control and
    /// handler dispatch. Partitions paused with
    /// [`pause_partitions`](Self::pause_partitions) are still excluded.
    /// The batch may be empty if the timeout elapses.
    pub async fn poll(&self, timeout: Duration) -> Result<RecordBatch<K, V>, StreamError> {
        self.channel
            .submit(|reply| Command::Poll { timeout, reply })
            .await
    }

    /// Changes how long each background poll blocks waiting for records
    pub async fn set_poll_timeout(&self, timeout: Duration) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetPollTimeout { timeout, reply })
            .await
    }

    /// Registers the per-record handler, driven under demand control
    pub async fn record_handler(
        &self,
        handler: impl FnMut(Record<K, V>) + Send + 'static,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetRecordHandler {
                handler: Some(Box::new(handler)),
                reply,
            })
            .await
    }

    pub async fn clear_record_handler(&self) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetRecordHandler {
                handler: None,
                reply,
            })
            .await
    }

    /// Registers the batch handler, invoked once per fetched batch
    /// regardless of demand
    pub async fn batch_handler(
        &self,
        handler: impl FnMut(&RecordBatch<K, V>) + Send + 'static,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetBatchHandler {
                handler: Some(Box::new(handler)),
                reply,
            })
            .await
    }

    pub async fn clear_batch_handler(&self) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetBatchHandler {
                handler: None,
                reply,
            })
            .await
    }

    /// Registers the handler for broker and decoding failures
    pub async fn exception_handler(
        &self,
        handler: impl FnMut(StreamError) + Send + 'static,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetExceptionHandler {
                handler: Some(Box::new(handler)),
                reply,
            })
            .await
    }

    /// Registers the handler invoked when the stream closes
    pub async fn end_handler(
        &self,
        handler: impl FnMut() + Send + 'static,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetEndHandler {
                handler: Some(Box::new(handler)),
                reply,
            })
            .await
    }

    /// Registers the handler invoked when partitions are assigned to this
    /// consumer during a group rebalance
    pub async fn partitions_assigned_handler(
        &self,
        handler: impl FnMut(HashSet<TopicPartition>) + Send + 'static,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetAssignedHandler {
                handler: Some(Box::new(handler)),
                reply,
            })
            .await
    }

    /// Registers the handler invoked when partitions are revoked from this
    /// consumer during a group rebalance
    pub async fn partitions_revoked_handler(
        &self,
        handler: impl FnMut(HashSet<TopicPartition>) + Send + 'static,
    ) -> Result<(), StreamError> {
        self.channel
            .submit(|reply| Command::SetRevokedHandler {
                handler: Some(Box::new(handler)),
                reply,
            })
            .await
    }

    /// Closes the stream: queued commands complete or fail first, the end
    /// handler fires, and the polling thread exits. Idempotent.
    pub async fn close(&self) -> Result<(), StreamError> {
        match self
            .channel
            .submit(|reply| Command::Close { reply })
            .await
        {
            Ok(()) | Err(StreamError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl<K, V> Drop for KafkaReadStream<K, V> {
    fn drop(&mut self) {
        // Best effort: ask the loop to shut down without blocking the
        // caller. A dropped channel alone would also terminate it.
        let (reply, _rx) = oneshot::channel();
        let _ = self.channel.send(Command::Close { reply });
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() {
                let _ = thread.join();
            }
        }
    }
}
