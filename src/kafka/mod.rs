mod client;
mod command;
mod consumer_config;
mod demand;
mod dispatcher;
mod error;
mod headers;
mod poll_loop;
mod read_stream;
mod record;
mod serialization;
mod topic_partition;

pub use client::{ConsumerClient, Fetched, KafkaClient, RebalanceEvent};
pub use consumer_config::{ConsumerConfig, OffsetReset};
pub use error::StreamError;
pub use headers::Headers;
pub use read_stream::KafkaReadStream;
pub use record::{Record, RecordBatch};
pub use serialization::{
    BytesSerializer, JsonSerializer, Serde, SerializationError, StringSerializer,
};
pub use topic_partition::{OffsetAndMetadata, OffsetAndTimestamp, PartitionInfo, TopicPartition};
