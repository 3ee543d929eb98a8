//! # kafka-readstream
//!
//! A non-blocking, demand-controlled read stream over the blocking Kafka
//! consumer, with full support for typed keys, values, and headers.
//!
//! ## Features
//!
//! - **Non-Blocking Consumption**: the blocking native consumer is confined
//!   to a dedicated polling thread; callers interact through async methods
//! - **Demand Control**: `pause`/`resume`/`fetch` govern record delivery
//!   without losing already-fetched data, and whole partitions can be muted
//!   independently
//! - **Serialized Commands**: every operation executes on the polling thread
//!   in call order, so handlers never observe data that predates a completed
//!   command
//! - **Type-Safe Records**: typed keys and values via pluggable serializers,
//!   plus a rich `Headers` type for message metadata
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kafka_readstream::{ConsumerConfig, JsonSerializer, KafkaReadStream, StringSerializer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug)]
//! struct Order {
//!     id: u64,
//!     amount: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kafka_readstream::StreamError> {
//!     let config = ConsumerConfig::new("localhost:9092", "order-readers");
//!     let stream: KafkaReadStream<String, Order> =
//!         KafkaReadStream::create(&config, StringSerializer, JsonSerializer)?;
//!
//!     stream
//!         .record_handler(|record| {
//!             println!("order {} for {}", record.value().id, record.value().amount);
//!         })
//!         .await?;
//!     stream.subscribe(["orders"]).await?;
//!
//!     // Throttle: deliver at most 10 records, then pause until fetched again.
//!     stream.fetch(10).await?;
//!
//!     stream.close().await
//! }
//! ```

pub mod kafka;

pub use kafka::{
    BytesSerializer, ConsumerClient, ConsumerConfig, Fetched, Headers, JsonSerializer,
    KafkaClient, KafkaReadStream, OffsetAndMetadata, OffsetAndTimestamp, OffsetReset,
    PartitionInfo, RebalanceEvent, Record, RecordBatch, Serde, SerializationError, StreamError,
    StringSerializer, TopicPartition,
};
