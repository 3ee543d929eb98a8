use crate::kafka::serialization::SerializationError;
use crate::kafka::topic_partition::TopicPartition;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

/// Unified error type for read stream operations.
///
/// Broker-origin failures surface either through the future of the operation
/// that caused them or through the stream-level exception handler; they are
/// never silently swallowed. `Closed` is raised synchronously when a command
/// is submitted after the stream has shut down, so callers can distinguish
/// it from broker-origin failures.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Underlying Kafka client error
    #[error("kafka operation failed: {0}")]
    Kafka(#[from] KafkaError),

    /// A record payload or key could not be decoded
    #[error("deserialization failed: {0}")]
    Serialization(#[from] SerializationError),

    /// The read stream has been closed; no further commands are accepted
    #[error("read stream is closed")]
    Closed,

    /// The queried partition is not part of the current assignment
    #[error("partition {0} is not assigned to this consumer")]
    NotAssigned(TopicPartition),

    /// A blocking metadata or offset query exceeded its timeout
    #[error("operation timed out")]
    Timeout,

    /// The polling thread could not be spawned
    #[error("failed to start polling thread: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Whether a poll failure is unrecoverable for the polling loop.
    ///
    /// Fatal failures (the client was destroyed or fenced) transition the
    /// loop to `Closing`; everything else is reported to the exception
    /// handler and polling continues.
    pub fn is_fatal(&self) -> bool {
        match self {
            StreamError::Kafka(KafkaError::MessageConsumption(code)) => matches!(
                code,
                RDKafkaErrorCode::Fatal
                    | RDKafkaErrorCode::BrokerDestroy
                    | RDKafkaErrorCode::Fenced
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_not_fatal() {
        assert!(!StreamError::Closed.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        let fatal = StreamError::Kafka(KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal));
        assert!(fatal.is_fatal());

        let destroyed = StreamError::Kafka(KafkaError::MessageConsumption(
            RDKafkaErrorCode::BrokerDestroy,
        ));
        assert!(destroyed.is_fatal());

        let transient = StreamError::Kafka(KafkaError::MessageConsumption(
            RDKafkaErrorCode::OperationTimedOut,
        ));
        assert!(!transient.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = StreamError::NotAssigned(TopicPartition::new("orders", 2));
        assert_eq!(
            err.to_string(),
            "partition orders-2 is not assigned to this consumer"
        );
        assert_eq!(StreamError::Closed.to_string(), "read stream is closed");
        assert_eq!(StreamError::Timeout.to_string(), "operation timed out");
    }
}
