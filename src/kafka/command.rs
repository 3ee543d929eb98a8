use crate::kafka::dispatcher::{
    BatchHandler, EndHandler, ExceptionHandler, PartitionsHandler, RecordHandler,
};
use crate::kafka::error::StreamError;
use crate::kafka::record::RecordBatch;
use crate::kafka::topic_partition::{
    OffsetAndMetadata, OffsetAndTimestamp, PartitionInfo, TopicPartition,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// The completion slot of one command: resolved exactly once, on the polling
/// thread, in enqueue order.
pub(crate) type Reply<T> = oneshot::Sender<Result<T, StreamError>>;

/// One control request for the polling loop.
///
/// Every externally visible operation of the read stream is expressed as a
/// variant here and executed serially by the loop, which is what upholds the
/// single-thread-access contract of the wrapped consumer.
pub(crate) enum Command<K, V> {
    Subscribe {
        topics: Vec<String>,
        reply: Reply<()>,
    },
    SubscribePattern {
        pattern: String,
        reply: Reply<()>,
    },
    Unsubscribe {
        reply: Reply<()>,
    },
    Subscription {
        reply: Reply<HashSet<String>>,
    },
    Assign {
        partitions: HashSet<TopicPartition>,
        reply: Reply<()>,
    },
    Assignment {
        reply: Reply<HashSet<TopicPartition>>,
    },
    Seek {
        partition: TopicPartition,
        offset: i64,
        reply: Reply<()>,
    },
    SeekToBeginning {
        partitions: HashSet<TopicPartition>,
        reply: Reply<()>,
    },
    SeekToEnd {
        partitions: HashSet<TopicPartition>,
        reply: Reply<()>,
    },
    Commit {
        offsets: Option<HashMap<TopicPartition, OffsetAndMetadata>>,
        reply: Reply<HashMap<TopicPartition, OffsetAndMetadata>>,
    },
    Committed {
        partition: TopicPartition,
        reply: Reply<Option<OffsetAndMetadata>>,
    },
    Position {
        partition: TopicPartition,
        reply: Reply<i64>,
    },
    PartitionsFor {
        topic: String,
        reply: Reply<Vec<PartitionInfo>>,
    },
    ListTopics {
        reply: Reply<HashMap<String, Vec<PartitionInfo>>>,
    },
    BeginningOffsets {
        partitions: HashSet<TopicPartition>,
        reply: Reply<HashMap<TopicPartition, i64>>,
    },
    EndOffsets {
        partitions: HashSet<TopicPartition>,
        reply: Reply<HashMap<TopicPartition, i64>>,
    },
    OffsetsForTimes {
        timestamps: HashMap<TopicPartition, i64>,
        reply: Reply<HashMap<TopicPartition, OffsetAndTimestamp>>,
    },
    PausePartitions {
        partitions: HashSet<TopicPartition>,
        reply: Reply<()>,
    },
    ResumePartitions {
        partitions: HashSet<TopicPartition>,
        reply: Reply<()>,
    },
    Paused {
        reply: Reply<HashSet<TopicPartition>>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Fetch {
        amount: u64,
        reply: Reply<()>,
    },
    Demand {
        reply: Reply<u64>,
    },
    Poll {
        timeout: Duration,
        reply: Reply<RecordBatch<K, V>>,
    },
    SetPollTimeout {
        timeout: Duration,
        reply: Reply<()>,
    },
    SetRecordHandler {
        handler: Option<RecordHandler<K, V>>,
        reply: Reply<()>,
    },
    SetBatchHandler {
        handler: Option<BatchHandler<K, V>>,
        reply: Reply<()>,
    },
    SetExceptionHandler {
        handler: Option<ExceptionHandler>,
        reply: Reply<()>,
    },
    SetEndHandler {
        handler: Option<EndHandler>,
        reply: Reply<()>,
    },
    SetAssignedHandler {
        handler: Option<PartitionsHandler>,
        reply: Reply<()>,
    },
    SetRevokedHandler {
        handler: Option<PartitionsHandler>,
        reply: Reply<()>,
    },
    Close {
        reply: Reply<()>,
    },
}

impl<K, V> Command<K, V> {
    /// Fails this command's future with `Closed` without executing it.
    ///
    /// Used when commands are still queued (or arrive) after the loop has
    /// begun shutting down.
    pub(crate) fn fail_closed(self) {
        macro_rules! refuse {
            ($reply:expr) => {
                let _ = $reply.send(Err(StreamError::Closed));
            };
        }
        match self {
            Command::Subscribe { reply, .. } => {
                refuse!(reply);
            }
            Command::SubscribePattern { reply, .. } => {
                refuse!(reply);
            }
            Command::Unsubscribe { reply } => {
                refuse!(reply);
            }
            Command::Subscription { reply } => {
                refuse!(reply);
            }
            Command::Assign { reply, .. } => {
                refuse!(reply);
            }
            Command::Assignment { reply } => {
                refuse!(reply);
            }
            Command::Seek { reply, .. } => {
                refuse!(reply);
            }
            Command::SeekToBeginning { reply, .. } => {
                refuse!(reply);
            }
            Command::SeekToEnd { reply, .. } => {
                refuse!(reply);
            }
            Command::Commit { reply, .. } => {
                refuse!(reply);
            }
            Command::Committed { reply, .. } => {
                refuse!(reply);
            }
            Command::Position { reply, .. } => {
                refuse!(reply);
            }
            Command::PartitionsFor { reply, .. } => {
                refuse!(reply);
            }
            Command::ListTopics { reply } => {
                refuse!(reply);
            }
            Command::BeginningOffsets { reply, .. } => {
                refuse!(reply);
            }
            Command::EndOffsets { reply, .. } => {
                refuse!(reply);
            }
            Command::OffsetsForTimes { reply, .. } => {
                refuse!(reply);
            }
            Command::PausePartitions { reply, .. } => {
                refuse!(reply);
            }
            Command::ResumePartitions { reply, .. } => {
                refuse!(reply);
            }
            Command::Paused { reply } => {
                refuse!(reply);
            }
            Command::Pause { reply } => {
                refuse!(reply);
            }
            Command::Resume { reply } => {
                refuse!(reply);
            }
            Command::Fetch { reply, .. } => {
                refuse!(reply);
            }
            Command::Demand { reply } => {
                refuse!(reply);
            }
            Command::Poll { reply, .. } => {
                refuse!(reply);
            }
            Command::SetPollTimeout { reply, .. } => {
                refuse!(reply);
            }
            Command::SetRecordHandler { reply, .. } => {
                refuse!(reply);
            }
            Command::SetBatchHandler { reply, .. } => {
                refuse!(reply);
            }
            Command::SetExceptionHandler { reply, .. } => {
                refuse!(reply);
            }
            Command::SetEndHandler { reply, .. } => {
                refuse!(reply);
            }
            Command::SetAssignedHandler { reply, .. } => {
                refuse!(reply);
            }
            Command::SetRevokedHandler { reply, .. } => {
                refuse!(reply);
            }
            Command::Close { reply } => {
                refuse!(reply);
            }
        }
    }
}

/// Thread-safe hand-off queue from arbitrary caller tasks into the polling
/// thread.
///
/// Commands are delivered in enqueue order (multi-producer FIFO, no
/// reordering or coalescing). Once the polling loop has terminated, `submit`
/// fails immediately with [`StreamError::Closed`] instead of hanging.
pub(crate) struct CommandChannel<K, V> {
    tx: mpsc::UnboundedSender<Command<K, V>>,
}

impl<K, V> Clone for CommandChannel<K, V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K, V> CommandChannel<K, V> {
    /// Creates the channel and the receiving end owned by the polling loop
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Command<K, V>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues a command built around a fresh completion slot and awaits
    /// its result.
    pub async fn submit<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command<K, V>,
    ) -> Result<T, StreamError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| StreamError::Closed)?;
        // A dropped reply means the loop shut down before executing us.
        rx.await.map_err(|_| StreamError::Closed)?
    }

    /// Fire-and-forget enqueue, used on drop where awaiting is impossible
    pub fn send(&self, command: Command<K, V>) -> Result<(), StreamError> {
        self.tx.send(command).map_err(|_| StreamError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_fails_closed_when_receiver_gone() {
        let (channel, rx) = CommandChannel::<String, String>::pair();
        drop(rx);

        let result = channel
            .submit(|reply| Command::Demand { reply })
            .await;
        assert!(matches!(result, Err(StreamError::Closed)));
    }

    #[tokio::test]
    async fn test_commands_preserve_enqueue_order() {
        let (channel, mut rx) = CommandChannel::<String, String>::pair();

        for amount in 0..10u64 {
            let (reply, _rx) = oneshot::channel();
            channel
                .send(Command::Fetch { amount, reply })
                .expect("send");
        }

        let mut seen = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let Command::Fetch { amount, .. } = cmd {
                seen.push(amount);
            }
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_fail_closed_resolves_future() {
        let (channel, mut rx) = CommandChannel::<String, String>::pair();

        let pending = tokio::spawn({
            let channel = channel.clone();
            async move {
                channel
                    .submit(|reply| Command::Unsubscribe { reply })
                    .await
            }
        });

        let cmd = loop {
            match rx.try_recv() {
                Ok(cmd) => break cmd,
                Err(_) => tokio::task::yield_now().await,
            }
        };
        cmd.fail_closed();

        let result = pending.await.expect("join");
        assert!(matches!(result, Err(StreamError::Closed)));
    }
}
