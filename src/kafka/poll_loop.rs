use crate::kafka::client::ConsumerClient;
use crate::kafka::command::Command;
use crate::kafka::demand::DemandController;
use crate::kafka::dispatcher::Dispatcher;
use crate::kafka::error::StreamError;
use crate::kafka::record::{Record, RecordBatch};
use crate::kafka::topic_partition::TopicPartition;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Client constructed, no poll issued yet
    Starting,
    Running,
    Closing,
    Closed,
}

/// The single-threaded event loop that owns the blocking consumer client.
///
/// Each cycle drains the command queue, delivers buffered records while
/// demand allows, reconciles the broker-level pause set against the current
/// assignment, and runs one bounded poll. Commands are executed strictly in
/// enqueue order, so a batch fetched after a command completes can never
/// predate that command's effect. Records fetched before a pause or fetch
/// cap may still sit in the delivery buffer and are handed to the record
/// handler once demand is replenished, never re-fetched and never dropped.
pub(crate) struct PollLoop<K, V, C> {
    client: C,
    commands: mpsc::UnboundedReceiver<Command<K, V>>,
    demand: DemandController,
    dispatcher: Dispatcher<K, V>,
    buffer: VecDeque<Record<K, V>>,
    poll_timeout: Duration,
    state: State,
    pending_close: Vec<oneshot::Sender<Result<(), StreamError>>>,
}

impl<K, V, C> PollLoop<K, V, C>
where
    C: ConsumerClient<K, V>,
{
    pub fn new(
        client: C,
        commands: mpsc::UnboundedReceiver<Command<K, V>>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            client,
            commands,
            demand: DemandController::new(),
            dispatcher: Dispatcher::new(),
            buffer: VecDeque::new(),
            poll_timeout,
            state: State::Starting,
            pending_close: Vec::new(),
        }
    }

    /// Runs until closed. Consumes the loop; the polling thread's entire
    /// body is this call.
    pub fn run(mut self) {
        log::info!("KafkaReadStream: polling loop started");
        self.state = State::Running;
        while self.state == State::Running {
            self.drain_commands();
            if self.state != State::Running {
                break;
            }
            self.flow();
            self.cycle();
        }
        self.shutdown();
    }

    /// Applies every command currently queued, in enqueue order
    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Every handle is gone; nobody can observe the stream
                    // any more.
                    self.state = State::Closing;
                    break;
                }
            }
        }
    }

    fn apply(&mut self, command: Command<K, V>) {
        if matches!(self.state, State::Closing | State::Closed) {
            match command {
                Command::Close { reply } => self.pending_close.push(reply),
                other => other.fail_closed(),
            }
            return;
        }

        match command {
            Command::Subscribe { topics, reply } => {
                log::debug!("KafkaReadStream: subscribing to {:?}", topics);
                let _ = reply.send(self.client.subscribe(&topics));
            }
            Command::SubscribePattern { pattern, reply } => {
                log::debug!("KafkaReadStream: subscribing to pattern {}", pattern);
                let _ = reply.send(self.client.subscribe_pattern(&pattern));
            }
            Command::Unsubscribe { reply } => {
                let _ = reply.send(self.client.unsubscribe());
            }
            Command::Subscription { reply } => {
                let _ = reply.send(self.client.subscription());
            }
            Command::Assign { partitions, reply } => {
                log::debug!("KafkaReadStream: assigning {:?}", partitions);
                let _ = reply.send(self.client.assign(&partitions));
            }
            Command::Assignment { reply } => {
                let _ = reply.send(self.client.assignment());
            }
            Command::Seek {
                partition,
                offset,
                reply,
            } => {
                let _ = reply.send(self.client.seek(&partition, offset));
            }
            Command::SeekToBeginning { partitions, reply } => {
                let _ = reply.send(self.client.seek_to_beginning(&partitions));
            }
            Command::SeekToEnd { partitions, reply } => {
                let _ = reply.send(self.client.seek_to_end(&partitions));
            }
            Command::Commit { offsets, reply } => {
                let _ = reply.send(self.client.commit(offsets.as_ref()));
            }
            Command::Committed { partition, reply } => {
                let _ = reply.send(self.client.committed(&partition));
            }
            Command::Position { partition, reply } => {
                let _ = reply.send(self.client.position(&partition));
            }
            Command::PartitionsFor { topic, reply } => {
                let _ = reply.send(self.client.partitions_for(&topic));
            }
            Command::ListTopics { reply } => {
                let _ = reply.send(self.client.list_topics());
            }
            Command::BeginningOffsets { partitions, reply } => {
                let _ = reply.send(self.client.beginning_offsets(&partitions));
            }
            Command::EndOffsets { partitions, reply } => {
                let _ = reply.send(self.client.end_offsets(&partitions));
            }
            Command::OffsetsForTimes { timestamps, reply } => {
                let _ = reply.send(self.client.offsets_for_times(&timestamps));
            }
            Command::PausePartitions { partitions, reply } => {
                self.demand.pause_partitions(&partitions);
                let _ = reply.send(Ok(()));
            }
            Command::ResumePartitions { partitions, reply } => {
                self.demand.resume_partitions(&partitions);
                let _ = reply.send(Ok(()));
            }
            Command::Paused { reply } => {
                let _ = reply.send(Ok(self.demand.paused().clone()));
            }
            Command::Pause { reply } => {
                self.demand.pause();
                let _ = reply.send(Ok(()));
            }
            Command::Resume { reply } => {
                self.demand.resume();
                let _ = reply.send(Ok(()));
            }
            Command::Fetch { amount, reply } => {
                self.demand.fetch(amount);
                let _ = reply.send(Ok(()));
            }
            Command::Demand { reply } => {
                let _ = reply.send(Ok(self.demand.demand()));
            }
            Command::Poll { timeout, reply } => {
                // One-shot poll for the caller, outside demand control and
                // handler dispatch. The demand-induced global pause is
                // lifted for the duration (the next cycle reconciles it),
                // but partitions the caller paused explicitly stay paused.
                let result = self
                    .client
                    .assignment()
                    .and_then(|assignment| {
                        let resume: HashSet<_> = assignment
                            .difference(self.demand.paused())
                            .cloned()
                            .collect();
                        if !resume.is_empty() {
                            self.client.resume(&resume)?;
                        }
                        self.client.poll(timeout)
                    })
                    .map(|fetched| {
                        for failure in fetched.failures {
                            self.dispatcher.dispatch_exception(failure);
                        }
                        RecordBatch::new(fetched.records)
                    });
                self.forward_rebalances();
                let _ = reply.send(result);
            }
            Command::SetPollTimeout { timeout, reply } => {
                self.poll_timeout = timeout;
                let _ = reply.send(Ok(()));
            }
            Command::SetRecordHandler { handler, reply } => {
                self.dispatcher.set_record_handler(handler);
                let _ = reply.send(Ok(()));
            }
            Command::SetBatchHandler { handler, reply } => {
                self.dispatcher.set_batch_handler(handler);
                let _ = reply.send(Ok(()));
            }
            Command::SetExceptionHandler { handler, reply } => {
                self.dispatcher.set_exception_handler(handler);
                let _ = reply.send(Ok(()));
            }
            Command::SetEndHandler { handler, reply } => {
                self.dispatcher.set_end_handler(handler);
                let _ = reply.send(Ok(()));
            }
            Command::SetAssignedHandler { handler, reply } => {
                self.dispatcher.set_assigned_handler(handler);
                let _ = reply.send(Ok(()));
            }
            Command::SetRevokedHandler { handler, reply } => {
                self.dispatcher.set_revoked_handler(handler);
                let _ = reply.send(Ok(()));
            }
            Command::Close { reply } => {
                self.state = State::Closing;
                self.pending_close.push(reply);
            }
        }
    }

    /// Delivers buffered records to the record handler while demand allows
    fn flow(&mut self) {
        while let Some(record) = self.buffer.pop_front() {
            if self.demand.take() {
                self.dispatcher.dispatch_record(record);
            } else {
                self.buffer.push_front(record);
                break;
            }
        }
    }

    /// One poll cycle: align the broker pause set with current demand, poll,
    /// then dispatch what came back.
    fn cycle(&mut self) {
        let assignment = match self.client.assignment() {
            Ok(assignment) => assignment,
            Err(e) => {
                self.handle_error(e);
                return;
            }
        };
        if let Err(e) = self.reconcile_pause(&assignment) {
            self.handle_error(e);
            return;
        }

        match self.client.poll(self.poll_timeout) {
            Ok(fetched) => {
                self.forward_rebalances();
                for failure in fetched.failures {
                    self.dispatcher.dispatch_exception(failure);
                }
                if !fetched.records.is_empty() {
                    log::trace!("KafkaReadStream: fetched {} records", fetched.records.len());
                    let batch = RecordBatch::new(fetched.records);
                    self.dispatcher.dispatch_batch(&batch);
                    // Without a record handler the batch handler is the only
                    // consumer, so nothing is retained.
                    if self.dispatcher.has_record_handler() {
                        self.buffer.extend(batch.into_records());
                        self.flow();
                    }
                }
            }
            Err(e) => {
                self.forward_rebalances();
                self.handle_error(e);
            }
        }
    }

    /// Pauses and resumes partitions at the broker so the next poll fetches
    /// only what demand permits. Both calls are idempotent client-side, so
    /// the full target sets are applied every cycle rather than tracking
    /// deltas.
    fn reconcile_pause(&mut self, assignment: &HashSet<TopicPartition>) -> Result<(), StreamError> {
        let pause = self.demand.effective_pause(assignment);
        let resume: HashSet<_> = assignment.difference(&pause).cloned().collect();
        if !pause.is_empty() {
            self.client.pause(&pause)?;
        }
        if !resume.is_empty() {
            self.client.resume(&resume)?;
        }
        Ok(())
    }

    fn forward_rebalances(&mut self) {
        for event in self.client.take_rebalance_events() {
            self.dispatcher.dispatch_rebalance(event);
        }
    }

    fn handle_error(&mut self, error: StreamError) {
        let fatal = error.is_fatal();
        if fatal {
            log::error!("KafkaReadStream: fatal consumer error: {}", error);
        } else {
            log::warn!("KafkaReadStream: consumer error: {}", error);
        }
        self.dispatcher.dispatch_exception(error);
        if fatal {
            self.state = State::Closing;
        }
    }

    /// Terminal transition: refuse queued work, release the subscription and
    /// signal the end of the stream.
    fn shutdown(&mut self) {
        log::info!("KafkaReadStream: closing");
        self.state = State::Closing;
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Close { reply } => self.pending_close.push(reply),
                other => other.fail_closed(),
            }
        }

        if let Err(e) = self.client.unsubscribe() {
            log::warn!("KafkaReadStream: error releasing subscription on close: {}", e);
        }
        self.dispatcher.dispatch_end();
        self.state = State::Closed;
        for reply in self.pending_close.drain(..) {
            let _ = reply.send(Ok(()));
        }
        log::info!("KafkaReadStream: closed");
    }
}
