use crate::kafka::client::RebalanceEvent;
use crate::kafka::error::StreamError;
use crate::kafka::record::{Record, RecordBatch};
use crate::kafka::topic_partition::TopicPartition;
use std::collections::HashSet;

pub(crate) type RecordHandler<K, V> = Box<dyn FnMut(Record<K, V>) + Send>;
pub(crate) type BatchHandler<K, V> = Box<dyn FnMut(&RecordBatch<K, V>) + Send>;
pub(crate) type ExceptionHandler = Box<dyn FnMut(StreamError) + Send>;
pub(crate) type EndHandler = Box<dyn FnMut() + Send>;
pub(crate) type PartitionsHandler = Box<dyn FnMut(HashSet<TopicPartition>) + Send>;

/// Routes fetched data and stream events to the caller-registered handlers.
///
/// Lives on the polling thread; every handler is invoked there, so no two
/// handlers ever run concurrently. The batch handler receives each fetched
/// batch exactly once and bypasses per-record demand; the record handler is
/// driven by the polling loop under demand control.
pub(crate) struct Dispatcher<K, V> {
    record_handler: Option<RecordHandler<K, V>>,
    batch_handler: Option<BatchHandler<K, V>>,
    exception_handler: Option<ExceptionHandler>,
    end_handler: Option<EndHandler>,
    assigned_handler: Option<PartitionsHandler>,
    revoked_handler: Option<PartitionsHandler>,
}

impl<K, V> Dispatcher<K, V> {
    pub fn new() -> Self {
        Self {
            record_handler: None,
            batch_handler: None,
            exception_handler: None,
            end_handler: None,
            assigned_handler: None,
            revoked_handler: None,
        }
    }

    pub fn set_record_handler(&mut self, handler: Option<RecordHandler<K, V>>) {
        self.record_handler = handler;
    }

    pub fn set_batch_handler(&mut self, handler: Option<BatchHandler<K, V>>) {
        self.batch_handler = handler;
    }

    pub fn set_exception_handler(&mut self, handler: Option<ExceptionHandler>) {
        self.exception_handler = handler;
    }

    pub fn set_end_handler(&mut self, handler: Option<EndHandler>) {
        self.end_handler = handler;
    }

    pub fn set_assigned_handler(&mut self, handler: Option<PartitionsHandler>) {
        self.assigned_handler = handler;
    }

    pub fn set_revoked_handler(&mut self, handler: Option<PartitionsHandler>) {
        self.revoked_handler = handler;
    }

    pub fn has_record_handler(&self) -> bool {
        self.record_handler.is_some()
    }

    /// Hands a freshly fetched batch to the batch handler, if registered
    pub fn dispatch_batch(&mut self, batch: &RecordBatch<K, V>) {
        if let Some(handler) = &mut self.batch_handler {
            handler(batch);
        }
    }

    /// Delivers one record to the record handler, if registered
    pub fn dispatch_record(&mut self, record: Record<K, V>) {
        if let Some(handler) = &mut self.record_handler {
            handler(record);
        }
    }

    /// Routes a stream-level failure to the exception handler.
    ///
    /// Without a registered handler the failure is logged, never dropped
    /// silently.
    pub fn dispatch_exception(&mut self, error: StreamError) {
        match &mut self.exception_handler {
            Some(handler) => handler(error),
            None => log::error!("KafkaReadStream: unhandled stream error: {}", error),
        }
    }

    /// Signals the end of the stream during close
    pub fn dispatch_end(&mut self) {
        if let Some(handler) = &mut self.end_handler {
            handler();
        }
    }

    /// Forwards a group rebalance notification
    pub fn dispatch_rebalance(&mut self, event: RebalanceEvent) {
        match event {
            RebalanceEvent::Assigned(partitions) => {
                log::debug!("KafkaReadStream: partitions assigned: {:?}", partitions);
                if let Some(handler) = &mut self.assigned_handler {
                    handler(partitions);
                }
            }
            RebalanceEvent::Revoked(partitions) => {
                log::debug!("KafkaReadStream: partitions revoked: {:?}", partitions);
                if let Some(handler) = &mut self.revoked_handler {
                    handler(partitions);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::headers::Headers;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record(offset: i64) -> Record<String, String> {
        Record::new(None, "v".to_string(), Headers::new(), "t", 0, offset, None)
    }

    #[test]
    fn test_batch_and_record_dispatch() {
        let mut dispatcher: Dispatcher<String, String> = Dispatcher::new();
        let batches = Arc::new(AtomicUsize::new(0));
        let records = Arc::new(AtomicUsize::new(0));

        let b = Arc::clone(&batches);
        dispatcher.set_batch_handler(Some(Box::new(move |batch| {
            b.fetch_add(batch.count(), Ordering::SeqCst);
        })));
        let r = Arc::clone(&records);
        dispatcher.set_record_handler(Some(Box::new(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        })));

        let batch = RecordBatch::new(vec![record(0), record(1)]);
        dispatcher.dispatch_batch(&batch);
        for rec in batch {
            dispatcher.dispatch_record(rec);
        }

        assert_eq!(batches.load(Ordering::SeqCst), 2);
        assert_eq!(records.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregistered_handlers_are_no_ops() {
        let mut dispatcher: Dispatcher<String, String> = Dispatcher::new();
        dispatcher.dispatch_batch(&RecordBatch::new(vec![record(0)]));
        dispatcher.dispatch_record(record(1));
        dispatcher.dispatch_exception(StreamError::Closed);
        dispatcher.dispatch_end();
    }

    #[test]
    fn test_handler_unregistration() {
        let mut dispatcher: Dispatcher<String, String> = Dispatcher::new();
        dispatcher.set_record_handler(Some(Box::new(|_| {})));
        assert!(dispatcher.has_record_handler());
        dispatcher.set_record_handler(None);
        assert!(!dispatcher.has_record_handler());
    }
}
