use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::{
    backlog::Backlog,
    builder::SenderConfig,
    error::{ItemError, SendError},
    item::{Item, Timestamp},
    protocol::{self, Acknowledgement},
    session::{self, Outcome, Session},
    transport::{Connector, TcpConnector},
};

/// Result of a successful send.
#[derive(Debug)]
pub struct SendReport {
    acknowledgement: Acknowledgement,
    items: Vec<Item>,
}

impl SendReport {
    /// Returns the trapper's response.
    pub fn acknowledgement(&self) -> &Acknowledgement {
        &self.acknowledgement
    }

    /// Returns the items that were sent.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Consumes the report, returning the response and the items that were sent.
    pub fn into_parts(self) -> (Acknowledgement, Vec<Item>) {
        (self.acknowledgement, self.items)
    }
}

/// A trapper client.
///
/// Items are buffered in a backlog with [`add_item`][Sender::add_item] and shipped in batches of at most
/// `max_per_send` items with [`send`][Sender::send].
///
/// The backlog is guarded by a lock, and all backlog operations (adding, taking a batch, requeueing a failed batch)
/// are atomic with respect to each other. Concurrent sends on the same `Sender` each take their own, disjoint batch.
pub struct Sender<C = TcpConnector> {
    config: SenderConfig,
    backlog: Mutex<Backlog>,
    connector: C,
}

impl<C> Sender<C>
where
    C: Connector,
{
    pub(crate) fn new(config: SenderConfig, connector: C) -> Self {
        let backlog = Mutex::new(Backlog::new(config.backlog_config()));
        Sender { config, backlog, connector }
    }

    /// Returns the sender configuration.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Adds an item to the backlog.
    ///
    /// If the item has no host, the configured `items_host` is used. If timestamps are enabled, the item is stamped
    /// with the current time, replacing any clock it was created with.
    ///
    /// # Errors
    ///
    /// If the item key is empty or its nanoseconds are out of range, an error is returned and the item is not added.
    pub fn add_item(&self, item: Item) -> Result<&Self, ItemError> {
        self.backlog.lock().add(item)?;
        Ok(self)
    }

    /// Removes every item from the backlog.
    pub fn clear_items(&self) -> &Self {
        self.backlog.lock().clear();
        self
    }

    /// Returns the number of items in the backlog.
    pub fn count_items(&self) -> usize {
        self.backlog.lock().len()
    }

    /// Sends a batch of items from the front of the backlog.
    ///
    /// Returns `Ok(None)` without touching the network if the backlog is empty. On success, the trapper's response is
    /// returned along with the items that were sent.
    ///
    /// # Errors
    ///
    /// If the batch can't be encoded, the round trip times out, the transport fails, or the response can't be decoded,
    /// an error is returned. Items from the failed batch that were stamped less than `max_backlog_time` before this
    /// call are put back at the front of the backlog for the next send, and the rest are dropped.
    pub async fn send(&self) -> Result<Option<SendReport>, SendError> {
        let start = Timestamp::now();

        let (batch, remaining) = {
            let mut backlog = self.backlog.lock();
            let batch = backlog.take_batch(self.config.max_per_send);
            (batch, backlog.len())
        };

        if batch.is_empty() {
            trace!("Backlog empty, nothing to send.");
            return Ok(None);
        }

        debug!(
            host = %self.config.host,
            port = self.config.port,
            batch_size = batch.len(),
            remaining,
            "Sending batch."
        );

        let frame = match protocol::encode(&batch, self.config.with_timestamps, self.config.with_ns) {
            Ok(frame) => frame,
            Err(e) => return Err(self.requeue_failed(start, batch, e.into())),
        };

        let session = Session::new(batch, frame, self.config.timeout);
        let Outcome { result, batch } = session::drive(
            &self.connector,
            &self.config.host,
            self.config.port,
            self.config.timeout,
            session,
        )
        .await;

        match result {
            Ok(acknowledgement) => {
                debug!(
                    items_sent = batch.len(),
                    response = acknowledgement.response(),
                    info = acknowledgement.info(),
                    "Batch sent."
                );
                Ok(Some(SendReport { acknowledgement, items: batch }))
            }
            Err(e) => Err(self.requeue_failed(start, batch, e)),
        }
    }

    /// Sends a batch of items, handing the result to `callback`.
    ///
    /// The callback is invoked exactly once, with the same result [`send`][Sender::send] would return.
    pub async fn send_with<F>(&self, callback: F)
    where
        F: FnOnce(Result<Option<SendReport>, SendError>),
    {
        callback(self.send().await);
    }

    fn requeue_failed(&self, start: Timestamp, batch: Vec<Item>, e: SendError) -> SendError {
        let threshold = start.clock.saturating_sub(self.max_backlog_secs());
        let requeue = self.backlog.lock().requeue_fresh(batch, threshold);
        error!(
            error = %e,
            requeued = requeue.requeued,
            dropped = requeue.dropped,
            "Failed to send batch."
        );
        e
    }

    fn max_backlog_secs(&self) -> i64 {
        i64::try_from(self.config.max_backlog_time.as_secs()).unwrap_or(i64::MAX)
    }
}
