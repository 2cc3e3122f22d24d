use std::collections::VecDeque;

use tracing::trace;

use crate::{
    error::ItemError,
    item::{Item, Timestamp},
};

/// Backlog configuration.
#[derive(Clone, Debug)]
pub(crate) struct BacklogConfiguration {
    /// Host assigned to items that don't specify one.
    pub items_host: String,

    /// Whether or not items are stamped with a clock when added.
    pub with_timestamps: bool,

    /// Whether or not the stamp includes nanoseconds.
    pub with_ns: bool,
}

/// Result of requeueing a failed batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct RequeueResult {
    pub requeued: usize,
    pub dropped: usize,
}

/// Items waiting to be sent, in insertion order.
pub(crate) struct Backlog {
    config: BacklogConfiguration,
    items: VecDeque<Item>,
}

impl Backlog {
    /// Creates an empty `Backlog` from the given configuration.
    pub fn new(config: BacklogConfiguration) -> Self {
        Backlog { config, items: VecDeque::new() }
    }

    /// Adds an item to the end of the backlog.
    ///
    /// The item is assigned the default host if it has none, and is stamped with the current time if timestamps are
    /// enabled.
    pub fn add(&mut self, item: Item) -> Result<(), ItemError> {
        self.add_at(item, Timestamp::now())
    }

    fn add_at(&mut self, mut item: Item, now: Timestamp) -> Result<(), ItemError> {
        item.validate()?;
        item.fill_host(&self.config.items_host);
        if self.config.with_timestamps {
            item.stamp(now, self.config.with_ns);
        }

        self.items.push_back(item);
        Ok(())
    }

    /// Removes up to `max_size` items from the front of the backlog.
    ///
    /// An empty batch means there is nothing to send.
    pub fn take_batch(&mut self, max_size: usize) -> Vec<Item> {
        let len = self.items.len().min(max_size);
        self.items.drain(..len).collect()
    }

    /// Puts the still-fresh items of a failed batch back at the front of the backlog.
    ///
    /// Items with a clock strictly greater than `threshold` keep their relative order and end up ahead of anything
    /// added since the batch was taken. Items with no clock at all are dropped.
    pub fn requeue_fresh(&mut self, batch: Vec<Item>, threshold: i64) -> RequeueResult {
        let mut result = RequeueResult::default();

        // Walk the batch backwards so that pushing to the front restores the original order.
        for item in batch.into_iter().rev() {
            match item.clock() {
                Some(clock) if clock > threshold => {
                    self.items.push_front(item);
                    result.requeued += 1;
                }
                _ => {
                    trace!(key = item.key(), clock = ?item.clock(), threshold, "Dropping stale item.");
                    result.dropped += 1;
                }
            }
        }

        result
    }

    /// Returns the number of items in the backlog.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Removes every item from the backlog.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{Backlog, BacklogConfiguration, RequeueResult};
    use crate::{
        error::ItemError,
        item::{Item, Timestamp},
    };

    fn backlog(with_timestamps: bool, with_ns: bool) -> Backlog {
        Backlog::new(BacklogConfiguration { items_host: "default-host".to_string(), with_timestamps, with_ns })
    }

    fn keys(items: &[Item]) -> Vec<&str> {
        items.iter().map(Item::key).collect()
    }

    fn fill(backlog: &mut Backlog, count: usize) {
        for i in 1..=count {
            backlog.add(Item::new(format!("item{i}"), i as u64)).unwrap();
        }
    }

    #[test]
    fn batch_sizing() {
        let mut backlog = backlog(false, false);
        fill(&mut backlog, 7);

        let first = backlog.take_batch(3);
        assert_eq!(keys(&first), ["item1", "item2", "item3"]);
        assert_eq!(backlog.len(), 4);

        let second = backlog.take_batch(3);
        assert_eq!(keys(&second), ["item4", "item5", "item6"]);

        let third = backlog.take_batch(3);
        assert_eq!(keys(&third), ["item7"]);
        assert_eq!(backlog.len(), 0);

        assert!(backlog.take_batch(3).is_empty());
    }

    #[test]
    fn batch_exactly_max_size() {
        let mut backlog = backlog(false, false);
        fill(&mut backlog, 3);

        assert_eq!(backlog.take_batch(3).len(), 3);
        assert_eq!(backlog.len(), 0);
    }

    #[test]
    fn add_fills_host_and_validates() {
        let mut backlog = backlog(false, false);
        backlog.add(Item::new("a", 1)).unwrap();
        backlog.add(Item::new("b", 1).with_host("other")).unwrap();
        assert_eq!(backlog.add(Item::new("", 1)), Err(ItemError::EmptyKey));

        let batch = backlog.take_batch(10);
        assert_eq!(batch[0].host(), Some("default-host"));
        assert_eq!(batch[1].host(), Some("other"));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn add_stamps_when_enabled() {
        let now = Timestamp::new(1_000, 500);

        let mut plain = backlog(false, false);
        plain.add_at(Item::new("a", 1), now).unwrap();

        let mut seconds = backlog(true, false);
        seconds.add_at(Item::new("a", 1), now).unwrap();

        let mut nanos = backlog(true, true);
        nanos.add_at(Item::new("a", 1), now).unwrap();

        let item = &plain.take_batch(1)[0];
        assert_eq!((item.clock(), item.ns()), (None, None));
        let item = &seconds.take_batch(1)[0];
        assert_eq!((item.clock(), item.ns()), (Some(1_000), None));
        let item = &nanos.take_batch(1)[0];
        assert_eq!((item.clock(), item.ns()), (Some(1_000), Some(500)));
    }

    #[test]
    fn add_replaces_explicit_clock_only_when_stamping() {
        let now = Timestamp::new(1_000, 500);

        let mut plain = backlog(false, false);
        plain.add_at(Item::new("a", 1).with_clock(5), now).unwrap();

        let mut nanos = backlog(true, true);
        nanos.add_at(Item::new("a", 1).with_clock(5), now).unwrap();

        let item = &plain.take_batch(1)[0];
        assert_eq!((item.clock(), item.ns()), (Some(5), None));
        let item = &nanos.take_batch(1)[0];
        assert_eq!((item.clock(), item.ns()), (Some(1_000), Some(500)));
    }

    #[test]
    fn requeue_freshness() {
        let start = 10_000;
        let threshold = start - 600;

        let batch = vec![
            Item::new("fresh", 1).with_clock(start - 599),
            Item::new("stale", 1).with_clock(start - 601),
            Item::new("boundary", 1).with_clock(start - 600),
            Item::new("unstamped", 1),
        ];

        let mut backlog = backlog(true, false);
        let result = backlog.requeue_fresh(batch, threshold);

        assert_eq!(result, RequeueResult { requeued: 1, dropped: 3 });
        assert_eq!(keys(&backlog.take_batch(10)), ["fresh"]);
    }

    #[test]
    fn requeue_goes_ahead_of_newer_items() {
        let mut backlog = backlog(false, false);
        for key in ["a", "b", "c", "d"] {
            backlog.add(Item::new(key, 1).with_clock(100)).unwrap();
        }

        let batch = backlog.take_batch(2);
        backlog.add(Item::new("e", 1).with_clock(100)).unwrap();

        let result = backlog.requeue_fresh(batch, 0);
        assert_eq!(result.requeued, 2);
        assert_eq!(keys(&backlog.take_batch(10)), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn clear_empties_backlog() {
        let mut backlog = backlog(false, false);
        fill(&mut backlog, 5);
        backlog.clear();
        assert_eq!(backlog.len(), 0);
        assert!(backlog.take_batch(1).is_empty());
    }
}
