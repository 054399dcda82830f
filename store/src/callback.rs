//! `CallbackStore` (spec.md §4.3, C4): wraps any [`BeaconStore`] and fires
//! a subscriber callback once per committed round, on a dedicated thread
//! fed by a bounded `flume` channel. Per spec.md §4.3 ("the callback must
//! not block the writer for long; a conformant implementation is
//! permitted to hand off to a bounded queue and drop the oldest pending
//! notification under pressure"), `put` never blocks on a slow or wedged
//! subscriber: when the queue is full it drops the oldest still-pending
//! notification to make room for the new one, trading notification
//! completeness for a writer that's never at the mercy of its callback.

use beacon_core::Beacon;

use crate::{BeaconStore, Result};

pub struct CallbackStore<S> {
    inner: S,
    queue: flume::Sender<Beacon>,
    /// Kept alongside `queue` so `put` can drop the oldest pending
    /// notification itself when the queue is full, without racing the
    /// worker thread for ownership of the channel.
    queue_rx: flume::Receiver<Beacon>,
    _worker: std::thread::JoinHandle<()>,
}

impl<S> CallbackStore<S> {
    /// Wraps `inner`, invoking `on_beacon` for every round once it has
    /// been durably written. `capacity` bounds how many pending
    /// notifications queue up before `put` starts dropping the oldest
    /// one rather than blocking.
    pub fn new<F>(inner: S, capacity: usize, on_beacon: F) -> Self
    where
        F: Fn(&Beacon) + Send + 'static,
    {
        let (tx, rx) = flume::bounded(capacity);
        let worker_rx = rx.clone();
        let worker = std::thread::spawn(move || {
            while let Ok(beacon) = worker_rx.recv() {
                on_beacon(&beacon);
            }
        });
        CallbackStore {
            inner,
            queue: tx,
            queue_rx: rx,
            _worker: worker,
        }
    }
}

impl<S: BeaconStore> BeaconStore for CallbackStore<S> {
    fn put(&self, beacon: Beacon) -> Result<()> {
        self.inner.put(beacon.clone())?;
        match self.queue.try_send(beacon) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(beacon)) => {
                // Queue is saturated: drop the oldest pending notification
                // to make room, then retry once. The worker may win the
                // race for the oldest slot first, in which case the retry
                // still finds room; either way `put` never blocks on it.
                let _ = self.queue_rx.try_recv();
                let _ = self.queue.try_send(beacon);
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                // Worker thread is gone; notifications are best-effort and
                // must never fail a write that already committed durably.
            }
        }
        Ok(())
    }

    fn last(&self) -> Result<Option<Beacon>> {
        self.inner.last()
    }

    fn get(&self, round: u64) -> Result<Option<Beacon>> {
        self.inner.get(round)
    }

    fn cursor(&self, from: u64) -> Result<Vec<Beacon>> {
        self.inner.cursor(from)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::memory::MemoryStore;

    fn beacon(round: u64) -> Beacon {
        Beacon::new(round, vec![round as u8], vec![round as u8; 2], vec![0u8; 32])
    }

    /// Builds a chain of beacons, each linking to the previous one's
    /// randomness, to satisfy `MemoryStore`'s chain-link check.
    fn chain(rounds: &[u64]) -> Vec<Beacon> {
        let mut out = Vec::new();
        let mut previous_rand = b"seed".to_vec();
        for &round in rounds {
            let beacon = Beacon::new(round, previous_rand, vec![round as u8; 2], vec![0u8; 32]);
            previous_rand = beacon.randomness.clone();
            out.push(beacon);
        }
        out
    }

    #[test]
    fn callback_fires_for_every_committed_round() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_writer = Arc::clone(&seen);
        let store = CallbackStore::new(MemoryStore::new(), 4, move |b: &Beacon| {
            seen_writer.lock().unwrap().push(b.round);
        });

        for beacon in chain(&[1, 2]) {
            store.put(beacon).unwrap();
        }

        // Callback runs asynchronously on the worker thread; give it a
        // moment to drain before asserting.
        for _ in 0..100 {
            if seen.lock().unwrap().len() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn reads_delegate_to_inner_store() {
        let store = CallbackStore::new(MemoryStore::new(), 4, |_: &Beacon| {});
        store.put(beacon(1)).unwrap();
        assert_eq!(store.get(1).unwrap(), Some(beacon(1)));
        assert_eq!(store.last().unwrap().unwrap().round, 1);
    }

    /// A subscriber that never drains must not make `put` block: once the
    /// queue is full, `put` drops the oldest pending notification and
    /// returns immediately (spec.md §4.3).
    #[test]
    fn put_does_not_block_when_the_subscriber_is_stalled() {
        let release = Arc::new(std::sync::Barrier::new(2));
        let release_worker = Arc::clone(&release);
        let first = std::sync::Once::new();
        let store = CallbackStore::new(MemoryStore::new(), 1, move |_: &Beacon| {
            first.call_once(|| release_worker.wait());
        });

        // Fill the one-slot queue, then push far more while the worker is
        // parked on the barrier, waiting to consume the very first item.
        for beacon in chain(&[1, 2, 3, 4, 5]) {
            store.put(beacon).unwrap();
        }

        // All five `put`s above must have returned without blocking; only
        // now do we let the worker proceed.
        release.wait();
    }
}
