//! # Buses
//!
//! A bus is an unbounded multi-producer/multi-consumer FIFO queue. The pool uses one for
//! submitted tasks, one for responses flowing back to the manager, and one private request bus
//! per worker.
//!
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

pub struct Bus<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Bus<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, item: T) {
        // NOTE: the bus holds its own receiver, so the channel can never be disconnected while
        // we hold a sender to it.
        let _ = self.tx.send(item);
    }

    pub fn try_pop(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait at most `timeout` for an item to show up.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take everything currently on the bus.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bus_is_empty() {
        let bus: Bus<u32> = Bus::new();
        assert!(bus.is_empty());
        assert!(bus.try_pop().is_none());
    }

    #[quickcheck]
    fn items_come_out_in_the_order_they_went_in(items: Vec<u32>) {
        let bus = Bus::new();
        for item in &items {
            bus.push(*item);
        }
        assert_eq!(bus.len(), items.len());
        for item in items {
            assert_eq!(bus.try_pop(), Some(item));
        }
        assert!(bus.is_empty());
    }

    #[quickcheck]
    fn clones_share_the_same_queue(items: Vec<u32>) {
        let producer = Bus::new();
        let consumer = producer.clone();
        for item in &items {
            producer.push(*item);
        }
        assert_eq!(consumer.drain(), items);
        assert!(producer.is_empty());
    }

    #[test]
    fn popping_with_a_timeout_gives_up_on_an_empty_bus() {
        let bus: Bus<u32> = Bus::new();
        assert!(bus.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn popping_with_a_timeout_sees_items_from_other_threads() {
        let bus = Bus::new();
        let producer = bus.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.push(1);
        });
        assert_eq!(bus.pop_timeout(Duration::from_secs(5)), Some(1));
        t.join().unwrap();
    }
}
