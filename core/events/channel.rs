use super::event::Event;
use super::EventConsumer;
use crate::sync::atomic::{AtomicBool, Ordering};
use crate::sync::Arc;
use crossbeam::deque::{Injector, Worker};

/// A broadcast point for pool events.
///
/// Events are dropped until the first consumer is created, so pools that nobody observes do
/// not accumulate them.
///
#[derive(Clone, Debug, Default)]
pub struct EventChannel {
    bus: Arc<Injector<Event>>,
    observed: Arc<AtomicBool>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bus.is_empty()
    }

    pub fn is_observed(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }

    pub fn send<E>(&self, event: E)
    where
        E: Into<Event>,
    {
        if self.is_observed() {
            self.bus.push(event.into())
        }
    }

    pub fn consumer(&self) -> EventConsumer {
        self.observed.store(true, Ordering::Release);
        EventConsumer::new(self.bus.clone(), Worker::new_fifo())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_channel_is_empty() {
        let ec = EventChannel::new();
        assert!(ec.is_empty());
    }

    #[test]
    fn new_event_consumer_is_empty_on_empty_channel() {
        let ec = EventChannel::new();
        let c = ec.consumer();
        assert!(c.is_empty());
    }

    #[quickcheck]
    fn events_are_dropped_while_nobody_listens(event: Event) {
        let ec = EventChannel::new();
        ec.send(event);
        assert!(ec.is_empty());
        assert!(!ec.is_observed());
    }

    #[quickcheck]
    fn new_event_consumer_is_nonempty_on_nonempty_channel(event: Event) {
        let ec = EventChannel::new();
        let c = ec.consumer();
        ec.send(event);
        assert!(!c.is_empty());
    }

    #[quickcheck]
    fn event_consumer_needs_to_fetch_to_get_messages(event: Event) {
        let ec = EventChannel::new();
        let c = ec.consumer();
        ec.send(event);
        assert!(c.pop().is_none());
        c.fetch();
        assert!(c.pop().is_some());
    }

    #[quickcheck]
    fn events_are_received_in_the_order_they_are_sent(events: Vec<Event>) {
        let ec = EventChannel::new();
        let c = ec.consumer();

        for event in &events {
            ec.send(event.clone());
        }

        assert_eq!(c.drain(), events);
        assert!(ec.is_empty());
        assert!(c.pop().is_none());
    }

    #[quickcheck]
    fn receive_consumes_a_message(event: Event) {
        let ec = EventChannel::new();
        let c = ec.consumer();

        assert!(c.pop().is_none());
        ec.send(event.clone());
        c.fetch();
        assert_matches!(c.pop(), Some(e) if e == event);
        assert!(c.pop().is_none());
    }
}
