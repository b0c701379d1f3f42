use std::collections::VecDeque;

type Listener<E> = Box<dyn FnMut(&E)>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the subscription impossible to remove"]
pub struct Subscription(u64);

/// Ordered publication of events to any number of listeners.
///
/// Every listener sees every event in publication order, and listeners are
/// called in subscription order. The bus can additionally keep a queue of
/// published events for hosts that prefer to poll rather than register
/// callbacks.
pub struct EventBus<E> {
    listeners: Vec<(u64, Listener<E>)>,
    next_id: u64,
    queue: Option<VecDeque<E>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
            queue: None,
        }
    }

    /// A bus that also records published events until [`EventBus::drain`] is called.
    pub fn with_queue() -> Self {
        Self {
            queue: Some(VecDeque::new()),
            ..Self::new()
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        Subscription(id)
    }

    /// Remove a listener. Returns false if it was already removed.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != subscription.0);
        self.listeners.len() != before
    }

    pub fn publish(&mut self, event: E) {
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
        if let Some(queue) = &mut self.queue {
            queue.push_back(event);
        }
    }

    pub fn publish_all(&mut self, events: impl IntoIterator<Item = E>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Take every queued event in publication order. Empty if the bus has no queue.
    pub fn drain(&mut self) -> Vec<E> {
        match &mut self.queue {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
