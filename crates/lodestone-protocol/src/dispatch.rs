use crate::factory::ClientboundPacket;
use crate::packet::{Clientbound, PacketKey};
use lodestone_common::ProtocolState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use tracing::{debug, trace};

pub type SubscriberId = u64;

type HandlerFn = dyn FnMut(&ClientboundPacket) + Send + 'static;
type Handler = Arc<Mutex<Box<HandlerFn>>>;

struct Subscriber {
    handler: Handler,
    keys: Vec<PacketKey>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    routes: HashMap<PacketKey, Vec<SubscriberId>>,
    subscribers: HashMap<SubscriberId, Subscriber>,
}

impl Registry {
    fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return false;
        };

        for key in subscriber.keys {
            if let Some(ids) = self.routes.get_mut(&key) {
                ids.retain(|&other| other != id);
                if ids.is_empty() {
                    self.routes.remove(&key);
                }
            }
        }
        true
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A panicking handler never holds the registry lock, so the table stays consistent
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fans decoded packets out to the subscribers registered for their `(state, id)`.
///
/// Cloning yields another handle to the same table.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a subscriber that listens to nothing until [`Subscription::listen`] is called.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&ClientboundPacket) + Send + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(
            id,
            Subscriber {
                handler: Arc::new(Mutex::new(Box::new(handler))),
                keys: Vec::new(),
            },
        );

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Removes every registration of `id`. Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        lock(&self.registry).remove(id)
    }

    /// Runs every handler registered for the packet's key, in registration order.
    ///
    /// The set of handlers is fixed when dispatch starts, so handlers may subscribe or
    /// unsubscribe freely. A handler that is already running, because it dispatched again from
    /// inside itself or another thread is dispatching to it, is skipped. Returns how many
    /// handlers ran.
    pub fn dispatch(&self, packet: &ClientboundPacket) -> usize {
        let key = packet.key();
        let handlers: Vec<Handler> = {
            let registry = lock(&self.registry);
            match registry.routes.get(&key) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| registry.subscribers.get(id))
                    .map(|subscriber| Arc::clone(&subscriber.handler))
                    .collect(),
                None => return 0,
            }
        };

        trace!(state = %key.state, id = key.id, handlers = handlers.len(), "dispatching");
        let mut ran = 0;
        for handler in &handlers {
            let mut handler = match handler.try_lock() {
                Ok(handler) => handler,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    debug!(state = %key.state, id = key.id, "handler busy, skipped");
                    continue;
                }
            };
            (*handler)(packet);
            ran += 1;
        }
        ran
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }

    pub fn listener_count(&self, key: PacketKey) -> usize {
        lock(&self.registry).routes.get(&key).map_or(0, Vec::len)
    }
}

/// Registration guard. Dropping it removes the subscriber from every key it listens to.
#[must_use = "dropping a Subscription unsubscribes it immediately"]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Registers for `(state, id)`. Listening twice to the same key is a no-op.
    pub fn listen(&self, state: ProtocolState, id: i32) -> &Self {
        let Some(registry) = self.registry.upgrade() else {
            return self;
        };

        let key = PacketKey::new(state, id);
        let mut registry = lock(&registry);
        let Some(subscriber) = registry.subscribers.get_mut(&self.id) else {
            return self;
        };
        if subscriber.keys.contains(&key) {
            return self;
        }
        subscriber.keys.push(key);
        registry.routes.entry(key).or_default().push(self.id);
        self
    }

    /// Registers for the key of packet type `P`.
    pub fn listen_to<P: Clientbound>(&self) -> &Self {
        let key = P::key();
        self.listen(key.state, key.id)
    }

    pub fn unsubscribe(self) {}

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keep_alive::KeepAlivePacket;
    use crate::login::SetCompressionPacket;
    use crate::packet::Packet;

    fn keep_alive(id: i64) -> ClientboundPacket {
        KeepAlivePacket { keep_alive_id: id }.into()
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let subscriptions: Vec<Subscription> = (0..3)
            .map(|n| {
                let log = Arc::clone(&log);
                let subscription = dispatcher.subscribe(move |_| log.lock().unwrap().push(n));
                subscription.listen_to::<KeepAlivePacket>();
                subscription
            })
            .collect();

        assert_eq!(dispatcher.dispatch(&keep_alive(1)), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(subscriptions.len(), 3);
    }

    #[test]
    fn test_only_matching_key() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let subscription = dispatcher.subscribe(move |_| *counter.lock().unwrap() += 1);
        subscription.listen_to::<SetCompressionPacket>();

        assert_eq!(dispatcher.dispatch(&keep_alive(1)), 0);
        let compression: ClientboundPacket = SetCompressionPacket { threshold: 5 }.into();
        assert_eq!(dispatcher.dispatch(&compression), 1);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_drop_unregisters() {
        let dispatcher = Dispatcher::new();
        let subscription = dispatcher.subscribe(|_| {});
        subscription.listen(ProtocolState::Play, 0x1F).listen(ProtocolState::Play, 0x1F);
        assert_eq!(dispatcher.listener_count(KeepAlivePacket::key()), 1);

        drop(subscription);
        assert_eq!(dispatcher.dispatch(&keep_alive(1)), 0);
        assert_eq!(dispatcher.subscriber_count(), 0);
        assert_eq!(dispatcher.listener_count(KeepAlivePacket::key()), 0);
    }

    #[test]
    fn test_unsubscribe_isolates_others() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first_log = Arc::clone(&log);
        let first = dispatcher.subscribe(move |_| first_log.lock().unwrap().push("first"));
        first.listen_to::<KeepAlivePacket>();
        let second_log = Arc::clone(&log);
        let second = dispatcher.subscribe(move |_| second_log.lock().unwrap().push("second"));
        second.listen_to::<KeepAlivePacket>();

        first.unsubscribe();
        assert_eq!(dispatcher.dispatch(&keep_alive(1)), 1);
        assert_eq!(*log.lock().unwrap(), vec!["second"]);

        assert!(dispatcher.unregister(second.id()));
        assert!(!dispatcher.unregister(second.id()));
        assert_eq!(dispatcher.dispatch(&keep_alive(2)), 0);
    }

    #[test]
    fn test_subscribe_during_dispatch() {
        let dispatcher = Dispatcher::new();
        let inner = Arc::new(Mutex::new(Vec::new()));

        let handle = dispatcher.clone();
        let added = Arc::clone(&inner);
        let subscription = dispatcher.subscribe(move |_| {
            let late = handle.subscribe(|_| {});
            late.listen_to::<KeepAlivePacket>();
            added.lock().unwrap().push(late);
        });
        subscription.listen_to::<KeepAlivePacket>();

        // The subscriber added mid-dispatch only runs from the next dispatch on
        assert_eq!(dispatcher.dispatch(&keep_alive(1)), 1);
        assert_eq!(dispatcher.dispatch(&keep_alive(2)), 2);
    }

    #[test]
    fn test_subscription_outlives_dispatcher() {
        let dispatcher = Dispatcher::new();
        let subscription = dispatcher.subscribe(|_| {});
        drop(dispatcher);
        subscription.listen(ProtocolState::Play, 0x1F);
        drop(subscription);
    }

    #[test]
    fn test_removing_middle_keeps_order() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut subscriptions: Vec<Subscription> = (0..3)
            .map(|n| {
                let log = Arc::clone(&log);
                let subscription = dispatcher.subscribe(move |_| log.lock().unwrap().push(n));
                subscription.listen_to::<KeepAlivePacket>();
                subscription
            })
            .collect();

        assert_eq!(dispatcher.dispatch(&keep_alive(1)), 3);
        subscriptions.remove(1).unsubscribe();
        assert_eq!(dispatcher.dispatch(&keep_alive(2)), 2);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 0, 2]);
        assert_eq!(dispatcher.listener_count(KeepAlivePacket::key()), 2);
    }

    #[test]
    fn test_reentrant_dispatch_skips_running_handler() {
        let dispatcher = Dispatcher::new();
        let inner_runs = Arc::new(Mutex::new(Vec::new()));

        let handle = dispatcher.clone();
        let runs = Arc::clone(&inner_runs);
        let subscription = dispatcher.subscribe(move |packet| {
            if let ClientboundPacket::KeepAlive(ping) = packet {
                if ping.keep_alive_id == 1 {
                    runs.lock().unwrap().push(handle.dispatch(&keep_alive(2)));
                }
            }
        });
        subscription.listen_to::<KeepAlivePacket>();

        assert_eq!(dispatcher.dispatch(&keep_alive(1)), 1);
        assert_eq!(*inner_runs.lock().unwrap(), vec![0]);
    }
}
