// Event bus: typed, synchronous publish/subscribe

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::trace;
use parking_lot::Mutex;

/// A named channel on the bus.
pub trait Signal: 'static {
    type Args: Send + Sync + 'static;
}

type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Receipt for one subscription; pass it back to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    signal: TypeId,
    id: u64,
}

trait ErasedChannel: Send + Sync {
    fn remove(&mut self, id: u64) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Channel<A> {
    handlers: Vec<(u64, Handler<A>)>,
}

impl<A: Send + Sync + 'static> ErasedChannel for Channel<A> {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    fn len(&self) -> usize {
        self.handlers.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    channels: HashMap<TypeId, Box<dyn ErasedChannel>>,
}

/// Cheap to clone; every clone talks to the same channels, so handlers can
/// hold one and subscribe or unsubscribe while a dispatch is running.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<S: Signal>(
        &self,
        handler: impl Fn(&S::Args) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let channel = inner
            .channels
            .entry(TypeId::of::<S>())
            .or_insert_with(|| {
                Box::new(Channel::<S::Args> {
                    handlers: Vec::new(),
                })
            });
        let handler: Handler<S::Args> = Arc::new(handler);
        if let Some(channel) = channel.as_any_mut().downcast_mut::<Channel<S::Args>>() {
            channel.handlers.push((id, handler));
        }
        Subscription {
            signal: TypeId::of::<S>(),
            id,
        }
    }

    /// Removes a subscription. Unknown or already removed receipts are a
    /// no-op; the return value says whether anything was removed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut inner = self.inner.lock();
        inner
            .channels
            .get_mut(&subscription.signal)
            .is_some_and(|channel| channel.remove(subscription.id))
    }

    /// Calls every current subscriber of `S` with `args`.
    ///
    /// The subscriber list is snapshotted before the first handler runs, so
    /// changes made by handlers take effect from the next publish.
    pub fn publish<S: Signal>(&self, args: S::Args) -> usize {
        let snapshot: Vec<Handler<S::Args>> = {
            let inner = self.inner.lock();
            match inner
                .channels
                .get(&TypeId::of::<S>())
                .and_then(|channel| channel.as_any().downcast_ref::<Channel<S::Args>>())
            {
                Some(channel) => channel.handlers.iter().map(|(_, h)| h.clone()).collect(),
                None => Vec::new(),
            }
        };
        trace!("publish {} to {} subscriber(s)", type_name::<S>(), snapshot.len());
        for handler in &snapshot {
            handler(&args);
        }
        snapshot.len()
    }

    pub fn subscriber_count<S: Signal>(&self) -> usize {
        self.inner
            .lock()
            .channels
            .get(&TypeId::of::<S>())
            .map_or(0, |channel| channel.len())
    }
}
