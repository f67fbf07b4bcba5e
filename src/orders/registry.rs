//! Order registry: the priority queues, the completed list and the event fan-out.
//!
//! Dequeue order is strict: recovery queue, then VIP, then normal.
//!
//! Two locks are involved. The queues sit behind a plain mutex that is never
//! held while events are delivered. Every engine operation (registry
//! mutations, bot pickups and ticks, pool scaling) additionally runs under
//! one reentrant engine lock, taken with [`OrderRegistry::exclusive`], which
//! is held across event delivery. Operations therefore execute one at a time
//! even on a multi-threaded runtime, while handlers on the same thread can
//! still call back into the registry.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::model::{Order, OrderEvent, OrderId, OrderKind, OrderStats};

/// Default broadcast channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Synchronous event handler registered with [`OrderRegistry::subscribe`].
pub type OrderHandler = Arc<dyn Fn(OrderEvent) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    recovery: VecDeque<Order>,
    vip: VecDeque<Order>,
    normal: VecDeque<Order>,
    completed: Vec<Order>,
    /// Ids handed out by `dequeue_next` and not yet completed or recovered.
    in_flight: HashSet<OrderId>,
    next_id: OrderId,
}

impl RegistryState {
    fn queue_mut(&mut self, kind: OrderKind) -> &mut VecDeque<Order> {
        match kind {
            OrderKind::Normal => &mut self.normal,
            OrderKind::Vip => &mut self.vip,
        }
    }

    fn pop_next(&mut self) -> Option<Order> {
        self.recovery
            .pop_front()
            .or_else(|| self.vip.pop_front())
            .or_else(|| self.normal.pop_front())
    }
}

/// Single owner of every order not currently held by a bot.
pub struct OrderRegistry {
    engine: ReentrantMutex<()>,
    state: Mutex<RegistryState>,
    handlers: RwLock<Vec<OrderHandler>>,
    tx: broadcast::Sender<OrderEvent>,
}

impl OrderRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty registry whose `watch` channel buffers `capacity` events.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            engine: ReentrantMutex::new(()),
            state: Mutex::new(RegistryState::default()),
            handlers: RwLock::new(Vec::new()),
            tx,
        })
    }

    pub fn create_normal_item(&self) -> Order {
        self.create_item(OrderKind::Normal)
    }

    pub fn create_vip_item(&self) -> Order {
        self.create_item(OrderKind::Vip)
    }

    /// Allocate the next id, append a pending order to its queue and publish
    /// `ItemAdded`. Returns a snapshot of the new order.
    pub fn create_item(&self, kind: OrderKind) -> Order {
        let _engine = self.exclusive();
        let order = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            let order = Order::new(id, kind);
            state.queue_mut(kind).push_back(order.clone());
            order
        };

        info!(order_id = order.id, kind = %kind, "Order created");
        self.publish(OrderEvent::ItemAdded);
        order
    }

    /// Pop the highest-priority pending order: recovery, then VIP, then normal.
    ///
    /// The caller takes ownership and must hand the order back through
    /// [`complete`](Self::complete) or [`recover`](Self::recover).
    pub fn dequeue_next(&self) -> Option<Order> {
        let _engine = self.exclusive();
        let order = {
            let mut state = self.state.lock();
            let order = state.pop_next()?;
            let fresh = state.in_flight.insert(order.id);
            debug_assert!(fresh, "order {} dequeued while already in flight", order.id);
            order
        };

        debug!(order_id = order.id, kind = %order.kind, "Order dequeued");
        self.publish(OrderEvent::ItemUpdated);
        Some(order)
    }

    /// Mark an in-flight order complete and move it to the completed list.
    ///
    /// Orders that are not in flight (already completed, recovered, or never
    /// dequeued) are ignored.
    pub fn complete(&self, mut order: Order) {
        let _engine = self.exclusive();
        {
            let mut state = self.state.lock();
            if !state.in_flight.remove(&order.id) {
                warn!(order_id = order.id, "Ignoring completion of order that is not in flight");
                return;
            }
            debug_assert!(!order.is_complete(), "in-flight order {} already complete", order.id);
            order.mark_complete();
            state.completed.push(order.clone());
        }

        info!(order_id = order.id, kind = %order.kind, "Order completed");
        self.publish(OrderEvent::ItemUpdated);
    }

    /// Return an interrupted order to the head of the recovery queue.
    ///
    /// The most recently recovered order is the next one dequeued. Orders that
    /// are not in flight are ignored.
    pub fn recover(&self, order: Order) {
        let _engine = self.exclusive();
        let id = order.id;
        {
            let mut state = self.state.lock();
            if !state.in_flight.remove(&id) {
                warn!(order_id = id, "Ignoring recovery of order that is not in flight");
                return;
            }
            state.recovery.push_front(order);
        }

        info!(order_id = id, "Order returned to recovery queue");
        self.publish(OrderEvent::ItemUpdated);
    }

    /// Register a handler invoked synchronously for every published event,
    /// in registration order.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(OrderEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Subscribe to the event stream as a broadcast receiver. Each WS client calls this.
    pub fn watch(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to the broadcast channel and then to every handler.
    pub fn publish(&self, event: OrderEvent) {
        let _engine = self.exclusive();

        // Broadcast; ok if no receivers are listening yet
        let _ = self.tx.send(event);

        // The queue lock is free here; only the engine lock is held.
        let handlers: Vec<OrderHandler> = self.handlers.read().clone();
        for handler in handlers {
            handler(event);
        }
    }

    /// Take the engine lock for the duration of one engine operation.
    ///
    /// Reentrant: a thread that already holds it (for example a handler
    /// running inside `publish`) acquires it again without blocking. Must not
    /// be taken for the first time while holding any other engine lock.
    pub(crate) fn exclusive(&self) -> ReentrantMutexGuard<'_, ()> {
        self.engine.lock()
    }

    /// Recovery queue, VIP queue, normal queue, then completed list.
    pub fn snapshot_all(&self) -> Vec<Order> {
        let state = self.state.lock();
        state
            .recovery
            .iter()
            .chain(state.vip.iter())
            .chain(state.normal.iter())
            .chain(state.completed.iter())
            .cloned()
            .collect()
    }

    /// Queued orders in dequeue order.
    pub fn pending(&self) -> Vec<Order> {
        let state = self.state.lock();
        state
            .recovery
            .iter()
            .chain(state.vip.iter())
            .chain(state.normal.iter())
            .cloned()
            .collect()
    }

    pub fn completed(&self) -> Vec<Order> {
        self.state.lock().completed.clone()
    }

    pub fn stats(&self) -> OrderStats {
        let state = self.state.lock();
        OrderStats {
            recovery: state.recovery.len(),
            vip: state.vip.len(),
            normal: state.normal.len(),
            in_flight: state.in_flight.len(),
            completed: state.completed.len(),
        }
    }
}
