//! A single bot: pull the next order, count it down tick by tick, complete it,
//! repeat until the queues are empty.
//!
//! Each pickup starts a fresh [`TickTimer`] task on the tokio clock. The timer
//! is owned by the bot's state and aborted when dropped, so completion,
//! destruction and dropping the bot all cancel it. Every timer carries an
//! epoch; a tick whose epoch no longer matches is discarded.
//!
//! Waking, ticking and destroying all run under the registry's engine lock,
//! so a bot never goes idle between another thread's enqueue and its
//! wake-on-add dispatch.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};

use super::model::{BotId, BotKind, BotSnapshot, BotStatus};
use crate::config::EngineConfig;
use crate::orders::{Order, OrderEvent, OrderRegistry};

/// Repeating one-tick countdown. Aborts its task on drop.
struct TickTimer {
    handle: JoinHandle<()>,
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct BotState {
    /// `Running` exactly while an order is held.
    status: BotStatus,
    order: Option<Order>,
    /// A pickup is in progress; further wakes are ignored until it settles.
    claimed: bool,
    timer: Option<TickTimer>,
    /// Bumped on every pickup and on destroy.
    epoch: u64,
    destroyed: bool,
}

struct BotInner {
    id: BotId,
    kind: BotKind,
    ticks: u32,
    tick: Duration,
    registry: Arc<OrderRegistry>,
    runtime: Handle,
    state: Mutex<BotState>,
}

/// Handle to a bot. Clones refer to the same bot.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Create a bot and immediately try to pick up work.
    pub(crate) fn start(
        id: BotId,
        kind: BotKind,
        registry: Arc<OrderRegistry>,
        config: &EngineConfig,
        runtime: Handle,
    ) -> Self {
        let bot = Self {
            inner: Arc::new(BotInner {
                id,
                kind,
                ticks: kind.ticks(config),
                tick: config.tick,
                registry,
                runtime,
                state: Mutex::new(BotState {
                    status: BotStatus::Idle,
                    order: None,
                    claimed: false,
                    timer: None,
                    epoch: 0,
                    destroyed: false,
                }),
            }),
        };
        info!(bot_id = id, kind = %kind, "Bot created");
        bot.wake();
        bot
    }

    pub fn id(&self) -> BotId {
        self.inner.id
    }

    pub fn kind(&self) -> BotKind {
        self.inner.kind
    }

    pub fn status(&self) -> BotStatus {
        self.inner.state.lock().status
    }

    pub fn is_idle(&self) -> bool {
        self.status() == BotStatus::Idle
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Copy of the order currently held, if any.
    pub fn current_order(&self) -> Option<Order> {
        self.inner.state.lock().order.clone()
    }

    pub fn snapshot(&self) -> BotSnapshot {
        let state = self.inner.state.lock();
        BotSnapshot {
            id: self.inner.id,
            kind: self.inner.kind,
            status: state.status,
            order_id: state.order.as_ref().map(|o| o.id),
            remaining_ticks: state.order.as_ref().map(|o| o.remaining_ticks),
        }
    }

    /// Ask an idle bot to look for work. Running, claimed or destroyed bots ignore it.
    pub(crate) fn wake(&self) {
        let _engine = self.inner.registry.exclusive();
        {
            let mut state = self.inner.state.lock();
            if state.destroyed || state.claimed || state.status != BotStatus::Idle {
                return;
            }
            state.claimed = true;
        }
        debug!(bot_id = self.inner.id, "Bot woken");
        self.run_next();
    }

    /// Stop the bot for good. A held order goes back to the head of the
    /// recovery queue with its countdown untouched. Calling this twice is a no-op.
    pub fn destroy(&self) {
        let _engine = self.inner.registry.exclusive();
        let order = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.claimed = false;
            state.epoch += 1;
            state.timer = None;
            state.status = BotStatus::Idle;
            state.order.take()
        };

        match order {
            Some(order) => {
                info!(
                    bot_id = self.inner.id,
                    order_id = order.id,
                    remaining_ticks = order.remaining_ticks,
                    "Bot destroyed while holding order"
                );
                self.inner.registry.recover(order);
            }
            None => info!(bot_id = self.inner.id, "Bot destroyed"),
        }
    }

    /// Pickup-and-run. The caller holds the engine lock and has claimed the bot.
    fn run_next(&self) {
        let registry = &self.inner.registry;

        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                state.claimed = false;
                return;
            }
        }

        let Some(mut order) = registry.dequeue_next() else {
            let mut state = self.inner.state.lock();
            debug_assert!(
                state.order.is_none(),
                "bot {} idles while holding an order",
                self.inner.id
            );
            state.claimed = false;
            debug!(bot_id = self.inner.id, "No pending orders, bot idle");
            return;
        };

        let order_id = order.id;
        {
            let mut state = self.inner.state.lock();
            state.claimed = false;
            if state.destroyed {
                drop(state);
                registry.recover(order);
                return;
            }
            debug_assert!(
                state.status.can_transition_to(BotStatus::Running),
                "bot {} picked up order {} while {}",
                self.inner.id,
                order_id,
                state.status
            );
            order.remaining_ticks = self.inner.ticks;
            state.order = Some(order);
            state.status = BotStatus::Running;
            state.epoch += 1;
            let epoch = state.epoch;
            state.timer = Some(self.start_timer(epoch));
        }

        info!(
            bot_id = self.inner.id,
            order_id,
            remaining_ticks = self.inner.ticks,
            "Bot picked up order"
        );
        registry.publish(OrderEvent::Progress);
    }

    fn start_timer(&self, epoch: u64) -> TickTimer {
        let weak: Weak<BotInner> = Arc::downgrade(&self.inner);
        let period = self.inner.tick;

        let handle = self.inner.runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let bot = Bot { inner };
                if !bot.on_tick(epoch) {
                    break;
                }
            }
        });

        TickTimer { handle }
    }

    /// Apply one tick. Returns whether the timer should keep running.
    fn on_tick(&self, epoch: u64) -> bool {
        let _engine = self.inner.registry.exclusive();
        let finished = {
            let mut state = self.inner.state.lock();
            if state.destroyed || state.epoch != epoch {
                return false;
            }
            let Some(order) = state.order.as_mut() else {
                return false;
            };

            debug_assert!(order.remaining_ticks > 0, "order {} ticked past zero", order.id);
            order.remaining_ticks = order.remaining_ticks.saturating_sub(1);
            debug!(
                bot_id = self.inner.id,
                order_id = order.id,
                remaining_ticks = order.remaining_ticks,
                "Tick"
            );

            if order.remaining_ticks > 0 {
                None
            } else {
                // Aborts this task at its next await; the rest of this tick is synchronous.
                state.timer = None;
                debug_assert!(state.status.can_transition_to(BotStatus::Idle));
                state.status = BotStatus::Idle;
                // Held until the follow-up pickup settles.
                state.claimed = true;
                state.order.take()
            }
        };

        self.inner.registry.publish(OrderEvent::Progress);

        match finished {
            None => true,
            Some(order) => {
                info!(bot_id = self.inner.id, order_id = order.id, "Bot finished order");
                self.inner.registry.complete(order);
                self.run_next();
                false
            }
        }
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderStatus;

    fn start(registry: &Arc<OrderRegistry>, id: BotId, kind: BotKind) -> Bot {
        Bot::start(
            id,
            kind,
            Arc::clone(registry),
            &EngineConfig::default(),
            Handle::current(),
        )
    }

    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn idle_when_nothing_queued() {
        let registry = OrderRegistry::new();
        let bot = start(&registry, 0, BotKind::Normal);
        assert_eq!(bot.status(), BotStatus::Idle);
        assert!(bot.current_order().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn normal_bot_finishes_after_ten_ticks() {
        let registry = OrderRegistry::new();
        let order = registry.create_normal_item();
        let bot = start(&registry, 0, BotKind::Normal);

        assert_eq!(bot.status(), BotStatus::Running);
        assert_eq!(bot.current_order().unwrap().remaining_ticks, 10);

        advance_ms(3_500).await;
        assert_eq!(bot.snapshot().remaining_ticks, Some(7));

        advance_ms(6_000).await;
        assert_eq!(bot.snapshot().remaining_ticks, Some(1));
        assert!(registry.completed().is_empty());

        advance_ms(1_000).await;
        assert_eq!(bot.status(), BotStatus::Idle);
        let completed = registry.completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, order.id);
        assert_eq!(completed[0].status, OrderStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn vip_bot_finishes_after_five_ticks() {
        let registry = OrderRegistry::new();
        registry.create_normal_item();
        let bot = start(&registry, 0, BotKind::Vip);

        advance_ms(4_500).await;
        assert_eq!(bot.status(), BotStatus::Running);

        advance_ms(1_000).await;
        assert_eq!(bot.status(), BotStatus::Idle);
        assert_eq!(registry.stats().completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_published_on_pickup_and_every_tick() {
        let registry = OrderRegistry::new();
        let progress = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&progress);
        registry.subscribe(move |event| {
            if event == OrderEvent::Progress {
                *sink.lock() += 1;
            }
        });

        registry.create_vip_item();
        let _bot = start(&registry, 0, BotKind::Vip);
        advance_ms(20_000).await;

        assert_eq!(*progress.lock(), 1 + 5);
    }

    #[tokio::test(start_paused = true)]
    async fn continues_to_next_order_without_being_woken() {
        let registry = OrderRegistry::new();
        registry.create_normal_item();
        registry.create_normal_item();
        registry.create_vip_item();
        let bot = start(&registry, 0, BotKind::Vip);

        // VIP order first.
        assert_eq!(bot.current_order().unwrap().id, 2);

        advance_ms(5_500).await;
        assert_eq!(bot.current_order().unwrap().id, 0);

        advance_ms(5_000).await;
        assert_eq!(bot.current_order().unwrap().id, 1);

        advance_ms(5_000).await;
        assert_eq!(bot.status(), BotStatus::Idle);
        let done: Vec<_> = registry.completed().iter().map(|o| o.id).collect();
        assert_eq!(done, vec![2, 0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_mid_run_recovers_order() {
        let registry = OrderRegistry::new();
        registry.create_normal_item();
        let order = registry.create_normal_item();
        let bot = start(&registry, 0, BotKind::Normal);
        registry.create_vip_item();

        advance_ms(4_500).await;
        bot.destroy();

        assert!(bot.is_destroyed());
        assert_eq!(bot.status(), BotStatus::Idle);
        assert!(bot.current_order().is_none());

        // Interrupted order is back at the head, ahead of the VIP order.
        let pending = registry.pending();
        assert_eq!(pending[0].id, 0);
        assert_eq!(pending[0].status, OrderStatus::Pending);
        assert_eq!(pending[0].remaining_ticks, 6);
        assert_eq!(pending[1].id, 2);
        assert_eq!(pending[2].id, order.id);

        // No tick lands after destruction.
        advance_ms(30_000).await;
        assert_eq!(registry.stats().completed, 0);
        assert_eq!(registry.pending()[0].remaining_ticks, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_is_idempotent() {
        let registry = OrderRegistry::new();
        registry.create_normal_item();
        let bot = start(&registry, 0, BotKind::Normal);

        bot.destroy();
        bot.destroy();

        let stats = registry.stats();
        assert_eq!(stats.recovery, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_bot_ignores_wake() {
        let registry = OrderRegistry::new();
        let bot = start(&registry, 0, BotKind::Normal);
        bot.destroy();

        registry.create_normal_item();
        bot.wake();

        assert_eq!(bot.status(), BotStatus::Idle);
        assert_eq!(registry.stats().normal, 1);
    }

    /// Handler slot filled once the bot exists, so handlers can look at it.
    fn bot_slot(registry: &OrderRegistry) -> (Arc<Mutex<Option<Bot>>>, Arc<Mutex<Vec<BotSnapshot>>>) {
        let slot: Arc<Mutex<Option<Bot>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (watched, sink) = (Arc::clone(&slot), Arc::clone(&seen));
        registry.subscribe(move |_| {
            let bot = watched.lock().clone();
            if let Some(bot) = bot {
                sink.lock().push(bot.snapshot());
                bot.wake();
            }
        });
        (slot, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn status_is_running_only_while_holding_an_order() {
        let registry = OrderRegistry::new();
        let bot = start(&registry, 0, BotKind::Vip);
        let (slot, seen) = bot_slot(&registry);
        *slot.lock() = Some(bot.clone());

        registry.create_normal_item();
        advance_ms(5_500).await;
        registry.create_vip_item();
        advance_ms(5_500).await;

        let seen = seen.lock();
        assert!(seen.len() > 10);
        for snapshot in seen.iter() {
            assert_eq!(
                snapshot.status == BotStatus::Running,
                snapshot.order_id.is_some(),
                "{snapshot:?}"
            );
        }
        assert_eq!(bot.status(), BotStatus::Idle);
        assert_eq!(registry.stats().completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_during_own_pickup_is_ignored() {
        let registry = OrderRegistry::new();
        let bot = start(&registry, 0, BotKind::Normal);
        let (slot, _seen) = bot_slot(&registry);
        *slot.lock() = Some(bot.clone());

        registry.create_normal_item();
        registry.create_normal_item();

        assert_eq!(bot.current_order().unwrap().id, 0);
        let stats = registry.stats();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.normal, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_on_running_bot_is_ignored() {
        let registry = OrderRegistry::new();
        registry.create_normal_item();
        registry.create_normal_item();
        let bot = start(&registry, 0, BotKind::Normal);

        bot.wake();

        assert_eq!(bot.current_order().unwrap().id, 0);
        assert_eq!(registry.stats().normal, 1);
        assert_eq!(registry.stats().in_flight, 1);
    }
}
