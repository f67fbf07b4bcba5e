//! Bot pool: creates and destroys bots, and wakes idle bots when new orders
//! arrive instead of having them poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::bot::Bot;
use super::model::{BotKind, BotSnapshot, BotStatus};
use crate::config::EngineConfig;
use crate::error::PoolError;
use crate::orders::{OrderEvent, OrderRegistry};

/// Manages the set of active bots, newest last.
pub struct BotPool {
    registry: Arc<OrderRegistry>,
    config: EngineConfig,
    runtime: Handle,
    bots: Arc<Mutex<Vec<Bot>>>,
    next_id: AtomicU64,
}

impl BotPool {
    /// Create an empty pool and subscribe it to the registry.
    ///
    /// Must be called inside a tokio runtime; bot timers are spawned on it.
    pub fn new(registry: Arc<OrderRegistry>, config: EngineConfig) -> Result<Self, PoolError> {
        let runtime = Handle::try_current()?;
        let bots: Arc<Mutex<Vec<Bot>>> = Arc::new(Mutex::new(Vec::new()));

        let watched = Arc::downgrade(&bots);
        registry.subscribe(move |event| {
            if event != OrderEvent::ItemAdded {
                return;
            }
            if let Some(bots) = watched.upgrade() {
                wake_idle(&bots);
            }
        });

        Ok(Self {
            registry,
            config,
            runtime,
            bots,
            next_id: AtomicU64::new(0),
        })
    }

    /// Add a bot of the given class. It starts on pending work right away.
    pub fn scale_up(&self, kind: BotKind) -> Bot {
        // Held until the bot is listed, so an ItemAdded from another thread sees it.
        let _engine = self.registry.exclusive();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let bot = Bot::start(
            id,
            kind,
            Arc::clone(&self.registry),
            &self.config,
            self.runtime.clone(),
        );
        let count = {
            let mut bots = self.bots.lock();
            bots.push(bot.clone());
            bots.len()
        };
        info!(bot_id = id, kind = %kind, bots = count, "Scaled up");
        bot
    }

    /// Remove and destroy the most recently added bot. `None` when empty.
    pub fn scale_down(&self) -> Option<Bot> {
        let _engine = self.registry.exclusive();
        let (bot, count) = {
            let mut bots = self.bots.lock();
            let bot = bots.pop()?;
            (bot, bots.len())
        };
        bot.destroy();
        info!(bot_id = bot.id(), bots = count, "Scaled down");
        Some(bot)
    }

    /// Bots in creation order.
    pub fn list_workers(&self) -> Vec<Bot> {
        self.bots.lock().clone()
    }

    pub fn snapshots(&self) -> Vec<BotSnapshot> {
        self.list_workers().iter().map(Bot::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.bots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.lock().is_empty()
    }

    pub fn idle_count(&self) -> usize {
        self.list_workers()
            .iter()
            .filter(|b| b.status() == BotStatus::Idle)
            .count()
    }

    /// Destroy every bot, newest first. Held orders go back to the recovery queue.
    pub fn shutdown(&self) {
        let _engine = self.registry.exclusive();
        let mut stopped = 0;
        while self.scale_down().is_some() {
            stopped += 1;
        }
        if stopped > 0 {
            info!(bots = stopped, "Bot pool shut down");
        }
    }

    pub fn registry(&self) -> &Arc<OrderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Wake every idle bot. Bots that find nothing left go back to idle.
fn wake_idle(bots: &Mutex<Vec<Bot>>) {
    let idle: Vec<Bot> = bots.lock().iter().filter(|b| b.is_idle()).cloned().collect();
    if idle.is_empty() {
        return;
    }
    debug!(count = idle.len(), "Waking idle bots");
    for bot in idle {
        bot.wake();
    }
}
