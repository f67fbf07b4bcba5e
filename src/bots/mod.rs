//! Bots: processing units and the pool that manages them.
//!
//! - `model`: `BotKind`, `BotStatus`, `BotSnapshot`
//! - `bot`: `Bot`: pickup, per-tick countdown, completion, destroy/recover
//! - `pool`: `BotPool`: scale up/down (newest first) and wake-on-add

pub mod bot;
pub mod model;
pub mod pool;

pub use bot::Bot;
pub use model::{BotId, BotKind, BotSnapshot, BotStatus};
pub use pool::BotPool;
