//! Order Bots: a pool of bots working through prioritized order queues.
//!
//! Recovered orders go first, then VIP, then normal. Bots count each order
//! down on the tokio clock and wake up when new orders arrive.

pub mod bots;
pub mod cli;
pub mod config;
pub mod error;
pub mod orders;
pub mod server;
