//! Orders: the work items, their priority queues and the change events.
//!
//! - `model`: `Order`, `OrderKind`, `OrderStatus`, `OrderEvent`
//! - `registry`: `OrderRegistry`: recovery > VIP > normal dequeue, completion,
//!   recovery, synchronous handlers and a broadcast feed

pub mod model;
pub mod registry;

pub use model::{Order, OrderEvent, OrderId, OrderKind, OrderStats, OrderStatus};
pub use registry::{OrderHandler, OrderRegistry};
