//! Order data model and engine events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Globally unique, strictly increasing order identifier.
pub type OrderId = u64;

/// Priority class of an order. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    #[default]
    Normal,
    Vip,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Vip => write!(f, "vip"),
        }
    }
}

impl std::str::FromStr for OrderKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "vip" => Ok(Self::Vip),
            _ => Err(format!("Unknown order kind: {}", s)),
        }
    }
}

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Queued, or held by a bot that has not finished it yet.
    Pending,
    /// Finished. Terminal.
    Complete,
}

impl OrderStatus {
    /// `Pending -> Complete` is the only transition.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        matches!((self, target), (Self::Pending, Self::Complete))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// A unit of work.
///
/// Orders are moved, not shared: the registry owns every order that is not
/// currently held by a bot, and a bot owns the single order it is working
/// on. Clones only ever leave the engine as snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub kind: OrderKind,
    pub status: OrderStatus,
    /// Countdown owned by the bot holding the order. Reset on every pickup.
    pub remaining_ticks: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub(crate) fn new(id: OrderId, kind: OrderKind) -> Self {
        Self {
            id,
            kind,
            status: OrderStatus::Pending,
            remaining_ticks: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn mark_complete(&mut self) {
        debug_assert!(
            self.status.can_transition_to(OrderStatus::Complete),
            "order {} completed twice",
            self.id
        );
        self.status = OrderStatus::Complete;
        self.remaining_ticks = 0;
        self.completed_at = Some(Utc::now());
    }
}

/// Change notification published by the registry.
///
/// Carries only a type tag; observers re-read state via
/// `OrderRegistry::snapshot_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    /// A new pending order was created.
    ItemAdded,
    /// An order changed queue membership or state (dequeue, completion, recovery).
    ItemUpdated,
    /// A bot's countdown changed.
    Progress,
}

impl std::fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ItemAdded => "ITEM_ADDED",
            Self::ItemUpdated => "ITEM_UPDATED",
            Self::Progress => "PROGRESS",
        };
        write!(f, "{s}")
    }
}

/// Per-collection counts, for status lines and health output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub recovery: usize,
    pub vip: usize,
    pub normal: usize,
    pub in_flight: usize,
    pub completed: usize,
}

impl OrderStats {
    pub fn pending(&self) -> usize {
        self.recovery + self.vip + self.normal + self.in_flight
    }

    pub fn total(&self) -> usize {
        self.pending() + self.completed
    }
}
