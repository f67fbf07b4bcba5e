//! Bot data model.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::orders::OrderId;

/// Unique, increasing bot identifier.
pub type BotId = u64;

/// Speed class of a bot. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotKind {
    #[default]
    Normal,
    /// Finishes an order in fewer ticks.
    Vip,
}

impl BotKind {
    /// Ticks this class of bot spends on one order.
    pub fn ticks(&self, config: &EngineConfig) -> u32 {
        match self {
            Self::Normal => config.normal_bot_ticks,
            Self::Vip => config.vip_bot_ticks,
        }
    }
}

impl std::fmt::Display for BotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Vip => write!(f, "vip"),
        }
    }
}

impl std::str::FromStr for BotKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "vip" => Ok(Self::Vip),
            _ => Err(format!("Unknown bot kind: {}", s)),
        }
    }
}

/// Run state of a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    /// Holding nothing; dormant until woken.
    Idle,
    /// Picking up or working on an order.
    Running,
}

impl BotStatus {
    pub fn can_transition_to(&self, target: BotStatus) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::Running) | (Self::Running, Self::Idle)
        )
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of a bot for observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSnapshot {
    pub id: BotId,
    pub kind: BotKind,
    pub status: BotStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ticks: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_follow_config() {
        let config = EngineConfig::default();
        assert_eq!(BotKind::Normal.ticks(&config), 10);
        assert_eq!(BotKind::Vip.ticks(&config), 5);

        let config = EngineConfig {
            normal_bot_ticks: 3,
            vip_bot_ticks: 1,
            ..EngineConfig::default()
        };
        assert_eq!(BotKind::Normal.ticks(&config), 3);
        assert_eq!(BotKind::Vip.ticks(&config), 1);
    }

    #[test]
    fn status_transitions() {
        assert!(BotStatus::Idle.can_transition_to(BotStatus::Running));
        assert!(BotStatus::Running.can_transition_to(BotStatus::Idle));
        assert!(!BotStatus::Idle.can_transition_to(BotStatus::Idle));
    }

    #[test]
    fn snapshot_omits_empty_order() {
        let snapshot = BotSnapshot {
            id: 4,
            kind: BotKind::Vip,
            status: BotStatus::Idle,
            order_id: None,
            remaining_ticks: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, serde_json::json!({"id": 4, "kind": "vip", "status": "idle"}));
    }
}
