//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Engine configuration: clock rate, processing durations and event fan-out.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Length of one simulated tick.
    pub tick: Duration,
    /// Ticks a normal bot needs to finish one order.
    pub normal_bot_ticks: u32,
    /// Ticks a VIP bot needs to finish one order.
    pub vip_bot_ticks: u32,
    /// Capacity of the broadcast channel behind `OrderRegistry::watch`.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            normal_bot_ticks: 10,
            vip_bot_ticks: 5,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `ORDER_BOTS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (env, test map, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tick_ms = parse_positive(
            &lookup,
            "ORDER_BOTS_TICK_MS",
            defaults.tick.as_millis() as u64,
        )?;
        let normal_bot_ticks =
            parse_positive(&lookup, "ORDER_BOTS_NORMAL_TICKS", defaults.normal_bot_ticks)?;
        let vip_bot_ticks = parse_positive(&lookup, "ORDER_BOTS_VIP_TICKS", defaults.vip_bot_ticks)?;
        let event_capacity =
            parse_positive(&lookup, "ORDER_BOTS_EVENT_CAPACITY", defaults.event_capacity)?;

        Ok(Self {
            tick: Duration::from_millis(tick_ms),
            normal_bot_ticks,
            vip_bot_ticks,
            event_capacity,
        })
    }
}

/// HTTP / WebSocket observer configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Whether to serve the HTTP / WS observer at all.
    pub enabled: bool,
    /// Listen port (binds 0.0.0.0).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let enabled = match lookup("ORDER_BOTS_HTTP").as_deref().map(str::trim) {
            None => defaults.enabled,
            Some("1" | "true" | "on" | "yes") => true,
            Some("0" | "false" | "off" | "no") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "ORDER_BOTS_HTTP".to_string(),
                    message: format!("expected a boolean, got {other:?}"),
                });
            }
        };
        let port = parse_value(&lookup, "ORDER_BOTS_PORT", defaults.port)?;

        Ok(Self { enabled, port })
    }
}

fn parse_value<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

fn parse_positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value = parse_value(lookup, key, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
