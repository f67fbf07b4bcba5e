//! HTTP + WebSocket observer for the engine.

pub mod ws;

pub use ws::{AppState, ClientAction, WsMessage, routes, serve};
