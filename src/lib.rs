//! Realtime client for the trading-bot dashboard: a Socket.IO channel with
//! bounded linear reconnection, session binding and snapshot refresh.

/// Dashboard login and the shared cookie session.
pub mod auth;
/// Realtime channel trait and its WebSocket implementation.
pub mod channel;
/// Command-line argument definitions.
pub mod cli;
/// Connection state and the reconnection policy.
pub mod client_state;
/// Socket.IO / Engine.IO text packet codec.
pub mod codec;
/// Renderer, notifier and fetcher interfaces.
pub mod collaborators;
/// Runtime configuration model.
pub mod config;
/// Interactive stdin commands.
pub mod console;
/// Server event routing.
pub mod dispatch;
/// Error types used across the crate.
pub mod error;
/// Lifecycle event bus between manager and UI.
pub mod events;
/// Dashboard snapshot pull and auto-refresh.
pub mod fetcher;
/// Terminal output formatters.
pub mod formatter;
/// Connection manager.
pub mod manager;
/// Metrics and health status.
pub mod monitoring;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Dashboard wire data models.
pub mod types;
/// Terminal collaborators and the lifecycle controller.
pub mod ui;

/// Primary crate error type.
pub use error::DashboardError;
pub use manager::ConnectionManager;
