/// file: src/collaborators.rs
/// description: Interfaces the manager drives: rendering, user notifications and snapshot refresh
use crate::{
    client_state::ConnectionState,
    types::{BalanceUpdate, BotStatusUpdate, DashboardSnapshot, LogEntry, PriceUpdate},
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Presentation sink for dashboard state. Implementations must not block.
pub trait Renderer: Send + Sync {
    fn update_connectivity(&self, state: ConnectionState);
    fn apply_balance(&self, balance: &BalanceUpdate);
    fn apply_bot_status(&self, status: &BotStatusUpdate);
    fn apply_price(&self, _price: &PriceUpdate) {}
    fn append_log(&self, _entry: &LogEntry) {}
    fn apply_snapshot(&self, _snapshot: &DashboardSnapshot) {}
}

/// Transient user-facing messages.
pub trait Notifier: Send + Sync {
    fn show(&self, message: &str, level: NotifyLevel);

    /// A message that stays until the user acts on it.
    fn show_persistent(&self, message: &str, level: NotifyLevel) {
        self.show(message, level);
    }
}

/// Pull-based refresh of the full dashboard snapshot. `refresh` returns
/// immediately; the fetch completes in the background.
pub trait DataFetcher: Send + Sync {
    fn refresh(&self);
}

/// Optional collaborator capabilities, fixed when the manager is built.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub renderer: Option<Arc<dyn Renderer>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub fetcher: Option<Arc<dyn DataFetcher>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn DataFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub(crate) fn render(&self, f: impl FnOnce(&dyn Renderer)) {
        if let Some(renderer) = &self.renderer {
            f(renderer.as_ref());
        }
    }

    pub(crate) fn notify(&self, message: &str, level: NotifyLevel) {
        if let Some(notifier) = &self.notifier {
            notifier.show(message, level);
        }
    }

    pub(crate) fn notify_persistent(&self, message: &str, level: NotifyLevel) {
        if let Some(notifier) = &self.notifier {
            notifier.show_persistent(message, level);
        }
    }
}
