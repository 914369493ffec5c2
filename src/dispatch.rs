/// file: src/dispatch.rs
/// description: Routes named server pushes to their typed handlers
use crate::{
    collaborators::{Collaborators, NotifyLevel},
    monitoring,
    types::{
        BalanceUpdate, BotStatusUpdate, EventKind, LogEntry, LogLevel, PriceUpdate, ServerEvent,
        SessionUpdate, TradeUpdate,
    },
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sends each server event kind to exactly one handler, which receives the
/// payload already decoded into its own type.
pub struct Dispatcher {
    collaborators: Collaborators,
    settle_delay: Duration,
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators, settle_delay: Duration) -> Self {
        Self {
            collaborators,
            settle_delay,
        }
    }

    /// Returns `true` if the event was handled. Unknown kinds and payloads
    /// that fail to decode are logged and dropped.
    pub fn dispatch(&self, name: &str, payload: Value) -> bool {
        let Ok(kind) = name.parse::<EventKind>() else {
            debug!("Ignoring unknown event '{}'", name);
            return false;
        };

        let event = match ServerEvent::decode(kind, payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = %kind, error = %e, "Dropping malformed event payload");
                return false;
            }
        };

        monitoring::EVENTS_RECEIVED_COUNTER.increment(1);
        match event {
            ServerEvent::LogEntry(entry) => self.on_log_entry(entry),
            ServerEvent::TradeUpdate(trade) => self.on_trade_update(trade),
            ServerEvent::BalanceUpdate(balance) => self.on_balance_update(balance),
            ServerEvent::SessionUpdate(session) => self.on_session_update(session),
            ServerEvent::BotStatus(status) => self.on_bot_status(status),
            ServerEvent::PriceUpdate(price) => self.on_price_update(price),
        }

        if kind.changes_state() {
            self.schedule_refresh();
        }
        true
    }

    fn on_log_entry(&self, entry: LogEntry) {
        debug!(source = %entry.source, level = ?entry.level, "{}", entry.message);
        self.collaborators.render(|r| r.append_log(&entry));
        if entry.level == LogLevel::Error {
            self.collaborators
                .notify(&format!("{}: {}", entry.source, entry.message), NotifyLevel::Error);
        }
    }

    fn on_trade_update(&self, trade: TradeUpdate) {
        info!(
            symbol = %trade.symbol,
            side = %trade.side,
            quantity = trade.quantity,
            price = trade.price,
            value = trade.value(),
            "Trade update"
        );
        self.collaborators.notify(
            &format!(
                "Trade executed: {} {} {} @ {:.2}",
                trade.side_formatted(),
                trade.quantity,
                trade.symbol,
                trade.price
            ),
            NotifyLevel::Success,
        );
    }

    fn on_balance_update(&self, balance: BalanceUpdate) {
        debug!(balance = balance.balance, "Balance update");
        self.collaborators.render(|r| r.apply_balance(&balance));
    }

    fn on_session_update(&self, session: SessionUpdate) {
        info!(status = %session.status, mode = ?session.trading_mode, "Session update");
        let message = match &session.trading_mode {
            Some(mode) => format!("Session {} ({})", session.status, mode),
            None => format!("Session {}", session.status),
        };
        self.collaborators.notify(&message, NotifyLevel::Info);
    }

    fn on_bot_status(&self, status: BotStatusUpdate) {
        info!(status = %status.status, mode = ?status.trading_mode, "Bot status");
        self.collaborators.render(|r| r.apply_bot_status(&status));
        if !status.message.is_empty() {
            self.collaborators.notify(&status.message, NotifyLevel::Info);
        }
    }

    fn on_price_update(&self, price: PriceUpdate) {
        self.collaborators.render(|r| r.apply_price(&price));
    }

    /// Pull the full snapshot once server-side state has had time to settle.
    fn schedule_refresh(&self) {
        let Some(fetcher) = self.collaborators.fetcher.clone() else {
            return;
        };

        let delay = self.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fetcher.refresh();
        });
    }
}
