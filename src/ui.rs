/// file: src/ui.rs
/// description: Terminal presentation: renderer and notifier collaborators, plus the
///              controller printing connection lifecycle events
use crate::{
    client_state::ConnectionState,
    collaborators::{Notifier, NotifyLevel, Renderer},
    events::{EventReceiver, ManagerEvent},
    formatter::{Colors, DashboardFormatter, OutputFormat, PriceMove},
    manager::ConnectionManager,
    types::{
        BalanceUpdate, BotStatusUpdate, DashboardSnapshot, LogEntry, LogLevel, PriceUpdate,
        SessionId,
    },
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct UiOptions {
    pub format: OutputFormat,
    pub colored: bool,
    pub quiet: bool,
}

impl UiOptions {
    fn formatter(&self) -> DashboardFormatter {
        DashboardFormatter::new(self.format, self.colored)
    }
}

/// Prints dashboard updates to stdout.
pub struct TerminalRenderer {
    formatter: DashboardFormatter,
    quiet: bool,
    last_prices: Mutex<HashMap<String, f64>>,
}

impl TerminalRenderer {
    pub fn new(options: UiOptions) -> Self {
        Self {
            formatter: options.formatter(),
            quiet: options.quiet,
            last_prices: Mutex::new(HashMap::new()),
        }
    }

    /// Records `price` and reports how it moved since the last one for its symbol.
    fn track_price(&self, price: &PriceUpdate) -> PriceMove {
        let mut last = self
            .last_prices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = last.insert(price.symbol.clone(), price.price);
        PriceMove::between(previous, price.price)
    }
}

impl Renderer for TerminalRenderer {
    fn update_connectivity(&self, state: ConnectionState) {
        if self.quiet && state != ConnectionState::Error {
            return;
        }
        println!("{}", self.formatter.connectivity(state));
    }

    fn apply_balance(&self, balance: &BalanceUpdate) {
        println!("{}", self.formatter.balance(balance));
    }

    fn apply_bot_status(&self, status: &BotStatusUpdate) {
        println!("{}", self.formatter.bot_status(status));
    }

    fn apply_price(&self, price: &PriceUpdate) {
        let movement = self.track_price(price);
        if self.quiet {
            return;
        }
        println!("{}", self.formatter.price(price, movement));
    }

    fn append_log(&self, entry: &LogEntry) {
        if self.quiet && entry.level == LogLevel::Info {
            return;
        }
        println!("{}", self.formatter.log_entry(entry));
    }

    fn apply_snapshot(&self, snapshot: &DashboardSnapshot) {
        for line in self.formatter.snapshot(snapshot) {
            println!("{line}");
        }
    }
}

/// Prints notifications; warnings and errors go to stderr.
pub struct TerminalNotifier {
    formatter: DashboardFormatter,
    quiet: bool,
}

impl TerminalNotifier {
    pub fn new(options: UiOptions) -> Self {
        Self {
            formatter: options.formatter(),
            quiet: options.quiet,
        }
    }

    fn print(&self, message: &str, level: NotifyLevel, persistent: bool) {
        let line = self.formatter.notification(message, level, persistent);
        match level {
            NotifyLevel::Warning | NotifyLevel::Error => eprintln!("{line}"),
            NotifyLevel::Info | NotifyLevel::Success if !self.quiet => println!("{line}"),
            _ => {}
        }
    }
}

impl Notifier for TerminalNotifier {
    fn show(&self, message: &str, level: NotifyLevel) {
        self.print(message, level, false);
    }

    fn show_persistent(&self, message: &str, level: NotifyLevel) {
        self.print(message, level, true);
    }
}

/// Consumes manager lifecycle events. Joins the configured session every
/// time the channel connects, since any disconnect drops the binding.
pub struct UiController {
    event_receiver: EventReceiver,
    manager: Arc<ConnectionManager>,
    session: Option<SessionId>,
    options: UiOptions,
}

impl UiController {
    pub fn new(
        event_receiver: EventReceiver,
        manager: Arc<ConnectionManager>,
        session: Option<SessionId>,
        options: UiOptions,
    ) -> Self {
        Self {
            event_receiver,
            manager,
            session,
            options,
        }
    }

    pub async fn run(&mut self) {
        self.print_startup_banner();
        while let Some(event) = self.event_receiver.recv().await {
            self.handle_event(event).await;
        }
        debug!("Lifecycle event stream closed");
    }

    async fn handle_event(&self, event: ManagerEvent) {
        match event {
            ManagerEvent::Connecting { url } => {
                self.print_connection_status("CONNECTING", &url);
            }
            ManagerEvent::Connected { connection_id } => {
                self.print_connection_status("CONNECTED", &format!("ID: {connection_id}"));
                if let Some(session_id) = self.session
                    && !self.manager.join_session(session_id).await
                {
                    info!("Could not join session {} after connect", session_id);
                }
            }
            ManagerEvent::Disconnected { reason } => {
                self.print_connection_status("DISCONNECTED", &reason);
            }
            ManagerEvent::ConnectFailed { error } => {
                self.print_error("CONNECTION FAILED", &error);
            }
            ManagerEvent::ReconnectScheduled { attempt, delay } => {
                self.print_reconnect_info(attempt, delay.as_millis());
            }
            ManagerEvent::ReconnectExhausted { attempts } => {
                self.print_error("GAVE UP", &format!("after {attempts} reconnection attempts"));
            }
            ManagerEvent::SessionJoined { session_id } => {
                self.print_connection_status("SESSION", &format!("joined #{session_id}"));
            }
            ManagerEvent::SessionLeft { session_id } => {
                self.print_connection_status("SESSION", &format!("left #{session_id}"));
            }
            ManagerEvent::CommandSent { name } => {
                debug!("Command sent: {}", name);
            }
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.options.colored {
            format!("{}{}{}{}", Colors::BOLD, color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    fn print_startup_banner(&self) {
        if self.options.quiet || self.options.format == OutputFormat::Json {
            return;
        }

        println!();
        println!(
            "{}",
            self.paint(
                Colors::BRIGHT_CYAN,
                "╔══════════════════════════════════════════════════════════════╗"
            )
        );
        println!(
            "{}",
            self.paint(
                Colors::BRIGHT_CYAN,
                "║                     TRADING BOT DASHBOARD                    ║"
            )
        );
        println!(
            "{}",
            self.paint(
                Colors::BRIGHT_CYAN,
                "╚══════════════════════════════════════════════════════════════╝"
            )
        );
        println!(
            "  Version {}  {}",
            env!("CARGO_PKG_VERSION"),
            self.session
                .map(|id| format!("session #{id}"))
                .unwrap_or_else(|| "all sessions".to_string())
        );
        println!("  Type 'help' for commands; SIGHUP or 'reconnect' resets reconnection");
        println!();
    }

    fn print_connection_status(&self, status: &str, message: &str) {
        if self.options.quiet || self.options.format == OutputFormat::Json {
            return;
        }

        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "SESSION" => (Colors::BRIGHT_BLUE, "~"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            _ => (Colors::WHITE, "-"),
        };

        println!(
            "{} {} {}",
            self.paint(color, &format!("[{status}]")),
            symbol,
            message
        );
    }

    fn print_error(&self, error_type: &str, message: &str) {
        eprintln!(
            "{} ! {}",
            self.paint(Colors::BRIGHT_RED, &format!("[{error_type}]")),
            message
        );
    }

    fn print_reconnect_info(&self, attempt: u32, delay_ms: u128) {
        if self.options.quiet {
            return;
        }
        println!(
            "{} > Attempt {} in {} ms...",
            self.paint(Colors::BRIGHT_YELLOW, "[RECONNECTING]"),
            attempt,
            delay_ms
        );
    }
}
