use crate::{
    client_state::ConnectionState,
    collaborators::NotifyLevel,
    types::{BalanceUpdate, BotStatusUpdate, DashboardSnapshot, LogEntry, LogLevel, PriceUpdate},
};
use chrono::Local;

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Minimal,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "minimal" => OutputFormat::Minimal,
            _ => OutputFormat::Table,
        }
    }
}

/// Price movement relative to the last value seen for the same symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMove {
    Up,
    Down,
    Flat,
}

impl PriceMove {
    pub fn between(previous: Option<f64>, current: f64) -> Self {
        match previous {
            Some(prev) if current > prev => PriceMove::Up,
            Some(prev) if current < prev => PriceMove::Down,
            _ => PriceMove::Flat,
        }
    }
}

pub fn format_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{:02}", cents % 100)
}

pub fn format_percent(value: f64) -> String {
    format!("{value:+.2}%")
}

/// Turns renderer inputs into printable lines.
pub struct DashboardFormatter {
    format: OutputFormat,
    colored: bool,
}

impl DashboardFormatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.colored {
            format!("{}{}{}", color, text, Colors::RESET)
        } else {
            text.to_string()
        }
    }

    fn pnl_color(value: f64) -> &'static str {
        if value >= 0.0 {
            Colors::BRIGHT_GREEN
        } else {
            Colors::BRIGHT_RED
        }
    }

    pub fn connectivity(&self, state: ConnectionState) -> String {
        if self.format == OutputFormat::Json {
            return serde_json::json!({ "type": "connectivity", "state": state }).to_string();
        }

        let (color, symbol) = match state {
            ConnectionState::Connecting => (Colors::BRIGHT_YELLOW, "*"),
            ConnectionState::Connected => (Colors::BRIGHT_GREEN, "+"),
            ConnectionState::Disconnected => (Colors::BRIGHT_RED, "X"),
            ConnectionState::Error => (Colors::BRIGHT_RED, "!"),
        };
        format!("{} {}", self.paint(color, &format!("[{state}]")), symbol)
    }

    pub fn balance(&self, balance: &BalanceUpdate) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::json!({ "type": "balance", "balance": balance.balance }).to_string()
            }
            OutputFormat::Minimal => format_currency(balance.balance),
            OutputFormat::Table => format!(
                "{} {}",
                self.paint(Colors::BRIGHT_CYAN, "[BALANCE]"),
                format_currency(balance.balance)
            ),
        }
    }

    pub fn bot_status(&self, status: &BotStatusUpdate) -> String {
        match self.format {
            OutputFormat::Json => serde_json::json!({
                "type": "bot_status",
                "status": status.status,
                "trading_mode": status.trading_mode,
                "message": status.message,
            })
            .to_string(),
            OutputFormat::Minimal => status.status.clone(),
            OutputFormat::Table => {
                let mode = status
                    .trading_mode
                    .as_deref()
                    .map(|m| format!(" ({m})"))
                    .unwrap_or_default();
                let detail = if status.message.is_empty() {
                    String::new()
                } else {
                    format!(" - {}", status.message)
                };
                format!(
                    "{} {}{}{}",
                    self.paint(Colors::BRIGHT_MAGENTA, "[BOT]"),
                    status.status.to_uppercase(),
                    mode,
                    detail
                )
            }
        }
    }

    pub fn price(&self, price: &PriceUpdate, movement: PriceMove) -> String {
        let local_time = price.timestamp.with_timezone(&Local);
        match self.format {
            OutputFormat::Json => serde_json::json!({
                "type": "price",
                "symbol": price.symbol,
                "price": price.price,
                "timestamp": price.timestamp,
            })
            .to_string(),
            OutputFormat::Minimal => {
                let arrow = match movement {
                    PriceMove::Up => "↗",
                    PriceMove::Down => "↘",
                    PriceMove::Flat => "→",
                };
                format!("{} {} {:.2}", price.symbol, arrow, price.price)
            }
            OutputFormat::Table => {
                let color = match movement {
                    PriceMove::Up => Colors::BRIGHT_GREEN,
                    PriceMove::Down => Colors::BRIGHT_RED,
                    PriceMove::Flat => Colors::WHITE,
                };
                format!(
                    "{} {:<10} {} {}",
                    self.paint(Colors::BRIGHT_BLUE, "[PRICE]"),
                    price.symbol,
                    self.paint(color, &format!("{:.2}", price.price)),
                    self.paint(Colors::GRAY, &local_time.format("%H:%M:%S").to_string())
                )
            }
        }
    }

    pub fn log_entry(&self, entry: &LogEntry) -> String {
        let (label, color) = match entry.level {
            LogLevel::Info => ("INFO", Colors::WHITE),
            LogLevel::Warning => ("WARN", Colors::BRIGHT_YELLOW),
            LogLevel::Error => ("ERROR", Colors::BRIGHT_RED),
        };

        match self.format {
            OutputFormat::Json => serde_json::json!({
                "type": "log",
                "source": entry.source,
                "level": entry.level,
                "message": entry.message,
            })
            .to_string(),
            OutputFormat::Minimal => format!("{label} {}", entry.message),
            OutputFormat::Table => format!(
                "{} {} {}",
                self.paint(color, &format!("[{label}]")),
                self.paint(Colors::DIM, &entry.source),
                entry.message
            ),
        }
    }

    pub fn notification(&self, message: &str, level: NotifyLevel, persistent: bool) -> String {
        let (label, color) = match level {
            NotifyLevel::Info => ("INFO", Colors::BRIGHT_BLUE),
            NotifyLevel::Success => ("OK", Colors::BRIGHT_GREEN),
            NotifyLevel::Warning => ("WARNING", Colors::BRIGHT_YELLOW),
            NotifyLevel::Error => ("ERROR", Colors::BRIGHT_RED),
        };

        if self.format == OutputFormat::Json {
            return serde_json::json!({
                "type": "notification",
                "level": label,
                "persistent": persistent,
                "message": message,
            })
            .to_string();
        }

        if persistent {
            format!(
                "{} {}",
                self.paint(&format!("{}{}", Colors::BOLD, color), &format!("[{label}!]")),
                self.paint(Colors::RED, message)
            )
        } else {
            format!("{} {}", self.paint(color, &format!("[{label}]")), message)
        }
    }

    pub fn snapshot(&self, snapshot: &DashboardSnapshot) -> Vec<String> {
        let balance = &snapshot.balance;
        let trading = &snapshot.trading;
        let pnl_percent = balance.total_pnl_percent.unwrap_or(0.0);

        if self.format == OutputFormat::Json {
            return vec![
                serde_json::json!({
                    "type": "snapshot",
                    "current_balance": balance.current_balance,
                    "initial_balance": balance.initial_balance(),
                    "total_pnl": balance.total_pnl,
                    "total_pnl_percent": pnl_percent,
                    "daily_pnl": balance.daily_pnl,
                    "trades": trading.total_trades,
                    "win_rate": trading.win_rate,
                    "active_positions": snapshot.positions.active_positions,
                    "timestamp": snapshot.timestamp,
                })
                .to_string(),
            ];
        }

        let updated = snapshot
            .timestamp_utc()
            .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        if self.format == OutputFormat::Minimal {
            return vec![format!(
                "{} pnl {} trades {} positions {}",
                format_currency(balance.current_balance),
                format_currency(balance.total_pnl),
                trading.total_trades,
                snapshot.positions.active_positions
            )];
        }

        vec![
            self.paint(
                &format!("{}{}", Colors::BOLD, Colors::BRIGHT_CYAN),
                &format!("── Dashboard snapshot ({updated}) ──"),
            ),
            format!(
                "  Balance   {}  (initial {})",
                format_currency(balance.current_balance),
                format_currency(balance.initial_balance())
            ),
            format!(
                "  P&L       {}  {}  today {}",
                self.paint(Self::pnl_color(balance.total_pnl), &format_currency(balance.total_pnl)),
                self.paint(Self::pnl_color(balance.total_pnl), &format_percent(pnl_percent)),
                self.paint(Self::pnl_color(balance.daily_pnl), &format_currency(balance.daily_pnl))
            ),
            format!(
                "  Trading   {}R/{}S  {} trades total  win rate {}%  ({}W / {}L)",
                trading.real_trades,
                trading.simulated_trades,
                trading.total_trades,
                trading.win_rate,
                trading.winning_trades,
                trading.losing_trades
            ),
            format!(
                "  Positions {} active  recent trades {}",
                snapshot.positions.active_positions,
                trading.recent_trades.len()
            ),
        ]
    }
}
