/// file: src/types.rs
/// description: server push payloads, outbound commands and the dashboard snapshot model
use crate::error::DashboardError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

pub type SessionId = u64;

// The server sends numbers either as JSON numbers or as decimal strings.
mod number_or_string {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
        }
    }
}

// Millisecond epoch numbers, RFC 3339 strings, or naive ISO strings (UTC).
mod flexible_timestamp {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
            Raw::Text(s) => parse(&s).map_err(serde::de::Error::custom),
        }
    }

    pub fn parse(s: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{s}': {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "INFO", alias = "debug", alias = "DEBUG")]
    Info,
    #[serde(alias = "WARNING", alias = "warn", alias = "WARN")]
    Warning,
    #[serde(alias = "ERROR", alias = "critical", alias = "CRITICAL")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub source: String,
    pub message: String,
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub symbol: String,
    pub side: String,
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub quantity: f64,
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub status: String,
    #[serde(default)]
    pub trading_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatusUpdate {
    pub status: String,
    #[serde(default)]
    pub trading_mode: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: String,
    #[serde(deserialize_with = "number_or_string::deserialize")]
    pub price: f64,
    #[serde(deserialize_with = "flexible_timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
}

impl TradeUpdate {
    /// Notional value of the fill (price * quantity)
    pub fn value(&self) -> f64 {
        self.price * self.quantity
    }

    pub fn is_buy(&self) -> bool {
        self.side.eq_ignore_ascii_case("buy") || self.side.eq_ignore_ascii_case("b")
    }

    pub fn side_formatted(&self) -> &'static str {
        if self.is_buy() { "BUY" } else { "SELL" }
    }
}

/// Names of the events the server pushes over the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LogEntry,
    TradeUpdate,
    BalanceUpdate,
    SessionUpdate,
    BotStatus,
    PriceUpdate,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::LogEntry,
        EventKind::TradeUpdate,
        EventKind::BalanceUpdate,
        EventKind::SessionUpdate,
        EventKind::BotStatus,
        EventKind::PriceUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LogEntry => "log_entry",
            EventKind::TradeUpdate => "trade_update",
            EventKind::BalanceUpdate => "balance_update",
            EventKind::SessionUpdate => "session_update",
            EventKind::BotStatus => "bot_status",
            EventKind::PriceUpdate => "price_update",
        }
    }

    /// Whether the event changes server state enough to warrant a snapshot pull.
    pub fn changes_state(&self) -> bool {
        matches!(
            self,
            EventKind::TradeUpdate | EventKind::SessionUpdate | EventKind::BotStatus
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DashboardError::InvalidPacket(format!("unknown event kind '{s}'")))
    }
}

/// A decoded server push. Consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    LogEntry(LogEntry),
    TradeUpdate(TradeUpdate),
    BalanceUpdate(BalanceUpdate),
    SessionUpdate(SessionUpdate),
    BotStatus(BotStatusUpdate),
    PriceUpdate(PriceUpdate),
}

impl ServerEvent {
    pub fn decode(kind: EventKind, payload: Value) -> Result<Self, DashboardError> {
        Ok(match kind {
            EventKind::LogEntry => ServerEvent::LogEntry(serde_json::from_value(payload)?),
            EventKind::TradeUpdate => ServerEvent::TradeUpdate(serde_json::from_value(payload)?),
            EventKind::BalanceUpdate => {
                ServerEvent::BalanceUpdate(serde_json::from_value(payload)?)
            }
            EventKind::SessionUpdate => {
                ServerEvent::SessionUpdate(serde_json::from_value(payload)?)
            }
            EventKind::BotStatus => ServerEvent::BotStatus(serde_json::from_value(payload)?),
            EventKind::PriceUpdate => ServerEvent::PriceUpdate(serde_json::from_value(payload)?),
        })
    }
}

/// Commands the client emits on the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    JoinSession { session_id: SessionId },
    LeaveSession { session_id: SessionId },
    BotCommand { payload: Map<String, Value> },
    StatusRequest,
}

impl ClientCommand {
    /// Builds a `bot_command` whose payload is `data` with `command` set to `name`.
    /// The `command` key wins over any value already present in `data`.
    pub fn bot_command(name: &str, data: Map<String, Value>) -> Self {
        let mut payload = data;
        payload.insert("command".to_string(), Value::String(name.to_string()));
        ClientCommand::BotCommand { payload }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::JoinSession { .. } => "join_session",
            ClientCommand::LeaveSession { .. } => "leave_session",
            ClientCommand::BotCommand { .. } => "bot_command",
            ClientCommand::StatusRequest => "status_request",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientCommand::JoinSession { session_id } | ClientCommand::LeaveSession { session_id } => {
                serde_json::json!({ "session_id": session_id })
            }
            ClientCommand::BotCommand { payload } => Value::Object(payload.clone()),
            ClientCommand::StatusRequest => Value::Object(Map::new()),
        }
    }
}

// Snapshot pulled from the dashboard data endpoint

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSnapshot {
    pub success: bool,
    pub message: Option<String>,
    pub session: Option<Value>,
    pub balance: BalanceSummary,
    pub trading: TradingSummary,
    pub positions: PositionsSummary,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceSummary {
    pub current_balance: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub total_pnl_percent: Option<f64>,
    pub history: Vec<BalancePoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancePoint {
    pub time: String,
    pub balance: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSummary {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub real_trades: u64,
    pub simulated_trades: u64,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub recent_trades: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionsSummary {
    pub active_positions: u64,
    pub positions: Vec<Value>,
}

impl DashboardSnapshot {
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|s| flexible_timestamp::parse(s).ok())
    }
}

impl BalanceSummary {
    /// Balance before realised P&L, as shown next to the current figure.
    pub fn initial_balance(&self) -> f64 {
        self.current_balance - self.total_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("market_data".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_state_changing_kinds() {
        let changing: Vec<_> = EventKind::ALL
            .into_iter()
            .filter(|k| k.changes_state())
            .collect();
        assert_eq!(
            changing,
            vec![
                EventKind::TradeUpdate,
                EventKind::SessionUpdate,
                EventKind::BotStatus
            ]
        );
    }

    #[test]
    fn test_decode_trade_with_string_numbers() {
        let event = ServerEvent::decode(
            EventKind::TradeUpdate,
            json!({"symbol": "BTCUSDT", "side": "buy", "quantity": "0.015", "price": 64250.5}),
        )
        .unwrap();

        let ServerEvent::TradeUpdate(trade) = event else {
            panic!("expected trade update");
        };
        assert_eq!(trade.quantity, 0.015);
        assert_eq!(trade.price, 64250.5);
        assert!(trade.is_buy());
        assert_eq!(trade.side_formatted(), "BUY");
    }

    #[test]
    fn test_decode_log_entry_levels() {
        let event = ServerEvent::decode(
            EventKind::LogEntry,
            json!({"source": "bot_service", "message": "stop loss hit", "level": "WARNING"}),
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::LogEntry(LogEntry {
                source: "bot_service".to_string(),
                message: "stop loss hit".to_string(),
                level: LogLevel::Warning,
            })
        );
    }

    #[test]
    fn test_decode_price_timestamps() {
        let millis = ServerEvent::decode(
            EventKind::PriceUpdate,
            json!({"symbol": "ETHUSDT", "price": 3100.0, "timestamp": 1_700_000_000_000i64}),
        )
        .unwrap();
        let naive = ServerEvent::decode(
            EventKind::PriceUpdate,
            json!({"symbol": "ETHUSDT", "price": "3100", "timestamp": "2023-11-14T22:13:20.000000"}),
        )
        .unwrap();

        let (ServerEvent::PriceUpdate(a), ServerEvent::PriceUpdate(b)) = (millis, naive) else {
            panic!("expected price updates");
        };
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.price, b.price);
    }

    #[test]
    fn test_decode_bot_status_optional_fields() {
        let event =
            ServerEvent::decode(EventKind::BotStatus, json!({"status": "running"})).unwrap();
        let ServerEvent::BotStatus(status) = event else {
            panic!("expected bot status");
        };
        assert!(status.trading_mode.is_none());
        assert!(status.message.is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        assert!(ServerEvent::decode(EventKind::BalanceUpdate, json!({"balance": "n/a"})).is_err());
        assert!(ServerEvent::decode(EventKind::TradeUpdate, json!({"symbol": "BTC"})).is_err());
    }

    #[test]
    fn test_bot_command_merge_command_wins() {
        let mut data = Map::new();
        data.insert("command".to_string(), json!("ignored"));
        data.insert("symbol".to_string(), json!("BTCUSDT"));

        let command = ClientCommand::bot_command("pause", data);
        assert_eq!(command.name(), "bot_command");
        assert_eq!(
            command.payload(),
            json!({"command": "pause", "symbol": "BTCUSDT"})
        );
    }

    #[test]
    fn test_command_payloads() {
        assert_eq!(
            ClientCommand::JoinSession { session_id: 7 }.payload(),
            json!({"session_id": 7})
        );
        assert_eq!(ClientCommand::StatusRequest.payload(), json!({}));
        assert_eq!(ClientCommand::StatusRequest.name(), "status_request");
    }

    #[test]
    fn test_snapshot_tolerates_missing_sections() {
        let snapshot: DashboardSnapshot = serde_json::from_value(json!({
            "success": true,
            "balance": {"current_balance": 1050.0, "total_pnl": 50.0},
            "timestamp": "2024-03-01T12:00:00.123456"
        }))
        .unwrap();

        assert!(snapshot.success);
        assert_eq!(snapshot.balance.initial_balance(), 1000.0);
        assert_eq!(snapshot.trading.total_trades, 0);
        assert!(snapshot.positions.positions.is_empty());
        assert!(snapshot.timestamp_utc().is_some());
    }
}
