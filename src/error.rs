use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Channel open failed: {0}")]
    ChannelOpenFailure(String),

    #[error("Channel runtime error: {0}")]
    ChannelRuntimeError(String),

    #[error("Maximum reconnection attempts ({attempts}) exceeded")]
    ReconnectExhausted { attempts: u32 },

    #[error("Channel is not open")]
    ChannelClosed,

    #[error("Login failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not authorized; login required")]
    Unauthorized,

    #[error("WebSocket transport error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}

