/// file: src/config.rs
/// description: Configuration management and CLI argument conversion for the dashboard client
use crate::{auth::Credentials, cli::Args, error::DashboardError, formatter::OutputFormat};
use anyhow::Result;
use std::time::Duration;
use url::Url;

/// Engine.IO handshake path and query used by the dashboard server.
pub const SOCKET_IO_PATH: &str = "/socket.io/";
pub const SOCKET_IO_QUERY: &str = "EIO=4&transport=websocket";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: Url,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
    pub refresh: RefreshConfig,
    pub metrics: MetricsConfig,
    pub display: DisplayConfig,
    pub session: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub enabled: bool,
    pub url: Url,
    pub connect_timeout: Duration,
    pub base_delay: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub login_url: Url,
    /// `None` talks to the server anonymously.
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub snapshot_url: Url,
    /// Wait between a state-changing push and the snapshot pull it triggers.
    pub settle_delay: Duration,
    /// `None` disables periodic polling.
    pub interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub format: OutputFormat,
    pub colored: bool,
    pub quiet: bool,
}

impl RealtimeConfig {
    /// Realtime settings for `url` with the stock reconnection policy
    /// (five attempts, one second base delay).
    pub fn new(url: Url) -> Self {
        Self {
            enabled: true,
            url,
            connect_timeout: Duration::from_secs(20),
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let server = Url::parse(&args.server)?;

        if args.max_attempts == 0 {
            return Err(DashboardError::InvalidConfig(
                "max-attempts must be at least 1".to_string(),
            )
            .into());
        }

        let credentials = match (&args.username, &args.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(DashboardError::InvalidConfig(
                    "username and password must be given together".to_string(),
                )
                .into());
            }
        };

        Ok(Config {
            auth: AuthConfig {
                login_url: server.join(&args.login_path)?,
                credentials,
            },
            realtime: RealtimeConfig {
                enabled: !args.no_realtime,
                url: socket_url(&server)?,
                connect_timeout: Duration::from_secs(args.timeout),
                base_delay: Duration::from_millis(args.reconnect_delay_ms),
                max_attempts: args.max_attempts,
            },
            refresh: RefreshConfig {
                snapshot_url: server.join(&args.snapshot_path)?,
                settle_delay: Duration::from_millis(args.settle_delay_ms),
                interval: (args.refresh_interval > 0)
                    .then(|| Duration::from_secs(args.refresh_interval)),
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
            display: DisplayConfig {
                format: OutputFormat::from(args.format.as_str()),
                colored: !args.no_color,
                quiet: args.quiet,
            },
            session: args.session,
            server,
        })
    }
}

/// Derives the realtime endpoint from the dashboard's HTTP base URL.
pub fn socket_url(server: &Url) -> Result<Url, DashboardError> {
    let scheme = match server.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(DashboardError::InvalidConfig(format!(
                "unsupported server scheme '{other}'"
            )));
        }
    };

    let mut url = server.join(SOCKET_IO_PATH)?;
    url.set_query(Some(SOCKET_IO_QUERY));
    url.set_scheme(scheme).map_err(|_| {
        DashboardError::InvalidConfig(format!("cannot use scheme '{scheme}' for {server}"))
    })?;
    Ok(url)
}
