use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "botdash",
    about = "realtime client for the trading-bot dashboard with bounded reconnection",
    version
)]
pub struct Args {
    /// Dashboard server base URL
    #[arg(short, long, default_value = "http://127.0.0.1:5000")]
    pub server: String,

    /// Path of the snapshot endpoint, relative to the server URL
    #[arg(long, default_value = "/api/v1/dashboard/data")]
    pub snapshot_path: String,

    /// Dashboard login user; enables login before snapshot pulls and the realtime connect
    #[arg(short, long, env = "BOTDASH_USERNAME")]
    pub username: Option<String>,

    /// Dashboard login password
    #[arg(short, long, env = "BOTDASH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path of the login endpoint, relative to the server URL
    #[arg(long, default_value = "/api/auth/login")]
    pub login_path: String,

    /// Disable the realtime channel (snapshot polling only)
    #[arg(long)]
    pub no_realtime: bool,

    /// Session to join once the realtime channel is connected
    #[arg(long)]
    pub session: Option<u64>,

    /// Maximum number of automatic reconnection attempts
    #[arg(long, default_value = "5")]
    pub max_attempts: u32,

    /// Base reconnection delay in milliseconds (multiplied by the attempt number)
    #[arg(long, default_value = "1000")]
    pub reconnect_delay_ms: u64,

    /// Connection timeout in seconds
    #[arg(long, default_value = "20")]
    pub timeout: u64,

    /// Delay before refreshing the snapshot after a state-changing push, in milliseconds
    #[arg(long, default_value = "1000")]
    pub settle_delay_ms: u64,

    /// Snapshot auto-refresh interval in seconds (0 disables polling)
    #[arg(long, default_value = "10")]
    pub refresh_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// Output format: table, json, minimal
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - only errors and terminal failures are printed
    #[arg(long)]
    pub quiet: bool,
}
