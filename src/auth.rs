// file: src/auth.rs
// description: Dashboard login and the cookie session shared by snapshot pulls and the
//              realtime channel

use crate::error::DashboardError;
use reqwest::{
    Client, StatusCode,
    cookie::{CookieStore, Jar},
    redirect,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginResponse {
    success: bool,
    message: Option<String>,
}

/// HTTP client plus the cookie jar holding the dashboard login.
///
/// Without credentials every method is a pass-through and requests go out
/// anonymously.
pub struct AuthSession {
    client: Client,
    jar: Arc<Jar>,
    server: Url,
    login_url: Url,
    credentials: Option<Credentials>,
    authenticated: AtomicBool,
    login_lock: Mutex<()>,
}

impl AuthSession {
    pub fn new(
        server: Url,
        login_url: Url,
        credentials: Option<Credentials>,
    ) -> Result<Self, DashboardError> {
        let jar = Arc::new(Jar::default());
        // The server answers unauthenticated requests with a redirect to its
        // login page; it must surface as a status, not be followed.
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("botdash/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(jar.clone())
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            jar,
            server,
            login_url,
            credentials,
            authenticated: AtomicBool::new(false),
            login_lock: Mutex::new(()),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn requires_login(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Logs in unless a session is already established. Concurrent callers
    /// share one login request.
    pub async fn ensure_login(&self) -> Result<(), DashboardError> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };

        let _guard = self.login_lock.lock().await;
        if self.is_authenticated() {
            return Ok(());
        }

        self.login(credentials).await?;
        self.authenticated.store(true, Ordering::Release);
        Ok(())
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), DashboardError> {
        debug!("Logging in to {} as {}", self.login_url, credentials.username);

        let response = self
            .client
            .post(self.login_url.clone())
            .json(credentials)
            .send()
            .await?;
        let status = response.status();
        let body = response.json::<LoginResponse>().await.unwrap_or_default();

        if status.is_success() && body.success {
            info!("Logged in to the dashboard as {}", credentials.username);
            return Ok(());
        }

        let reason = body
            .message
            .unwrap_or_else(|| format!("login rejected with status {status}"));
        warn!("Dashboard login failed: {}", reason);
        Err(DashboardError::AuthenticationFailed(reason))
    }

    /// Drops the session so the next request logs in again.
    pub fn invalidate(&self) {
        if self.requires_login() && self.authenticated.swap(false, Ordering::AcqRel) {
            debug!("Dashboard session invalidated");
        }
    }

    /// `Cookie` header value to present on the realtime upgrade request.
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.server)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }
}

/// Unauthenticated API calls get 401, or a redirect to the login page.
pub fn is_unauthorized(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status.is_redirection()
}

#[cfg(test)]
pub(crate) mod test_server {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };
    use url::Url;

    /// Serves each canned HTTP response to one connection, in order.
    pub async fn serve(responses: Vec<String>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    /// Consumes headers and body so closing the socket never resets the client.
    async fn read_request(socket: &mut TcpStream) {
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let Ok(n) = socket.read(&mut buf).await else {
                return;
            };
            if n == 0 {
                return;
            }
            received.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&received);
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }

    pub fn response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }
}
