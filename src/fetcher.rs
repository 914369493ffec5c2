/// file: src/fetcher.rs
/// description: Pull-based dashboard snapshot refresh, on demand and on a fixed interval
use crate::{
    auth::{self, AuthSession},
    collaborators::{DataFetcher, Notifier, NotifyLevel, Renderer},
    error::DashboardError,
    monitoring,
    types::{DashboardSnapshot, SessionId},
};
use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

struct FetcherInner {
    auth: Arc<AuthSession>,
    url: Url,
    renderer: Option<Arc<dyn Renderer>>,
    notifier: Option<Arc<dyn Notifier>>,
    in_flight: AtomicBool,
}

pub struct SnapshotFetcher {
    inner: Arc<FetcherInner>,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotFetcher {
    /// `session` scopes every snapshot to one bot session (`?session_id=`).
    /// Requests go through `auth`, which holds the login cookie.
    pub fn new(
        mut url: Url,
        session: Option<SessionId>,
        auth: Arc<AuthSession>,
        renderer: Option<Arc<dyn Renderer>>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        if let Some(session_id) = session {
            url.query_pairs_mut()
                .append_pair("session_id", &session_id.to_string());
        }

        Self {
            inner: Arc::new(FetcherInner {
                auth,
                url,
                renderer,
                notifier,
                in_flight: AtomicBool::new(false),
            }),
            auto_refresh: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub async fn fetch(&self) -> Result<DashboardSnapshot, DashboardError> {
        self.inner.fetch().await
    }

    /// Replaces any running poller. The first pull happens immediately.
    pub fn start_auto_refresh(&self, interval: Duration) {
        self.stop_auto_refresh();

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.refresh_once().await;
            }
        });

        info!("Snapshot auto-refresh every {:?}", interval);
        *self.poller() = Some(handle);
    }

    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self.poller().take() {
            debug!("Stopping snapshot auto-refresh");
            handle.abort();
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.poller().as_ref().is_some_and(|h| !h.is_finished())
    }

    fn poller(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.auto_refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DataFetcher for SnapshotFetcher {
    fn refresh(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.refresh_once().await });
    }
}

impl Drop for SnapshotFetcher {
    fn drop(&mut self) {
        self.stop_auto_refresh();
    }
}

impl FetcherInner {
    /// Logs in first when needed. An expired login is renewed once per pull.
    async fn fetch(&self) -> Result<DashboardSnapshot, DashboardError> {
        self.auth.ensure_login().await?;
        match self.get().await {
            Err(DashboardError::Unauthorized) if self.auth.requires_login() => {
                info!("Dashboard session expired; logging in again");
                self.auth.invalidate();
                self.auth.ensure_login().await?;
                self.get().await
            }
            result => result,
        }
    }

    async fn get(&self) -> Result<DashboardSnapshot, DashboardError> {
        let response = self.auth.client().get(self.url.clone()).send().await?;
        if auth::is_unauthorized(response.status()) {
            return Err(DashboardError::Unauthorized);
        }
        let snapshot = response
            .error_for_status()?
            .json::<DashboardSnapshot>()
            .await?;
        Ok(snapshot)
    }

    /// Overlapping refreshes collapse into the one already running.
    async fn refresh_once(&self) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Snapshot refresh already in flight");
            return;
        }

        let result = self.fetch().await;
        self.in_flight.store(false, Ordering::Release);
        monitoring::SNAPSHOT_REFRESH_COUNTER.increment(1);

        match result {
            Ok(snapshot) if snapshot.success => {
                debug!(
                    balance = snapshot.balance.current_balance,
                    trades = snapshot.trading.total_trades,
                    "Snapshot refreshed"
                );
                if let Some(renderer) = &self.renderer {
                    renderer.apply_snapshot(&snapshot);
                }
            }
            Ok(snapshot) => {
                warn!(
                    "No dashboard data available: {}",
                    snapshot.message.as_deref().unwrap_or("no message")
                );
            }
            Err(e @ (DashboardError::Unauthorized | DashboardError::AuthenticationFailed(_))) => {
                warn!("Dashboard data refused: {}", e);
                if let Some(notifier) = &self.notifier {
                    notifier.show(
                        "Dashboard login required (use --username/--password)",
                        NotifyLevel::Error,
                    );
                }
            }
            Err(e) => {
                warn!("Error loading dashboard data: {}", e);
                if let Some(notifier) = &self.notifier {
                    notifier.show("Error loading dashboard data", NotifyLevel::Error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        Credentials,
        test_server::{response, serve},
    };

    #[derive(Default)]
    struct RecordingNotifier {
        messages: std::sync::Mutex<Vec<(String, NotifyLevel)>>,
    }

    impl Notifier for RecordingNotifier {
        fn show(&self, message: &str, level: NotifyLevel) {
            self.messages
                .lock()
                .unwrap()
                .push((message.to_string(), level));
        }
    }

    fn unreachable_url() -> Url {
        Url::parse("http://127.0.0.1:9/api/v1/dashboard/data").unwrap()
    }

    fn anonymous(server: &Url) -> Arc<AuthSession> {
        Arc::new(
            AuthSession::new(server.clone(), server.join("/api/auth/login").unwrap(), None)
                .unwrap(),
        )
    }

    fn fetcher(url: Url, notifier: Option<Arc<dyn Notifier>>) -> SnapshotFetcher {
        let auth = anonymous(&url);
        SnapshotFetcher::new(url, None, auth, None, notifier)
    }

    async fn wait_for_message(notifier: &RecordingNotifier) -> Vec<(String, NotifyLevel)> {
        for _ in 0..100 {
            if !notifier.messages.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        notifier.messages.lock().unwrap().clone()
    }

    #[test]
    fn test_session_appends_query() {
        let url = unreachable_url();
        let fetcher = SnapshotFetcher::new(url.clone(), Some(12), anonymous(&url), None, None);
        assert_eq!(fetcher.url().query(), Some("session_id=12"));

        let fetcher = SnapshotFetcher::new(url.clone(), None, anonymous(&url), None, None);
        assert_eq!(fetcher.url().query(), None);
    }

    #[tokio::test]
    async fn test_fetch_error_is_reported() {
        let fetcher = fetcher(unreachable_url(), None);
        assert!(matches!(
            fetcher.fetch().await,
            Err(DashboardError::HttpError(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_failure_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fetcher = fetcher(unreachable_url(), Some(notifier.clone()));

        fetcher.refresh();

        assert_eq!(
            wait_for_message(&notifier).await,
            vec![(
                "Error loading dashboard data".to_string(),
                NotifyLevel::Error
            )]
        );
    }

    #[tokio::test]
    async fn test_login_redirect_is_unauthorized() {
        let server = serve(vec![response(
            "302 FOUND",
            "Location: /login?next=%2Fapi%2Fv1%2Fdashboard%2Fdata\r\n",
            "",
        )])
        .await;
        let notifier = Arc::new(RecordingNotifier::default());
        let fetcher = fetcher(server.join("/api/v1/dashboard/data").unwrap(), Some(notifier.clone()));

        fetcher.refresh();

        assert_eq!(
            wait_for_message(&notifier).await,
            vec![(
                "Dashboard login required (use --username/--password)".to_string(),
                NotifyLevel::Error
            )]
        );
    }

    #[tokio::test]
    async fn test_expired_login_is_renewed_once() {
        let login_ok = response(
            "200 OK",
            "Set-Cookie: session=abc123; Path=/\r\n",
            r#"{"success":true}"#,
        );
        let server = serve(vec![
            login_ok.clone(),
            response("401 UNAUTHORIZED", "", r#"{"error":"login required"}"#),
            login_ok,
            response("200 OK", "", r#"{"success":true,"balance":{"current_balance":1250.5}}"#),
        ])
        .await;
        let auth = Arc::new(
            AuthSession::new(
                server.clone(),
                server.join("/api/auth/login").unwrap(),
                Some(Credentials {
                    username: "trader".to_string(),
                    password: "secret".to_string(),
                }),
            )
            .unwrap(),
        );
        let fetcher = SnapshotFetcher::new(
            server.join("/api/v1/dashboard/data").unwrap(),
            None,
            auth.clone(),
            None,
            None,
        );

        let snapshot = fetcher.fetch().await.unwrap();
        assert!(snapshot.success);
        assert_eq!(snapshot.balance.current_balance, 1250.5);
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_auto_refresh_start_stop() {
        let fetcher = fetcher(unreachable_url(), None);
        assert!(!fetcher.is_auto_refreshing());

        fetcher.start_auto_refresh(Duration::from_secs(60));
        assert!(fetcher.is_auto_refreshing());

        fetcher.stop_auto_refresh();
        assert!(!fetcher.is_auto_refreshing());
    }
}
