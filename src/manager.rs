// file: src/manager.rs
// description: Connection manager owning the realtime channel lifecycle, bounded reconnection
//              and outbound command emission

use crate::{
    channel::{Channel, ChannelSignal, LinkId, LinkSignal, SignalReceiver},
    client_state::{
        ConnectionState, ConnectionStats, ManagerState, ReconnectDecision, ReconnectPolicy,
        SharedManagerState,
    },
    collaborators::{Collaborators, NotifyLevel},
    config::RealtimeConfig,
    dispatch::Dispatcher,
    error::DashboardError,
    events::{EventSender, ManagerEvent, publish},
    monitoring,
    types::{ClientCommand, SessionId},
};
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// The parts a scheduled reconnection timer needs after the handler returns.
#[derive(Clone)]
struct Core {
    state: SharedManagerState,
    channel: Arc<dyn Channel>,
    collaborators: Collaborators,
    events: EventSender,
    url: String,
}

impl Core {
    /// State must already be `Connecting`, with `link` taken from it.
    fn begin_attempt(&self, link: LinkId) {
        self.collaborators
            .render(|r| r.update_connectivity(ConnectionState::Connecting));
        publish(
            &self.events,
            ManagerEvent::Connecting {
                url: self.url.clone(),
            },
        );
        self.channel.open(link);
    }

    async fn reconnect_after(self, delay: Duration, epoch: u64) {
        tokio::time::sleep(delay).await;

        let link = {
            let mut state = self.state.lock().await;
            if state.explicit_close || state.epoch != epoch {
                debug!("Skipping reconnection attempt invalidated by an explicit close");
                return;
            }
            if state.connection == ConnectionState::Connected {
                debug!("Already connected; skipping scheduled reconnection");
                return;
            }
            state.begin_connecting()
        };

        self.begin_attempt(link);
    }
}

pub struct ConnectionManager {
    config: RealtimeConfig,
    core: Core,
    dispatcher: Dispatcher,
}

impl ConnectionManager {
    pub fn new(
        config: RealtimeConfig,
        channel: Arc<dyn Channel>,
        collaborators: Collaborators,
        settle_delay: Duration,
        events: EventSender,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.max_attempts, config.base_delay);
        let core = Core {
            state: Arc::new(Mutex::new(ManagerState::new(policy))),
            channel,
            collaborators: collaborators.clone(),
            events,
            url: config.url.to_string(),
        };

        Self {
            config,
            core,
            dispatcher: Dispatcher::new(collaborators, settle_delay),
        }
    }

    /// Opens the channel once. A no-op when realtime is disabled or the
    /// manager was already initialized.
    pub async fn initialize(&self) {
        if !self.config.enabled {
            debug!("Realtime channel disabled by configuration");
            return;
        }

        let link = {
            let mut state = self.core.state.lock().await;
            if state.initialized {
                debug!("Connection manager already initialized");
                return;
            }
            state.initialized = true;
            state.explicit_close = false;
            state.begin_connecting()
        };

        info!("Initializing realtime channel to {}", self.core.url);
        self.core.begin_attempt(link);
    }

    /// Feeds channel signals to the handlers until every sender is gone.
    pub async fn run(&self, mut signals: SignalReceiver) {
        while let Some(LinkSignal { link, signal }) = signals.recv().await {
            self.handle_signal(link, signal).await;
        }
        info!("Channel signal stream ended; connection manager stopping");
    }

    /// Signals from any link but the latest one are dropped, so a link
    /// closed by `disconnect()` or replaced by `reconnect()` cannot touch the
    /// current connection.
    pub async fn handle_signal(&self, link: LinkId, signal: ChannelSignal) {
        if !self.config.enabled {
            return;
        }

        let current = self.core.state.lock().await.link;
        if link != current {
            debug!(link, current, "Dropping signal from a stale link: {:?}", signal);
            return;
        }

        match signal {
            ChannelSignal::Connected => self.on_connect().await,
            ChannelSignal::Disconnected { reason } => self.on_disconnect(reason).await,
            ChannelSignal::ConnectError { error } => self.on_connect_error(error).await,
            ChannelSignal::Event { name, payload } => {
                self.core.state.lock().await.record_event();
                self.dispatcher.dispatch(&name, payload);
            }
        }
    }

    async fn on_connect(&self) {
        let connection_id = {
            let mut state = self.core.state.lock().await;
            if state.explicit_close {
                None
            } else {
                Some(state.mark_connected())
            }
        };

        let Some(connection_id) = connection_id else {
            warn!("Connect signal arrived after an explicit disconnect; closing again");
            self.core.channel.close();
            return;
        };

        info!(connection_id = %connection_id, "Realtime channel connected");
        monitoring::CONNECTED_GAUGE.set(1.0);
        self.core
            .collaborators
            .render(|r| r.update_connectivity(ConnectionState::Connected));
        self.core
            .collaborators
            .notify("Realtime connection established", NotifyLevel::Success);
        publish(&self.core.events, ManagerEvent::Connected { connection_id });
    }

    async fn on_disconnect(&self, reason: String) {
        let explicit = {
            let mut state = self.core.state.lock().await;
            state.mark_lost(ConnectionState::Disconnected);
            state.explicit_close
        };

        monitoring::CONNECTED_GAUGE.set(0.0);
        publish(
            &self.core.events,
            ManagerEvent::Disconnected {
                reason: reason.clone(),
            },
        );

        if explicit {
            debug!("Channel closed by explicit disconnect ({})", reason);
            return;
        }

        warn!("Realtime channel disconnected: {}", reason);
        self.core
            .collaborators
            .render(|r| r.update_connectivity(ConnectionState::Disconnected));
        self.core.collaborators.notify(
            &format!("Realtime connection lost: {reason}"),
            NotifyLevel::Warning,
        );
        self.schedule_reconnect().await;
    }

    async fn on_connect_error(&self, error: String) {
        let explicit = {
            let mut state = self.core.state.lock().await;
            if !state.explicit_close {
                state.mark_lost(ConnectionState::Error);
            }
            state.explicit_close
        };

        if explicit {
            debug!("Ignoring connect error after explicit disconnect: {}", error);
            return;
        }

        warn!("Realtime connect error: {}", error);
        monitoring::CONNECTED_GAUGE.set(0.0);
        self.core
            .collaborators
            .render(|r| r.update_connectivity(ConnectionState::Error));
        publish(&self.core.events, ManagerEvent::ConnectFailed { error });
        self.schedule_reconnect().await;
    }

    async fn schedule_reconnect(&self) {
        let (decision, epoch, max_attempts) = {
            let mut state = self.core.state.lock().await;
            if state.explicit_close {
                return;
            }
            (
                state.policy.register_failure(),
                state.epoch,
                state.policy.max_attempts(),
            )
        };

        match decision {
            ReconnectDecision::Retry { attempt, delay } => {
                warn!(
                    "Reconnecting in {} ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    max_attempts
                );
                monitoring::RECONNECT_ATTEMPTS_COUNTER.increment(1);
                publish(
                    &self.core.events,
                    ManagerEvent::ReconnectScheduled { attempt, delay },
                );
                tokio::spawn(self.core.clone().reconnect_after(delay, epoch));
            }
            ReconnectDecision::Exhausted { attempts, first } => {
                if !first {
                    debug!("Reconnection attempts already exhausted");
                    return;
                }

                let failure = DashboardError::ReconnectExhausted { attempts };
                error!("{}", failure);
                self.core.collaborators.notify_persistent(
                    &format!("{failure}. Reconnect manually to resume live updates."),
                    NotifyLevel::Error,
                );
                publish(
                    &self.core.events,
                    ManagerEvent::ReconnectExhausted { attempts },
                );
            }
        }
    }

    /// Explicit external reset: clears the attempt count and opens the
    /// channel again. Does nothing while connected.
    pub async fn reconnect(&self) {
        if !self.config.enabled {
            return;
        }

        let link = {
            let mut state = self.core.state.lock().await;
            if state.connection == ConnectionState::Connected {
                debug!("Reconnect requested while connected; ignoring");
                return;
            }
            state.initialized = true;
            state.explicit_close = false;
            state.epoch += 1;
            state.policy.reset();
            state.begin_connecting()
        };

        info!("Manual reconnect requested");
        self.core.begin_attempt(link);
    }

    /// User-initiated close. Suppresses every pending and future automatic
    /// reconnection until `reconnect()`.
    pub async fn disconnect(&self) {
        if !self.config.enabled {
            return;
        }

        {
            let mut state = self.core.state.lock().await;
            state.explicit_close = true;
            state.epoch += 1;
            state.mark_lost(ConnectionState::Disconnected);
        }

        info!("Disconnecting realtime channel");
        self.core.channel.close();
        monitoring::CONNECTED_GAUGE.set(0.0);
        self.core
            .collaborators
            .render(|r| r.update_connectivity(ConnectionState::Disconnected));
    }

    /// Joins `session_id`. Rebinding from another session sends no leave
    /// for the previous one.
    pub async fn join_session(&self, session_id: SessionId) -> bool {
        if !self
            .emit_if_connected(ClientCommand::JoinSession { session_id })
            .await
        {
            return false;
        }

        let previous = self.core.state.lock().await.session.replace(session_id);
        if let Some(previous) = previous
            && previous != session_id
        {
            debug!(
                "Rebinding from session {} to {} without leaving it",
                previous, session_id
            );
        }

        info!("Joined session {}", session_id);
        publish(&self.core.events, ManagerEvent::SessionJoined { session_id });
        true
    }

    pub async fn leave_session(&self, session_id: SessionId) -> bool {
        if !self
            .emit_if_connected(ClientCommand::LeaveSession { session_id })
            .await
        {
            return false;
        }

        {
            let mut state = self.core.state.lock().await;
            if state.session == Some(session_id) {
                state.session = None;
            }
        }

        info!("Left session {}", session_id);
        publish(&self.core.events, ManagerEvent::SessionLeft { session_id });
        true
    }

    /// Emits `bot_command` with `data` plus `command: name`.
    pub async fn send_command(&self, name: &str, data: Map<String, Value>) -> bool {
        self.emit_if_connected(ClientCommand::bot_command(name, data))
            .await
    }

    pub async fn request_status(&self) -> bool {
        self.emit_if_connected(ClientCommand::StatusRequest).await
    }

    async fn emit_if_connected(&self, command: ClientCommand) -> bool {
        if !self.config.enabled || !self.is_connected().await {
            debug!("Not connected; dropping '{}'", command.name());
            return false;
        }

        match self.core.channel.emit(&command) {
            Ok(()) => {
                debug!("Sent '{}'", command.name());
                publish(
                    &self.core.events,
                    ManagerEvent::CommandSent {
                        name: command.name().to_string(),
                    },
                );
                true
            }
            Err(e) => {
                warn!("Failed to send '{}': {}", command.name(), e);
                false
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.core.state.lock().await.connection == ConnectionState::Connected
    }

    pub async fn state(&self) -> ConnectionState {
        self.core.state.lock().await.connection
    }

    pub async fn current_session(&self) -> Option<SessionId> {
        self.core.state.lock().await.session
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        self.core.state.lock().await.stats()
    }

    pub async fn events_received(&self) -> u64 {
        self.core.state.lock().await.events_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::{DataFetcher, Notifier, Renderer},
        events::{EventReceiver, create_event_channel},
        types::{BalanceUpdate, BotStatusUpdate},
    };
    use serde_json::json;
    use std::sync::{
        Mutex as StdMutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    };
    use url::Url;

    #[derive(Default)]
    struct MockChannel {
        opens: AtomicUsize,
        last_link: AtomicU64,
        closes: AtomicUsize,
        emitted: StdMutex<Vec<(String, Value)>>,
    }

    impl MockChannel {
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn last_link(&self) -> LinkId {
            self.last_link.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        fn emitted(&self) -> Vec<(String, Value)> {
            self.emitted.lock().unwrap().clone()
        }
    }

    impl Channel for MockChannel {
        fn open(&self, link: LinkId) {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.last_link.store(link, Ordering::SeqCst);
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn emit(&self, command: &ClientCommand) -> Result<(), DashboardError> {
            self.emitted
                .lock()
                .unwrap()
                .push((command.name().to_string(), command.payload()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        states: StdMutex<Vec<ConnectionState>>,
        notes: StdMutex<Vec<(String, NotifyLevel, bool)>>,
        refreshes: AtomicUsize,
    }

    impl Recorder {
        fn states(&self) -> Vec<ConnectionState> {
            self.states.lock().unwrap().clone()
        }

        fn notes(&self) -> Vec<(String, NotifyLevel, bool)> {
            self.notes.lock().unwrap().clone()
        }

        fn persistent(&self) -> Vec<String> {
            self.notes()
                .into_iter()
                .filter(|(_, _, persistent)| *persistent)
                .map(|(message, _, _)| message)
                .collect()
        }

        fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    impl Renderer for Recorder {
        fn update_connectivity(&self, state: ConnectionState) {
            self.states.lock().unwrap().push(state);
        }
        fn apply_balance(&self, _balance: &BalanceUpdate) {}
        fn apply_bot_status(&self, _status: &BotStatusUpdate) {}
    }

    impl Notifier for Recorder {
        fn show(&self, message: &str, level: NotifyLevel) {
            self.notes
                .lock()
                .unwrap()
                .push((message.to_string(), level, false));
        }

        fn show_persistent(&self, message: &str, level: NotifyLevel) {
            self.notes
                .lock()
                .unwrap()
                .push((message.to_string(), level, true));
        }
    }

    impl DataFetcher for Recorder {
        fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        manager: ConnectionManager,
        channel: Arc<MockChannel>,
        recorder: Arc<Recorder>,
        events: EventReceiver,
    }

    impl Harness {
        fn new(enabled: bool) -> Self {
            let url = Url::parse("ws://localhost:5000/socket.io/?EIO=4&transport=websocket")
                .unwrap();
            let mut config = RealtimeConfig::new(url);
            config.enabled = enabled;

            let channel = Arc::new(MockChannel::default());
            let recorder = Arc::new(Recorder::default());
            let (tx, events) = create_event_channel();
            let collaborators = Collaborators::new()
                .with_renderer(recorder.clone())
                .with_notifier(recorder.clone())
                .with_fetcher(recorder.clone());

            let manager = ConnectionManager::new(
                config,
                channel.clone(),
                collaborators,
                Duration::from_millis(1000),
                tx,
            );

            Self {
                manager,
                channel,
                recorder,
                events,
            }
        }

        /// Delivers `signal` as if from the most recently opened link.
        async fn signal(&self, signal: ChannelSignal) {
            self.manager
                .handle_signal(self.channel.last_link(), signal)
                .await;
        }

        async fn fail(&self) {
            self.signal(ChannelSignal::ConnectError {
                error: "refused".to_string(),
            })
            .await;
        }

        async fn drop_link(&self) {
            self.signal(ChannelSignal::Disconnected {
                reason: "transport close".to_string(),
            })
            .await;
        }

        async fn connect(&self) {
            self.signal(ChannelSignal::Connected).await;
        }

        fn drain_events(&mut self) -> Vec<ManagerEvent> {
            let mut drained = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                drained.push(event);
            }
            drained
        }

        fn scheduled_delays(&mut self) -> Vec<Duration> {
            self.drain_events()
                .into_iter()
                .filter_map(|event| match event {
                    ManagerEvent::ReconnectScheduled { delay, .. } => Some(delay),
                    _ => None,
                })
                .collect()
        }
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_opens_once() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.manager.initialize().await;

        assert_eq!(h.channel.opens(), 1);
        assert_eq!(h.manager.state().await, ConnectionState::Connecting);
        assert_eq!(h.recorder.states(), vec![ConnectionState::Connecting]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff_delays() {
        let mut h = Harness::new(true);
        h.manager.initialize().await;

        for expected_opens in 2..=4 {
            h.fail().await;
            wait(999 * (expected_opens as u64 - 1)).await;
            assert_eq!(h.channel.opens(), expected_opens - 1);
            wait(expected_opens as u64).await;
            assert_eq!(h.channel.opens(), expected_opens);
        }

        assert_eq!(
            h.scheduled_delays(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );
        assert_eq!(h.manager.connection_stats().await.attempt_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_notifies_once_and_stops() {
        let mut h = Harness::new(true);
        h.manager.initialize().await;

        for _ in 0..4 {
            h.fail().await;
        }
        assert_eq!(h.scheduled_delays().len(), 4);
        assert!(h.recorder.persistent().is_empty());

        // Fifth failure reaches the ceiling: nothing scheduled, one persistent notice.
        h.fail().await;
        h.drop_link().await;
        h.fail().await;

        let events = h.drain_events();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ManagerEvent::ReconnectScheduled { .. }))
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ManagerEvent::ReconnectExhausted { attempts: 5 }))
                .count(),
            1
        );

        let persistent = h.recorder.persistent();
        assert_eq!(persistent.len(), 1);
        assert!(persistent[0].contains("Maximum reconnection attempts (5) exceeded"));

        // Only the four timers scheduled before exhaustion ever reopen.
        wait(60_000).await;
        assert_eq!(h.channel.opens(), 5);
        assert_eq!(h.manager.connection_stats().await.attempt_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_resets_attempts() {
        let mut h = Harness::new(true);
        h.manager.initialize().await;
        h.fail().await;
        h.fail().await;
        assert_eq!(h.manager.connection_stats().await.attempt_count, 2);

        h.connect().await;
        let stats = h.manager.connection_stats().await;
        assert!(stats.connected);
        assert_eq!(stats.attempt_count, 0);
        assert!(
            h.recorder
                .notes()
                .contains(&("Realtime connection established".to_string(), NotifyLevel::Success, false))
        );

        h.drain_events();
        h.drop_link().await;
        assert_eq!(h.scheduled_delays(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_reopen_after_connect() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.fail().await;
        h.connect().await;

        wait(5_000).await;
        assert_eq!(h.channel.opens(), 1);
        assert!(h.manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.fail().await;

        h.manager.disconnect().await;
        wait(10_000).await;

        assert_eq!(h.channel.opens(), 1);
        assert_eq!(h.channel.closes(), 1);
        assert_eq!(h.manager.state().await, ConnectionState::Disconnected);
        assert!(h.recorder.persistent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_signal_after_explicit_close_is_quiet() {
        let mut h = Harness::new(true);
        h.manager.initialize().await;
        h.connect().await;
        h.manager.disconnect().await;
        h.drain_events();

        h.signal(ChannelSignal::Disconnected {
            reason: "io client disconnect".to_string(),
        })
        .await;

        assert!(h.scheduled_delays().is_empty());
        assert!(
            !h.recorder
                .notes()
                .iter()
                .any(|(message, _, _)| message.starts_with("Realtime connection lost"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_close_of_replaced_link_leaves_new_connection_alone() {
        let mut h = Harness::new(true);
        h.manager.initialize().await;
        h.connect().await;
        let closed_link = h.channel.last_link();

        h.manager.disconnect().await;
        h.manager.reconnect().await;
        h.connect().await;
        assert_ne!(h.channel.last_link(), closed_link);
        h.drain_events();

        // The first link reports its closure only after the new one is up.
        h.manager
            .handle_signal(
                closed_link,
                ChannelSignal::Disconnected {
                    reason: "io client disconnect".to_string(),
                },
            )
            .await;

        assert!(h.manager.is_connected().await);
        assert!(h.scheduled_delays().is_empty());
        assert!(
            !h.recorder
                .notes()
                .iter()
                .any(|(message, _, _)| message.starts_with("Realtime connection lost"))
        );

        wait(5_000).await;
        assert_eq!(h.channel.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_from_replaced_link_are_ignored() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.fail().await;
        let first = h.channel.last_link();
        wait(1_001).await;
        assert_eq!(h.channel.opens(), 2);
        h.connect().await;

        h.manager
            .handle_signal(
                first,
                ChannelSignal::Event {
                    name: "trade_update".to_string(),
                    payload: json!({ "symbol": "BTC", "side": "buy", "quantity": 1, "price": 1 }),
                },
            )
            .await;

        assert_eq!(h.manager.events_received().await, 0);
        assert!(h.manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stray_connect_after_disconnect_closes_again() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.manager.disconnect().await;

        h.connect().await;

        assert_eq!(h.channel.closes(), 2);
        assert!(!h.manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reconnect_after_exhaustion() {
        let mut h = Harness::new(true);
        h.manager.initialize().await;
        for _ in 0..5 {
            h.fail().await;
        }
        wait(60_000).await;
        let opens = h.channel.opens();
        h.drain_events();

        h.manager.reconnect().await;
        assert_eq!(h.channel.opens(), opens + 1);
        assert_eq!(h.manager.connection_stats().await.attempt_count, 0);

        h.fail().await;
        assert_eq!(h.scheduled_delays(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_ignores_timer_from_before_disconnect() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.fail().await;
        h.manager.disconnect().await;
        h.manager.reconnect().await;
        assert_eq!(h.channel.opens(), 2);

        wait(5_000).await;
        assert_eq!(h.channel.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_while_connected_is_noop() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.connect().await;

        h.manager.reconnect().await;
        assert_eq!(h.channel.opens(), 1);
        assert!(h.manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_are_dropped_when_not_connected() {
        let h = Harness::new(true);
        h.manager.initialize().await;

        assert!(!h.manager.join_session(3).await);
        assert!(!h.manager.leave_session(3).await);
        assert!(!h.manager.send_command("start", Map::new()).await);
        assert!(!h.manager.request_status().await);

        assert!(h.channel.emitted().is_empty());
        assert_eq!(h.manager.current_session().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_binding_and_commands() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.connect().await;

        assert!(h.manager.join_session(7).await);
        assert_eq!(h.manager.current_session().await, Some(7));

        // Rebinding sends no leave for the old session.
        assert!(h.manager.join_session(8).await);
        assert_eq!(h.manager.current_session().await, Some(8));

        assert!(h.manager.leave_session(7).await);
        assert_eq!(h.manager.current_session().await, Some(8));
        assert!(h.manager.leave_session(8).await);
        assert_eq!(h.manager.current_session().await, None);

        let mut data = Map::new();
        data.insert("mode".to_string(), json!("simulation"));
        data.insert("command".to_string(), json!("ignored"));
        assert!(h.manager.send_command("start", data).await);
        assert!(h.manager.request_status().await);

        let emitted = h.channel.emitted();
        let names: Vec<&str> = emitted.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "join_session",
                "join_session",
                "leave_session",
                "leave_session",
                "bot_command",
                "status_request"
            ]
        );
        assert_eq!(emitted[0].1, json!({ "session_id": 7 }));
        assert_eq!(
            emitted[4].1,
            json!({ "command": "start", "mode": "simulation" })
        );
        assert_eq!(emitted[5].1, json!({}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_session() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.connect().await;
        assert!(h.manager.join_session(4).await);

        h.drop_link().await;
        assert_eq!(h.manager.current_session().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trade_update_refreshes_after_settle_delay() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.connect().await;

        h.signal(ChannelSignal::Event {
            name: "trade_update".to_string(),
            payload: json!({ "symbol": "BTC", "side": "buy", "quantity": 0.5, "price": 50000 }),
        })
        .await;

        assert_eq!(h.recorder.refreshes(), 0);
        wait(999).await;
        assert_eq!(h.recorder.refreshes(), 0);
        wait(2).await;
        assert_eq!(h.recorder.refreshes(), 1);

        assert!(h.recorder.notes().contains(&(
            "Trade executed: BUY 0.5 BTC @ 50000.00".to_string(),
            NotifyLevel::Success,
            false
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_counted_even_when_unhandled() {
        let h = Harness::new(true);
        h.manager.initialize().await;
        h.connect().await;

        for name in ["balance_update", "mystery_event"] {
            h.signal(ChannelSignal::Event {
                name: name.to_string(),
                payload: json!({ "balance": 10 }),
            })
            .await;
        }

        assert_eq!(h.manager.events_received().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_manager_is_inert() {
        let h = Harness::new(false);
        h.manager.initialize().await;
        h.fail().await;
        h.connect().await;
        h.manager.reconnect().await;
        h.manager.disconnect().await;
        wait(30_000).await;

        assert_eq!(h.manager.state().await, ConnectionState::Disconnected);
        assert_eq!(h.channel.opens(), 0);
        assert_eq!(h.channel.closes(), 0);
        assert!(h.recorder.states().is_empty());
        assert!(h.recorder.notes().is_empty());
        assert!(!h.manager.join_session(1).await);
        assert!(h.channel.emitted().is_empty());
    }
}
