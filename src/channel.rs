// file: src/channel.rs
// description: Realtime channel abstraction and its Socket.IO-over-WebSocket implementation
// reference: https://socket.io/docs/v4/socket-io-protocol/

use crate::{
    auth::AuthSession,
    codec::{self, NAMESPACE_CONNECT, NAMESPACE_DISCONNECT, PONG, Packet, SocketPacket},
    error::DashboardError,
    types::ClientCommand,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde_json::Value;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::COOKIE},
    },
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Lifecycle and data signals a channel reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Connected,
    Disconnected { reason: String },
    ConnectError { error: String },
    Event { name: String, payload: Value },
}

/// Identifies one `open` of a channel. Assigned by the owner, echoed on every signal.
pub type LinkId = u64;

/// A signal together with the link that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSignal {
    pub link: LinkId,
    pub signal: ChannelSignal,
}

const SIGNAL_CHANNEL_CAPACITY: usize = 4_096;

pub type SignalSender = mpsc::Sender<LinkSignal>;
pub type SignalReceiver = mpsc::Receiver<LinkSignal>;

pub fn create_signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::channel(SIGNAL_CHANNEL_CAPACITY)
}

/// A reopenable realtime channel. `open` and `close` return immediately;
/// their outcome arrives later as a [`LinkSignal`] tagged with `link`.
pub trait Channel: Send + Sync {
    /// Replaces any current link with a new one identified by `link`.
    fn open(&self, link: LinkId);
    fn close(&self);
    fn emit(&self, command: &ClientCommand) -> Result<(), DashboardError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

struct Link {
    outbound: mpsc::UnboundedSender<String>,
    /// `true` asks the link to report its closure; a replaced link stops silently.
    shutdown: oneshot::Sender<bool>,
    task: JoinHandle<()>,
}

/// Why a link stopped.
#[derive(Debug)]
enum LinkEnd {
    ClientClose { notify: bool },
    ServerClose(String),
    Failed(String),
    /// The server refused the namespace connect (`44`).
    Rejected(String),
}

/// Signal sender bound to one link.
struct LinkSignals {
    link: LinkId,
    sender: SignalSender,
}

impl LinkSignals {
    async fn send(&self, signal: ChannelSignal) {
        let tagged = LinkSignal {
            link: self.link,
            signal,
        };
        if self.sender.send(tagged).await.is_err() {
            debug!("Signal receiver dropped; discarding channel signal");
        }
    }
}

pub struct WsChannel {
    url: Url,
    connect_timeout: Duration,
    signals: SignalSender,
    auth: Option<Arc<AuthSession>>,
    link: Mutex<Option<Link>>,
}

impl WsChannel {
    pub fn new(url: Url, connect_timeout: Duration, signals: SignalSender) -> Self {
        Self {
            url,
            connect_timeout,
            signals,
            auth: None,
            link: Mutex::new(None),
        }
    }

    /// Logs in before each connect and presents the session cookie on the upgrade.
    pub fn with_auth(mut self, auth: Arc<AuthSession>) -> Self {
        self.auth = Some(auth);
        self
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Channel for WsChannel {
    fn open(&self, id: LinkId) {
        let mut link = self.link();

        if let Some(previous) = link.take() {
            if !previous.task.is_finished() {
                debug!("Replacing live link on reopen");
            }
            let _ = previous.shutdown.send(false);
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(link = id, "Opening realtime channel to {}", self.url);
        let task = tokio::spawn(run_link(
            self.url.clone(),
            self.connect_timeout,
            self.auth.clone(),
            LinkSignals {
                link: id,
                sender: self.signals.clone(),
            },
            outbound_rx,
            shutdown_rx,
        ));

        *link = Some(Link {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        });
    }

    fn close(&self) {
        if let Some(link) = self.link().take() {
            debug!("Closing realtime channel");
            let _ = link.shutdown.send(true);
        }
    }

    fn emit(&self, command: &ClientCommand) -> Result<(), DashboardError> {
        let text = codec::encode_event(command.name(), &command.payload())?;
        let link = self.link();
        let link = link.as_ref().ok_or(DashboardError::ChannelClosed)?;

        trace!("Queueing outbound packet: {}", text);
        link.outbound
            .send(text)
            .map_err(|_| DashboardError::ChannelClosed)
    }
}

async fn run_link(
    url: Url,
    connect_timeout: Duration,
    auth: Option<Arc<AuthSession>>,
    signals: LinkSignals,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<bool>,
) {
    let stream = tokio::select! {
        biased;

        _ = &mut shutdown => {
            debug!("Channel closed before the transport connected");
            return;
        }

        result = tokio::time::timeout(connect_timeout, establish(&url, auth.as_deref())) => match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Failed to connect to WebSocket: {}", e);
                let error = DashboardError::ChannelOpenFailure(e.to_string());
                signals.send(ChannelSignal::ConnectError { error: error.to_string() }).await;
                return;
            }
            Err(_) => {
                error!("WebSocket connection timed out after {:?}", connect_timeout);
                let error = DashboardError::ChannelOpenFailure("connection timeout".to_string());
                signals.send(ChannelSignal::ConnectError { error: error.to_string() }).await;
                return;
            }
        }
    };

    info!(link = signals.link, "WebSocket transport established to {}", url);

    let (mut write, mut read) = stream.split();
    let handshake_deadline = Instant::now() + connect_timeout;
    let mut joined = false;

    let end = loop {
        tokio::select! {
            notify = &mut shutdown => {
                let _ = write.send(Message::Text(NAMESPACE_DISCONNECT.into())).await;
                let _ = write.send(Message::Close(None)).await;
                break LinkEnd::ClientClose { notify: notify.unwrap_or(false) };
            }

            _ = tokio::time::sleep_until(handshake_deadline), if !joined => {
                break LinkEnd::Failed("namespace handshake timeout".to_string());
            }

            Some(text) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    error!("Failed to send outbound packet: {}", e);
                    break LinkEnd::Failed(e.to_string());
                }
            }

            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    trace!("Received text packet: {}", text.as_str());
                    if let Some(end) = handle_packet(text.as_str(), &mut write, &signals, &mut joined).await {
                        break end;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!("Binary packets not supported ({} bytes)", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!("Received close frame: {:?}", frame);
                    break LinkEnd::ServerClose("transport close".to_string());
                }
                Some(Ok(_)) => {
                    // WebSocket-level ping/pong and raw frames are handled by tungstenite
                }
                Some(Err(e)) => {
                    let error = DashboardError::from(e);
                    error!("WebSocket stream error: {}", error);
                    break LinkEnd::Failed(error.to_string());
                }
                None => {
                    info!("WebSocket stream ended");
                    break LinkEnd::ServerClose("transport close".to_string());
                }
            }
        }
    };

    if let (LinkEnd::Rejected(_), Some(auth)) = (&end, &auth) {
        // Most likely an expired login; the next attempt authenticates again.
        auth.invalidate();
    }

    let signal = match (end, joined) {
        (LinkEnd::ClientClose { notify: false }, _) => {
            debug!("Link replaced; not reporting closure");
            return;
        }
        (LinkEnd::ClientClose { notify: true }, _) => ChannelSignal::Disconnected {
            reason: "io client disconnect".to_string(),
        },
        (LinkEnd::ServerClose(reason), true) => ChannelSignal::Disconnected { reason },
        (LinkEnd::Failed(e) | LinkEnd::Rejected(e), true) => ChannelSignal::Disconnected {
            reason: DashboardError::ChannelRuntimeError(e).to_string(),
        },
        (LinkEnd::ServerClose(reason) | LinkEnd::Failed(reason) | LinkEnd::Rejected(reason), false) => {
            ChannelSignal::ConnectError {
                error: DashboardError::ChannelOpenFailure(reason).to_string(),
            }
        }
    };

    signals.send(signal).await;
}

/// Builds the upgrade request (with the login cookie when authenticated) and connects.
async fn establish(url: &Url, auth: Option<&AuthSession>) -> Result<WsStream, DashboardError> {
    let mut request = url.as_str().into_client_request()?;

    if let Some(auth) = auth {
        auth.ensure_login().await?;
        if let Some(cookie) = auth.cookie_header() {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| DashboardError::ChannelOpenFailure(format!("invalid cookie: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }
    }

    let (stream, _) = connect_async(request).await?;
    Ok(stream)
}

/// Returns `Some` when the packet ends the link.
async fn handle_packet(
    text: &str,
    write: &mut WsSink,
    signals: &LinkSignals,
    joined: &mut bool,
) -> Option<LinkEnd> {
    let packet = match codec::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(
                "Failed to decode packet: {}. Packet: {}",
                e,
                text.chars().take(100).collect::<String>()
            );
            return None;
        }
    };

    match packet {
        Packet::Open(handshake) => {
            debug!("Engine handshake: {}", handshake);
            if let Err(e) = write.send(Message::Text(NAMESPACE_CONNECT.into())).await {
                return Some(LinkEnd::Failed(e.to_string()));
            }
        }
        Packet::Ping => {
            if let Err(e) = write.send(Message::Text(PONG.into())).await {
                return Some(LinkEnd::Failed(e.to_string()));
            }
        }
        Packet::Close => return Some(LinkEnd::ServerClose("transport close".to_string())),
        Packet::Message(SocketPacket::Connect(ack)) => {
            debug!("Namespace joined: {:?}", ack);
            *joined = true;
            signals.send(ChannelSignal::Connected).await;
        }
        Packet::Message(SocketPacket::Event { name, payload }) => {
            signals.send(ChannelSignal::Event { name, payload }).await;
        }
        Packet::Message(SocketPacket::Disconnect) => {
            return Some(LinkEnd::ServerClose("io server disconnect".to_string()));
        }
        Packet::Message(SocketPacket::ConnectError(message)) => {
            warn!("Server rejected namespace connect: {}", message);
            return Some(LinkEnd::Rejected(message));
        }
        Packet::Message(SocketPacket::Ack) | Packet::Pong | Packet::Upgrade | Packet::Noop => {}
    }

    None
}
