use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::{CloseFrame, Message, frame::coding::CloseCode},
};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{
    ABNORMAL_CLOSURE, NO_STATUS, NORMAL_CLOSURE, Transport, TransportCommand, TransportConnection,
    TransportEvent, TransportPeer, redact,
};
use crate::error::TransportError;
use crate::tls::install_rustls_provider;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the peer's close frame after sending ours.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Timer period when pings are disabled; the branch is never polled.
const IDLE_PING_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Clone, Copy, Debug)]
pub struct WebSocketConfig {
    /// Keep-alive ping interval (`None` disables pings)
    pub ping_interval: Option<Duration>,
    /// Upper bound on the TCP/TLS/upgrade handshake
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

/// tokio-tungstenite transport. Each `open` spawns one driver task.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        install_rustls_provider();
        Self { config }
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &Url) -> TransportConnection {
        let (conn, peer) = TransportConnection::pair();
        let config = self.config;
        let url = url.clone();
        let conn_id = conn.id();
        tokio::spawn(async move {
            drive(url, config, peer).await;
            debug!(conn_id, "WebSocket driver stopped");
        });
        conn
    }
}

/// Run one connection from handshake to close.
async fn drive(url: Url, config: WebSocketConfig, mut peer: TransportPeer) {
    let target = redact(&url);
    info!("Connecting to WebSocket: {}", target);

    let connect = tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()));
    tokio::pin!(connect);

    let mut stream: WsStream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(Ok((stream, _response))) => break stream,
                Ok(Err(e)) => {
                    warn!("Connection failed: {}", e);
                    fail(&peer, TransportError::Connect(e.to_string())).await;
                    return;
                }
                Err(_) => {
                    warn!("Connection to {} timed out", target);
                    let reason = format!("timed out after {:?}", config.connect_timeout);
                    fail(&peer, TransportError::Connect(reason)).await;
                    return;
                }
            },
            cmd = peer.commands.recv() => match cmd {
                Some(TransportCommand::Send(_)) => {
                    warn!("Dropping outbound frame queued before the connection opened");
                }
                Some(TransportCommand::Close { code, .. }) => {
                    peer.emit(TransportEvent::Close { code, was_clean: true }).await;
                    return;
                }
                // Owner released the connection mid-handshake.
                None => return,
            }
        }
    };

    info!("Connected to WebSocket: {}", target);
    if !peer.emit(TransportEvent::Open).await {
        let _ = stream.close(None).await;
        return;
    }

    let ping_period = config.ping_interval.unwrap_or(IDLE_PING_PERIOD);
    let mut heartbeat =
        tokio::time::interval_at(tokio::time::Instant::now() + ping_period, ping_period);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = heartbeat.tick(), if config.ping_interval.is_some() => {
                if let Err(e) = stream.send(Message::Ping(Default::default())).await {
                    warn!("Failed to send ping: {}", e);
                    fail(&peer, TransportError::Send(e.to_string())).await;
                    return;
                }
                trace!("Sent ping to {}", target);
            }

            cmd = peer.commands.recv() => match cmd {
                Some(TransportCommand::Send(text)) => {
                    if let Err(e) = stream.send(Message::text(text)).await {
                        warn!("Failed to send frame: {}", e);
                        fail(&peer, TransportError::Send(e.to_string())).await;
                        return;
                    }
                }
                Some(TransportCommand::Close { code, reason }) => {
                    close_gracefully(&mut stream, code, reason).await;
                    peer.emit(TransportEvent::Close { code, was_clean: true }).await;
                    return;
                }
                None => {
                    close_gracefully(&mut stream, NORMAL_CLOSURE, String::new()).await;
                    return;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !peer.emit(TransportEvent::Message(text.as_str().to_owned())).await {
                        let _ = stream.close(None).await;
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if !peer.emit(TransportEvent::Message(text)).await {
                            let _ = stream.close(None).await;
                            return;
                        }
                    }
                    Err(_) => warn!("Dropping non-UTF-8 binary frame ({} bytes)", data.len()),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code)).unwrap_or(NO_STATUS);
                    info!(code, "WebSocket closed by server");
                    peer.emit(TransportEvent::Close { code, was_clean: true }).await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    fail(&peer, TransportError::Send(e.to_string())).await;
                    return;
                }
                None => {
                    warn!("WebSocket stream closed");
                    peer.emit(TransportEvent::Close { code: ABNORMAL_CLOSURE, was_clean: false }).await;
                    return;
                }
            }
        }
    }
}

/// Report an unrecoverable connection error followed by an unclean close.
async fn fail(peer: &TransportPeer, error: TransportError) {
    if peer.emit(TransportEvent::Error(error.to_string())).await {
        peer.emit(TransportEvent::Close {
            code: ABNORMAL_CLOSURE,
            was_clean: false,
        })
        .await;
    }
}

async fn close_gracefully(stream: &mut WsStream, code: u16, reason: String) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    if let Err(e) = stream.close(Some(frame)).await {
        debug!("Close frame not sent: {}", e);
        return;
    }
    // Drain until the peer acknowledges or the grace period ends.
    let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
        while let Some(Ok(_)) = stream.next().await {}
    })
    .await;
}
