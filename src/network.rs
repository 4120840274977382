//! Peer-to-peer transport
//!
//! Peers speak JSON text frames over WebSockets. Each frame is a
//! [`WireMessage`] whose `data` field, when present, is itself a JSON string
//! holding the block sequence. Inbound frames are handed to the
//! [`Synchronizer`]; its replies go back to the sender and its broadcasts go
//! to every connected peer.

use crate::blockchain::Block;
use crate::error::ChainError;
use crate::service::LedgerHandle;
use crate::sync::{SyncAction, Synchronizer};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    QueryLatest = 0,
    QueryAll = 1,
    ResponseBlockchain = 2,
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::QueryLatest),
            1 => Ok(MessageType::QueryAll),
            2 => Ok(MessageType::ResponseBlockchain),
            other => Err(format!("unknown message type {}", other)),
        }
    }
}

/// Frame layout on the wire: `{"type": 2, "data": "[...]"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    QueryLatest,
    QueryAll,
    ResponseChain(Vec<Block>),
}

impl Message {
    pub fn to_json(&self) -> Result<String, ChainError> {
        let wire = match self {
            Message::QueryLatest => WireMessage {
                message_type: MessageType::QueryLatest,
                data: None,
            },
            Message::QueryAll => WireMessage {
                message_type: MessageType::QueryAll,
                data: None,
            },
            Message::ResponseChain(blocks) => WireMessage {
                message_type: MessageType::ResponseBlockchain,
                data: Some(serde_json::to_string(blocks)?),
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decodes a text frame. Anything malformed is a structural error.
    pub fn from_json(text: &str) -> Result<Self, ChainError> {
        let wire: WireMessage = serde_json::from_str(text)
            .map_err(|e| ChainError::Structural(format!("Malformed message: {}", e)))?;

        match wire.message_type {
            MessageType::QueryLatest => Ok(Message::QueryLatest),
            MessageType::QueryAll => Ok(Message::QueryAll),
            MessageType::ResponseBlockchain => {
                let data = wire.data.ok_or_else(|| {
                    ChainError::Structural("Blockchain response carries no data".to_string())
                })?;
                let blocks: Vec<Block> = serde_json::from_str(&data).map_err(|e| {
                    ChainError::Structural(format!("Malformed blockchain response: {}", e))
                })?;
                Ok(Message::ResponseChain(blocks))
            }
        }
    }
}

/// Frames queued per peer before further sends to it are dropped.
pub const PEER_QUEUE_CAPACITY: usize = 256;

/// Upper bound on dialing a peer, handshake included.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct Peer {
    addr: String,
    outbound: mpsc::Sender<String>,
}

impl Peer {
    fn enqueue(&self, text: String) {
        match self.outbound.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Queue for {} is full, dropping frame", self.addr),
            Err(TrySendError::Closed(_)) => debug!("Peer {} writer is gone", self.addr),
        }
    }
}

/// Connected peers, keyed by a connection id. Sends are queued per peer, so a
/// slow or dead socket never holds up the others. A full queue drops frames.
#[derive(Clone, Default)]
pub struct PeerSet {
    peers: Arc<RwLock<HashMap<u64, Peer>>>,
    next_id: Arc<AtomicU64>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer and returns its id with the queue its writer drains.
    pub async fn add(&self, addr: String) -> (u64, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.peers.write().await.insert(id, Peer { addr, outbound });
        (id, rx)
    }

    pub async fn remove(&self, id: u64) {
        if let Some(peer) = self.peers.write().await.remove(&id) {
            info!("Peer {} disconnected", peer.addr);
        }
    }

    pub async fn send_to(&self, id: u64, message: &Message) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode message: {}", e);
                return;
            }
        };
        if let Some(peer) = self.peers.read().await.get(&id) {
            peer.enqueue(text);
        }
    }

    /// Best-effort send to every peer.
    pub async fn broadcast(&self, message: &Message) {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return;
            }
        };
        for peer in self.peers.read().await.values() {
            peer.enqueue(text.clone());
        }
    }

    pub async fn addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self
            .peers
            .read()
            .await
            .values()
            .map(|p| p.addr.clone())
            .collect();
        addrs.sort();
        addrs
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct NetworkNode {
    peers: PeerSet,
    sync: Synchronizer,
}

impl NetworkNode {
    pub fn new(ledger: LedgerHandle, peers: PeerSet) -> Self {
        NetworkNode {
            peers,
            sync: Synchronizer::new(ledger),
        }
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub async fn list_peers(&self) -> Vec<String> {
        self.peers.addresses().await
    }

    /// Binds `addr` and accepts WebSocket peers until the returned task is aborted.
    pub async fn listen(
        self: &Arc<Self>,
        addr: &str,
    ) -> Result<(SocketAddr, JoinHandle<()>), ChainError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ChainError::NetworkError(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        info!("P2P server listening on ws://{}", local_addr);

        let node = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        let node = Arc::clone(&node);
                        tokio::spawn(async move {
                            match tokio_tungstenite::accept_async(stream).await {
                                Ok(ws) => node.run_connection(ws, remote.to_string()).await,
                                Err(e) => {
                                    warn!("WebSocket handshake with {} failed: {}", remote, e)
                                }
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept P2P connection: {}", e),
                }
            }
        });

        Ok((local_addr, task))
    }

    /// Dials `url` (e.g. `ws://127.0.0.1:6001`) and serves the connection in
    /// the background. Returns once the handshake completes, or fails after
    /// [`CONNECT_TIMEOUT`].
    pub async fn connect_peer(self: &Arc<Self>, url: &str) -> Result<(), ChainError> {
        self.connect_peer_within(url, CONNECT_TIMEOUT).await
    }

    pub async fn connect_peer_within(
        self: &Arc<Self>,
        url: &str,
        limit: Duration,
    ) -> Result<(), ChainError> {
        let (ws, _response) = tokio::time::timeout(limit, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| {
                ChainError::NetworkError(format!(
                    "Timed out connecting to {} after {:?}",
                    url, limit
                ))
            })?
            .map_err(|e| ChainError::NetworkError(format!("Failed to connect to {}: {}", url, e)))?;
        info!("Connected to peer {}", url);

        let node = Arc::clone(self);
        let addr = url.to_string();
        tokio::spawn(async move { node.run_connection(ws, addr).await });
        Ok(())
    }

    async fn run_connection<S>(self: Arc<Self>, ws: WebSocketStream<S>, addr: String)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut stream) = ws.split();
        let (id, mut outbound) = self.peers.add(addr.clone()).await;

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound.recv().await {
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        self.peers.send_to(id, &Message::QueryLatest).await;

        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => self.dispatch(id, &addr, &text).await,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection to {} failed: {}", addr, e);
                    break;
                }
            }
        }

        self.peers.remove(id).await;
        writer.abort();
    }

    async fn dispatch(&self, id: u64, addr: &str, text: &str) {
        match self.sync.handle_raw(text).await {
            Ok(SyncAction::None) => {}
            Ok(SyncAction::Reply(message)) => self.peers.send_to(id, &message).await,
            Ok(SyncAction::Broadcast(message)) => self.peers.broadcast(&message).await,
            Err(e) if e.is_race_loss() => debug!("{}", e),
            Err(e) => warn!("Message from {} rejected: {}", addr, e),
        }
    }
}
