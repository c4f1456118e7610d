use std::sync::Arc;
use std::time::Duration;

use cmesh_core::{GossipPayload, NodeId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::envelope::Envelope;
use crate::peer::{PeerInfo, PeerTable};
use crate::seen::SeenSet;

/// A delivered message plus the peer it arrived from, handed to the owning
/// component's handler. Handlers must be non-blocking (spec §4.3); this
/// channel is how the transport hands off without waiting on the consumer.
pub type Delivery = (Envelope, NodeId);

/// Application-facing handle returned by `GossipTransport::bind`.
pub struct GossipHandle {
    /// Send a locally-originated envelope here to flood it to the mesh.
    pub outbound_tx: mpsc::Sender<Envelope>,
    /// Receive delivered `(envelope, from_peer_id)` pairs here.
    pub inbound_rx: mpsc::Receiver<Delivery>,
    pub peers: Arc<PeerTable>,
    pub local_node_id: NodeId,
}

/// Owns the listening socket and the peer table. Run with
/// `tokio::spawn(transport.run())`.
pub struct GossipTransport {
    config: P2pConfig,
    local_node_id: NodeId,
    local_port: u16,
    listener: TcpListener,
    peers: Arc<PeerTable>,
    seen: Arc<Mutex<SeenSet>>,
    inbound_tx: mpsc::Sender<Delivery>,
    outbound_rx: mpsc::Receiver<Envelope>,
}

impl GossipTransport {
    pub async fn bind(
        config: P2pConfig,
        local_node_id: NodeId,
    ) -> std::io::Result<(Self, GossipHandle)> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        let local_port = listener.local_addr()?.port();

        let peers = Arc::new(PeerTable::new());
        let seen = Arc::new(Mutex::new(SeenSet::new(
            config.seen_set_capacity,
            Duration::from_secs(config.seen_set_ttl_secs),
        )));
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        let (outbound_tx, outbound_rx) = mpsc::channel(1024);

        let handle = GossipHandle {
            outbound_tx,
            inbound_rx,
            peers: Arc::clone(&peers),
            local_node_id: local_node_id.clone(),
        };
        let transport = Self {
            config,
            local_node_id,
            local_port,
            listener,
            peers,
            seen,
            inbound_tx,
            outbound_rx,
        };
        Ok((transport, handle))
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Drive the gossip event loop: accept inbound connections, dial
    /// bootstrap peers, run the heartbeat worker, and flood locally
    /// originated envelopes.
    pub async fn run(mut self) {
        for addr in self.config.bootstrap_peers.clone() {
            let local_node_id = self.local_node_id.clone();
            let local_port = self.local_port;
            let peers = Arc::clone(&self.peers);
            let seen = Arc::clone(&self.seen);
            let inbound_tx = self.inbound_tx.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    dial(addr.clone(), local_node_id, local_port, peers, seen, inbound_tx, config).await
                {
                    warn!(peer_addr = %addr, error = %e, "failed to dial bootstrap peer");
                }
            });
        }

        {
            let peers = Arc::clone(&self.peers);
            let config = self.config.clone();
            tokio::spawn(async move { heartbeat_worker(peers, config).await });
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let local_node_id = self.local_node_id.clone();
                            let local_port = self.local_port;
                            let peers = Arc::clone(&self.peers);
                            let seen = Arc::clone(&self.seen);
                            let inbound_tx = self.inbound_tx.clone();
                            let config = self.config.clone();
                            tokio::spawn(async move {
                                if let Err(e) = accept(
                                    stream, local_node_id, local_port, peers, seen, inbound_tx, config,
                                ).await {
                                    debug!(peer_addr = %addr, error = %e, "inbound connection ended");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                Some(envelope) = self.outbound_rx.recv() => {
                    flood(&self.peers, &self.config, envelope, None).await;
                }
            }
        }
    }
}

async fn dial(
    addr: String,
    local_node_id: NodeId,
    local_port: u16,
    peers: Arc<PeerTable>,
    seen: Arc<Mutex<SeenSet>>,
    inbound_tx: mpsc::Sender<Delivery>,
    config: P2pConfig,
) -> std::io::Result<()> {
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    send_handshake(&mut write_half, &local_node_id, local_port).await?;
    let mut reader = BufReader::new(read_half);
    let peer_node_id = read_handshake(&mut reader).await?;

    run_connection(reader, write_half, peer_node_id, addr, peers, seen, inbound_tx, config).await
}

async fn accept(
    stream: TcpStream,
    local_node_id: NodeId,
    local_port: u16,
    peers: Arc<PeerTable>,
    seen: Arc<Mutex<SeenSet>>,
    inbound_tx: mpsc::Sender<Delivery>,
    config: P2pConfig,
) -> std::io::Result<()> {
    let addr = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let peer_node_id = read_handshake(&mut reader).await?;
    send_handshake(&mut write_half, &local_node_id, local_port).await?;

    run_connection(reader, write_half, peer_node_id, addr, peers, seen, inbound_tx, config).await
}

async fn send_handshake(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    local_node_id: &str,
    local_port: u16,
) -> std::io::Result<()> {
    let env = Envelope::originate(
        GossipPayload::Handshake { node_id: local_node_id.to_string(), port: local_port },
        0,
        now_ms(),
    );
    write_half.write_all(env.to_line().as_bytes()).await?;
    write_half.write_all(b"\n").await
}

async fn read_handshake(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> std::io::Result<NodeId> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed before handshake"));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match Envelope::from_line(trimmed) {
            Ok(env) => match env.payload {
                GossipPayload::Handshake { node_id, .. } => return Ok(node_id),
                _ => continue,
            },
            Err(_) => continue,
        }
    }
}

/// Drive one already-handshaken connection: a reader loop that frames,
/// dedups, delivers and relays, plus a writer task fed by the peer's
/// `PeerSender` queue.
async fn run_connection(
    mut reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    peer_node_id: NodeId,
    addr: String,
    peers: Arc<PeerTable>,
    seen: Arc<Mutex<SeenSet>>,
    inbound_tx: mpsc::Sender<Delivery>,
    config: P2pConfig,
) -> std::io::Result<()> {
    let (sender, mut receiver) = mpsc::channel::<Envelope>(256);
    peers.insert(PeerInfo::new(peer_node_id.clone(), addr, sender)).await;
    info!(peer = %peer_node_id, "peer connected");

    let writer_peer = peer_node_id.clone();
    tokio::spawn(async move {
        while let Some(env) = receiver.recv().await {
            let line = env.to_line();
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
        }
        debug!(peer = %writer_peer, "writer task ended");
    });

    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let env = match Envelope::from_line(trimmed) {
            Ok(env) => env,
            Err(e) => {
                debug!(peer = %peer_node_id, error = %e, "dropping malformed or unrecognized gossip line");
                peers.record_dropped_unknown();
                continue;
            }
        };
        handle_incoming(env, &peer_node_id, &peers, &seen, &inbound_tx, &config).await;
    }

    peers.remove(&peer_node_id).await;
    info!(peer = %peer_node_id, "peer disconnected");
    Ok(())
}

async fn handle_incoming(
    env: Envelope,
    from_peer: &str,
    peers: &Arc<PeerTable>,
    seen: &Arc<Mutex<SeenSet>>,
    inbound_tx: &mpsc::Sender<Delivery>,
    config: &P2pConfig,
) {
    match &env.payload {
        GossipPayload::Ping { ping_id, .. } => {
            let pong = Envelope::originate(
                GossipPayload::Pong { timestamp: now_ms(), ping_id: ping_id.clone() },
                0,
                now_ms(),
            );
            if let Some(sender) = peers.sender_for(from_peer).await {
                let _ = sender.send(pong).await;
            }
            return;
        }
        GossipPayload::Pong { ping_id, .. } => {
            peers.resolve_pending_ping(from_peer, ping_id).await;
            return;
        }
        GossipPayload::Handshake { .. } => return,
        _ => {}
    }

    if let Some(id) = &env.message_id {
        let mut guard = seen.lock().await;
        if !guard.insert_if_new(id) {
            return;
        }
    }

    let _ = inbound_tx.send((env.clone(), from_peer.to_string())).await;

    if env.payload.is_relayable() {
        flood(peers, config, env, Some(from_peer)).await;
    }
}

/// Flood `env` to a fanout-bounded, RTT-ranked peer selection, excluding
/// `exclude_peer` (the peer it arrived from, if any).
async fn flood(peers: &Arc<PeerTable>, config: &P2pConfig, env: Envelope, exclude_peer: Option<&str>) {
    let Some(relayed) = env.relayed() else { return };
    let fanout = if env.payload.is_task_kind() { config.fanout_task } else { config.fanout_default };
    let exclude = exclude_peer.unwrap_or("");
    let targets = peers.select_relay_targets(exclude, fanout).await;
    for (_, sender) in targets {
        let _ = sender.send(relayed.clone()).await;
    }
}

async fn heartbeat_worker(peers: Arc<PeerTable>, config: P2pConfig) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.heartbeat_interval_secs));
    loop {
        ticker.tick().await;
        peers.prune_stale_pings(config.ping_timeout_secs).await;
        for node_id in peers.all_node_ids().await {
            let ping_id = uuid::Uuid::new_v4().to_string();
            peers.record_pending_ping(&node_id, ping_id.clone()).await;
            let env = Envelope::originate(
                GossipPayload::Ping { timestamp: now_ms(), ping_id },
                0,
                now_ms(),
            );
            if let Some(sender) = peers.sender_for(&node_id).await {
                let _ = sender.send(env).await;
            }
        }
    }
}

fn now_ms() -> cmesh_core::Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
