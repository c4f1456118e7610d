use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cmesh_bazaar::TaskBazaar;
use cmesh_capsule::CapsuleStore;
use cmesh_core::{
    escrow_account_id, AccountId, AssetId, Attribution, Bounty, CapsuleRecord, CapsuleStatus,
    GossipPayload, LogEntry, MeshError, MeshResult, NodeId, Price, Task, TaskId, Timestamp,
    Transaction, TxId, TxType,
};
use cmesh_crypto::KeyPair;
use cmesh_ledger::{LedgerEngine, LedgerMode, StateDb};
use cmesh_p2p::{Envelope, GossipHandle, PeerTable};
use cmesh_rating::RatingEngine;
use cmesh_worker::{TaskWorker, WorkerAction};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::events::GossipEvent;

fn now_ms() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A transaction this node broadcast as a follower and hasn't yet seen land
/// in the log; re-broadcast on an exponential backoff until it does.
struct PendingTx {
    tx: Transaction,
    next_attempt_at: Timestamp,
    backoff_secs: u64,
}

/// Composition root: owns every storage engine plus the gossip handle, and
/// is the only thing allowed to apply a `GossipEvent` or originate a wire
/// message (spec §4.7 "the mesh coordinator"). Mirrors the teacher's
/// node-main wiring, split so the binary crate stays thin.
pub struct Coordinator {
    wallet: KeyPair,
    config: MeshConfig,
    ledger: LedgerEngine,
    capsules: CapsuleStore,
    rating: RatingEngine,
    bazaar: TaskBazaar,
    worker: TaskWorker,

    outbound_tx: mpsc::Sender<Envelope>,
    peers: Arc<PeerTable>,
    local_node_id: NodeId,

    pending_txs: Mutex<HashMap<TxId, PendingTx>>,
}

impl Coordinator {
    pub fn new(wallet: KeyPair, config: MeshConfig, mode: LedgerMode, gossip: GossipHandle) -> MeshResult<(Arc<Self>, mpsc::Receiver<cmesh_p2p::Delivery>)> {
        let GossipHandle { outbound_tx, inbound_rx, peers, local_node_id } = gossip;

        let ledger_db = Arc::new(StateDb::open(config.ledger_dir()).map_err(storage_err)?);
        let ledger = LedgerEngine::open(ledger_db, mode);
        if mode == LedgerMode::Leader {
            ledger.initialize(&wallet, config.genesis_supply)?;
        }

        let capsules = CapsuleStore::open(config.capsule_dir())?;
        let rating = RatingEngine::open(config.rating_dir(), config.rating)?;
        let bazaar = TaskBazaar::open(config.bazaar_dir())?;
        let worker = TaskWorker::new(local_node_id.clone());

        let rehydrated = bazaar.rehydrate()?;
        info!(tasks = rehydrated, mode = ?mode, "coordinator state rehydrated");

        let coordinator = Arc::new(Self {
            wallet,
            config,
            ledger,
            capsules,
            rating,
            bazaar,
            worker,
            outbound_tx,
            peers,
            local_node_id,
            pending_txs: Mutex::new(HashMap::new()),
        });
        Ok((coordinator, inbound_rx))
    }

    pub fn account_id(&self) -> &AccountId {
        &self.wallet.account_id
    }

    pub fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    pub fn capsules(&self) -> &CapsuleStore {
        &self.capsules
    }

    pub fn bazaar(&self) -> &TaskBazaar {
        &self.bazaar
    }

    pub fn rating(&self) -> &RatingEngine {
        &self.rating
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.len().await
    }

    async fn broadcast(&self, payload: GossipPayload, hops: u32) {
        let env = Envelope::originate(payload, hops, now_ms());
        if self.outbound_tx.send(env).await.is_err() {
            warn!("outbound gossip channel closed, dropping broadcast");
        }
    }

    fn hops_for(&self, payload: &GossipPayload) -> u32 {
        if payload.is_task_kind() {
            self.config.p2p.hops_task
        } else {
            self.config.p2p.hops_default
        }
    }

    async fn broadcast_auto(&self, payload: GossipPayload) {
        let hops = self.hops_for(&payload);
        self.broadcast(payload, hops).await;
    }

    // ── Public surface (spec §4.7) ───────────────────────────────────────────

    /// Submit a transaction. The leader appends it directly and broadcasts
    /// the resulting log entry; a follower broadcasts the raw transaction
    /// and enqueues it for re-broadcast until it's observed applied.
    pub async fn submit_tx(&self, tx: Transaction) -> MeshResult<TxId> {
        match self.ledger.mode() {
            LedgerMode::Leader => {
                let (seq, tx_id) = self.ledger.submit_local_as_leader(tx.clone())?;
                self.broadcast_auto(GossipPayload::TxLog { entry: LogEntry { seq, tx } }).await;
                self.bazaar.scan_pending_escrow(&self.ledger)?;
                Ok(tx_id)
            }
            LedgerMode::Follower => {
                let tx_id = tx.tx_id.clone();
                self.broadcast_auto(GossipPayload::Tx { tx: tx.clone() }).await;
                let mut guard = self.pending_txs.lock().await;
                guard.insert(
                    tx_id.clone(),
                    PendingTx {
                        tx,
                        next_attempt_at: now_ms() + (self.config.rebroadcast_initial_secs as i64) * 1000,
                        backoff_secs: self.config.rebroadcast_initial_secs,
                    },
                );
                Ok(tx_id)
            }
        }
    }

    /// Poll confirmations for `tx_id` until `target` is reached or the
    /// timeout elapses; returns the highest confirmation count observed.
    pub async fn wait_for_confirmations(&self, tx_id: &TxId, target: u64) -> u64 {
        let deadline = now_ms() + (self.config.confirmation_timeout_secs as i64) * 1000;
        loop {
            let observed = self.ledger.confirmations(tx_id).unwrap_or(0);
            if observed >= target || now_ms() >= deadline {
                return observed;
            }
            tokio::time::sleep(Duration::from_millis(self.config.confirmation_poll_interval_ms)).await;
        }
    }

    /// Publish a capsule: store content locally, optionally pay the publish
    /// fee, then broadcast the public metadata.
    pub async fn publish_capsule(
        &self,
        content: Vec<u8>,
        capsule_type: String,
        tags: Vec<String>,
        price: Price,
    ) -> MeshResult<CapsuleRecord> {
        if self.config.capsule_publish_fee > 0 {
            self.pay_fee(self.config.capsule_publish_fee).await?;
        }

        let asset_id = AssetId::derive(&content);
        let record = CapsuleRecord {
            asset_id,
            capsule_type,
            confidence: 1.0,
            attribution: Attribution { creator: self.wallet.account_id.clone() },
            tags,
            price,
            status: CapsuleStatus::Active,
        };
        let record = self.capsules.publish(record, &content)?;

        let content_hash = record.asset_id.as_str().trim_start_matches("sha256:").to_string();
        self.broadcast_auto(GossipPayload::Capsule { capsule: record.clone(), content_hash }).await;
        Ok(record)
    }

    /// Publish a task: escrow the bounty, optionally pay the publish fee,
    /// persist as `pending_escrow`, then broadcast.
    pub async fn publish_task(&self, description: String, bounty: Bounty, tags: Vec<String>) -> MeshResult<Task> {
        if self.config.task_publish_fee > 0 {
            self.pay_fee(self.config.task_publish_fee).await?;
        }

        let published_at = now_ms();
        let task_id = TaskId::derive(&description, &self.wallet.account_id, published_at);
        let escrow_account = escrow_account_id(&task_id);

        let escrow_tx = self.build_transfer(escrow_account.clone(), bounty.amount).await?;
        let escrow_tx_id = self.submit_tx(escrow_tx).await?;
        self.wait_for_confirmations(&escrow_tx_id, self.config.confirmation_target).await;

        let task = Task::new(task_id, description, self.wallet.account_id.clone(), published_at, bounty, escrow_account, tags);
        let task = self.bazaar.publish(task)?;
        self.broadcast_auto(GossipPayload::Task { task: task.clone() }).await;
        self.bazaar.scan_pending_escrow(&self.ledger)?;
        Ok(task)
    }

    /// Purchase a capsule: pay creator and platform shares, wait for
    /// confirmation, then grant and return the private content.
    pub async fn purchase_capsule(&self, asset_id: &AssetId) -> MeshResult<Vec<u8>> {
        let record = self
            .capsules
            .get(asset_id)?
            .ok_or_else(|| MeshError::CapsuleNotFound(asset_id.to_string()))?;

        let creator_amount = record.price.creator_amount();
        let platform_amount = record.price.platform_amount();

        let mut last_tx_id = None;
        if creator_amount > 0 {
            let tx = self.build_transfer(record.attribution.creator.clone(), creator_amount).await?;
            last_tx_id = Some(self.submit_tx(tx).await?);
        }
        if platform_amount > 0 {
            let tx = self.build_transfer(self.config.platform_account.clone(), platform_amount).await?;
            last_tx_id = Some(self.submit_tx(tx).await?);
        }
        if let Some(tx_id) = last_tx_id {
            self.wait_for_confirmations(&tx_id, self.config.confirmation_target).await;
        }

        self.capsules.grant_access(asset_id, &self.wallet.account_id)?;
        self.capsules
            .get_content_for(asset_id, &self.wallet.account_id)?
            .ok_or_else(|| MeshError::CapsuleNotFound(asset_id.to_string()))
    }

    async fn pay_fee(&self, amount: cmesh_core::Balance) -> MeshResult<()> {
        let tx = self.build_transfer(self.config.platform_account.clone(), amount).await?;
        let tx_id = self.submit_tx(tx).await?;
        self.wait_for_confirmations(&tx_id, self.config.confirmation_target).await;
        Ok(())
    }

    async fn build_transfer(&self, to: AccountId, amount: cmesh_core::Balance) -> MeshResult<Transaction> {
        let nonce = self.ledger.nonce(&self.wallet.account_id) + 1;
        Ok(cmesh_crypto::build_signed_transaction(
            &self.wallet,
            TxType::Transfer,
            self.wallet.account_id.clone(),
            to,
            amount,
            nonce,
            now_ms(),
        ))
    }

    fn emit_escrow_release(&self, task: &Task) -> MeshResult<()> {
        if self.ledger.mode() != LedgerMode::Leader {
            return Ok(());
        }
        let Some(winner) = task.assigned_to.clone() else { return Ok(()) };
        let winner_account = AccountId::from(winner);
        let nonce = self.ledger.nonce(&task.escrow_account_id) + 1;
        let tx = cmesh_crypto::build_signed_transaction(
            &self.wallet,
            TxType::EscrowRelease,
            task.escrow_account_id.clone(),
            winner_account,
            task.bounty.amount,
            nonce,
            now_ms(),
        );
        let (seq, _) = self.ledger.submit_local_as_leader(tx.clone())?;
        debug!(task_id = %task.task_id, seq, "escrow released to winner");
        Ok(())
    }

    // ── Inbound gossip dispatch (spec §9) ────────────────────────────────────

    /// Apply one inbound gossip delivery. Handlers never throw across the
    /// scheduler: the caller logs and continues on `Err`.
    pub async fn handle(&self, event: GossipEvent) -> MeshResult<()> {
        match event.payload {
            GossipPayload::Capsule { capsule, .. } => self.capsules.store_remote_metadata(capsule),

            GossipPayload::Task { task } => self.bazaar.receive_remote(task),

            GossipPayload::TaskBid { task_id, bid } => match self.bazaar.record_bid(&task_id, bid) {
                Ok(_) => Ok(()),
                Err(MeshError::DuplicateBid { .. }) => Ok(()),
                Err(e) => Err(e),
            },

            GossipPayload::TaskAssigned { task_id, assigned_to, assigned_at } => {
                self.bazaar.record_assigned(&task_id, assigned_to, assigned_at)
            }

            GossipPayload::TaskCompleted { task_id, node_id, result, .. } => {
                let task = self.bazaar.record_completion(&task_id, node_id.clone(), now_ms(), result)?;
                if let Some(assigned_at) = task.assigned_at {
                    let completed_at = task.completed_at.unwrap_or(assigned_at);
                    let duration_ms = completed_at.saturating_sub(assigned_at).max(0) as u64;
                    self.rating.record_completion(&node_id, duration_ms)?;
                }
                self.emit_escrow_release(&task)
            }

            GossipPayload::TaskFailed { task_id, node_id } => {
                self.bazaar.record_failure(&task_id, &node_id)?;
                self.rating.record_failure(&node_id)?;
                Ok(())
            }

            GossipPayload::TaskLike { task_id, winner_node_id, liked_by } => {
                self.rating.add_like(&task_id, &winner_node_id, &liked_by)?;
                Ok(())
            }

            GossipPayload::Tx { tx } => {
                if self.ledger.mode() == LedgerMode::Leader {
                    let (seq, _) = self.ledger.submit_local_as_leader(tx.clone())?;
                    self.broadcast_auto(GossipPayload::TxLog { entry: LogEntry { seq, tx } }).await;
                    self.bazaar.scan_pending_escrow(&self.ledger)?;
                }
                Ok(())
            }

            GossipPayload::TxLog { entry } => {
                if self.ledger.mode() != LedgerMode::Follower {
                    return Ok(());
                }
                match self.ledger.apply_remote_entry(entry) {
                    Ok(()) => {
                        self.bazaar.scan_pending_escrow(&self.ledger)?;
                        Ok(())
                    }
                    Err(MeshError::OutOfOrder { expected, .. }) => {
                        self.broadcast_auto(GossipPayload::TxLogRequest {
                            since_seq: expected.saturating_sub(1),
                            limit: None,
                        })
                        .await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }

            GossipPayload::TxLogRequest { since_seq, limit } => {
                let entries = self.ledger.entries_since(since_seq, limit.unwrap_or(cmesh_core::DEFAULT_LOG_BATCH_LIMIT));
                let last_seq = self.ledger.last_seq();
                let has_more = since_seq + entries.len() as u64 + 1 <= last_seq;
                self.broadcast_auto(GossipPayload::TxLogBatch { entries, last_seq, has_more }).await;
                Ok(())
            }

            GossipPayload::TxLogBatch { entries, .. } => {
                if self.ledger.mode() != LedgerMode::Follower {
                    return Ok(());
                }
                for entry in entries {
                    match self.ledger.apply_remote_entry(entry) {
                        Ok(()) => {}
                        Err(MeshError::OutOfOrder { .. }) => break,
                        Err(e) => return Err(e),
                    }
                }
                self.bazaar.scan_pending_escrow(&self.ledger)?;
                Ok(())
            }

            GossipPayload::LedgerHeadRequest {} => {
                let leader_account = self.ledger.leader_pubkey_pem().map(|pem| cmesh_crypto::account_id_from_pem(&pem));
                self.broadcast_auto(GossipPayload::LedgerHeadResponse { last_seq: self.ledger.last_seq(), leader_account }).await;
                Ok(())
            }

            GossipPayload::LedgerHeadResponse { last_seq, .. } => {
                debug!(from = %event.from_peer, last_seq, "peer ledger head observed");
                Ok(())
            }

            // Dashboard query surface is out of scope; these never originate
            // from this implementation and are dropped on arrival.
            GossipPayload::Query { .. } | GossipPayload::QueryResponse { .. } => Ok(()),

            // Handled entirely inside the transport before reaching the
            // coordinator; listed so this match stays exhaustive.
            GossipPayload::Handshake { .. } | GossipPayload::Ping { .. } | GossipPayload::Pong { .. } => Ok(()),
        }
    }

    // ── Periodic workers ─────────────────────────────────────────────────────

    async fn scan_and_broadcast_bids(&self) -> MeshResult<()> {
        let actions = self.worker.scan_and_bid(&self.bazaar, &self.rating, now_ms())?;
        for action in actions {
            if let WorkerAction::Bid { task_id, bid } = action {
                if self.bazaar.record_bid(&task_id, bid.clone()).is_ok() {
                    self.broadcast_auto(GossipPayload::TaskBid { task_id, bid }).await;
                }
            }
        }
        Ok(())
    }

    async fn finalize_ready_votes(&self) -> MeshResult<()> {
        let now = now_ms();
        for task_id in self.bazaar.tasks_ready_for_selection(now)? {
            let Some(task) = self.bazaar.get(&task_id)? else { continue };
            if task.publisher != self.wallet.account_id {
                continue;
            }
            let winner = self.bazaar.select_winner(&task_id, now)?;
            self.broadcast_auto(GossipPayload::TaskAssigned {
                task_id,
                assigned_to: winner.node_id.clone(),
                assigned_at: now,
            })
            .await;
        }
        Ok(())
    }

    async fn process_worker_assignments(&self) -> MeshResult<()> {
        for action in self.worker.process_assignments(&self.bazaar)? {
            match action {
                WorkerAction::Completed { task_id, node_id, result, package } => {
                    let completed_at = now_ms();
                    let task = self.bazaar.record_completion(&task_id, node_id.clone(), completed_at, result.clone())?;
                    if let Some(assigned_at) = task.assigned_at {
                        let duration_ms = completed_at.saturating_sub(assigned_at).max(0) as u64;
                        self.rating.record_completion(&node_id, duration_ms)?;
                    }
                    self.emit_escrow_release(&task)?;
                    self.broadcast_auto(GossipPayload::TaskCompleted { task_id, node_id, result, package }).await;
                }
                WorkerAction::Failed { task_id, node_id } => {
                    self.bazaar.record_failure(&task_id, &node_id)?;
                    self.rating.record_failure(&node_id)?;
                    self.broadcast_auto(GossipPayload::TaskFailed { task_id, node_id }).await;
                }
                WorkerAction::Bid { .. } => {}
            }
        }
        Ok(())
    }

    async fn rebroadcast_pending(&self) {
        if self.ledger.mode() != LedgerMode::Follower {
            return;
        }
        let now = now_ms();
        let mut to_send = Vec::new();
        {
            let mut guard = self.pending_txs.lock().await;
            let confirmed: Vec<TxId> = guard
                .keys()
                .filter(|id| self.ledger.confirmations(id).is_some())
                .cloned()
                .collect();
            for id in confirmed {
                guard.remove(&id);
            }
            for (id, pending) in guard.iter_mut() {
                if now >= pending.next_attempt_at {
                    to_send.push(pending.tx.clone());
                    pending.backoff_secs = (pending.backoff_secs * 2).min(self.config.rebroadcast_max_secs);
                    pending.next_attempt_at = now + (pending.backoff_secs as i64) * 1000;
                    debug!(tx_id = %id, backoff = pending.backoff_secs, "re-broadcasting unconfirmed transaction");
                }
            }
        }
        for tx in to_send {
            self.broadcast_auto(GossipPayload::Tx { tx }).await;
        }
    }

    async fn request_ledger_sync(&self, full: bool) {
        let since_seq = if full { 0 } else { self.ledger.last_seq() };
        self.broadcast_auto(GossipPayload::TxLogRequest { since_seq, limit: None }).await;
    }

    /// Drive the inbound gossip loop and every periodic scanner. Runs until
    /// the inbound channel closes (the transport shut down).
    pub async fn run(self: Arc<Self>, mut inbound_rx: mpsc::Receiver<cmesh_p2p::Delivery>) {
        let mut bid_scan = tokio::time::interval(Duration::from_secs(self.config.bid_scan_interval_secs));
        let mut vote_scan = tokio::time::interval(Duration::from_secs(self.config.vote_scan_interval_secs));
        let mut assignment_scan = tokio::time::interval(Duration::from_secs(self.config.bid_scan_interval_secs));
        let mut ledger_sync = tokio::time::interval(Duration::from_secs(self.config.ledger_sync_interval_secs));
        let mut ledger_full_resync = tokio::time::interval(Duration::from_secs(self.config.ledger_full_resync_interval_secs));
        let mut rebroadcast = tokio::time::interval(Duration::from_secs(self.config.rebroadcast_initial_secs));

        loop {
            tokio::select! {
                delivery = inbound_rx.recv() => {
                    let Some((envelope, from_peer)) = delivery else { break };
                    let event = GossipEvent::new(from_peer, envelope.payload);
                    if let Err(e) = self.handle(event).await {
                        warn!(error = %e, "gossip handler failed");
                    }
                }
                _ = bid_scan.tick() => {
                    if let Err(e) = self.scan_and_broadcast_bids().await {
                        warn!(error = %e, "bid scan failed");
                    }
                }
                _ = vote_scan.tick() => {
                    if let Err(e) = self.finalize_ready_votes().await {
                        warn!(error = %e, "vote finalization failed");
                    }
                }
                _ = assignment_scan.tick() => {
                    if let Err(e) = self.process_worker_assignments().await {
                        warn!(error = %e, "assignment processing failed");
                    }
                }
                _ = ledger_sync.tick() => {
                    if self.ledger.mode() == LedgerMode::Follower {
                        self.request_ledger_sync(false).await;
                    }
                }
                _ = ledger_full_resync.tick() => {
                    if self.ledger.mode() == LedgerMode::Follower {
                        self.request_ledger_sync(true).await;
                    }
                }
                _ = rebroadcast.tick() => {
                    self.rebroadcast_pending().await;
                }
            }
        }
        info!("coordinator inbound channel closed, run loop exiting");
    }
}

fn storage_err(e: impl std::fmt::Display) -> MeshError {
    MeshError::Storage(e.to_string())
}
