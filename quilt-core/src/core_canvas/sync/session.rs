/*
    session.rs - Async driver for one peer session

    Runs a SyncReconciler over a Transport:

    1. Subscribe to the replica's op notifications and read its summary
       under one lock, so nothing logged in between is missed
    2. Send our VERSION_SUMMARY, wait for the peer's, queue the delta
    3. Stream: interleave inbound frames, newly logged operations and
       outgoing presence with tokio::select!, flushing the queue after
       every event

    Presence received from the peer is installed locally and not relayed;
    it reaches directly connected peers only.

    A session ends when the peer closes, shutdown is signalled, or the op
    subscription lags. Lagging means notifications were lost, so the
    session gives up and the next negotiation recomputes the gap.
*/

use super::reconciler::{SyncReconciler, SyncState};
use super::transport::Transport;
use super::wire::Frame;
use crate::core_canvas::crdt::VersionSummary;
use crate::core_canvas::model::Operation;
use crate::core_canvas::presence::{PresenceChannel, PresenceMessage};
use crate::core_canvas::replica::{lock_replica, SharedReplica};
use crate::core_canvas::store::{StoreError, StoreResult};
use crate::metrics;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    PeerClosed,
    Shutdown,
    Lagged,
    ReplicaClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub end: SessionEnd,

    /// Size of the delta queued at negotiation
    pub backlog: usize,
    pub ops_sent: u64,
    pub ops_received: u64,

    /// Received operations that changed a register
    pub ops_applied: u64,

    /// Queued operations dropped at the end; still in the log
    pub undelivered: usize,
}

#[derive(Debug, Default)]
struct Counters {
    backlog: usize,
    ops_sent: u64,
    ops_received: u64,
    ops_applied: u64,
}

pub struct SyncSession<T: Transport> {
    replica: SharedReplica,
    transport: T,
    presence: Option<PresenceChannel>,
    shutdown: Option<watch::Receiver<bool>>,
    reconciler: SyncReconciler,
    counters: Counters,
}

impl<T: Transport> SyncSession<T> {
    pub fn new(replica: SharedReplica, transport: T) -> Self {
        SyncSession {
            replica,
            transport,
            presence: None,
            shutdown: None,
            reconciler: SyncReconciler::new(),
            counters: Counters::default(),
        }
    }

    /// Exchange presence over this session too
    pub fn with_presence(mut self, presence: PresenceChannel) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Stop once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> SyncState {
        self.reconciler.state()
    }

    /// Drive the session to completion
    pub async fn run(mut self) -> StoreResult<SessionReport> {
        metrics::session_started();
        let result = self.drive().await;
        metrics::session_ended();

        let undelivered = match &result {
            Ok(_) => self.reconciler.disconnect(),
            Err(err) => self.reconciler.on_transport_failure(err),
        };
        if let Err(err) = self.transport.close().await {
            debug!(error = %err, "closing transport failed");
        }

        let end = result?;
        info!(?end, sent = self.counters.ops_sent, received = self.counters.ops_received, "sync session ended");
        Ok(SessionReport {
            end,
            backlog: self.counters.backlog,
            ops_sent: self.counters.ops_sent,
            ops_received: self.counters.ops_received,
            ops_applied: self.counters.ops_applied,
            undelivered,
        })
    }

    async fn drive(&mut self) -> StoreResult<SessionEnd> {
        self.reconciler.connect()?;

        let (mut ops, summary) = {
            let replica = lock_replica(&self.replica)?;
            (replica.subscribe_ops(), replica.snapshot())
        };
        let mut outgoing_presence = self.presence.as_ref().map(PresenceChannel::subscribe_outgoing);

        self.transport.send(Frame::summary(&summary).encode()?).await?;

        loop {
            tokio::select! {
                inbound = self.transport.recv() => match inbound? {
                    Some(bytes) => self.handle_frame(&bytes)?,
                    None => return Ok(SessionEnd::PeerClosed),
                },
                op = ops.recv() => match op {
                    Ok(op) => {
                        self.reconciler.push(op);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "op subscription lagged, ending session for renegotiation");
                        return Ok(SessionEnd::Lagged);
                    }
                    Err(RecvError::Closed) => return Ok(SessionEnd::ReplicaClosed),
                },
                message = next_presence(&mut outgoing_presence) => {
                    self.transport.send(Frame::presence(&message).encode()?).await?;
                }
                _ = shutdown_signalled(&mut self.shutdown) => return Ok(SessionEnd::Shutdown),
            }
            self.flush().await?;
        }
    }

    /// Send everything the reconciler has queued
    async fn flush(&mut self) -> StoreResult<()> {
        let mut sent = 0u64;
        while let Some(op) = self.reconciler.next_outbound() {
            self.transport.send(Frame::op(&op)?.encode()?).await?;
            sent += 1;
        }
        if sent > 0 {
            self.counters.ops_sent += sent;
            lock_replica(&self.replica)?.add_ops_sent(sent);
        }
        Ok(())
    }

    fn handle_frame(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                lock_replica(&self.replica)?.record_malformed();
                return Ok(());
            }
        };

        match frame {
            Frame::VersionSummary(wire) => {
                let peer = VersionSummary::try_from(wire)?;
                if self.reconciler.state() == SyncState::Streaming {
                    self.reconciler.on_peer_progress(&peer);
                } else {
                    let replica = lock_replica(&self.replica)?;
                    self.counters.backlog = self.reconciler.on_peer_summary(peer, replica.log())?;
                }
            }
            Frame::Op(wire) => {
                self.counters.ops_received += 1;
                let op = match Operation::try_from(wire) {
                    Ok(op) => op,
                    Err(err) => {
                        warn!(error = %err, "dropping malformed operation");
                        lock_replica(&self.replica)?.record_malformed();
                        return Ok(());
                    }
                };
                let stamp = op.stamp;
                let applied = lock_replica(&self.replica)?.apply_remote(op.clone());
                match applied {
                    Ok(changed) => {
                        self.reconciler.note_received(&op);
                        if changed {
                            self.counters.ops_applied += 1;
                        }
                    }
                    // Already logged and counted by the replica
                    Err(StoreError::MalformedOperation(_)) => {
                        debug!(%stamp, "peer sent an invalid operation");
                    }
                    Err(err) => return Err(err),
                }
            }
            Frame::Presence(wire) => match (PresenceMessage::try_from(wire), &self.presence) {
                (Ok(message), Some(presence)) => presence.receive(message)?,
                (Ok(message), None) => debug!(site = %message.site, "no presence channel, dropping"),
                (Err(err), _) => warn!(error = %err, "dropping undecodable presence"),
            },
        }
        Ok(())
    }
}

async fn next_presence(rx: &mut Option<broadcast::Receiver<PresenceMessage>>) -> PresenceMessage {
    if let Some(rx) = rx {
        loop {
            match rx.recv().await {
                Ok(message) => return message,
                // Presence is ephemeral; the next publication supersedes what was lost
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    }
    std::future::pending().await
}

async fn shutdown_signalled(rx: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = rx {
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
    std::future::pending::<()>().await
}
