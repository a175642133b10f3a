/*
    channel.rs - Ephemeral per-peer presence

    Presence (cursor position, selection, display name...) is opaque bytes
    with a time-to-live. It is not replicated state: no clock stamps, no
    merging, no persistence. The latest message received from a peer
    replaces that peer's entry, and entries disappear once they expire.

    Time is `tokio::time::Instant` so tests can drive expiry with paused
    time.
*/

use crate::core_canvas::crdt::Site;
use crate::core_canvas::store::{StoreError, StoreResult};
use crate::metrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

/// Helper to convert lock poisoning errors to StoreError
fn handle_poison<T>(_err: PoisonError<T>) -> StoreError {
    StoreError::InvalidOperation("Lock poisoned: a thread panicked while holding the presence lock".to_string())
}

/// A presence announcement as it travels between peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceMessage {
    pub site: Site,
    pub payload: Vec<u8>,
    pub ttl: Duration,
}

/// One peer's current presence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub site: Site,
    pub payload: Vec<u8>,
    pub expires_at: Instant,
}

impl PresenceEntry {
    /// An entry is live up to and including its expiry instant
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at >= now
    }
}

#[derive(Debug, Clone)]
struct PresenceUpdate {
    site: Site,
    payload: Vec<u8>,
}

/// Shared presence table for one replica
///
/// Cloning is cheap; clones share the same table and subscribers.
#[derive(Clone)]
pub struct PresenceChannel {
    local: Site,
    entries: Arc<Mutex<HashMap<Site, PresenceEntry>>>,
    updates: broadcast::Sender<PresenceUpdate>,
    outgoing: broadcast::Sender<PresenceMessage>,
}

impl PresenceChannel {
    pub fn new(local: Site, capacity: usize) -> Self {
        let (updates, _rx) = broadcast::channel(capacity.max(1));
        let (outgoing, _rx) = broadcast::channel(capacity.max(1));
        PresenceChannel { local, entries: Arc::new(Mutex::new(HashMap::new())), updates, outgoing }
    }

    pub fn local_site(&self) -> Site {
        self.local
    }

    /// Set this replica's presence; returns the message to send to all peers
    pub fn publish(&self, payload: Vec<u8>, ttl: Duration) -> StoreResult<PresenceMessage> {
        self.publish_at(payload, ttl, Instant::now())
    }

    pub fn publish_at(&self, payload: Vec<u8>, ttl: Duration, now: Instant) -> StoreResult<PresenceMessage> {
        self.install(self.local, payload.clone(), now + ttl)?;
        let message = PresenceMessage { site: self.local, payload, ttl };
        let _ = self.outgoing.send(message.clone());
        Ok(message)
    }

    /// Messages this replica publishes from now on, for sessions to forward
    pub fn subscribe_outgoing(&self) -> broadcast::Receiver<PresenceMessage> {
        self.outgoing.subscribe()
    }

    /// Install a peer's announcement, replacing whatever it sent before
    ///
    /// Received announcements are never re-published, so presence only
    /// reaches directly connected peers.
    pub fn receive(&self, message: PresenceMessage) -> StoreResult<()> {
        self.receive_at(message, Instant::now())
    }

    pub fn receive_at(&self, message: PresenceMessage, now: Instant) -> StoreResult<()> {
        if message.site == self.local {
            debug!(site = %message.site, "ignoring echo of own presence");
            return Ok(());
        }
        self.install(message.site, message.payload, now + message.ttl)
    }

    /// Payloads announced by `site` from now on
    pub fn on_update(&self, site: Site) -> impl Stream<Item = Vec<u8>> + Send + Unpin + 'static {
        BroadcastStream::new(self.updates.subscribe()).filter_map(move |item| match item {
            Ok(update) if update.site == site => Some(update.payload),
            Ok(_) => None,
            Err(err) => {
                warn!(%site, error = %err, "presence subscriber lagged");
                None
            }
        })
    }

    /// Drop entries that expired before `now`; returns their sites
    pub fn sweep(&self, now: Instant) -> StoreResult<Vec<Site>> {
        let mut entries = self.entries.lock().map_err(handle_poison)?;
        let expired: Vec<Site> =
            entries.values().filter(|entry| !entry.is_live(now)).map(|entry| entry.site).collect();
        for site in &expired {
            entries.remove(site);
        }
        metrics::record_gauge(metrics::PRESENCE_PEERS, entries.len() as f64);
        if !expired.is_empty() {
            debug!(count = expired.len(), "presence entries expired");
        }
        Ok(expired)
    }

    pub fn get(&self, site: &Site) -> StoreResult<Option<PresenceEntry>> {
        let entries = self.entries.lock().map_err(handle_poison)?;
        Ok(entries.get(site).cloned())
    }

    /// Every entry currently held, expired-but-unswept ones included
    pub fn peers(&self) -> StoreResult<Vec<PresenceEntry>> {
        let entries = self.entries.lock().map_err(handle_poison)?;
        Ok(entries.values().cloned().collect())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.lock().map_err(handle_poison)?.len())
    }

    fn install(&self, site: Site, payload: Vec<u8>, expires_at: Instant) -> StoreResult<()> {
        {
            let mut entries = self.entries.lock().map_err(handle_poison)?;
            entries.insert(site, PresenceEntry { site, payload: payload.clone(), expires_at });
            metrics::record_gauge(metrics::PRESENCE_PEERS, entries.len() as f64);
        }
        let _ = self.updates.send(PresenceUpdate { site, payload });
        Ok(())
    }
}
