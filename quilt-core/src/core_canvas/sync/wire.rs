/*
    wire.rs - Frames exchanged between peers

    Three message kinds cross the transport:
    - OP: one operation, ids and sites as raw 16-byte strings, the value as
      the bincode encoding of its FieldValue
    - VERSION_SUMMARY: a peer's per-site high-water marks
    - PRESENCE: an ephemeral payload with a time-to-live in milliseconds

    Frames are bincode-encoded. Decoding only checks the envelope; turning
    a WireOp into an Operation is where ids, sites and values are checked,
    and failures there are MalformedOperation.
*/

use crate::core_canvas::crdt::{LogicalClock, Site, VersionSummary};
use crate::core_canvas::model::{EntityId, FieldValue, Operation};
use crate::core_canvas::presence::PresenceMessage;
use crate::core_canvas::store::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest frame accepted from a peer
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Op(WireOp),
    VersionSummary(WireSummary),
    Presence(WirePresence),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireStamp {
    pub counter: u64,
    pub site: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOp {
    pub entity_id: Vec<u8>,
    pub field: String,
    pub value: Vec<u8>,
    pub stamp: WireStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSummaryEntry {
    pub site: Vec<u8>,
    pub counter: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSummary {
    pub entries: Vec<WireSummaryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePresence {
    pub site: Vec<u8>,
    pub payload: Vec<u8>,
    pub ttl_ms: u32,
}

impl Frame {
    pub fn op(op: &Operation) -> StoreResult<Frame> {
        Ok(Frame::Op(WireOp::from_operation(op)?))
    }

    pub fn summary(summary: &VersionSummary) -> Frame {
        Frame::VersionSummary(WireSummary::from(summary))
    }

    pub fn presence(message: &PresenceMessage) -> Frame {
        Frame::Presence(WirePresence::from(message))
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Frame> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(StoreError::Deserialization(format!(
                "frame is {} bytes, limit {}",
                bytes.len(),
                MAX_FRAME_LEN
            )));
        }
        bincode::deserialize(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Op(_) => "OP",
            Frame::VersionSummary(_) => "VERSION_SUMMARY",
            Frame::Presence(_) => "PRESENCE",
        }
    }
}

impl WireOp {
    pub fn from_operation(op: &Operation) -> StoreResult<WireOp> {
        Ok(WireOp {
            entity_id: op.entity_id.as_bytes().to_vec(),
            field: op.field.clone(),
            value: op.value.to_bytes()?,
            stamp: WireStamp { counter: op.stamp.counter, site: op.stamp.site.as_bytes().to_vec() },
        })
    }
}

impl TryFrom<WireOp> for Operation {
    type Error = StoreError;

    fn try_from(wire: WireOp) -> StoreResult<Operation> {
        let entity_id = EntityId::from_slice(&wire.entity_id).ok_or_else(|| {
            StoreError::MalformedOperation(format!("entity id is {} bytes, expected {}", wire.entity_id.len(), EntityId::WIDTH))
        })?;
        let site = Site::from_slice(&wire.stamp.site).ok_or_else(|| {
            StoreError::MalformedOperation(format!("site is {} bytes, expected {}", wire.stamp.site.len(), Site::WIDTH))
        })?;
        let value = FieldValue::from_bytes(&wire.value)
            .map_err(|e| StoreError::MalformedOperation(format!("undecodable value: {e}")))?;

        Ok(Operation::new(entity_id, wire.field, value, LogicalClock::new(wire.stamp.counter, site)))
    }
}

impl From<&VersionSummary> for WireSummary {
    fn from(summary: &VersionSummary) -> Self {
        WireSummary {
            entries: summary
                .iter()
                .map(|(site, counter)| WireSummaryEntry { site: site.as_bytes().to_vec(), counter: *counter })
                .collect(),
        }
    }
}

impl TryFrom<WireSummary> for VersionSummary {
    type Error = StoreError;

    fn try_from(wire: WireSummary) -> StoreResult<VersionSummary> {
        let mut summary = VersionSummary::new();
        for entry in wire.entries {
            let site = Site::from_slice(&entry.site).ok_or_else(|| {
                StoreError::Deserialization(format!("summary site is {} bytes, expected {}", entry.site.len(), Site::WIDTH))
            })?;
            summary.set(site, entry.counter);
        }
        Ok(summary)
    }
}

impl From<&PresenceMessage> for WirePresence {
    fn from(message: &PresenceMessage) -> Self {
        WirePresence {
            site: message.site.as_bytes().to_vec(),
            payload: message.payload.clone(),
            ttl_ms: u32::try_from(message.ttl.as_millis()).unwrap_or(u32::MAX),
        }
    }
}

impl TryFrom<WirePresence> for PresenceMessage {
    type Error = StoreError;

    fn try_from(wire: WirePresence) -> StoreResult<PresenceMessage> {
        let site = Site::from_slice(&wire.site).ok_or_else(|| {
            StoreError::Deserialization(format!("presence site is {} bytes, expected {}", wire.site.len(), Site::WIDTH))
        })?;
        Ok(PresenceMessage { site, payload: wire.payload, ttl: Duration::from_millis(u64::from(wire.ttl_ms)) })
    }
}
