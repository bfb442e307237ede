//! Ledger events and the journal they are recorded in
//!
//! Events are the ledger's only externally observable output. Each one is
//! appended to an [`EventJournal`] in the same critical section as the state
//! change it describes, so journal order is commit order. Observers read the
//! journal through [`EventSource`], resuming from the cursor they last saw.

use std::collections::VecDeque;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::LeafType;

/// A deposit was appended to the exit tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub leaf_type: LeafType,
    pub origin_network: u32,
    pub origin_address: Address,
    pub destination_network: u32,
    pub destination_address: Address,
    pub amount: U256,
    pub metadata: Bytes,
    /// Index of the new leaf.
    pub deposit_count: u32,
}

/// A deposit from another network was claimed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEvent {
    pub global_index: U256,
    pub origin_network: u32,
    pub origin_address: Address,
    pub destination_address: Address,
    pub amount: U256,
}

/// First claim of a foreign token created its wrapped representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWrappedToken {
    pub origin_network: u32,
    pub origin_token_address: Address,
    pub wrapped_token_address: Address,
    pub metadata: Bytes,
}

/// A new global exit root was committed into the L1-info tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateL1InfoTree {
    pub mainnet_exit_root: B256,
    pub rollup_exit_root: B256,
    pub global_exit_root: B256,
    pub l1_info_index: u32,
    pub l1_info_root: B256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Bridge(BridgeEvent),
    Claim(ClaimEvent),
    NewWrappedToken(NewWrappedToken),
    UpdateL1InfoTree(UpdateL1InfoTree),
    EmergencyStateActivated,
    EmergencyStateDeactivated,
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Bridge(_) => "BridgeEvent",
            LedgerEvent::Claim(_) => "ClaimEvent",
            LedgerEvent::NewWrappedToken(_) => "NewWrappedToken",
            LedgerEvent::UpdateL1InfoTree(_) => "UpdateL1InfoTree",
            LedgerEvent::EmergencyStateActivated => "EmergencyStateActivated",
            LedgerEvent::EmergencyStateDeactivated => "EmergencyStateDeactivated",
        }
    }
}

// ============================================================================
// Journal & Sources
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub cursor: u64,
    pub event: LedgerEvent,
}

/// A page of events and the cursor to resume from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatch {
    pub entries: Vec<JournalEntry>,
    pub next_cursor: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Event source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to decode events: {0}")]
    Decode(String),

    #[error("Cursor {cursor} is ahead of the source head {head}")]
    CursorAhead { cursor: u64, head: u64 },

    #[error("Cursor {cursor} was pruned; oldest retained event is {oldest}")]
    CursorPruned { cursor: u64, oldest: u64 },
}

/// A restartable sequence of ledger events.
///
/// `fetch` never skips: entries are returned in order starting exactly at
/// `from`, and `next_cursor` is where the following call should resume.
pub trait EventSource {
    fn fetch(&mut self, from: u64, limit: usize) -> Result<EventBatch, SourceError>;
}

/// Append-only event log with absolute cursors.
///
/// Unbounded by default. With a retention limit only the newest events are
/// kept; cursors stay absolute and reading below the oldest retained one
/// fails with [`SourceError::CursorPruned`].
#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    events: VecDeque<LedgerEvent>,
    /// Cursor of `events[0]`.
    oldest: u64,
    retention: Option<usize>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retention` events (at least one).
    pub fn with_retention(retention: usize) -> Self {
        Self {
            retention: Some(retention.max(1)),
            ..Self::default()
        }
    }

    pub fn push(&mut self, event: LedgerEvent) -> u64 {
        let cursor = self.head();
        self.events.push_back(event);
        if let Some(retention) = self.retention {
            while self.events.len() > retention {
                self.events.pop_front();
                self.oldest += 1;
            }
        }
        cursor
    }

    /// Events currently retained.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn oldest(&self) -> u64 {
        self.oldest
    }

    pub fn head(&self) -> u64 {
        self.oldest + self.events.len() as u64
    }

    pub fn since(&self, from: u64, limit: usize) -> Result<EventBatch, SourceError> {
        let head = self.head();
        if from > head {
            return Err(SourceError::CursorAhead { cursor: from, head });
        }
        if from < self.oldest {
            return Err(SourceError::CursorPruned {
                cursor: from,
                oldest: self.oldest,
            });
        }

        let entries: Vec<JournalEntry> = self
            .events
            .iter()
            .skip((from - self.oldest) as usize)
            .take(limit)
            .zip(from..)
            .map(|(event, cursor)| JournalEntry {
                cursor,
                event: event.clone(),
            })
            .collect();
        let next_cursor = from + entries.len() as u64;

        Ok(EventBatch {
            entries,
            next_cursor,
        })
    }
}

impl EventSource for EventJournal {
    fn fetch(&mut self, from: u64, limit: usize) -> Result<EventBatch, SourceError> {
        self.since(from, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(amount: u64) -> LedgerEvent {
        LedgerEvent::Claim(ClaimEvent {
            global_index: U256::from(amount),
            origin_network: 1,
            origin_address: Address::ZERO,
            destination_address: Address::repeat_byte(1),
            amount: U256::from(amount),
        })
    }

    #[test]
    fn test_journal_pages() {
        let mut journal = EventJournal::new();
        for i in 0..5 {
            assert_eq!(journal.push(claim(i)), i);
        }

        let first = journal.fetch(0, 2).unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_cursor, 2);

        let rest = journal.fetch(first.next_cursor, 10).unwrap();
        assert_eq!(rest.entries.len(), 3);
        assert_eq!(rest.entries[0].cursor, 2);
        assert_eq!(rest.next_cursor, 5);

        let empty = journal.fetch(5, 10).unwrap();
        assert!(empty.entries.is_empty());
        assert_eq!(empty.next_cursor, 5);
    }

    #[test]
    fn test_journal_restart_from_checkpoint() {
        let mut journal = EventJournal::new();
        journal.push(claim(1));
        let checkpoint = journal.fetch(0, 10).unwrap().next_cursor;

        journal.push(claim(2));
        let resumed = journal.fetch(checkpoint, 10).unwrap();
        assert_eq!(resumed.entries.len(), 1);
        assert_eq!(resumed.entries[0].event, claim(2));
    }

    #[test]
    fn test_cursor_ahead() {
        let mut journal = EventJournal::new();
        assert_eq!(
            journal.fetch(3, 1),
            Err(SourceError::CursorAhead { cursor: 3, head: 0 })
        );
    }

    #[test]
    fn test_retention_keeps_absolute_cursors() {
        let mut journal = EventJournal::with_retention(3);
        for i in 0..5 {
            assert_eq!(journal.push(claim(i)), i);
        }
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.oldest(), 2);
        assert_eq!(journal.head(), 5);

        let batch = journal.fetch(3, 10).unwrap();
        assert_eq!(batch.entries[0].cursor, 3);
        assert_eq!(batch.entries[0].event, claim(3));
        assert_eq!(batch.next_cursor, 5);

        assert_eq!(
            journal.fetch(1, 10),
            Err(SourceError::CursorPruned { cursor: 1, oldest: 2 })
        );
        assert_eq!(
            journal.fetch(6, 1),
            Err(SourceError::CursorAhead { cursor: 6, head: 5 })
        );
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(LedgerEvent::EmergencyStateActivated).unwrap();
        assert_eq!(json["type"], "emergency_state_activated");

        let json = serde_json::to_value(claim(7)).unwrap();
        assert_eq!(json["type"], "claim");
        assert_eq!(json["origin_network"], 1);

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, claim(7));
    }
}
