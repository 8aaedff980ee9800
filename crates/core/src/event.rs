//! Domain events: immutable facts recorded by aggregates.

use std::cell::Cell;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::Id;

thread_local! {
    static LAST_OCCURRED_AT: Cell<Option<DateTime<Utc>>> = const { Cell::new(None) };
}

/// Wall-clock time that never goes backwards on the calling thread.
fn monotonic_now() -> DateTime<Utc> {
    LAST_OCCURRED_AT.with(|last| {
        let now = Utc::now();
        let ts = match last.get() {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        last.set(Some(ts));
        ts
    })
}

/// Metadata carried by every domain event.
///
/// Equality is by `event_id` only: two events created separately are never
/// equal, even with identical payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    event_id: Uuid,
    occurred_at: DateTime<Utc>,

    aggregate_id: Id,
    aggregate_type: String,

    /// Optional position of the event in the aggregate stream.
    sequence: Option<u64>,
}

impl EventMetadata {
    /// Metadata for a new event raised now by the given aggregate.
    pub fn new(aggregate_id: impl Into<Id>, aggregate_type: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: monotonic_now(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            sequence: None,
        }
    }

    /// Rebuild metadata for an event that already exists (e.g. loaded from a log).
    pub fn restore(
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        aggregate_id: impl Into<Id>,
        aggregate_type: impl Into<String>,
        sequence: Option<u64>,
    ) -> Self {
        Self {
            event_id,
            occurred_at,
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            sequence,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn aggregate_id(&self) -> Id {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }
}

impl PartialEq for EventMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.event_id == other.event_id
    }
}

impl Eq for EventMetadata {}

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - owned by exactly one aggregate (`metadata().aggregate_id()`)
/// - buffered by the aggregate until committed
pub trait DomainEvent: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "sales.order.placed").
    fn event_type(&self) -> &'static str;

    fn metadata(&self) -> &EventMetadata;

    fn event_id(&self) -> Uuid {
        self.metadata().event_id()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata().occurred_at()
    }
}
