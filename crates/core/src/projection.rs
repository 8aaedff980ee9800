//! Projections: folding committed events into read models.
//!
//! A [`Projector`] turns one event into read model writes. A
//! [`ProjectionRunner`] feeds it events in stream order, tracking the last
//! sequence applied per aggregate so replays are skipped and gaps are reported.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{DomainError, DomainResult};
use crate::event::DomainEvent;
use crate::id::Id;

/// Projects events of one type into read models.
///
/// Projectors see each event at most once through a [`ProjectionRunner`], but
/// should still tolerate re-application after a rebuild.
pub trait Projector: Send + Sync {
    type Event: DomainEvent;

    fn project(&self, event: &Self::Event) -> DomainResult<()>;
}

/// Drives a [`Projector`], applying each aggregate's events in sequence order.
///
/// Every event must carry a sequence (see
/// [`AggregateRoot::event_metadata`](crate::AggregateRoot::event_metadata)).
/// The first event seen for an aggregate sets its starting point, so a runner
/// can be attached to a stream that is already in progress.
#[derive(Debug)]
pub struct ProjectionRunner<P> {
    projector: P,
    cursors: RwLock<HashMap<Id, u64>>,
}

impl<P: Projector> ProjectionRunner<P> {
    pub fn new(projector: P) -> Self {
        Self {
            projector,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn projector(&self) -> &P {
        &self.projector
    }

    pub fn into_projector(self) -> P {
        self.projector
    }

    /// Last sequence applied for `aggregate_id`, if any.
    pub fn last_sequence(&self, aggregate_id: impl Into<Id>) -> Option<u64> {
        let cursors = self.cursors.read().unwrap_or_else(PoisonError::into_inner);
        cursors.get(&aggregate_id.into()).copied()
    }

    /// Forget all cursors so the next events are applied from scratch.
    pub fn reset(&self) {
        self.cursors.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Apply one event. Returns `false` when it was already applied.
    ///
    /// Fails with `InvariantViolation` for an event without a sequence and with
    /// `Conflict` when the sequence skips ahead of the aggregate's cursor. The
    /// cursor only advances after the projector succeeds.
    pub fn apply(&self, event: &P::Event) -> DomainResult<bool> {
        let meta = event.metadata();
        let sequence = meta.sequence().ok_or_else(|| {
            DomainError::invariant(format!(
                "{} event {} has no sequence",
                event.event_type(),
                meta.event_id()
            ))
        })?;
        let aggregate = meta.aggregate_id();

        // Held across `project` so events of one aggregate are applied in order.
        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(&last) = cursors.get(&aggregate) {
            if sequence <= last {
                tracing::debug!(
                    aggregate = %aggregate,
                    sequence,
                    last,
                    "skipping already projected event"
                );
                return Ok(false);
            }
            if sequence != last + 1 {
                return Err(DomainError::conflict(format!(
                    "{} {aggregate}: expected sequence {} but got {sequence}",
                    meta.aggregate_type(),
                    last + 1
                )));
            }
        }

        self.projector.project(event)?;
        cursors.insert(aggregate, sequence);
        Ok(true)
    }

    /// Apply events in order, stopping at the first failure. Returns how many
    /// were newly applied.
    pub fn run<'a, I>(&self, events: I) -> DomainResult<usize>
    where
        I: IntoIterator<Item = &'a P::Event>,
    {
        let mut applied = 0;
        for event in events {
            if self.apply(event)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}
