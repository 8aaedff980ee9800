//! Aggregate roots and their buffer of uncommitted domain events.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entity::Entity;
use crate::event::{DomainEvent, EventMetadata};
use crate::id::Identifier;

#[derive(Debug)]
struct BufferState<E> {
    version: u64,
    /// Sequence of the last event ever recorded, across commits
    sequence: u64,
    /// Bumped by every commit of either kind
    epoch: u64,
    events: Vec<E>,
}

/// Ordered, append-only buffer of events raised since the last commit.
///
/// Version and events live under a single lock, so readers never observe a
/// cleared buffer with a stale version (or the reverse). Reads return
/// snapshots; the buffer can be appended to while a snapshot is iterated.
#[derive(Debug)]
pub struct EventBuffer<E> {
    state: RwLock<BufferState<E>>,
}

impl<E> EventBuffer<E> {
    pub fn new() -> Self {
        Self::at_version(0)
    }

    /// Empty buffer for an aggregate already at `version`.
    pub fn at_version(version: u64) -> Self {
        Self::with_events(version, Vec::new())
    }

    /// Buffer pre-loaded with uncommitted events.
    ///
    /// Sequence numbering continues after `version + events.len()`.
    pub fn with_events(version: u64, events: Vec<E>) -> Self {
        let sequence = version + events.len() as u64;
        Self {
            state: RwLock::new(BufferState {
                version,
                sequence,
                epoch: 0,
                events,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BufferState<E>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BufferState<E>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Version as of the last commit.
    pub fn version(&self) -> u64 {
        self.read().version
    }

    /// `version + number of uncommitted events`.
    pub fn next_version(&self) -> u64 {
        let state = self.read();
        state.version + state.events.len() as u64
    }

    /// Sequence number the next recorded event should carry.
    ///
    /// Strictly increasing over the buffer's lifetime, whichever commit
    /// convention is used.
    pub fn next_sequence(&self) -> u64 {
        self.read().sequence + 1
    }

    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().events.is_empty()
    }

    /// Append an event. Never validates, never fails.
    pub fn push(&self, event: E) {
        let mut state = self.write();
        state.sequence += 1;
        state.events.push(event);
    }

    /// Advance the version by the number of buffered events and clear them.
    pub fn mark_committed(&self) {
        let mut state = self.write();
        state.version += state.events.len() as u64;
        state.epoch += 1;
        state.events.clear();
    }
}

impl<E: Clone> EventBuffer<E> {
    pub fn snapshot(&self) -> Vec<E> {
        self.read().events.clone()
    }

    /// Hand a snapshot to `publish`; on success bump the version by exactly one
    /// and drop the published events.
    ///
    /// The lock is not held while `publish` runs. Events appended meanwhile stay
    /// buffered for the next commit. If `publish` fails the buffer is untouched.
    /// If another commit completed while `publish` ran, the buffer no longer
    /// starts with the published events and is left as it is.
    /// Returns the number of events published.
    pub fn commit_with<F, Err>(&self, publish: F) -> Result<usize, Err>
    where
        F: FnOnce(&[E]) -> Result<(), Err>,
    {
        let (snapshot, epoch) = {
            let state = self.read();
            (state.events.clone(), state.epoch)
        };
        publish(&snapshot)?;

        let mut state = self.write();
        if state.epoch != epoch {
            tracing::warn!(
                published = snapshot.len(),
                buffered = state.events.len(),
                "buffer committed concurrently, keeping events appended since"
            );
            return Ok(snapshot.len());
        }
        state.events.drain(..snapshot.len());
        state.version += 1;
        state.epoch += 1;
        Ok(snapshot.len())
    }
}

impl<E> Default for EventBuffer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Clone for EventBuffer<E> {
    fn clone(&self) -> Self {
        let state = self.read();
        Self {
            state: RwLock::new(BufferState {
                version: state.version,
                sequence: state.sequence,
                epoch: state.epoch,
                events: state.events.clone(),
            }),
        }
    }
}

/// Aggregate root: an entity that records domain events until they are committed.
///
/// Implementors only expose their [`EventBuffer`]; the bookkeeping lives in the
/// provided methods. Two commit conventions exist and are not interchangeable:
///
/// - [`mark_changes_as_committed`](AggregateRoot::mark_changes_as_committed):
///   the caller persisted the events itself; version advances by the event count.
/// - [`commit`](AggregateRoot::commit): the events are published as one
///   transaction; version advances by exactly one.
pub trait AggregateRoot: Entity {
    type Event: DomainEvent;

    fn changes(&self) -> &EventBuffer<Self::Event>;

    fn version(&self) -> u64 {
        self.changes().version()
    }

    fn next_version(&self) -> u64 {
        self.changes().next_version()
    }

    fn has_uncommitted_changes(&self) -> bool {
        !self.changes().is_empty()
    }

    /// Snapshot of the uncommitted events, in the order they were applied.
    fn uncommitted_changes(&self) -> Vec<Self::Event> {
        self.changes().snapshot()
    }

    /// Metadata for the next event this aggregate raises.
    ///
    /// Sequences keep increasing across commits, so they identify an event
    /// within its aggregate even though `commit` advances the version by one.
    fn event_metadata(&self) -> EventMetadata {
        EventMetadata::new(self.id().as_id(), Self::KIND).with_sequence(self.changes().next_sequence())
    }

    /// Record an event as uncommitted.
    fn apply(&self, event: Self::Event) {
        self.changes().push(event);
    }

    fn mark_changes_as_committed(&self) {
        self.changes().mark_committed();
        tracing::debug!(
            aggregate = %self.key(),
            version = self.version(),
            "changes marked as committed"
        );
    }

    fn commit<F, Err>(&self, publish: F) -> Result<(), Err>
    where
        F: FnOnce(&[Self::Event]) -> Result<(), Err>,
    {
        let published = self.changes().commit_with(publish)?;
        tracing::debug!(
            aggregate = %self.key(),
            version = self.version(),
            events = published,
            "aggregate committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use std::convert::Infallible;
    use std::sync::Arc;

    crate::impl_id! {
        struct OrderId;
    }

    #[derive(Debug, Clone)]
    struct LineAdded {
        meta: EventMetadata,
        sku: String,
    }

    impl DomainEvent for LineAdded {
        fn event_type(&self) -> &'static str {
            "order.line_added"
        }

        fn metadata(&self) -> &EventMetadata {
            &self.meta
        }
    }

    #[derive(Debug)]
    struct Order {
        id: OrderId,
        lines: Vec<String>,
        changes: EventBuffer<LineAdded>,
    }

    impl Order {
        fn new(id: OrderId) -> Self {
            Self {
                id,
                lines: Vec::new(),
                changes: EventBuffer::new(),
            }
        }

        fn add_line(&mut self, sku: &str) {
            self.lines.push(sku.to_string());
            let event = LineAdded {
                meta: self.event_metadata(),
                sku: sku.to_string(),
            };
            self.apply(event);
        }
    }

    impl Entity for Order {
        const KIND: &'static str = "order";
        type Id = OrderId;

        fn id(&self) -> &OrderId {
            &self.id
        }
    }

    impl AggregateRoot for Order {
        type Event = LineAdded;

        fn changes(&self) -> &EventBuffer<LineAdded> {
            &self.changes
        }
    }

    fn collect_into(sink: &mut Vec<String>) -> impl FnOnce(&[LineAdded]) -> Result<(), Infallible> + '_ {
        move |events| {
            sink.extend(events.iter().map(|e| e.sku.clone()));
            Ok(())
        }
    }

    #[test]
    fn starts_clean_at_version_zero() {
        let order = Order::new(OrderId::new());
        assert_eq!(order.version(), 0);
        assert_eq!(order.next_version(), 0);
        assert!(!order.has_uncommitted_changes());
    }

    #[test]
    fn apply_buffers_without_touching_version() {
        let mut order = Order::new(OrderId::new());
        order.add_line("A");

        assert_eq!(order.version(), 0);
        assert_eq!(order.next_version(), 1);
        assert!(order.has_uncommitted_changes());
        assert_eq!(order.lines, vec!["A".to_string()]);
    }

    #[test]
    fn mark_committed_advances_by_event_count() {
        let mut order = Order::new(OrderId::new());
        order.add_line("A");
        order.mark_changes_as_committed();

        assert_eq!(order.version(), 1);
        assert!(order.uncommitted_changes().is_empty());

        order.add_line("B");
        order.add_line("C");
        order.add_line("D");
        order.mark_changes_as_committed();
        assert_eq!(order.version(), 4);
    }

    #[test]
    fn commit_publishes_snapshot_and_advances_by_one() {
        let mut order = Order::new(OrderId::new());
        order.add_line("A");
        order.mark_changes_as_committed();

        order.add_line("B");
        order.add_line("C");
        let mut published = Vec::new();
        order.commit(collect_into(&mut published)).unwrap();

        assert_eq!(published, vec!["B".to_string(), "C".to_string()]);
        assert_eq!(order.version(), 2);
        assert!(!order.has_uncommitted_changes());
    }

    #[test]
    fn failed_publish_leaves_buffer_untouched() {
        let mut order = Order::new(OrderId::new());
        order.add_line("A");

        let err = order
            .commit(|_| Err(DomainError::Conflict("sink unavailable".into())))
            .unwrap_err();

        assert_eq!(err, DomainError::Conflict("sink unavailable".into()));
        assert_eq!(order.version(), 0);
        assert_eq!(order.uncommitted_changes().len(), 1);
    }

    #[test]
    fn events_carry_owner_identity_and_sequence() {
        let id = OrderId::new();
        let mut order = Order::new(id);
        order.add_line("A");
        order.add_line("B");

        let events = order.uncommitted_changes();
        assert_eq!(events[0].metadata().aggregate_id(), id);
        assert_eq!(events[0].metadata().aggregate_type(), "order");
        assert_eq!(events[0].metadata().sequence(), Some(1));
        assert_eq!(events[1].metadata().sequence(), Some(2));
    }

    #[test]
    fn buffer_can_start_from_existing_state() {
        let id = OrderId::new();
        let meta = EventMetadata::new(id, "order");
        let pending = LineAdded {
            meta,
            sku: "X".to_string(),
        };
        let buffer = EventBuffer::with_events(5, vec![pending]);

        assert_eq!(buffer.version(), 5);
        assert_eq!(buffer.next_version(), 6);
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let order = Arc::new(Order::new(OrderId::new()));

        std::thread::scope(|s| {
            for t in 0..4 {
                let order = order.clone();
                s.spawn(move || {
                    for i in 0..50 {
                        let event = LineAdded {
                            meta: order.event_metadata(),
                            sku: format!("{t}-{i}"),
                        };
                        order.apply(event);
                        let _ = order.uncommitted_changes();
                    }
                });
            }
        });

        assert_eq!(order.uncommitted_changes().len(), 200);
        assert_eq!(order.next_version(), 200);
    }

    #[test]
    fn events_applied_during_publish_survive_the_commit() {
        let mut order = Order::new(OrderId::new());
        order.add_line("A");

        let late = LineAdded {
            meta: order.event_metadata(),
            sku: "late".to_string(),
        };
        order
            .commit(|events| {
                assert_eq!(events.len(), 1);
                order.apply(late);
                Ok::<(), Infallible>(())
            })
            .unwrap();

        let remaining = order.uncommitted_changes();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].sku, "late");
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn events_recorded_after_a_concurrent_commit_are_not_dropped() {
        let buffer: EventBuffer<&str> = EventBuffer::new();
        buffer.push("a");

        let published = buffer
            .commit_with(|events| {
                assert_eq!(events, ["a"]);
                buffer.mark_committed();
                buffer.push("late");
                Ok::<(), Infallible>(())
            })
            .unwrap();

        assert_eq!(published, 1);
        assert_eq!(buffer.snapshot(), vec!["late"]);
        assert_eq!(buffer.version(), 1);
    }

    #[test]
    fn sequences_keep_increasing_across_commits() {
        let mut order = Order::new(OrderId::new());
        order.add_line("A");
        order.add_line("B");
        order.add_line("C");
        order.commit(|_| Ok::<(), Infallible>(())).unwrap();
        assert_eq!(order.version(), 1);

        order.add_line("D");
        let events = order.uncommitted_changes();
        assert_eq!(events[0].metadata().sequence(), Some(4));

        order.mark_changes_as_committed();
        order.add_line("E");
        assert_eq!(order.uncommitted_changes()[0].metadata().sequence(), Some(5));
    }

    #[test]
    fn loaded_buffer_continues_the_sequence() {
        let buffer: EventBuffer<u8> = EventBuffer::with_events(5, vec![1, 2]);
        assert_eq!(buffer.next_sequence(), 8);
        assert_eq!(buffer.clone().next_sequence(), 8);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Apply(u8),
            Mark,
            Commit,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (1u8..5).prop_map(Step::Apply),
                Just(Step::Mark),
                Just(Step::Commit),
            ]
        }

        proptest! {
            /// next_version == version + buffered and sequences count every event, for
            /// any sequence of operations.
            #[test]
            fn version_arithmetic_holds(start in 0u64..1_000, steps in prop::collection::vec(step(), 0..40)) {
                let buffer: EventBuffer<u8> = EventBuffer::at_version(start);
                let mut expected_version = start;
                let mut buffered = 0u64;
                let mut recorded = 0u64;

                for s in steps {
                    match s {
                        Step::Apply(n) => {
                            for i in 0..n {
                                buffer.push(i);
                            }
                            buffered += u64::from(n);
                            recorded += u64::from(n);
                        }
                        Step::Mark => {
                            buffer.mark_committed();
                            expected_version += buffered;
                            buffered = 0;
                        }
                        Step::Commit => {
                            let published = buffer.commit_with(|events| {
                                prop_assert_eq!(events.len() as u64, buffered);
                                Ok(())
                            })?;
                            prop_assert_eq!(published as u64, buffered);
                            expected_version += 1;
                            buffered = 0;
                        }
                    }

                    prop_assert_eq!(buffer.version(), expected_version);
                    prop_assert_eq!(buffer.next_version(), expected_version + buffered);
                    prop_assert_eq!(buffer.next_sequence(), start + recorded + 1);
                }
            }
        }
    }
}
