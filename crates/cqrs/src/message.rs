//! Messages: commands and queries, and the runtime kind they are routed by.

use std::any::{Any, TypeId};

use keel_core::Id;

/// Runtime kind of a message: the concrete Rust type of the value.
///
/// Handlers are looked up by kind. Equality and hashing use the `TypeId` only;
/// the type name is carried for logs and error messages.
#[derive(Debug, Copy, Clone)]
pub struct MessageKind {
    type_id: TypeId,
    name: &'static str,
}

impl MessageKind {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name (e.g. `my_app::orders::PlaceOrder`).
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MessageKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for MessageKind {}

impl core::hash::Hash for MessageKind {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state)
    }
}

impl core::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erasure support shared by every message.
///
/// Implemented for all eligible types; there is nothing to implement by hand.
/// Through a `&dyn Command` these methods report the concrete message type.
pub trait Message: Any + Send + Sync + core::fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    fn kind(&self) -> MessageKind;
}

impl<T> Message for T
where
    T: Any + Send + Sync + core::fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> MessageKind {
        MessageKind::of::<T>()
    }
}

/// A fire-and-forget command (command abstraction).
///
/// Commands represent **intent** - a request to change state. A command may be
/// handled by any number of handlers; the caller only learns whether all of
/// them succeeded.
///
/// ## Tracking
///
/// A command whose `tracking_id` returns `Some` is *trackable*: the bus records
/// `CommandStatus::Pending` under that id on submission, and handlers report
/// further progress through the status store.
///
/// ## Design Constraints
///
/// Commands must be:
/// - **Send + Sync**: Commands cross thread boundaries (worker pool)
/// - **'static**: Commands don't contain borrowed data (must own all data)
/// - **Debug**: Commands show up in logs
pub trait Command: Message {
    fn tracking_id(&self) -> Option<Id> {
        None
    }
}

/// A command that is handled by exactly one handler and produces a value.
pub trait ResultCommand: Message {
    type Output: Send + 'static;
}

/// A read request handled by exactly one handler.
pub trait Query: Message {
    type Output: Send + 'static;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    impl Command for Ping {}

    #[derive(Debug)]
    struct Pong;

    impl Command for Pong {}

    #[test]
    fn kind_is_the_concrete_type_behind_a_trait_object() {
        let boxed: Box<dyn Command> = Box::new(Ping);
        let erased: &dyn Command = &*boxed;

        assert_eq!(erased.kind(), MessageKind::of::<Ping>());
        assert_ne!(erased.kind(), MessageKind::of::<Pong>());
        assert!(erased.as_any().downcast_ref::<Ping>().is_some());
    }

    #[test]
    fn kind_name_is_the_type_name() {
        let kind = MessageKind::of::<Ping>();
        assert!(kind.name().ends_with("Ping"));
        assert_eq!(kind.to_string(), kind.name());
    }

    #[test]
    fn commands_are_untracked_by_default() {
        assert!(Ping.tracking_id().is_none());
    }
}
