//! Entity trait: identity + continuity across state changes.

use crate::id::{Id, Identifier};

/// Entity marker + minimal interface.
pub trait Entity {
    /// Stable name of the entity kind (e.g. "sales.order").
    const KIND: &'static str;

    /// Strongly-typed entity identifier.
    type Id: Identifier;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Identity key used for entity equality: kind plus identifier.
    fn key(&self) -> EntityKey {
        EntityKey::new(Self::KIND, self.id().as_id())
    }

    /// Kind-aware identity comparison.
    fn is_same_entity<E: Entity + ?Sized>(&self, other: &E) -> bool {
        self.key() == other.key()
    }

    /// Compares identifiers only, ignoring the entity kind.
    ///
    /// Two entities of unrelated kinds that happen to share an id return `true`.
    fn shares_id_with<E: Entity + ?Sized>(&self, other: &E) -> bool {
        self.id().as_id() == other.id().as_id()
    }
}

/// Hashable identity of an entity across kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    kind: &'static str,
    id: Id,
}

impl EntityKey {
    pub fn new(kind: &'static str, id: Id) -> Self {
        Self { kind, id }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn id(&self) -> Id {
        self.id
    }
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Implement `PartialEq`, `Eq` and `Hash` for an entity type in terms of its
/// [`EntityKey`], so that state fields never take part in equality.
#[macro_export]
macro_rules! entity_identity {
    ($t:ty) => {
        impl PartialEq for $t {
            fn eq(&self, other: &Self) -> bool {
                $crate::Entity::key(self) == $crate::Entity::key(other)
            }
        }

        impl Eq for $t {}

        impl core::hash::Hash for $t {
            fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
                core::hash::Hash::hash(&$crate::Entity::key(self), state)
            }
        }
    };
}
