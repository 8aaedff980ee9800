//! Identifiers used across the domain.
//!
//! Every identifier is a random 128-bit UUID. Typed newtypes (declared with
//! [`impl_id!`](crate::impl_id)) exist for readability at API boundaries, but
//! identity is structural: a typed id and an [`Id`] built from the same UUID are
//! equal and hash identically.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Type-erased identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

/// Anything that is backed by an [`Id`].
///
/// Implemented by [`Id`] itself and by every type declared with `impl_id!`.
pub trait Identifier:
    Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static
{
    fn as_uuid(&self) -> &Uuid;

    fn as_id(&self) -> Id {
        Id(*self.as_uuid())
    }
}

/// Declare a typed identifier newtype over a UUID.
///
/// The generated type converts to and from [`Id`] and `Uuid`, parses from the
/// hyphenated form, and compares equal to an [`Id`] with the same value.
#[macro_export]
macro_rules! impl_id {
    ($(#[$meta:meta])* $vis:vis struct $t:ident;) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            $crate::__private::serde::Serialize, $crate::__private::serde::Deserialize,
        )]
        #[serde(crate = "keel_core::__private::serde", transparent)]
        $vis struct $t($crate::__private::uuid::Uuid);

        impl $t {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self($crate::__private::uuid::Uuid::new_v4())
            }

            pub fn from_uuid(uuid: $crate::__private::uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $crate::Identifier for $t {
            fn as_uuid(&self) -> &$crate::__private::uuid::Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$crate::__private::uuid::Uuid> for $t {
            fn from(value: $crate::__private::uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for $crate::__private::uuid::Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl From<$crate::Id> for $t {
            fn from(value: $crate::Id) -> Self {
                Self(*$crate::Identifier::as_uuid(&value))
            }
        }

        impl From<$t> for $crate::Id {
            fn from(value: $t) -> Self {
                $crate::Identifier::as_id(&value)
            }
        }

        impl PartialEq<$crate::Id> for $t {
            fn eq(&self, other: &$crate::Id) -> bool {
                self.0 == *$crate::Identifier::as_uuid(other)
            }
        }

        impl PartialEq<$t> for $crate::Id {
            fn eq(&self, other: &$t) -> bool {
                *$crate::Identifier::as_uuid(self) == other.0
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $crate::id::parse_uuid(s, stringify!($t)).map(Self)
            }
        }
    };
}

impl Id {
    /// Create a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Identifier for Id {
    fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    fn as_id(&self) -> Id {
        *self
    }
}

impl core::fmt::Display for Id {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<Id> for Uuid {
    fn from(value: Id) -> Self {
        value.0
    }
}

impl FromStr for Id {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uuid(s, "Id").map(Self)
    }
}

#[doc(hidden)]
pub fn parse_uuid(s: &str, name: &str) -> Result<Uuid, DomainError> {
    Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("{name}: {e}")))
}
