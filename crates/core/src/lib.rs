//! `keel-core`: domain foundation building blocks.
//!
//! Identifiers, entities, domain events, event-buffering aggregate roots and
//! the read side (projectors and read models).
//! This crate contains **pure domain** primitives (no dispatch, no IO).

extern crate self as keel_core;

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;
pub mod projection;
pub mod read_model;
pub mod repository;

pub use aggregate::{AggregateRoot, EventBuffer};
pub use entity::{Entity, EntityKey};
pub use error::{DomainError, DomainResult};
pub use event::{DomainEvent, EventMetadata};
pub use id::{Id, Identifier};
pub use projection::{ProjectionRunner, Projector};
pub use read_model::{InMemoryReadRepository, ReadModel, ReadRepository};
pub use repository::{InMemoryRepository, Repository};

#[doc(hidden)]
pub mod __private {
    pub use serde;
    pub use uuid;
}
