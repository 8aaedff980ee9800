//! Repository abstraction handlers use to load and save entities.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};

/// Keyed entity storage.
pub trait Repository<E: Entity>: Send + Sync {
    fn find(&self, id: &E::Id) -> DomainResult<Option<E>>;
    fn save(&self, entity: E) -> DomainResult<()>;
    /// Remove an entity; returns whether it existed.
    fn delete(&self, id: &E::Id) -> DomainResult<bool>;

    /// Like [`find`](Repository::find), but a missing entity is `DomainError::NotFound`.
    fn get(&self, id: &E::Id) -> DomainResult<E> {
        self.find(id)?
            .ok_or_else(|| DomainError::not_found(E::KIND, id))
    }
}

impl<E, R> Repository<E> for Arc<R>
where
    E: Entity,
    R: Repository<E> + ?Sized,
{
    fn find(&self, id: &E::Id) -> DomainResult<Option<E>> {
        (**self).find(id)
    }

    fn save(&self, entity: E) -> DomainResult<()> {
        (**self).save(entity)
    }

    fn delete(&self, id: &E::Id) -> DomainResult<bool> {
        (**self).delete(id)
    }
}

/// In-memory repository for tests/dev.
#[derive(Debug)]
pub struct InMemoryRepository<E: Entity> {
    inner: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Repository<E> for InMemoryRepository<E>
where
    E: Entity + Clone + Send + Sync,
{
    fn find(&self, id: &E::Id) -> DomainResult<Option<E>> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(id).cloned())
    }

    fn save(&self, entity: E) -> DomainResult<()> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(*entity.id(), entity);
        Ok(())
    }

    fn delete(&self, id: &E::Id) -> DomainResult<bool> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(map.remove(id).is_some())
    }
}
