//! Read side: query-shaped views built from committed events.
//!
//! Read models are disposable. They are derived from events by a
//! [`Projector`](crate::Projector) and can be rebuilt by replaying them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{DomainError, DomainResult};
use crate::id::Identifier;

/// A denormalized view, stored and looked up by its own id.
pub trait ReadModel: Clone + Send + Sync + 'static {
    /// Name used in errors and logs (e.g. `"cart_summary"`).
    const KIND: &'static str;

    type Id: Identifier;

    fn id(&self) -> &Self::Id;
}

/// Storage for one read model type.
pub trait ReadRepository<R: ReadModel>: Send + Sync {
    fn find(&self, id: &R::Id) -> DomainResult<Option<R>>;

    /// Insert or replace.
    fn upsert(&self, model: R) -> DomainResult<()>;

    /// Returns whether a model was stored under `id`.
    fn delete(&self, id: &R::Id) -> DomainResult<bool>;

    fn all(&self) -> DomainResult<Vec<R>>;

    /// Like [`find`](ReadRepository::find), but a missing model is `DomainError::NotFound`.
    fn get(&self, id: &R::Id) -> DomainResult<R> {
        self.find(id)?
            .ok_or_else(|| DomainError::not_found(R::KIND, id))
    }
}

impl<R, S> ReadRepository<R> for Arc<S>
where
    R: ReadModel,
    S: ReadRepository<R> + ?Sized,
{
    fn find(&self, id: &R::Id) -> DomainResult<Option<R>> {
        (**self).find(id)
    }

    fn upsert(&self, model: R) -> DomainResult<()> {
        (**self).upsert(model)
    }

    fn delete(&self, id: &R::Id) -> DomainResult<bool> {
        (**self).delete(id)
    }

    fn all(&self) -> DomainResult<Vec<R>> {
        (**self).all()
    }
}

#[derive(Debug)]
pub struct InMemoryReadRepository<R: ReadModel> {
    models: RwLock<HashMap<R::Id, R>>,
}

impl<R: ReadModel> InMemoryReadRepository<R> {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.models.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every model, e.g. before a rebuild.
    pub fn clear(&self) {
        self.models.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl<R: ReadModel> Default for InMemoryReadRepository<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ReadModel> ReadRepository<R> for InMemoryReadRepository<R> {
    fn find(&self, id: &R::Id) -> DomainResult<Option<R>> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        Ok(models.get(id).cloned())
    }

    fn upsert(&self, model: R) -> DomainResult<()> {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        models.insert(*model.id(), model);
        Ok(())
    }

    fn delete(&self, id: &R::Id) -> DomainResult<bool> {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        Ok(models.remove(id).is_some())
    }

    fn all(&self) -> DomainResult<Vec<R>> {
        let models = self.models.read().unwrap_or_else(PoisonError::into_inner);
        Ok(models.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::impl_id! {
        struct ShelfId;
    }

    #[derive(Debug, Clone, PartialEq)]
    struct ShelfView {
        id: ShelfId,
        books: u32,
    }

    impl ReadModel for ShelfView {
        const KIND: &'static str = "shelf_view";
        type Id = ShelfId;

        fn id(&self) -> &ShelfId {
            &self.id
        }
    }

    #[test]
    fn upsert_replaces_the_stored_view() {
        let repo = InMemoryReadRepository::new();
        let id = ShelfId::new();

        repo.upsert(ShelfView { id, books: 1 }).unwrap();
        repo.upsert(ShelfView { id, books: 2 }).unwrap();

        assert_eq!(repo.get(&id).unwrap().books, 2);
        assert_eq!(repo.all().unwrap().len(), 1);
    }

    #[test]
    fn missing_view_is_not_found_under_its_kind() {
        let repo: Arc<dyn ReadRepository<ShelfView>> = Arc::new(InMemoryReadRepository::new());
        let id = ShelfId::new();

        assert_eq!(repo.get(&id).unwrap_err(), DomainError::not_found("shelf_view", id));
        assert!(!repo.delete(&id).unwrap());
    }

    #[test]
    fn clear_empties_the_store() {
        let repo = InMemoryReadRepository::new();
        repo.upsert(ShelfView { id: ShelfId::new(), books: 0 }).unwrap();
        repo.clear();
        assert!(repo.is_empty());
    }
}
