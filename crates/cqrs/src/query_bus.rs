//! Query dispatch: exactly one handler per query kind.

use std::sync::Arc;

use crate::config::BusConfig;
use crate::error::{BusError, ConfigError};
use crate::handler::{QueryHandler, invoke_single};
use crate::message::{MessageKind, Query};
use crate::registry::SingleHandlerRegistry;
use crate::worker::{DispatchHandle, WorkerPool};

/// In-process query bus.
///
/// Registering a handler for a kind that already has one replaces it.
#[derive(Debug)]
pub struct QueryBus {
    handlers: SingleHandlerRegistry,
    pool: Arc<WorkerPool>,
}

impl QueryBus {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            handlers: SingleHandlerRegistry::new(),
            pool,
        }
    }

    pub fn from_config(config: &BusConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(Arc::new(WorkerPool::new(config)?)))
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Register the handler of `Q`. Returns the handler it replaced, if any.
    pub fn register<Q: Query>(
        &self,
        handler: Arc<dyn QueryHandler<Q>>,
    ) -> Option<Arc<dyn QueryHandler<Q>>> {
        let kind = MessageKind::of::<Q>();
        let replaced = self.handlers.insert(kind, handler);
        if replaced.is_some() {
            tracing::warn!(kind = %kind, "query handler replaced");
        } else {
            tracing::debug!(kind = %kind, "query handler registered");
        }
        replaced
    }

    /// Drop the handler of `Q`. Returns whether one was registered.
    pub fn remove<Q: Query>(&self) -> bool {
        let kind = MessageKind::of::<Q>();
        let removed = self.handlers.remove(kind);
        if removed {
            tracing::debug!(kind = %kind, "query handler removed");
        }
        removed
    }

    pub fn is_registered<Q: Query>(&self) -> bool {
        self.handlers.contains(MessageKind::of::<Q>())
    }

    fn handler<Q: Query>(&self) -> Result<Arc<dyn QueryHandler<Q>>, BusError> {
        let kind = MessageKind::of::<Q>();
        self.handlers
            .get::<Arc<dyn QueryHandler<Q>>>(kind)
            .ok_or_else(|| BusError::no_handler(kind.name()))
    }

    /// Run the handler of `Q` on the worker pool.
    pub fn send<Q: Query>(&self, query: Q) -> DispatchHandle<Q::Output> {
        let kind = MessageKind::of::<Q>();
        match self.handler::<Q>() {
            Ok(handler) => {
                tracing::debug!(kind = %kind, "dispatching query");
                self.pool
                    .submit(kind.name(), move || invoke_single(kind, || handler.handle(&query)))
            }
            Err(err) => DispatchHandle::ready(Err(err)),
        }
    }

    /// Run the handler of `Q` on the calling thread.
    pub fn send_sync<Q: Query>(&self, query: Q) -> Result<Q::Output, BusError> {
        let kind = MessageKind::of::<Q>();
        let handler = self.handler::<Q>()?;
        invoke_single(kind, || handler.handle(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::query_handler;

    #[derive(Debug)]
    struct CountOrders;

    impl Query for CountOrders {
        type Output = usize;
    }

    fn bus() -> QueryBus {
        QueryBus::from_config(&BusConfig::default()).unwrap()
    }

    #[test]
    fn register_returns_the_replaced_handler() {
        let bus = bus();
        let first = query_handler(|_: &CountOrders| Ok(1));

        assert!(bus.register(first.clone()).is_none());
        let replaced = bus.register(query_handler(|_: &CountOrders| Ok(2))).unwrap();

        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(bus.send_sync(CountOrders).unwrap(), 2);
    }

    #[test]
    fn remove_reports_whether_anything_was_there() {
        let bus = bus();
        assert!(!bus.remove::<CountOrders>());

        bus.register(query_handler(|_: &CountOrders| Ok(0)));
        assert!(bus.is_registered::<CountOrders>());
        assert!(bus.remove::<CountOrders>());
        assert!(!bus.is_registered::<CountOrders>());
    }

    #[test]
    fn panicking_handler_is_reported() {
        let bus = bus();
        bus.register(query_handler(|_: &CountOrders| -> crate::HandlerResult<usize> {
            panic!("index corrupt")
        }));

        let err = bus.send(CountOrders).wait().unwrap_err();
        assert!(matches!(err, BusError::HandlerPanicked { ref message, .. } if message == "index corrupt"));
    }
}
