//! Command and query buses sharing one worker pool.

use std::sync::Arc;

use crate::command_bus::CommandBus;
use crate::config::BusConfig;
use crate::error::ConfigError;
use crate::query_bus::QueryBus;
use crate::status::CommandStatusStore;
use crate::worker::WorkerPool;

/// The buses of one application, cheap to clone and hand to handlers.
#[derive(Debug, Clone)]
pub struct Buses {
    commands: Arc<CommandBus>,
    queries: Arc<QueryBus>,
}

impl Buses {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            commands: Arc::new(CommandBus::new(pool.clone())),
            queries: Arc::new(QueryBus::new(pool)),
        }
    }

    /// Buses over a custom status store.
    pub fn with_status_store(pool: Arc<WorkerPool>, statuses: Arc<dyn CommandStatusStore>) -> Self {
        Self {
            commands: Arc::new(CommandBus::with_status_store(pool.clone(), statuses)),
            queries: Arc::new(QueryBus::new(pool)),
        }
    }

    pub fn from_config(config: &BusConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(Arc::new(WorkerPool::new(config)?)))
    }

    /// [`from_config`](Buses::from_config) with [`BusConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(&BusConfig::from_env()?)
    }

    pub fn commands(&self) -> &Arc<CommandBus> {
        &self.commands
    }

    pub fn queries(&self) -> &Arc<QueryBus> {
        &self.queries
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        self.commands.pool()
    }
}
