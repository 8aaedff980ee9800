//! Lifecycle status of trackable commands.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use keel_core::Id;

/// Lifecycle of a trackable command.
///
/// The bus only ever writes `Pending`; every later state is reported by the
/// handlers themselves, since several handlers may finish at different times.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Never recorded.
    #[default]
    Unknown,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Unknown => "UNKNOWN",
            CommandStatus::Pending => "PENDING",
            CommandStatus::Processing => "PROCESSING",
            CommandStatus::Completed => "COMPLETED",
            CommandStatus::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status storage keyed by the command's own tracking id.
pub trait CommandStatusStore: Send + Sync {
    /// Overwrite the status (last writer wins, no history).
    fn update_status(&self, command_id: Id, status: CommandStatus);

    /// Current status; `Unknown` if never recorded. Never fails.
    fn status(&self, command_id: Id) -> CommandStatus;

    /// Drop the entry, returning the last recorded status.
    fn forget(&self, command_id: Id) -> Option<CommandStatus>;
}

impl<S> CommandStatusStore for Arc<S>
where
    S: CommandStatusStore + ?Sized,
{
    fn update_status(&self, command_id: Id, status: CommandStatus) {
        (**self).update_status(command_id, status)
    }

    fn status(&self, command_id: Id) -> CommandStatus {
        (**self).status(command_id)
    }

    fn forget(&self, command_id: Id) -> Option<CommandStatus> {
        (**self).forget(command_id)
    }
}

/// In-memory status store.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    statuses: RwLock<HashMap<Id, CommandStatus>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.statuses.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommandStatusStore for InMemoryStatusStore {
    fn update_status(&self, command_id: Id, status: CommandStatus) {
        // A poisoned map is still a valid map; keep accepting updates.
        self.statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command_id, status);
        tracing::debug!(
            command_id = %command_id,
            status = %status,
            terminal = status.is_terminal(),
            "command status updated"
        );
    }

    fn status(&self, command_id: Id) -> CommandStatus {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&command_id)
            .copied()
            .unwrap_or_default()
    }

    fn forget(&self, command_id: Id) -> Option<CommandStatus> {
        self.statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&command_id)
    }
}
