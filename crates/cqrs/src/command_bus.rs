//! Command dispatch: many handlers per fire-and-forget command kind, exactly one
//! per result command kind.
//!
//! ## Dispatch Semantics
//!
//! ```text
//! send(command)
//!   ↓
//! 1. Resolve handlers by the command's runtime kind (none → `false`, nothing scheduled)
//!   ↓
//! 2. Reserve a pool slot (bounded pool full → `Saturated`, no status written)
//!   ↓
//! 3. Trackable? record `Pending` under its tracking id
//!   ↓
//! 4. Run every handler once, in registration order (caller thread or pool)
//!   ↓
//! 5. `true` iff every handler returned `Ok`
//! ```
//!
//! A failing handler never prevents its siblings from running; the failure is
//! logged and folded into the boolean. `send` and `send_sync` share this policy.
//!
//! Result commands are fail-fast: the single handler's value or error is
//! returned as-is.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use keel_core::Id;

use crate::config::BusConfig;
use crate::error::{BusError, ConfigError};
use crate::handler::{CommandHandler, ResultCommandHandler, invoke_all, invoke_single};
use crate::message::{Command, Message, MessageKind, ResultCommand};
use crate::registry::SingleHandlerRegistry;
use crate::status::{CommandStatus, CommandStatusStore, InMemoryStatusStore};
use crate::worker::{DispatchHandle, WorkerPool};

type HandlerList = Vec<Arc<dyn CommandHandler>>;

fn same_allocation<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// In-process command bus.
///
/// Registration, unregistration and dispatch are safe from any number of
/// threads. Handler lists are snapshotted before execution, so handlers may
/// themselves register, unregister or send.
pub struct CommandBus {
    handlers: RwLock<HashMap<MessageKind, HandlerList>>,
    result_handlers: SingleHandlerRegistry,
    statuses: Arc<dyn CommandStatusStore>,
    pool: Arc<WorkerPool>,
}

impl CommandBus {
    /// Bus with its own in-memory status store.
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self::with_status_store(pool, Arc::new(InMemoryStatusStore::new()))
    }

    pub fn with_status_store(pool: Arc<WorkerPool>, statuses: Arc<dyn CommandStatusStore>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            result_handlers: SingleHandlerRegistry::new(),
            statuses,
            pool,
        }
    }

    /// Bus with a dedicated worker pool built from `config`.
    pub fn from_config(config: &BusConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(Arc::new(WorkerPool::new(config)?)))
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// The status store handlers report progress to.
    pub fn status_store(&self) -> Arc<dyn CommandStatusStore> {
        self.statuses.clone()
    }

    /// Add `handler` to the handlers of `kind`.
    ///
    /// No uniqueness check: registering the same handler twice runs it twice.
    pub fn register(&self, handler: Arc<dyn CommandHandler>, kind: MessageKind) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let list = handlers.entry(kind).or_default();
        list.push(handler);
        tracing::debug!(kind = %kind, handlers = list.len(), "command handler registered");
    }

    pub fn register_many(&self, handler: Arc<dyn CommandHandler>, kinds: &[MessageKind]) {
        for kind in kinds {
            self.register(handler.clone(), *kind);
        }
    }

    /// Remove one occurrence of `handler` from `kind`. No-op if absent.
    pub fn unregister<H>(&self, handler: &Arc<H>, kind: MessageKind)
    where
        H: CommandHandler + ?Sized,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return;
        };

        if let Some(pos) = list.iter().position(|h| same_allocation(h, handler)) {
            list.remove(pos);
            tracing::debug!(kind = %kind, handlers = list.len(), "command handler unregistered");
        }
        if list.is_empty() {
            handlers.remove(&kind);
        }
    }

    pub fn unregister_many<H>(&self, handler: &Arc<H>, kinds: &[MessageKind])
    where
        H: CommandHandler + ?Sized,
    {
        for kind in kinds {
            self.unregister(handler, *kind);
        }
    }

    /// Number of fire-and-forget handlers registered for `kind`.
    pub fn handler_count(&self, kind: MessageKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handler_count(kind) > 0 || self.result_handlers.contains(kind)
    }

    /// Register the handler of result command `C`, replacing any previous one.
    ///
    /// Returns the replaced handler.
    pub fn register_result<C: ResultCommand>(
        &self,
        handler: Arc<dyn ResultCommandHandler<C>>,
    ) -> Option<Arc<dyn ResultCommandHandler<C>>> {
        let kind = MessageKind::of::<C>();
        let replaced = self.result_handlers.insert(kind, handler);
        if replaced.is_some() {
            tracing::warn!(kind = %kind, "result command handler replaced");
        } else {
            tracing::debug!(kind = %kind, "result command handler registered");
        }
        replaced
    }

    /// Remove the handler of `C` if it is `handler`. Returns whether it was removed.
    pub fn unregister_result<C, H>(&self, handler: &Arc<H>) -> bool
    where
        C: ResultCommand,
        H: ResultCommandHandler<C> + ?Sized,
    {
        let kind = MessageKind::of::<C>();
        let removed = self
            .result_handlers
            .remove_if::<Arc<dyn ResultCommandHandler<C>>>(kind, |current| {
                same_allocation(current, handler)
            });
        if removed {
            tracing::debug!(kind = %kind, "result command handler unregistered");
        }
        removed
    }

    fn handlers_for(&self, kind: MessageKind) -> HandlerList {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).cloned().unwrap_or_default()
    }

    fn mark_pending(&self, command: &dyn Command) -> Option<Id> {
        let id = command.tracking_id()?;
        self.statuses.update_status(id, CommandStatus::Pending);
        Some(id)
    }

    /// Dispatch on the worker pool. Never blocks.
    ///
    /// The handle yields `true` iff every handler succeeded, and `false`
    /// right away when no handler is registered.
    pub fn send<C: Command>(&self, command: C) -> DispatchHandle<bool> {
        self.send_boxed(Box::new(command))
    }

    /// [`send`](CommandBus::send) for a type-erased command; handlers are
    /// resolved by the value's concrete type.
    pub fn send_boxed(&self, command: Box<dyn Command>) -> DispatchHandle<bool> {
        let kind = Message::kind(&*command);
        let handlers = self.handlers_for(kind);
        if handlers.is_empty() {
            tracing::debug!(kind = %kind, "no command handlers registered");
            return DispatchHandle::ready(Ok(false));
        }

        // A rejected dispatch must not leave a Pending status behind.
        let slot = match self.pool.reserve(kind.name()) {
            Ok(slot) => slot,
            Err(err) => return DispatchHandle::ready(Err(err)),
        };

        let command_id = self.mark_pending(&*command);
        tracing::debug!(
            kind = %kind,
            command_id = ?command_id,
            handlers = handlers.len(),
            "dispatching command"
        );

        self.pool
            .spawn(slot, move || Ok(invoke_all(kind, &handlers, &*command)))
    }

    /// Dispatch inline on the calling thread; same policy as [`send`](CommandBus::send).
    pub fn send_sync<C: Command>(&self, command: C) -> bool {
        self.send_sync_dyn(&command)
    }

    pub fn send_sync_dyn(&self, command: &dyn Command) -> bool {
        let kind = Message::kind(command);
        let handlers = self.handlers_for(kind);
        if handlers.is_empty() {
            tracing::debug!(kind = %kind, "no command handlers registered");
            return false;
        }

        let command_id = self.mark_pending(command);
        tracing::debug!(
            kind = %kind,
            command_id = ?command_id,
            handlers = handlers.len(),
            "dispatching command inline"
        );

        invoke_all(kind, &handlers, command)
    }

    fn result_handler<C: ResultCommand>(&self) -> Result<Arc<dyn ResultCommandHandler<C>>, BusError> {
        let kind = MessageKind::of::<C>();
        self.result_handlers
            .get::<Arc<dyn ResultCommandHandler<C>>>(kind)
            .ok_or_else(|| BusError::no_handler(kind.name()))
    }

    /// Run the handler of `C` on the worker pool.
    pub fn send_result<C: ResultCommand>(&self, command: C) -> DispatchHandle<C::Output> {
        let kind = MessageKind::of::<C>();
        match self.result_handler::<C>() {
            Ok(handler) => self.pool.submit(kind.name(), move || {
                invoke_single(kind, || handler.handle(&command))
            }),
            Err(err) => DispatchHandle::ready(Err(err)),
        }
    }

    /// Run the handler of `C` inline and return its value or error.
    pub fn send_result_sync<C: ResultCommand>(&self, command: C) -> Result<C::Output, BusError> {
        let kind = MessageKind::of::<C>();
        let handler = self.result_handler::<C>()?;
        invoke_single(kind, || handler.handle(&command))
    }
}

impl CommandStatusStore for CommandBus {
    fn update_status(&self, command_id: Id, status: CommandStatus) {
        self.statuses.update_status(command_id, status)
    }

    fn status(&self, command_id: Id) -> CommandStatus {
        self.statuses.status(command_id)
    }

    fn forget(&self, command_id: Id) -> Option<CommandStatus> {
        self.statuses.forget(command_id)
    }
}

impl core::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CommandBus")
            .field(
                "handlers",
                &handlers
                    .iter()
                    .map(|(kind, list)| (kind.name(), list.len()))
                    .collect::<Vec<_>>(),
            )
            .field("result_handlers", &self.result_handlers)
            .field("pool", &self.pool.name())
            .finish()
    }
}
