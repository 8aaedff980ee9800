//! Handler traits and the invocation policies the buses run them under.
//!
//! Domain failures are logged with their `DomainError::code` when the handler
//! error wraps one.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use keel_core::DomainError;

use crate::error::BusError;
use crate::message::{Command, Message, MessageKind, Query, ResultCommand};

/// Error raised by a handler body.
///
/// Any error type converts into it with `?`; callers get the original back with
/// `downcast_ref`.
pub type HandlerError = anyhow::Error;

pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Handles fire-and-forget commands.
///
/// The same handler may be registered for several command kinds, so it receives
/// the command type-erased. [`command_handler`] builds a handler for a single
/// concrete command type from a closure.
pub trait CommandHandler: Send + Sync + 'static {
    fn handle(&self, command: &dyn Command) -> HandlerResult;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// The single handler of a result-bearing command.
pub trait ResultCommandHandler<C: ResultCommand>: Send + Sync + 'static {
    fn handle(&self, command: &C) -> HandlerResult<C::Output>;
}

impl<C, F> ResultCommandHandler<C> for F
where
    C: ResultCommand,
    F: Fn(&C) -> HandlerResult<C::Output> + Send + Sync + 'static,
{
    fn handle(&self, command: &C) -> HandlerResult<C::Output> {
        self(command)
    }
}

/// The single handler of a query kind.
pub trait QueryHandler<Q: Query>: Send + Sync + 'static {
    fn handle(&self, query: &Q) -> HandlerResult<Q::Output>;
}

impl<Q, F> QueryHandler<Q> for F
where
    Q: Query,
    F: Fn(&Q) -> HandlerResult<Q::Output> + Send + Sync + 'static,
{
    fn handle(&self, query: &Q) -> HandlerResult<Q::Output> {
        self(query)
    }
}

/// Command handler for exactly one command type, backed by a closure.
pub struct TypedCommandHandler<C, F> {
    f: F,
    _command: PhantomData<fn(&C)>,
}

impl<C, F> CommandHandler for TypedCommandHandler<C, F>
where
    C: Command,
    F: Fn(&C) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, command: &dyn Command) -> HandlerResult {
        match command.as_any().downcast_ref::<C>() {
            Some(command) => (self.f)(command),
            None => Err(anyhow::anyhow!(
                "handler for {} received {}",
                MessageKind::of::<C>(),
                command.kind()
            )),
        }
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<C>()
    }
}

/// Wrap a closure over one concrete command type as a registrable handler.
///
/// Keep the returned `Arc` to unregister the handler later.
pub fn command_handler<C, F>(f: F) -> Arc<dyn CommandHandler>
where
    C: Command,
    F: Fn(&C) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(TypedCommandHandler {
        f,
        _command: PhantomData,
    })
}

/// Wrap a closure as the handler of result command `C`.
pub fn result_handler<C, F>(f: F) -> Arc<dyn ResultCommandHandler<C>>
where
    C: ResultCommand,
    F: Fn(&C) -> HandlerResult<C::Output> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as the handler of query `Q`.
pub fn query_handler<Q, F>(f: F) -> Arc<dyn QueryHandler<Q>>
where
    Q: Query,
    F: Fn(&Q) -> HandlerResult<Q::Output> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Run one handler call, turning errors and panics into [`BusError`].
pub(crate) fn invoke_single<T>(
    kind: MessageKind,
    call: impl FnOnce() -> HandlerResult<T>,
) -> Result<T, BusError> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            tracing::debug!(
                kind = %kind,
                code = domain_code(&err),
                error = %err,
                "handler returned an error"
            );
            Err(BusError::Handler(err))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(kind = %kind, panic = %message, "handler panicked");
            Err(BusError::HandlerPanicked {
                kind: kind.name(),
                message,
            })
        }
    }
}

/// Run every handler once, in order. `true` iff all of them succeeded.
///
/// A failing or panicking handler is logged and does not stop the others.
pub(crate) fn invoke_all(
    kind: MessageKind,
    handlers: &[Arc<dyn CommandHandler>],
    command: &dyn Command,
) -> bool {
    let mut all_succeeded = true;
    for handler in handlers {
        match catch_unwind(AssertUnwindSafe(|| handler.handle(command))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(
                    kind = %kind,
                    handler = handler.name(),
                    code = domain_code(&err),
                    error = %err,
                    "command handler failed"
                );
                all_succeeded = false;
            }
            Err(payload) => {
                tracing::error!(
                    kind = %kind,
                    handler = handler.name(),
                    panic = %panic_message(payload.as_ref()),
                    "command handler panicked"
                );
                all_succeeded = false;
            }
        }
    }
    all_succeeded
}

/// `DomainError::code` of the wrapped error, or `"handler.error"` for anything else.
fn domain_code(err: &HandlerError) -> &'static str {
    err.downcast_ref::<DomainError>()
        .map_or("handler.error", DomainError::code)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
