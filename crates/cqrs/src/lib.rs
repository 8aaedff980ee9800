//! In-process command and query dispatch.
//!
//! - [`CommandBus`]: fire-and-forget commands fan out to every registered
//!   handler; result commands go to exactly one.
//! - [`QueryBus`]: one handler per query kind.
//! - [`CommandStatusStore`]: lifecycle of trackable commands.
//! - [`WorkerPool`]: where asynchronous sends run. Share one between buses.
//!
//! Handlers are routed by the runtime type of the message ([`MessageKind`]).
//!
//! ```no_run
//! use keel_cqrs::{BusConfig, Command, CommandBus, MessageKind, command_handler};
//!
//! #[derive(Debug)]
//! struct Greet(String);
//!
//! impl Command for Greet {}
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = CommandBus::from_config(&BusConfig::default())?;
//! bus.register(
//!     command_handler(|cmd: &Greet| {
//!         tracing::info!(name = %cmd.0, "hello");
//!         Ok(())
//!     }),
//!     MessageKind::of::<Greet>(),
//! );
//!
//! assert!(bus.send_sync(Greet("keel".into())));
//! assert!(bus.send(Greet("again".into())).wait()?);
//! # Ok(())
//! # }
//! ```

pub mod command_bus;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;
pub mod query_bus;
mod registry;
pub mod status;
pub mod worker;

pub use command_bus::CommandBus;
pub use config::BusConfig;
pub use context::Buses;
pub use error::{BusError, ConfigError};
pub use handler::{
    CommandHandler, HandlerError, HandlerResult, QueryHandler, ResultCommandHandler,
    TypedCommandHandler, command_handler, query_handler, result_handler,
};
pub use message::{Command, Message, MessageKind, Query, ResultCommand};
pub use query_bus::QueryBus;
pub use status::{CommandStatus, CommandStatusStore, InMemoryStatusStore};
pub use worker::{DispatchHandle, PoolStats, WorkerPool};
