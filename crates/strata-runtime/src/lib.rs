//! # strata-runtime
//!
//! Operation dispatch over a [`strata_core::traits::EntityStore`].
//! Operations resolve to CRUD primitives or SDK handlers; requests pass through
//! payload conversion, actor resolution and identifier verification, and
//! failures leave as stable fault payloads.

pub mod collaborators;
pub mod dispatcher;
pub mod exchange;
pub mod fault;
pub mod operation;
pub mod runtime;

pub use dispatcher::Dispatcher;
pub use exchange::Exchange;
pub use fault::{Fault, FaultType};
pub use operation::{Behavior, CrudPrimitive, OperationContext, OperationDefinition, OperationHandler};
pub use runtime::{RuntimeOptions, StrataRuntime};
