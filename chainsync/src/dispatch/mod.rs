//! Routing of inputs to domain handlers and persistence of their outcomes.

mod dispatcher;
mod handler;
mod registry;

pub use dispatcher::Dispatcher;
pub use handler::{Handler, HandlerContext};
pub use registry::{Domain, HandlerRegistry, HandlerRegistryBuilder, RegisteredHandler};
