//! Values flowing through the dispatcher: inputs to process and what handlers produce.

mod input;
mod result;

pub use input::{Input, InputCall, InputEvent, InputKind, InputTarget, Origin};
pub use result::{HandlerOutcome, HandlerResult, PublishedEvent, RegisteredContract};
