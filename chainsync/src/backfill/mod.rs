//! Historical replay of inputs through the dispatcher.

mod http;
mod source;
mod stats;
mod streamer;

pub use http::HttpInputSource;
pub use source::{BackfillWindow, Cursor, FetchRequest, InputSource, Page};
pub use stats::AggregateStats;
pub use streamer::backfill;
