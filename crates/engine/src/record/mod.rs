/// Typed record derivation
///
/// A matched raw capture is a map of strings; this module turns it into
/// a typed, enriched `Record` (status class, byte counts, request path)
/// and hosts the post-parse record filter. Derivation is a pure
/// function per record: no shared state, safe to run per arriving line.
pub mod derive;
pub mod filter;
pub mod model;

pub use derive::derive;
pub use model::{Record, Value};
