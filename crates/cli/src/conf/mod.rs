//! nginx configuration discovery.

pub mod discover;

pub use discover::{discover, Discovered};
