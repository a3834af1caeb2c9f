//! Lantern Logs - Incremental log iteration and output sanitising

mod iterator;
mod sanitize;

pub use iterator::LogIterator;
pub use sanitize::strip_clear_screen;
