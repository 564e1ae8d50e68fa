//! Throttled stream decorators.

mod reader;
mod writer;

pub use reader::ThrottledReader;
pub use writer::ThrottledWriter;
