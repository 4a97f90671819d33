//! Report composition and chunking.

pub mod chunk;
pub mod compose;

pub use chunk::{chunk_report, truncate_chars};
pub use compose::{build_report, sorted, Composer, ReportOrder};
