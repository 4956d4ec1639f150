//! Foundational file and time helpers shared across vigil crates.
//!
//! Persisted recovery state, marker files, and installed gateway configs all go
//! through these helpers so concurrent readers never observe a partial write.

pub mod atomic_io;
pub mod clock;

pub use atomic_io::{read_optional_text, remove_file_if_exists, write_text_atomic};
pub use clock::{has_lapsed, now_unix, now_unix_millis};
