//! Frame abstraction and CSV I/O.
//!
//! A [`Frame`] is an immutable rectangular table of named f64 columns. It is
//! the unit of exchange between every scoring path in the harness: the
//! input snapshot, the native prediction output, and the parsed output of
//! each artifact execution are all frames.

mod csv;
mod frame;

pub use self::csv::{export_csv, import_csv};
pub use self::frame::{DataError, Frame};
