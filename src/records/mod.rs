//! Record log implementation.
//!
//! Every state change is one line of an append-only text file; the codec
//! turns lines into [`Record`]s and back.

mod codec;
mod log;

pub use codec::Record;
pub use log::{lines, RecordLog};
