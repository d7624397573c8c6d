//! Default channel: room creation and lookup

pub mod router;

pub use router::{ConnectionRouter, DEFAULT_NAMESPACE};
