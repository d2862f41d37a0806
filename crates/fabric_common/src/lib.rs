//! Common result and error types shared across the fabric workspace.

mod result;

pub use result::{FabricResult, InternalError};
