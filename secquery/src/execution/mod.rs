//! Per-party execution state.

mod context;
mod session;

pub use context::{ExecContext, TensorTable};
pub use session::Session;
