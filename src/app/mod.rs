//! Application wiring
//!
//! Store registration into an explicit context and the long-running runner.

pub mod context;
pub mod runner;

pub use context::{AppContext, Registrar};
pub use runner::App;
