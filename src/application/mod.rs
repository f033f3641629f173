// Application layer: ledger use cases on top of the repository.

mod config;
mod context;
pub mod error;
pub mod notify;
pub mod reporting;
mod service;

pub use config::*;
pub use context::*;
pub use error::*;
pub use notify::*;
pub use reporting::*;
pub use service::*;
