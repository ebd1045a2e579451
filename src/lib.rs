//! planspec - normalized resource specs from infrastructure plans
//!
//! Resource types are described by declarative mapping documents instead of
//! per-type parsers: a small query language locates values in the plan,
//! placeholders and reference strategies turn them into specs.

pub mod config;
pub mod error;
pub mod extract;
pub mod mapping;
pub mod query;
pub mod resolve;
pub mod session;

pub use config::Config;
pub use error::{EngineError, Result};
pub use extract::{Extraction, NormalizedResourceSpec};
pub use session::Session;
