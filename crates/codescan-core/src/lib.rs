pub mod ast;
pub mod config;
pub mod error;
pub mod finding;
pub mod hash;
pub mod types;

pub use ast::*;
pub use config::*;
pub use error::*;
pub use finding::*;
pub use hash::*;
pub use types::*;
