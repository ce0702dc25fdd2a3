pub mod diag;
pub mod encoder;
pub mod error;
pub mod eval;
pub mod expr;
pub mod image;
pub mod output;
pub mod parser;
pub mod record;
pub mod scanner;
pub mod session;
pub mod source;
pub mod symbol;

pub use error::{Error, Result};
