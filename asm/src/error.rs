use thiserror::Error;

/// Conditions that stop the assembler. Ordinary source errors are reported
/// through [`crate::diag::Diagnostics`] and counted instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("excessive number of subexpressions")]
    ExprArenaExhausted,

    #[error("cannot redefine reserved symbol `{0}`")]
    ReservedTwice(String),

    #[error("Unknown output file extension: {0}")]
    UnknownExtension(String),

    #[error("Failed to open file: {0}")]
    FileOpen(String, #[source] std::io::Error),

    #[error("Failed to read line: {0}")]
    FileRead(String, #[source] std::io::Error),

    #[error("Failed to create file: {0}")]
    FileCreate(String, #[source] std::io::Error),

    #[error("Failed to write file: {0}")]
    FileWrite(String, #[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
