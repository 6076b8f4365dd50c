use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZiError {
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
    #[error("Operation timed out")]
    Timeout,
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Type error: {0}")]
    Type(String),
    #[error("Command mismatch: expected {expected}, got {actual}")]
    CommandMismatch { expected: String, actual: String },
    #[error("Invalid node path: {0}")]
    InvalidPath(String),
    #[error("Server error {code}: {message}")]
    ServerError { code: i32, message: String },
    #[error("Expected node missing from returned data: {0}")]
    MissingNode(String),
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),
    #[error("AWG compiler error: {0}")]
    Compiler(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<std::io::Error> for ZiError {
    fn from(source: std::io::Error) -> Self {
        ZiError::Io {
            source,
            context: "socket".to_string(),
        }
    }
}
