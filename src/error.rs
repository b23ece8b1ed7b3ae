//! Library error types.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Library error that can be serialized across the host boundary.
#[derive(Debug)]
pub struct AppError {
    payload: HashMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Executable missing or the process could not be spawned
    Launch,
    /// Process or request exceeded its time bound
    Timeout,
    /// Child process misbehaved after a successful spawn
    Process,
    /// Network error
    Network,
    /// File system error
    Io,
    /// Secret store error
    Secrets,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::Launch => 1001,
            Self::Timeout => 1002,
            Self::Process => 1003,
            Self::Network => 2001,
            Self::Io => 3001,
            Self::Secrets => 3002,
            Self::Other => 9999,
        }
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, payload: HashMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            HashMap::new()
        } else {
            HashMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Launch, message)
    }

    pub fn timeout(command: &str, limit: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            HashMap::from([
                ("command".to_string(), command.to_string()),
                ("timeout_secs".to_string(), limit.as_secs().to_string()),
            ]),
        )
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Process, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Network, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn secrets(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Secrets, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let mut pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for AppError {}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::with_detail(ErrorKind::Timeout, err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
