use thiserror::Error;

/// Errors raised by routing mutators before any state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    /// Empty or all-whitespace port name.
    #[error("invalid port name {0:?}")]
    Invalid(String),

    /// A `PortRef::Chain` pointed outside the rack.
    #[error("no chain at index {0}")]
    UnknownChain(usize),
}

/// Structural failures while loading a pedalboard into the plugin host.
///
/// Any of these aborts the current load; previously published plugin state
/// stays untouched.
#[derive(Debug, Error)]
pub enum HostError {
    /// The external pedalboard translator failed (non-zero exit, spawn
    /// failure, or unparseable output).
    #[error("translator '{program}' failed: {reason}")]
    Translation { program: String, reason: String },

    /// I/O failure talking to the plugin host process.
    #[error("plugin host i/o: {0}")]
    Communication(#[from] std::io::Error),

    /// The host process died or closed its pipes mid-conversation.
    #[error("plugin host unavailable: {0}")]
    HostGone(String),
}

/// A recognized host-protocol line that could not be parsed. Always
/// recoverable: callers log it and keep scanning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparseable host line {line:?}: {reason}")]
pub struct ParseError {
    pub line: String,
    pub reason: &'static str,
}

impl ParseError {
    pub fn new(line: &str, reason: &'static str) -> Self {
        ParseError {
            line: line.to_string(),
            reason,
        }
    }
}
