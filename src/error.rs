//! Error types shared by the whole generator

use thiserror::Error;

/// Result type alias for pktforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pktforge
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// No transmission technology given on the sequence or the command line
    #[error("No transmission technology set")]
    NoTech,

    /// Unknown transmission technology name
    #[error("Unknown transmission technology '{0}'")]
    UnknownTech(String),

    /// No interface given on the sequence or in the global settings
    #[error("No interface set")]
    NoInterface,

    /// Thread count resolved to zero
    #[error("No threads available for the sequence")]
    NoThreads,

    /// Neither a source IP nor source ranges were given
    #[error("No source IP or source ranges set")]
    NoSourceIp,

    /// No destination IP was given
    #[error("No destination IP set")]
    NoDestination,

    /// Unknown transport protocol name
    #[error("Unknown protocol '{0}'")]
    UnknownProtocol(String),

    /// IPv4 literal could not be parsed
    #[error("Invalid IPv4 address '{0}'")]
    InvalidIp(String),

    /// MAC address string could not be parsed
    #[error("Malformed MAC address '{0}'")]
    MalformedAddress(String),

    /// Source range could not be parsed
    #[error("Invalid source range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    /// Payload hex token could not be decoded
    #[error("Invalid hex token '{0}' in payload")]
    InvalidHex(String),

    /// Payload file could not be read
    #[error("Cannot read payload file '{path}': {source}")]
    PayloadIo {
        path: String,
        source: std::io::Error,
    },

    /// Interface MAC lookup failed
    #[error("Cannot read the MAC address of '{dev}': {reason}")]
    MacLookup { dev: String, reason: String },

    /// Default gateway MAC lookup failed
    #[error("Cannot resolve the gateway MAC address: {0}")]
    GatewayLookup(String),

    /// Backend could not acquire its send resource
    #[error("Backend setup failed: {0}")]
    BackendSetup(String),

    /// Pcap capture or savefile error
    #[error("Pcap error: {0}")]
    Pcap(#[from] pcap::Error),

    /// A frame could not be handed to the backend
    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl Error {
    /// Create an invalid range error
    pub fn invalid_range<S: Into<String>>(range: S, reason: S) -> Self {
        Error::InvalidRange {
            range: range.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend setup error with a custom message
    pub fn backend_setup<S: Into<String>>(msg: S) -> Self {
        Error::BackendSetup(msg.into())
    }

    /// Create a send error with a custom message
    pub fn send_failed<S: Into<String>>(msg: S) -> Self {
        Error::SendFailed(msg.into())
    }
}
