//! Crate-wide error types.
//!
//! Per-packet failures inside the pair tracker and listener loop are *not*
//! represented here — they are local, logged, and swallowed inside the
//! loop that produced them. These errors are for the boundary operations that a caller
//! actually needs to react to: socket setup, keystore I/O, config parsing.

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("keystore I/O error at {path}: {source}")]
    KeystoreIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("keystore file {path} is not valid JSON: {source}")]
    KeystoreDecode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file {path} could not be read: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid TOML: {source}")]
    ConfigDecode {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, BeaconError>;
