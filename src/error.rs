use std::net::SocketAddr;

use thiserror::Error;

/// Why the aggregator declined to store a transaction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("amount must be a finite number")]
    NonFiniteAmount,

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("timestamp must be positive (got {0} ms)")]
    NonPositiveTimestamp(i64),

    #[error("timestamp {timestamp_ms} ms is after now ({now_ms} ms)")]
    FutureTimestamp { timestamp_ms: i64, now_ms: i64 },
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
