//! Error types for the network crate.

use aurum_ledger::LedgerError;
use thiserror::Error;

/// Result alias used throughout the network crate.
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

/// Failures surfaced by the sync engine.
///
/// Peer-attributable errors are recovered locally: the offending peer is
/// reported to the peer set and a different one is selected on the next
/// cycle. Local failures (storage, consistency) are logged and never blamed
/// on a peer.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The peer violated the protocol: wrong hash, misordered headers, an
    /// empty reply where data was required, or a branch outside the
    /// checkpoint.
    #[error("peer misbehaved: {reason}")]
    PeerMisbehave { reason: String },

    /// The transport could not send a request; the peer is gone.
    #[error("peer dropped before the request could be sent")]
    PeerDropped,

    /// No reply arrived within the sync timeout.
    #[error("{request} request timed out after {timeout_ms}ms")]
    RequestTimeout {
        request: &'static str,
        timeout_ms: u64,
    },

    /// A header batch does not extend the working header list.
    #[error("received headers do not extend the working header list")]
    AppendOrderMismatch,

    /// A merkle proof did not commit to the revealed data.
    #[error("merkle proof validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// The chain state machine rejected or failed to ingest a block.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl NetworkError {
    /// Whether the error should count against the sync peer.
    pub fn is_peer_fault(&self) -> bool {
        match self {
            NetworkError::PeerMisbehave { .. }
            | NetworkError::PeerDropped
            | NetworkError::RequestTimeout { .. }
            | NetworkError::AppendOrderMismatch
            | NetworkError::ValidationFailed { .. } => true,
            NetworkError::Ledger(err) => err.is_peer_fault(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_not_peer_faults() {
        let err = NetworkError::Ledger(LedgerError::Storage {
            operation: "save_block".into(),
            reason: "disk full".into(),
        });
        assert!(!err.is_peer_fault());

        let err = NetworkError::PeerMisbehave {
            reason: "empty header batch".into(),
        };
        assert!(err.is_peer_fault());
    }
}
