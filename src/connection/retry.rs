//! Lost-connection classification.
//!
//! When a classifier reports that a transport failure was caused by a lost
//! connection, the client re-runs the request exactly once. The default
//! classifier never does.

use crate::transport::TransportError;

/// Decides whether a transport failure warrants a single retry.
pub trait LostConnection: Send + Sync {
    fn caused_by_lost_connection(&self, error: &TransportError) -> bool;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverLost;

impl LostConnection for NeverLost {
    fn caused_by_lost_connection(&self, _error: &TransportError) -> bool {
        false
    }
}

/// Retries refused or timed-out connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct DroppedConnection;

impl LostConnection for DroppedConnection {
    fn caused_by_lost_connection(&self, error: &TransportError) -> bool {
        error.is_connection_error()
    }
}
