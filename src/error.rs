//! Error types for tree materialization, value decoding and search.
//!
//! Store access failures come in two flavours: failures to open a single
//! subkey, which materialization recovers from by skipping the child, and
//! failures to enumerate a key itself, which are surfaced to the caller.

use crate::tree::NodeId;
use std::io;
use thiserror::Error;

/// Result type alias for explorer operations.
pub type Result<T> = std::result::Result<T, ExplorerError>;

/// Errors that can occur while browsing or searching a key store.
#[derive(Error, Debug)]
pub enum ExplorerError {
    /// I/O error, e.g. the search worker thread could not be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A key exists but cannot be opened for reading.
    #[error("Access denied: {path}")]
    AccessDenied {
        /// Absolute path of the key that could not be opened.
        path: String,
    },

    /// Listing the subkeys or values of a key failed.
    #[error("Failed to enumerate {path}: {reason}")]
    Enumeration {
        /// Absolute path of the key being enumerated.
        path: String,
        /// Store-provided description of the failure.
        reason: String,
    },

    /// Key or value not found in the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The node id no longer refers to a live tree node (e.g. it was
    /// discarded by a refresh of one of its ancestors).
    #[error("Stale node id: {0:?}")]
    StaleNode(NodeId),

    /// A search query was built without any terms.
    #[error("Search query has no terms")]
    EmptyQuery,

    /// Invalid UTF-16 string data in a raw value payload.
    #[error("Invalid UTF-16 string data")]
    InvalidUtf16,

    /// Raw value payload shorter than its type requires.
    #[error("Truncated data: expected {expected} bytes, got {actual} bytes")]
    TruncatedData {
        /// Number of bytes the value type needs.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// The background search worker panicked.
    #[error("Search worker failed: {0}")]
    SearchWorker(String),
}

impl ExplorerError {
    /// Creates an access denied error for the given key path.
    pub fn access_denied(path: &str) -> Self {
        Self::AccessDenied {
            path: path.to_string(),
        }
    }

    /// Creates an enumeration error with context.
    ///
    /// # Arguments
    ///
    /// * `path` - Absolute path of the key being enumerated
    /// * `reason` - Description of what went wrong
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use reg_explorer::error::ExplorerError;
    /// let err = ExplorerError::enumeration("HKEY_CURRENT_USER\\Software", "handle closed");
    /// assert!(!err.is_recoverable());
    /// ```
    pub fn enumeration(path: &str, reason: impl Into<String>) -> Self {
        Self::Enumeration {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a not found error with context about what was being looked up.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use reg_explorer::error::ExplorerError;
    /// let err = ExplorerError::not_found("value", "DisplayName");
    /// assert_eq!(err.to_string(), "Not found: value 'DisplayName'");
    /// ```
    pub fn not_found(item_type: &str, name: &str) -> Self {
        Self::NotFound(format!("{} '{}'", item_type, name))
    }

    /// Whether materialization may skip the offending subkey and continue.
    ///
    /// Only failures to open an individual child are recoverable; everything
    /// else aborts the operation for the node concerned.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AccessDenied { .. } | Self::NotFound(_))
    }
}
