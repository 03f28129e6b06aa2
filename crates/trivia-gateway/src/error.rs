//! The error taxonomy of spec.md §7, shaped like the teacher's
//! `kind` + `source` structs (see `ConnectingError`/`ReceivingEventError`
//! in `twilight-gateway`'s `shard/processor/impl.rs`) rather than a
//! `thiserror` derive, to match the corpus this crate is grounded on.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// An error raised somewhere in the fan-out core.
///
/// Carries a [`ErrorKind`] describing what failed and, where applicable, an
/// underlying source error.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, source: None }
    }

    #[must_use]
    pub fn with_source(
        kind: ErrorKind,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Error {
            kind,
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Consume the error, returning its parts.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (ErrorKind, Option<Box<dyn StdError + Send + Sync>>) {
        (self.kind, self.source)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.kind, f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Kind of failure, per the policy table in spec.md §7.
///
/// Each variant documents its handling policy so call sites don't need to
/// re-derive it from the spec.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Reading from the transport failed. Transient; terminates the
    /// connection, never propagated further.
    TransportRead { connection: String },
    /// Writing to the transport failed. Same policy as `TransportRead`.
    TransportWrite { connection: String },
    /// A connection's send buffer was full; it is deemed unhealthy and
    /// unregistered.
    BufferFull { connection: String },
    /// A priority tier was at capacity; the message was dropped. Only the
    /// critical tier overflowing raises an alert.
    QueueOverflow { tier: &'static str },
    /// A shard migration did not complete within its timeout; both sides
    /// are unregistered.
    MigrationTimeout { user_id: String, from: u64, to: u64 },
    /// Publishing to the cluster bus failed. Local delivery is unaffected.
    ClusterPublishFailure,
    /// An inbound message handler raised an error; reported to the
    /// offending sender only.
    HandlerFailure { message_type: String },
    /// The upgrade handshake failed to authenticate.
    AuthenticationFailure,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ErrorKind::TransportRead { connection } => {
                write!(f, "transport read failed for {connection}")
            }
            ErrorKind::TransportWrite { connection } => {
                write!(f, "transport write failed for {connection}")
            }
            ErrorKind::BufferFull { connection } => {
                write!(f, "send buffer full for {connection}")
            }
            ErrorKind::QueueOverflow { tier } => write!(f, "priority queue tier {tier} overflowed"),
            ErrorKind::MigrationTimeout { user_id, from, to } => write!(
                f,
                "migration of {user_id} from shard {from} to {to} timed out"
            ),
            ErrorKind::ClusterPublishFailure => f.write_str("publishing to the cluster bus failed"),
            ErrorKind::HandlerFailure { message_type } => {
                write!(f, "handler for message type {message_type} failed")
            }
            ErrorKind::AuthenticationFailure => f.write_str("authentication failed at upgrade"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
