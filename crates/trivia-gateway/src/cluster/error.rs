use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Errors from the cluster pub/sub bridge, kept separate from
/// [`crate::error::Error`] because a cluster failure never aborts local
/// delivery — it's handled entirely within [`crate::cluster`].
#[derive(Debug)]
pub struct ClusterError {
    kind: ClusterErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ClusterError {
    #[must_use]
    pub fn new(kind: ClusterErrorKind) -> Self {
        ClusterError { kind, source: None }
    }

    #[must_use]
    pub fn with_source(kind: ClusterErrorKind, source: impl StdError + Send + Sync + 'static) -> Self {
        ClusterError {
            kind,
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &ClusterErrorKind {
        &self.kind
    }
}

impl Display for ClusterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.kind, f)
    }
}

impl StdError for ClusterError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|s| &**s as &(dyn StdError + 'static))
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum ClusterErrorKind {
    ConnectFailed,
    PublishFailed,
    SubscribeFailed,
    MalformedEnvelope,
}

impl Display for ClusterErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ClusterErrorKind::ConnectFailed => f.write_str("failed to connect to the cluster bus"),
            ClusterErrorKind::PublishFailed => f.write_str("failed to publish to the cluster bus"),
            ClusterErrorKind::SubscribeFailed => f.write_str("failed to subscribe to the cluster bus"),
            ClusterErrorKind::MalformedEnvelope => f.write_str("received a malformed cluster envelope"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
