// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A failure reported by the [`Bucket`](crate::Bucket) client boundary.
///
/// This is a tagged sum rather than a free-form string so that callers crossing
/// the bucket boundary (and the proxy built on top of it) can distinguish
/// "the object isn't there" and "my precondition was rejected" from any other
/// transport failure without resorting to substring matching.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BucketError {
    /// The requested object (or the requested generation of it) does not exist.
    #[error("not found")]
    NotFound,

    /// A `CreateObject` call was rejected because its generation precondition no
    /// longer matched the object's current state.
    #[error("{0}")]
    Precondition(String),

    /// Any other bucket failure, carrying the bucket's own message.
    #[error("{0}")]
    Other(String),
}

impl BucketError {
    /// Returns `true` if this is a not-found failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns `true` if this is a precondition failure.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

/// Errors surfaced by [`ObjectProxy`](crate::ObjectProxy) operations.
///
/// Every variant other than [`InvalidGeneration`](Error::InvalidGeneration) carries
/// the underlying [`BucketError`] (or, for [`Io`](Error::Io), whichever local or
/// bucket failure triggered it) so the full cause chain is preserved.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The bucket reported that the object (or requested generation) does not exist.
    ///
    /// Note that [`ObjectProxy::stat`](crate::ObjectProxy::stat) never returns this
    /// variant: a not-found `StatObject` result is translated into the `clobbered`
    /// flag instead, per the proxy's contract.
    #[error("not found")]
    NotFound(#[source] BucketError),

    /// `CreateObject` was rejected because its generation precondition no longer
    /// held. The message always names the operation so callers inspecting the
    /// rendered text (rather than matching on the variant) can still identify it.
    #[error("CreateObject: {0}")]
    Precondition(String),

    /// A bucket or local scratch failure, tagged with the operation that triggered
    /// it (`StatObject`, `NewReader`, `CreateObject`, `Copy`, or `Close`).
    #[error("{op}: {source}")]
    Io {
        /// The operation that failed.
        op: &'static str,
        /// The underlying cause.
        #[source]
        source: BucketError,
    },

    /// A local scratch file I/O failure, tagged with the originating operation.
    #[error("{op}: {source}")]
    ScratchIo {
        /// The operation that failed (`read_at`, `write_at`, `truncate`, ...).
        op: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bucket reported a successful `CreateObject` but returned a non-positive
    /// generation, which violates the bucket's own contract that generations are
    /// strictly positive.
    #[error("CreateObject: invalid generation 0")]
    InvalidGeneration,
}

impl Error {
    /// Returns `true` if this error represents a not-found condition, whether
    /// reported directly or wrapped as the cause of an operation-tagged [`Io`](Error::Io)
    /// failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns `true` if this error represents a `CreateObject` precondition failure.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    pub(crate) const fn io(op: &'static str, source: BucketError) -> Self {
        Self::Io { op, source }
    }

    pub(crate) const fn scratch_io(op: &'static str, source: std::io::Error) -> Self {
        Self::ScratchIo { op, source }
    }
}

/// A specialized `Result` for use with [`ObjectProxy`](crate::ObjectProxy) operations.
pub type Result<T> = std::result::Result<T, Error>;
