// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::BucketError;

/// Metadata the bucket returns about an object: its current generation and size.
///
/// `generation` is always strictly positive for any object the bucket actually
/// holds; `0` is reserved by the proxy to mean "no prior generation" and is never
/// produced by a well-behaved [`Bucket`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRecord {
    /// The object's current generation.
    pub generation: i64,
    /// The object's size in bytes.
    pub size: u64,
}

/// A request to publish new object contents, with an optional generation
/// precondition.
///
/// `generation_precondition` of `Some(0)` means "create only if the object does
/// not already exist". Any other value means "replace only if the object's
/// current generation matches exactly".
#[derive(Debug, Clone)]
pub struct CreateObjectRequest {
    /// The object's name (key) in the bucket.
    pub name: String,
    /// The full contents to publish. The bucket only supports whole-object
    /// replacement, so this is always the complete byte sequence, not a delta.
    pub contents: Bytes,
    /// The generation the caller expects to be replacing (or `Some(0)` /
    /// `None` to require the object be absent).
    pub generation_precondition: Option<i64>,
}

/// A streaming, sequential, read-only view over one generation of a remote
/// object.
///
/// Returned by [`Bucket::new_reader`] and fully drained then closed by the
/// proxy's materializer in a single pass; it is never held across public
/// proxy operations.
#[async_trait]
pub trait SourceReader: Send {
    /// Reads up to `buf.len()` bytes into `buf`, returning the number of bytes
    /// read. A return of `0` indicates the stream is exhausted.
    async fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, BucketError>;

    /// Releases any resources held by the reader.
    ///
    /// Must be called exactly once, after the stream has been fully drained (or
    /// after an error aborts the read). A failure here must be surfaced to the
    /// caller even if every preceding read succeeded.
    async fn close(self: Box<Self>) -> std::result::Result<(), BucketError>;
}

/// The remote object store the proxy bridges to POSIX-style random access.
///
/// Implementations provide whole-object sequential reads
/// ([`new_reader`](Bucket::new_reader)), whole-object optimistic-concurrency
/// writes ([`create_object`](Bucket::create_object)), and metadata lookups
/// ([`stat_object`](Bucket::stat_object)). The proxy issues exactly one of
/// these calls at a time and never pipelines requests against the same
/// `Bucket` instance on behalf of a single proxy.
///
/// A `Bucket` is a shared, borrowed capability: many [`ObjectProxy`](crate::ObjectProxy)
/// instances may hold a reference to the same bucket concurrently.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Looks up the current metadata for `name`.
    ///
    /// Returns `Err(BucketError::NotFound)` if no object exists under that
    /// name (which is a normal, expected outcome, not a transport failure).
    async fn stat_object(
        &self,
        cx: &CancellationToken,
        name: &str,
    ) -> std::result::Result<ObjectRecord, BucketError>;

    /// Opens a streaming reader over `generation` of `name`.
    async fn new_reader(
        &self,
        cx: &CancellationToken,
        name: &str,
        generation: i64,
    ) -> std::result::Result<Box<dyn SourceReader>, BucketError>;

    /// Publishes new contents for the object named by `request.name`, subject to
    /// `request.generation_precondition`.
    ///
    /// Returns `Err(BucketError::Precondition(_))` if the precondition was not
    /// met (the object was created, deleted, or updated concurrently).
    async fn create_object(
        &self,
        cx: &CancellationToken,
        request: CreateObjectRequest,
    ) -> std::result::Result<ObjectRecord, BucketError>;
}

/// Lets an `Arc<dyn Bucket>` (or `Arc<ConcreteBucket>`) be shared across
/// several proxies while each still holds its own owned `B: Bucket`.
#[async_trait]
impl<T: Bucket + ?Sized> Bucket for std::sync::Arc<T> {
    async fn stat_object(
        &self,
        cx: &CancellationToken,
        name: &str,
    ) -> std::result::Result<ObjectRecord, BucketError> {
        T::stat_object(self, cx, name).await
    }

    async fn new_reader(
        &self,
        cx: &CancellationToken,
        name: &str,
        generation: i64,
    ) -> std::result::Result<Box<dyn SourceReader>, BucketError> {
        T::new_reader(self, cx, name, generation).await
    }

    async fn create_object(
        &self,
        cx: &CancellationToken,
        request: CreateObjectRequest,
    ) -> std::result::Result<ObjectRecord, BucketError> {
        T::create_object(self, cx, request).await
    }
}

#[cfg(any(feature = "fakes", test))]
mockall::mock! {
    /// A mock [`Bucket`] for unit and scenario tests.
    pub MockBucket {}

    #[async_trait]
    impl Bucket for MockBucket {
        async fn stat_object(
            &self,
            cx: &CancellationToken,
            name: &str,
        ) -> std::result::Result<ObjectRecord, BucketError>;

        async fn new_reader(
            &self,
            cx: &CancellationToken,
            name: &str,
            generation: i64,
        ) -> std::result::Result<Box<dyn SourceReader>, BucketError>;

        async fn create_object(
            &self,
            cx: &CancellationToken,
            request: CreateObjectRequest,
        ) -> std::result::Result<ObjectRecord, BucketError>;
    }
}

#[cfg(any(feature = "fakes", test))]
mockall::mock! {
    /// A mock [`SourceReader`] for unit and scenario tests.
    pub MockSourceReader {}

    #[async_trait]
    impl SourceReader for MockSourceReader {
        async fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, BucketError>;
        async fn close(self: Box<Self>) -> std::result::Result<(), BucketError>;
    }
}

#[cfg(any(feature = "fakes", test))]
pub mod fakes {
    use super::{BucketError, SourceReader};
    use async_trait::async_trait;

    /// A [`SourceReader`] that serves bytes from an in-memory buffer, for tests
    /// that want a real (if trivial) reader rather than per-call mock
    /// expectations.
    #[derive(Debug)]
    pub struct InMemoryReader {
        remaining: std::collections::VecDeque<u8>,
        close_result: std::result::Result<(), BucketError>,
    }

    impl InMemoryReader {
        pub fn new(contents: impl Into<Vec<u8>>) -> Self {
            Self {
                remaining: contents.into().into(),
                close_result: Ok(()),
            }
        }

        pub fn with_close_error(contents: impl Into<Vec<u8>>, err: BucketError) -> Self {
            Self {
                remaining: contents.into().into(),
                close_result: Err(err),
            }
        }
    }

    #[async_trait]
    impl SourceReader for InMemoryReader {
        async fn read(&mut self, buf: &mut [u8]) -> std::result::Result<usize, BucketError> {
            let n = self.remaining.len().min(buf.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.remaining.pop_front().expect("checked len above");
            }
            Ok(n)
        }

        async fn close(self: Box<Self>) -> std::result::Result<(), BucketError> {
            self.close_result
        }
    }
}
