// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::bucket::{Bucket, CreateObjectRequest};
use crate::dirty::Dirty;
use crate::error::{BucketError, Error, Result};
use crate::invariants::{check_invariants, InvariantView};
use crate::materialize::ensure_materialized;
use crate::scratch::ScratchFile;

/// A per-object, in-process mediator presenting a random-access, mutable byte
/// view of one generation of an immutable remote blob.
///
/// An `ObjectProxy` is branched from a single bucket generation (or from
/// nothing, when constructed with `source_generation == 0`). It lazily
/// materializes that generation into a local scratch file on first read or
/// write, serves all subsequent random access locally, and publishes
/// accumulated edits back to the bucket as a new generation on
/// [`sync`](Self::sync).
///
/// Not internally synchronized: exactly one logical caller may issue
/// operations on a given instance at a time. Distinct instances are fully
/// independent.
pub struct ObjectProxy<B: Bucket> {
    bucket: B,
    name: String,
    source_generation: i64,
    source_size: u64,
    local: Option<ScratchFile>,
    dirty: Dirty,
}

impl<B: Bucket> ObjectProxy<B> {
    /// Creates a proxy branched from `source_generation` of `name`.
    ///
    /// `source_generation == 0` means "no prior object": the proxy starts in
    /// the empty-source state, and its first successful `sync` creates the
    /// object rather than replacing one.
    pub fn new(bucket: B, name: impl Into<String>, source_generation: i64, source_size: u64) -> Self {
        let proxy = Self {
            bucket,
            name: name.into(),
            source_generation,
            source_size,
            local: None,
            dirty: Dirty::clean(),
        };
        proxy.check_invariants();
        proxy
    }

    /// The object's immutable name. No side effects.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Verifies this proxy's internal invariants, panicking if any is
    /// violated.
    ///
    /// Called automatically at the start and end of every other public
    /// operation; exposed directly so tests (and paranoid callers) can probe
    /// proxy state at arbitrary points.
    pub fn check_invariants(&self) {
        check_invariants(&InvariantView {
            source_generation: self.source_generation,
            local_size: self.local.as_ref().map(ScratchFile::size),
            dirty: self.dirty.is_dirty(),
            _marker: std::marker::PhantomData,
        });
    }

    fn effective_size(&self) -> u64 {
        self.local.as_ref().map_or(self.source_size, ScratchFile::size)
    }

    /// Reports the bucket's current view of the object, the local effective
    /// size (which reflects any pending local edits), and whether the remote
    /// object has drifted from this proxy's source generation.
    ///
    /// Never materializes the source and never mutates the proxy, including
    /// on error.
    #[tracing::instrument(skip(self, cx), fields(name = %self.name))]
    pub async fn stat(&self, cx: &CancellationToken) -> Result<(u64, bool)> {
        self.check_invariants();
        let result = self.stat_inner(cx).await;
        self.check_invariants();
        result
    }

    async fn stat_inner(&self, cx: &CancellationToken) -> Result<(u64, bool)> {
        let clobbered = match self.bucket.stat_object(cx, &self.name).await {
            Ok(record) => record.generation != self.source_generation,
            Err(BucketError::NotFound) => self.source_generation != 0,
            Err(other) => return Err(Error::io("StatObject", other)),
        };

        if clobbered {
            tracing::warn!(name = %self.name, "stat detected clobber against remote object");
        }

        Ok((self.effective_size(), clobbered))
    }

    /// Reads up to `buf.len()` bytes starting at `offset`, materializing the
    /// source first if this is the first read or write against this proxy.
    ///
    /// Returns `0` once `offset` reaches or passes the effective size,
    /// conventionally signalling end-of-stream rather than an error. A
    /// zero-length `buf` still triggers materialization.
    #[tracing::instrument(skip(self, cx, buf), fields(name = %self.name, offset))]
    pub async fn read_at(&mut self, cx: &CancellationToken, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.check_invariants();
        let result = self.read_at_inner(cx, buf, offset).await;
        self.check_invariants();
        result
    }

    async fn read_at_inner(&mut self, cx: &CancellationToken, buf: &mut [u8], offset: u64) -> Result<usize> {
        ensure_materialized(&self.bucket, cx, &self.name, self.source_generation, &mut self.local).await?;

        let scratch = self.local.as_ref().expect("just materialized");
        scratch
            .read_at(buf, offset)
            .await
            .map_err(|e| Error::scratch_io("read_at", e))
    }

    /// Writes `buf` at `offset`, materializing the source first if needed,
    /// extending the scratch (zero-filling the gap) if `offset + buf.len()`
    /// exceeds its current size, and marking the proxy dirty.
    ///
    /// Partial writes are not possible at this layer: success always means
    /// all of `buf` was written.
    #[tracing::instrument(skip(self, cx, buf), fields(name = %self.name, offset))]
    pub async fn write_at(&mut self, cx: &CancellationToken, buf: &[u8], offset: u64) -> Result<usize> {
        self.check_invariants();
        let result = self.write_at_inner(cx, buf, offset).await;
        self.check_invariants();
        result
    }

    async fn write_at_inner(&mut self, cx: &CancellationToken, buf: &[u8], offset: u64) -> Result<usize> {
        ensure_materialized(&self.bucket, cx, &self.name, self.source_generation, &mut self.local).await?;

        let scratch = self.local.as_mut().expect("just materialized");
        let n = scratch
            .write_at(buf, offset)
            .await
            .map_err(|e| Error::scratch_io("write_at", e))?;
        self.dirty.mark();
        Ok(n)
    }

    /// Resizes the effective object to exactly `new_size`, materializing the
    /// source first if needed and unconditionally marking the proxy dirty
    /// (even if `new_size` happens to equal the current size).
    #[tracing::instrument(skip(self, cx), fields(name = %self.name, new_size))]
    pub async fn truncate(&mut self, cx: &CancellationToken, new_size: u64) -> Result<()> {
        self.check_invariants();
        let result = self.truncate_inner(cx, new_size).await;
        self.check_invariants();
        result
    }

    async fn truncate_inner(&mut self, cx: &CancellationToken, new_size: u64) -> Result<()> {
        ensure_materialized(&self.bucket, cx, &self.name, self.source_generation, &mut self.local).await?;

        let scratch = self.local.as_mut().expect("just materialized");
        scratch
            .truncate(new_size)
            .await
            .map_err(|e| Error::scratch_io("truncate", e))?;
        self.dirty.mark();
        Ok(())
    }

    /// Publishes accumulated local edits as a new object generation.
    ///
    /// Elides the bucket call entirely — returning the current
    /// `source_generation` — only when there is a prior source generation
    /// and no mutation is pending. A brand-new proxy with
    /// `source_generation == 0` and no writes still publishes an empty
    /// object, matching the bucket's contract that the first generation must
    /// be created explicitly.
    ///
    /// On a precondition rejection or any other failure, the proxy's dirty
    /// state is left exactly as it was so a subsequent `sync` retries.
    #[tracing::instrument(skip(self, cx), fields(name = %self.name))]
    pub async fn sync(&mut self, cx: &CancellationToken) -> Result<i64> {
        self.check_invariants();
        let result = self.sync_inner(cx).await;
        self.check_invariants();
        result
    }

    async fn sync_inner(&mut self, cx: &CancellationToken) -> Result<i64> {
        if self.source_generation != 0 && !self.dirty.is_dirty() {
            return Ok(self.source_generation);
        }

        ensure_materialized(&self.bucket, cx, &self.name, self.source_generation, &mut self.local).await?;
        let scratch = self.local.as_ref().expect("just materialized");
        let size = scratch.size();
        let mut contents = vec![0_u8; size as usize];
        scratch
            .read_at(&mut contents, 0)
            .await
            .map_err(|e| Error::scratch_io("read_at", e))?;

        let request = CreateObjectRequest {
            name: self.name.clone(),
            contents: Bytes::from(contents),
            generation_precondition: Some(self.source_generation),
        };

        let result = self.bucket.create_object(cx, request).await;

        let generation = match result {
            Ok(record) if record.generation == 0 => return Err(Error::InvalidGeneration),
            Ok(record) => record.generation,
            Err(BucketError::Precondition(msg)) => {
                tracing::warn!(name = %self.name, "sync rejected by precondition");
                return Err(Error::Precondition(msg));
            }
            Err(other) => return Err(Error::io("CreateObject", other)),
        };

        tracing::info!(name = %self.name, generation, "sync published new generation");
        self.source_generation = generation;
        self.source_size = size;
        self.dirty.clear();
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code")]

    use super::*;
    use crate::bucket::fakes::InMemoryReader;
    use crate::bucket::{MockBucket, ObjectRecord};

    fn cx() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn s1_create_from_empty_write_sync_read() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_create_object()
            .withf(|_, req| {
                req.name == "some/object" && req.contents.as_ref() == b"taco" && req.generation_precondition == Some(0)
            })
            .returning(|_, _| Ok(ObjectRecord { generation: 17, size: 4 }));

        let mut proxy = ObjectProxy::new(bucket, "some/object", 0, 0);

        let n = proxy.write_at(&cx(), b"taco", 0).await.unwrap();
        assert_eq!(n, 4);

        let generation = proxy.sync(&cx()).await.unwrap();
        assert_eq!(generation, 17);

        let mut buf = [0_u8; 1024];
        let n = proxy.read_at(&cx(), &mut buf, 0).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], b"taco");

        let generation = proxy.sync(&cx()).await.unwrap();
        assert_eq!(generation, 17);
    }

    #[tokio::test]
    async fn s2_write_past_end_then_read() {
        let bucket = MockBucket::new();
        let mut proxy = ObjectProxy::new(bucket, "some/object", 0, 0);

        proxy.write_at(&cx(), b"taco", 2).await.unwrap();

        let mut buf = [0_u8; 1024];
        let n = proxy.read_at(&cx(), &mut buf, 0).await.unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buf[..6], b"\x00\x00taco");

        let mut buf = [0_u8; 4];
        let n = proxy.read_at(&cx(), &mut buf, 1).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"\x00tac");
    }

    #[tokio::test]
    async fn s3_branch_from_generation_partial_read_single_new_reader() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_new_reader()
            .times(1)
            .withf(|_, name, generation| name == "some/object" && *generation == 123)
            .returning(|_, _, _| Ok(Box::new(InMemoryReader::new(*b"tacoburrito"))));

        let mut proxy = ObjectProxy::new(bucket, "some/object", 123, 11);

        let mut buf = [0_u8; 4];
        let n = proxy.read_at(&cx(), &mut buf, 0).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"taco");

        let mut buf = [0_u8; 4];
        let n = proxy.read_at(&cx(), &mut buf, 2).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"cobu");
    }

    #[tokio::test]
    async fn s4_sync_precondition_failure_then_retry() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_create_object()
            .times(2)
            .returning(|_, _| Err(BucketError::Precondition("taco".to_owned())));

        let mut proxy = ObjectProxy::new(bucket, "some/object", 0, 0);

        let err = proxy.sync(&cx()).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("CreateObject"));
        assert!(err.to_string().contains("taco"));

        let err = proxy.sync(&cx()).await.unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn s5_invalid_generation_from_bucket() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_create_object()
            .returning(|_, _| Ok(ObjectRecord { generation: 0, size: 0 }));

        let mut proxy = ObjectProxy::new(bucket, "some/object", 0, 0);

        let err = proxy.sync(&cx()).await.unwrap_err();
        assert!(!err.is_precondition());
        let rendered = err.to_string();
        assert!(rendered.contains("CreateObject"));
        assert!(rendered.contains("invalid generation"));
        assert!(rendered.contains('0'));
    }

    #[tokio::test]
    async fn s6_clobber_detection_preserves_scratch() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_new_reader()
            .returning(|_, _, _| Ok(Box::new(InMemoryReader::new(vec![0_u8; 456]))));
        bucket.expect_stat_object().returning(|_, _| {
            Ok(ObjectRecord {
                generation: 123 + 19,
                size: 456,
            })
        });

        let mut proxy = ObjectProxy::new(bucket, "some/object", 123, 456);
        proxy.truncate(&cx(), 473).await.unwrap();

        let (size, clobbered) = proxy.stat(&cx()).await.unwrap();
        assert_eq!(size, 473);
        assert!(clobbered);

        let mut buf = [0_u8; 473];
        let n = proxy.read_at(&cx(), &mut buf, 0).await.unwrap();
        assert_eq!(n, 473);
    }

    #[tokio::test]
    async fn sync_on_fresh_empty_proxy_calls_create_object() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_create_object()
            .times(1)
            .withf(|_, req| req.contents.is_empty() && req.generation_precondition == Some(0))
            .returning(|_, _| Ok(ObjectRecord { generation: 1, size: 0 }));

        let mut proxy = ObjectProxy::new(bucket, "some/object", 0, 0);
        let generation = proxy.sync(&cx()).await.unwrap();
        assert_eq!(generation, 1);
    }

    #[tokio::test]
    async fn stat_not_found_on_branched_proxy_is_clobbered() {
        let mut bucket = MockBucket::new();
        bucket.expect_stat_object().returning(|_, _| Err(BucketError::NotFound));

        let proxy = ObjectProxy::new(bucket, "some/object", 123, 456);
        let (size, clobbered) = proxy.stat(&cx()).await.unwrap();
        assert_eq!(size, 456);
        assert!(clobbered);
    }

    #[tokio::test]
    async fn stat_not_found_on_empty_proxy_is_not_clobbered() {
        let mut bucket = MockBucket::new();
        bucket.expect_stat_object().returning(|_, _| Err(BucketError::NotFound));

        let proxy = ObjectProxy::new(bucket, "some/object", 0, 0);
        let (size, clobbered) = proxy.stat(&cx()).await.unwrap();
        assert_eq!(size, 0);
        assert!(!clobbered);
    }

    #[tokio::test]
    async fn stat_never_materializes() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_stat_object()
            .returning(|_, _| Ok(ObjectRecord { generation: 123, size: 456 }));
        // `new_reader` is deliberately left unconfigured: any call panics the mock.

        let proxy = ObjectProxy::new(bucket, "some/object", 123, 456);
        let (size, clobbered) = proxy.stat(&cx()).await.unwrap();
        assert_eq!(size, 456);
        assert!(!clobbered);
    }

    #[tokio::test]
    async fn failed_sync_preserves_dirty_and_local_state() {
        let mut bucket = MockBucket::new();
        bucket
            .expect_create_object()
            .returning(|_, _| Err(BucketError::Other("network blip".to_owned())));

        let mut proxy = ObjectProxy::new(bucket, "some/object", 0, 0);
        proxy.write_at(&cx(), b"taco", 0).await.unwrap();

        let err = proxy.sync(&cx()).await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(!err.is_precondition());

        let mut buf = [0_u8; 4];
        let n = proxy.read_at(&cx(), &mut buf, 0).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"taco");
    }

    #[tokio::test]
    #[should_panic(expected = "source_generation must be non-negative")]
    async fn corrupted_state_panics_on_invariant_check() {
        let bucket = MockBucket::new();
        let mut proxy = ObjectProxy::new(bucket, "some/object", 0, 0);
        proxy.source_generation = -1;
        proxy.check_invariants();
    }
}
