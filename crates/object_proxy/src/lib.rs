// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-object mediator presenting a random-access, mutable byte view of a
//! single immutable remote blob stored in a generation-based object store.
//!
//! [`ObjectProxy`] bridges a bucket's whole-object, optimistic-concurrency
//! model to POSIX-style `read_at`/`write_at`/`truncate` access: it
//! materializes a specific source generation into a local scratch file on
//! first use, serves subsequent random access from that file, and publishes
//! accumulated edits as a new generation on [`ObjectProxy::sync`].
//!
//! Implement [`Bucket`] against your object store to use this crate; enable
//! the `fakes` feature to get [`bucket::MockBucket`] and friends for testing
//! code that depends on [`ObjectProxy`].

mod bucket;
mod dirty;
mod error;
mod invariants;
mod materialize;
mod proxy;
mod scratch;

pub use bucket::{Bucket, CreateObjectRequest, ObjectRecord, SourceReader};
pub use error::{BucketError, Error, Result};
pub use proxy::ObjectProxy;

#[cfg(any(feature = "fakes", test))]
pub use bucket::fakes;
#[cfg(any(feature = "fakes", test))]
pub use bucket::{MockBucket, MockSourceReader};
