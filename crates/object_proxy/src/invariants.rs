// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// The fields of an [`ObjectProxy`](crate::ObjectProxy) needed to check its
/// invariants, borrowed rather than threading the whole struct through to
/// keep this module decoupled from the bucket's generic parameter.
pub(crate) struct InvariantView<'a> {
    pub(crate) source_generation: i64,
    pub(crate) local_size: Option<u64>,
    pub(crate) dirty: bool,
    pub(crate) _marker: std::marker::PhantomData<&'a ()>,
}

/// Panics if any of the proxy's documented invariants is violated.
///
/// Called at the start and end of every public [`ObjectProxy`](crate::ObjectProxy)
/// operation. This is a debug/assert mechanism, not a recoverable check: a
/// violation indicates a bug in this crate, never an expected runtime
/// condition, so it panics rather than returning a `Result`.
pub(crate) fn check_invariants(view: &InvariantView<'_>) {
    assert!(
        view.source_generation >= 0,
        "invariant violated: source_generation must be non-negative, got {}",
        view.source_generation
    );

    assert!(
        !(view.dirty && view.local_size.is_none()),
        "invariant violated: dirty is true but no local scratch is present"
    );

    assert!(
        !(view.source_generation == 0 && view.local_size.is_none() && view.dirty),
        "invariant violated: empty-source proxy with no scratch cannot be dirty"
    );
}
