// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tokio_util::sync::CancellationToken;

use crate::bucket::Bucket;
use crate::error::{Error, Result};
use crate::scratch::ScratchFile;

/// Ensures `local` is populated with the full contents of `source_generation`,
/// leaving it untouched if already present.
///
/// Idempotent: a no-op if `local` is `Some(_)` on entry. On any failure,
/// `local` is left `None` so the next call starts over cleanly rather than
/// serving a half-copied scratch.
pub(crate) async fn ensure_materialized<B: Bucket>(
    bucket: &B,
    cx: &CancellationToken,
    name: &str,
    source_generation: i64,
    local: &mut Option<ScratchFile>,
) -> Result<()> {
    if local.is_some() {
        return Ok(());
    }

    if source_generation == 0 {
        tracing::debug!(name, "materializing empty source (no prior generation)");
        *local = Some(ScratchFile::create().await.map_err(|e| Error::scratch_io("create", e))?);
        return Ok(());
    }

    tracing::debug!(name, source_generation, "materializing from bucket");

    let mut reader = bucket
        .new_reader(cx, name, source_generation)
        .await
        .map_err(|e| Error::io("NewReader", e))?;

    let mut scratch = ScratchFile::create()
        .await
        .map_err(|e| Error::scratch_io("create", e))?;

    let copy_result = copy_into(reader.as_mut(), &mut scratch).await;
    let close_result = reader.close().await.map_err(|e| Error::io("Close", e));

    if let Err(err) = copy_result {
        tracing::warn!(name, error = %err, "materialization copy failed, discarding scratch");
        return Err(err);
    }
    if let Err(err) = close_result {
        tracing::warn!(name, error = %err, "materialization close failed, discarding scratch");
        return Err(err);
    }

    tracing::debug!(name, size = scratch.size(), "materialization complete");
    *local = Some(scratch);
    Ok(())
}

async fn copy_into(
    reader: &mut (dyn crate::bucket::SourceReader + '_),
    scratch: &mut ScratchFile,
) -> Result<()> {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut offset = 0_u64;
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| Error::io("Copy", e))?;
        if n == 0 {
            return Ok(());
        }
        scratch
            .write_at(&buf[..n], offset)
            .await
            .map_err(|e| Error::scratch_io("write_at", e))?;
        offset += n as u64;
    }
}
