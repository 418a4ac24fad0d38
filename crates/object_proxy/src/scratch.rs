// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

/// A sparse, random-access local byte container backing one proxy's mutable
/// view of its source object.
///
/// Backed by an anonymous temporary file (via [`tempfile::tempfile`]): it has
/// no path in the filesystem namespace and is reclaimed by the operating
/// system when the last handle to it (held only by this [`ScratchFile`]) is
/// dropped, matching the non-goal that unsynced local edits need not survive
/// a process crash.
///
/// All I/O blocks a worker thread via [`tokio::task::spawn_blocking`] rather
/// than the calling task, since positional file I/O has no natural async
/// equivalent on most platforms.
#[derive(Debug)]
pub(crate) struct ScratchFile {
    file: Arc<std::fs::File>,
    size: u64,
}

impl ScratchFile {
    /// Creates a new, empty scratch file.
    pub(crate) async fn create() -> io::Result<Self> {
        let file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .expect("scratch file creation task panicked")?;
        Ok(Self {
            file: Arc::new(file),
            size: 0,
        })
    }

    /// The scratch file's current size, in bytes.
    pub(crate) const fn size(&self) -> u64 {
        self.size
    }

    /// Reads into `buf` starting at `offset`, returning the number of bytes
    /// actually copied. Reading at or past [`size`](Self::size) returns `0`
    /// rather than an error.
    pub(crate) async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let available = (self.size - offset) as usize;
        let to_read = buf.len().min(available);
        let file = Arc::clone(&self.file);
        let mut scratch = vec![0_u8; to_read];
        let n = tokio::task::spawn_blocking(move || {
            file.read_at(&mut scratch, offset).map(|n| (n, scratch))
        })
        .await
        .expect("scratch read task panicked")
        .map(|(n, scratch)| {
            buf[..n].copy_from_slice(&scratch[..n]);
            n
        })?;
        Ok(n)
    }

    /// Writes `buf` at `offset`, extending (and zero-filling the gap) if
    /// `offset + buf.len()` exceeds the current size.
    pub(crate) async fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let end = offset + buf.len() as u64;
        if end > self.size {
            self.set_len(end).await?;
        }
        let file = Arc::clone(&self.file);
        let owned = buf.to_vec();
        tokio::task::spawn_blocking(move || file.write_at(&owned, offset))
            .await
            .expect("scratch write task panicked")
    }

    /// Resizes the scratch file to exactly `new_size`, zero-filling on growth
    /// and dropping trailing bytes on shrink.
    pub(crate) async fn truncate(&mut self, new_size: u64) -> io::Result<()> {
        self.set_len(new_size).await
    }

    async fn set_len(&mut self, new_size: u64) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.set_len(new_size))
            .await
            .expect("scratch resize task panicked")?;
        self.size = new_size;
        Ok(())
    }
}
