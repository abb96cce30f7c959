// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Utilities for saving file parts to the filesystem.
//!
//! ### Warning: Do **not** trust user input!
//! It is a serious security risk to create files or directories with paths based on user input.
//! A malicious user could craft a filename which can be used to overwrite important files, such
//! as templates, static assets, database files or configuration files, if they are writable by the
//! server process. [`FilePart::filename()`] is reduced to a base name but is otherwise arbitrary;
//! pick destination paths yourself.
use tempfile::{self, PathPersistError};

use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::{fs, mem};

use crate::error::Result;

use super::field::{released, FilePart, Storage};

/// Size of each buffer handed out by [`BufferPool::default()`].
pub const DEFAULT_COPY_BUF_SIZE: usize = 4096;

const DEFAULT_MAX_IDLE: usize = 16;

/// Prefix of the sibling file written before it is renamed over the destination.
const PERSIST_PREFIX: &str = ".persist-";

/// A shared pool of copy buffers.
///
/// Each buffer is held by at most one copy at a time and goes back to the pool when the
/// [`PooledBuf`] is dropped. At most `max_idle` buffers are kept around between copies.
#[derive(Debug)]
pub struct BufferPool {
    buf_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// A pool of `buf_size`-byte buffers keeping at most `max_idle` of them when unused.
    pub fn new(buf_size: usize, max_idle: usize) -> Self {
        BufferPool {
            buf_size: buf_size.max(1),
            max_idle: max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// The size of each buffer.
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// The number of buffers currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    /// Borrow a buffer for exclusive use until the guard is dropped.
    pub fn checkout(&self) -> PooledBuf {
        let buf = self
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0; self.buf_size]);

        PooledBuf {
            buf: buf,
            pool: self,
        }
    }

    /// Copy `r` to `w` through a pooled buffer until `r` is exhausted.
    ///
    /// Retries when `io::Error::kind() == io::ErrorKind::Interrupted`.
    pub fn copy<R: Read + ?Sized, W: Write + ?Sized>(&self, r: &mut R, w: &mut W) -> io::Result<u64> {
        let mut buf = self.checkout();
        let mut total = 0u64;

        loop {
            let read = match r.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(read) => read,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            w.write_all(&buf[..read])?;
            total += read as u64;
        }
    }

    fn put_back(&self, buf: Vec<u8>) {
        let mut idle = self.lock();

        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    fn lock(&self) -> ::std::sync::MutexGuard<Vec<Vec<u8>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new(DEFAULT_COPY_BUF_SIZE, DEFAULT_MAX_IDLE)
    }
}

/// A buffer checked out of a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuf<'p> {
    buf: Vec<u8>,
    pool: &'p BufferPool,
}

impl<'p> Deref for PooledBuf<'p> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl<'p> DerefMut for PooledBuf<'p> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl<'p> Drop for PooledBuf<'p> {
    fn drop(&mut self) {
        self.pool.put_back(mem::take(&mut self.buf));
    }
}

/// Save the content of `part` at `dest`, creating any missing parent directories.
///
/// A part spilled to a temporary file is renamed into place when possible, after which the part
/// refers to `dest`. Otherwise the content is written to a sibling temporary file, synced, and
/// renamed over `dest`, so `dest` is either absent or complete. File content is copied with
/// [`io::copy`], which lets the kernel move the bytes where it can; in-memory content goes
/// through a buffer from `pool`. Persisting the same part to the
/// same path again succeeds and leaves the content unchanged.
pub fn persist<P: AsRef<Path>>(part: &FilePart, dest: P, pool: &BufferPool) -> Result<()> {
    let dest = dest.as_ref();

    create_dir_all(dest)?;

    if try_rename(part, dest)? {
        return Ok(());
    }

    copy_atomic(part, dest, pool)
}

/// Move a spilled part into place. `false` if the content still has to be copied.
fn try_rename(part: &FilePart, dest: &Path) -> Result<bool> {
    let mut storage = part.lock();

    match mem::replace(&mut *storage, Storage::Released) {
        Storage::Spilled(path) => match path.persist(dest) {
            Ok(()) => {
                debug!("Renamed spilled part {:?} to {:?}", part.filename(), dest);
                *storage = Storage::Persisted(dest.to_path_buf());
                Ok(true)
            }
            Err(PathPersistError { error, path }) => {
                warn!("Could not rename {:?} to {:?}, copying instead: {}", path, dest, error);
                *storage = Storage::Spilled(path);
                Ok(false)
            }
        },
        Storage::Persisted(path) => {
            let done = path.as_path() == dest;
            *storage = Storage::Persisted(path);
            Ok(done)
        }
        Storage::Released => Err(released().into()),
        memory => {
            *storage = memory;
            Ok(false)
        }
    }
}

fn copy_atomic(part: &FilePart, dest: &Path, pool: &BufferPool) -> Result<()> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Dropped (and deleted) on any error below.
    let mut tmp = tempfile::Builder::new()
        .prefix(PERSIST_PREFIX)
        .tempfile_in(dir)?;

    let mut reader = part.open()?;

    // File to file copies can stay in the kernel.
    let written = match reader.as_file_mut() {
        Some(file) => io::copy(file, tmp.as_file_mut())?,
        None => pool.copy(&mut reader, tmp.as_file_mut())?,
    };

    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;

    debug!("Copied {} bytes of {:?} to {:?}", written, part.filename(), dest);

    Ok(())
}

fn create_dir_all(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        Some(_) => Ok(()),
        None => {
            warn!("Attempting to save file in what looks like a root directory. File path: {:?}", path);
            Ok(())
        }
    }
}
