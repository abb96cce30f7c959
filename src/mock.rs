// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Mocked I/O endpoints for testing. Enabled with the `mock` feature (on by default).
use rand::rngs::ThreadRng;
use rand::Rng;

use std::fmt;
use std::io::{self, Read, Write};

/// A `Read` over a byte slice which, like a network connection, rarely fills the whole buffer
/// it is given.
pub struct ShortReader<'a> {
    data: &'a [u8],
    rng: ThreadRng,
}

impl<'a> ShortReader<'a> {
    /// Read `data` in randomly sized pieces.
    pub fn new(data: &'a [u8]) -> Self {
        ShortReader {
            data: data,
            rng: rand::thread_rng(),
        }
    }
}

impl<'a> Read for ShortReader<'a> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            debug!("Passed a zero-sized buffer.");
            return Ok(0);
        }

        // Simulate the randomness of a network connection by not always reading everything
        let len = self.rng.gen_range(1..=out.len());
        self.data.read(&mut out[..len])
    }
}

impl<'a> fmt::Debug for ShortReader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("gateway_multipart::mock::ShortReader")
            .field("remaining", &self.data.len())
            .finish()
    }
}

/// A `Write` that accepts `capacity` bytes and then fails every further write.
#[derive(Debug, Default)]
pub struct FailingWriter {
    /// Everything written before the failure.
    pub written: Vec<u8>,
    capacity: usize,
}

impl FailingWriter {
    /// Fail once more than `capacity` bytes have been written.
    pub fn new(capacity: usize) -> Self {
        FailingWriter {
            written: Vec::new(),
            capacity: capacity,
        }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.capacity - self.written.len();

        if room == 0 && !buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "mock writer is full"));
        }

        let len = room.min(buf.len());
        self.written.extend_from_slice(&buf[..len]);
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
