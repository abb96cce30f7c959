// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Splitting a buffered multipart body on its boundary.
use twoway;

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    /// Nothing consumed yet; the preamble may precede the first boundary.
    Start,
    /// Positioned at the start of a delimiter line.
    AtBoundary,
    /// The close delimiter (`--boundary--`) was read.
    End,
}

/// Yields the raw parts (headers and body) of a multipart body held in memory.
///
/// Each part is the slice between a delimiter line and the line break preceding the next
/// delimiter, so it begins with the part headers and ends with the last byte of content.
#[derive(Debug)]
pub struct BoundaryReader<'a> {
    data: &'a [u8],
    /// `--` followed by the boundary.
    delimiter: Vec<u8>,
    /// `\n` followed by `delimiter`, the pattern searched for inside the body.
    search: Vec<u8>,
    pos: usize,
    state: State,
}

impl<'a> BoundaryReader<'a> {
    /// Split `data` on `boundary` (as given in the `Content-Type`, without leading dashes).
    pub fn new(data: &'a [u8], boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary.as_bytes());

        let mut search = Vec::with_capacity(delimiter.len() + 1);
        search.push(b'\n');
        search.extend_from_slice(&delimiter);

        BoundaryReader {
            data: data,
            delimiter: delimiter,
            search: search,
            pos: 0,
            state: State::Start,
        }
    }

    /// Read the next part, or `None` after the close delimiter.
    pub fn next_part(&mut self) -> Result<Option<&'a [u8]>> {
        if self.state == State::End {
            return Ok(None);
        }

        if self.state == State::Start {
            self.pos = self.find_opening()?;
            self.state = State::AtBoundary;
        }

        let part_start = match self.consume_delimiter_line()? {
            Some(start) => start,
            None => {
                self.state = State::End;
                return Ok(None);
            }
        };

        let (part_end, next_delimiter) = self
            .find_delimiter(part_start)
            .ok_or_else(|| Error::malformed("missing closing boundary"))?;

        trace!(
            "Part spans {}..{} ({} bytes)",
            part_start,
            part_end,
            part_end - part_start
        );

        self.pos = next_delimiter;

        Ok(Some(&self.data[part_start..part_end]))
    }

    /// Locate the first delimiter, skipping any preamble.
    fn find_opening(&self) -> Result<usize> {
        if self.data.starts_with(&self.delimiter) && self.is_delimiter_at(0) {
            return Ok(0);
        }

        match self.find_delimiter(0) {
            Some((_, delimiter)) => {
                debug!("Skipped {} bytes of preamble", delimiter);
                Ok(delimiter)
            }
            None => Err(Error::malformed("missing opening boundary")),
        }
    }

    /// Consume the delimiter line at `self.pos`, returning the offset just past it, or `None`
    /// for the close delimiter.
    fn consume_delimiter_line(&mut self) -> Result<Option<usize>> {
        let after = self.pos + self.delimiter.len();
        let rest = &self.data[after..];

        if rest.starts_with(b"--") {
            return Ok(None);
        }

        // Transport padding is allowed between the boundary and the line break.
        let padding = rest
            .iter()
            .take_while(|&&b| b == b' ' || b == b'\t')
            .count();

        let rest = &rest[padding..];

        let line_break = if rest.starts_with(b"\r\n") {
            2
        } else if rest.starts_with(b"\n") {
            1
        } else {
            return Err(Error::malformed("expected line break after boundary"));
        };

        Ok(Some(after + padding + line_break))
    }

    /// Find the next delimiter line at or after `from`. Returns the offset where the preceding
    /// part's content ends and the offset of the delimiter itself.
    fn find_delimiter(&self, from: usize) -> Option<(usize, usize)> {
        let mut search_from = from;

        while search_from < self.data.len() {
            let newline = search_from + twoway::find_bytes(&self.data[search_from..], &self.search)?;
            let delimiter = newline + 1;

            if self.is_delimiter_at(delimiter) {
                let content_end = if newline > from && self.data[newline - 1] == b'\r' {
                    newline - 1
                } else {
                    newline
                };

                return Some((content_end, delimiter));
            }

            // The boundary text appeared inside content; keep looking.
            search_from = newline + 1;
        }

        None
    }

    /// A delimiter only counts if it is followed by `--`, whitespace, a line break, or the end.
    fn is_delimiter_at(&self, idx: usize) -> bool {
        let after = idx + self.delimiter.len();

        match self.data.get(after) {
            None => true,
            Some(&b'-') => self.data.get(after + 1) == Some(&b'-'),
            Some(&b) => b == b'\r' || b == b'\n' || b == b' ' || b == b'\t',
        }
    }
}
