// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The client-side writer of `multipart/form-data` bodies.
//!
//! Use this to produce upload bodies for the gateway, or in tests.
//!
//! ```
//! use gateway_multipart::client::FormWriter;
//!
//! let mut form = FormWriter::new();
//! form.write_text("name", "John Doe")
//!     .write_stream("upload", &mut &b"hello"[..], Some("hello.txt"), None);
//!
//! let body = form.into_http_body().unwrap();
//! assert!(body.content_type.starts_with("multipart/form-data; boundary="));
//! ```
use mime::{self, Mime};

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::marshal::HttpBody;

const BOUNDARY_LEN: usize = 16;

/// Writes fields of a `multipart/form-data` body to a stream.
///
/// Though they perform I/O, the `.write_*()` methods do not return `io::Result<_>` in order to
/// facilitate method chaining. Upon the first error, all subsequent API calls will be no-ops until
/// `.finish()` is called, at which point the error will be reported.
#[derive(Debug)]
pub struct FormWriter<W = Vec<u8>> {
    stream: W,
    boundary: String,
    last_err: Option<io::Error>,
    data_written: bool,
}

impl FormWriter<Vec<u8>> {
    /// A writer building the body in memory, with a random boundary.
    pub fn new() -> Self {
        FormWriter::with_writer(Vec::new())
    }

    /// Finish the body and wrap it in an [`HttpBody`] carrying its `Content-Type`.
    pub fn into_http_body(self) -> io::Result<HttpBody> {
        let content_type = self.content_type();
        let data = self.finish()?;
        Ok(HttpBody::new(content_type, data))
    }
}

impl Default for FormWriter<Vec<u8>> {
    fn default() -> Self {
        FormWriter::new()
    }
}

impl<W: Write> FormWriter<W> {
    /// Write the body to `stream`, with a random boundary.
    pub fn with_writer(stream: W) -> Self {
        FormWriter::with_boundary(stream, crate::random_alphanumeric(BOUNDARY_LEN))
    }

    /// Write the body to `stream`, separating fields with `boundary`.
    pub fn with_boundary<B: Into<String>>(stream: W, boundary: B) -> Self {
        FormWriter {
            stream: stream,
            boundary: boundary.into(),
            last_err: None,
            data_written: false,
        }
    }

    /// The boundary separating fields.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The `Content-Type` value announcing this body.
    pub fn content_type(&self) -> String {
        format!("{}; boundary={}", mime::MULTIPART_FORM_DATA, self.boundary)
    }

    /// Get a reference to the last error returned from writing to the stream, if any.
    pub fn last_err(&self) -> Option<&io::Error> {
        self.last_err.as_ref()
    }

    /// Remove and return the last error to occur, allowing subsequent API calls to proceed
    /// normally.
    ///
    /// ##Warning
    /// If an error occurred during a write, the body may be corrupt.
    pub fn take_err(&mut self) -> Option<io::Error> {
        self.last_err.take()
    }

    /// Write a text field.
    pub fn write_text<N: AsRef<str>, V: AsRef<str>>(&mut self, name: N, val: V) -> &mut Self {
        if self.last_err.is_none() {
            self.last_err = self
                .write_field_headers(name.as_ref(), None, None)
                .and_then(|()| self.stream.write_all(val.as_ref().as_bytes()))
                .err();
        }

        self
    }

    /// Open the file at `path` and write its contents as a file field, supplying its filename
    /// and guessing its `Content-Type` from its extension.
    ///
    /// If you want to set these values manually, or use another type that implements `Read`,
    /// use `.write_stream()`.
    pub fn write_file<N: AsRef<str>, P: AsRef<Path>>(&mut self, name: N, path: P) -> &mut Self {
        if self.last_err.is_none() {
            let path = path.as_ref();
            let content_type = ::mime_guess::from_path(path).first_or_octet_stream();
            let filename = path.file_name().and_then(|filename| filename.to_str());

            self.last_err = File::open(path)
                .and_then(|mut file| {
                    self.write_field_headers(name.as_ref(), filename, Some(&content_type))?;
                    io::copy(&mut file, &mut self.stream)
                })
                .err();
        }

        self
    }

    /// Write a byte stream as a file field, supplying `filename` if given, and `content_type` if
    /// given or `"application/octet-stream"` if not.
    ///
    /// Without a filename the server reads the field as a text value; pass `Some("")` to send a
    /// file part with an empty filename.
    ///
    /// ##Warning
    /// The given `Read` **must** be able to read to EOF.
    pub fn write_stream<N: AsRef<str>, R: Read + ?Sized>(
        &mut self,
        name: N,
        read: &mut R,
        filename: Option<&str>,
        content_type: Option<Mime>,
    ) -> &mut Self {
        if self.last_err.is_none() {
            let content_type = content_type.unwrap_or(mime::APPLICATION_OCTET_STREAM);

            self.last_err = self
                .write_field_headers(name.as_ref(), filename, Some(&content_type))
                .and_then(|()| io::copy(read, &mut self.stream))
                .err();
        }

        self
    }

    fn write_field_headers(
        &mut self,
        name: &str,
        filename: Option<&str>,
        content_type: Option<&Mime>,
    ) -> io::Result<()> {
        self.data_written = true;

        // The first boundary, or the one ending the previous field.
        write!(self.stream, "\r\n--{}\r\n", self.boundary)?;
        write!(self.stream, "Content-Disposition: form-data; name=\"{}\"", escape(name))?;

        if let Some(filename) = filename {
            write!(self.stream, "; filename=\"{}\"", escape(filename))?;
        }

        if let Some(content_type) = content_type {
            write!(self.stream, "\r\nContent-Type: {}", content_type)?;
        }

        self.stream.write_all(b"\r\n\r\n")
    }

    /// Write the close delimiter and return the stream, or the last error if set.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.last_err {
            return Err(err);
        }

        if self.data_written {
            write!(self.stream, "\r\n--{}--\r\n", self.boundary)?;
        } else {
            write!(self.stream, "--{}--\r\n", self.boundary)?;
        }

        self.stream.flush()?;
        Ok(self.stream)
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
