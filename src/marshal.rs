// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The inbound marshaler the gateway uses for `multipart/form-data` requests.
//!
//! The gateway decodes every request body by calling [`Decoder::decode`] with the message type
//! the service expects. For an ordinary message the call decodes one JSON document. When the
//! service asks for the raw-body placeholder [`HttpBody`], [`MultipartDecoder`] instead copies
//! the request bytes over in chunks of at most [`CHUNK_SIZE`], one chunk per call, and reports
//! [`Decoded::Complete`] once the source is exhausted. [`read_envelope`] runs that call loop
//! and hands back the reassembled envelope.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use std::any::Any;
use std::io::{self, Read};

use crate::error::{Error, Result};

/// Number of bytes one decode call transfers into an [`HttpBody`].
pub const CHUNK_SIZE: usize = 512;

/// A message carrying an opaque body and its content type, used as the placeholder for
/// "give me the raw request body".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBody {
    /// The `Content-Type` of the body.
    #[serde(default)]
    pub content_type: String,
    /// The body bytes.
    #[serde(default)]
    pub data: Vec<u8>,
}

impl HttpBody {
    /// Wrap `data` with the given content type.
    pub fn new<C: Into<String>, D: Into<Vec<u8>>>(content_type: C, data: D) -> Self {
        HttpBody {
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// What a single decode call produced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A whole message was decoded into the target.
    Message,
    /// This many bytes were copied into the target body. Always non-zero.
    Chunk(usize),
    /// The source is exhausted; nothing was transferred and further calls stay complete.
    Complete,
}

/// The gateway's per-call decode operation.
pub trait Decoder {
    /// Decode the next piece of the request into `target`.
    fn decode<T: DeserializeOwned + 'static>(&mut self, target: &mut T) -> Result<Decoded>;
}

/// Decodes one JSON document per request. Unknown fields are ignored.
#[derive(Debug)]
pub struct JsonDecoder<R> {
    reader: R,
    done: bool,
}

impl<R: Read> JsonDecoder<R> {
    /// Decode JSON from `reader`.
    pub fn new(reader: R) -> Self {
        JsonDecoder {
            reader: reader,
            done: false,
        }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Decoder for JsonDecoder<R> {
    fn decode<T: DeserializeOwned + 'static>(&mut self, target: &mut T) -> Result<Decoded> {
        if self.done {
            return Ok(Decoded::Complete);
        }

        *target = serde_json::from_reader(&mut self.reader)?;
        self.done = true;

        Ok(Decoded::Message)
    }
}

/// The per-session state of chunked transfer: a scratch buffer whose *length* is the chunk size,
/// and whether the source has run dry.
#[derive(Debug)]
struct ChunkCursor {
    buf: Vec<u8>,
    eof: bool,
}

impl ChunkCursor {
    fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");

        ChunkCursor {
            buf: vec![0; chunk_size],
            eof: false,
        }
    }

    fn next_chunk<R: Read>(&mut self, source: &mut R, body: &mut HttpBody) -> Result<Decoded> {
        body.data.clear();

        if self.eof {
            return Ok(Decoded::Complete);
        }

        let read = read_full(source, &mut self.buf)?;

        if read < self.buf.len() {
            self.eof = true;
        }

        if read == 0 {
            debug!("Envelope source exhausted on a chunk boundary");
            return Ok(Decoded::Complete);
        }

        trace!("Decoded chunk of {} bytes (eof: {})", read, self.eof);

        body.data.extend_from_slice(&self.buf[..read]);
        Ok(Decoded::Chunk(read))
    }
}

/// Fill `buf` from `source`, stopping early only at end of stream. Retries on interrupts.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// Decoder for requests routed to the multipart marshaler.
///
/// Targets other than [`HttpBody`] are delegated, unchanged, to a [`JsonDecoder`] over the same
/// source.
#[derive(Debug)]
pub struct MultipartDecoder<R> {
    inner: JsonDecoder<R>,
    cursor: ChunkCursor,
}

impl<R: Read> MultipartDecoder<R> {
    /// Wrap `reader`, transferring [`CHUNK_SIZE`] bytes per call.
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, CHUNK_SIZE)
    }

    /// Wrap `reader`, transferring up to `chunk_size` bytes per call.
    ///
    /// ### Panics
    /// If `chunk_size` is zero.
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        MultipartDecoder {
            inner: JsonDecoder::new(reader),
            cursor: ChunkCursor::with_chunk_size(chunk_size),
        }
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> Decoder for MultipartDecoder<R> {
    fn decode<T: DeserializeOwned + 'static>(&mut self, target: &mut T) -> Result<Decoded> {
        match (&mut *target as &mut dyn Any).downcast_mut::<HttpBody>() {
            Some(body) => self.cursor.next_chunk(self.inner.get_mut(), body),
            None => self.inner.decode(target),
        }
    }
}

/// Run the gateway's decode loop for a raw-body request: call `decoder` until it reports
/// completion and concatenate every chunk.
///
/// Fails with `SizeLimitExceeded` as soon as the accumulated body would exceed `size_limit`.
pub fn read_envelope<D: Decoder>(decoder: &mut D, size_limit: Option<u64>) -> Result<HttpBody> {
    let mut envelope = HttpBody::default();
    let mut chunk = HttpBody::default();

    loop {
        match decoder.decode(&mut chunk)? {
            Decoded::Chunk(_) | Decoded::Message => (),
            Decoded::Complete => break,
        }

        let total = (envelope.data.len() + chunk.data.len()) as u64;

        if let Some(limit) = size_limit {
            if total > limit {
                return Err(Error::SizeLimitExceeded(limit, total));
            }
        }

        envelope.data.extend_from_slice(&chunk.data);
    }

    debug!("Read envelope of {} bytes", envelope.data.len());

    Ok(envelope)
}

/// The marshaler registered for `multipart/form-data`.
///
/// Inbound, it produces a [`MultipartDecoder`]. Outbound, an [`HttpBody`] is written as its raw
/// bytes and anything else as JSON with every field emitted.
#[derive(Copy, Clone, Debug, Default)]
pub struct MultipartFormMarshaler;

impl MultipartFormMarshaler {
    /// The MIME type this marshaler is registered for.
    pub const MIME_TYPE: &'static str = "multipart/form-data";

    /// Create the decoder for one inbound request body.
    pub fn new_decoder<R: Read>(&self, reader: R) -> MultipartDecoder<R> {
        MultipartDecoder::new(reader)
    }

    /// The content type of the reply for `value`.
    pub fn content_type<T: 'static>(&self, value: &T) -> String {
        match (value as &dyn Any).downcast_ref::<HttpBody>() {
            Some(body) => body.content_type.clone(),
            None => "application/json".to_owned(),
        }
    }

    /// Encode a reply.
    pub fn marshal<T: Serialize + 'static>(&self, value: &T) -> Result<Vec<u8>> {
        match (value as &dyn Any).downcast_ref::<HttpBody>() {
            Some(body) => Ok(body.data.clone()),
            None => Ok(serde_json::to_vec(value)?),
        }
    }
}
