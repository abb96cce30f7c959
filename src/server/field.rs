// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Part header parsing and the file part handle.

use httparse::{self, Status, EMPTY_HEADER};

use mime::{self, Mime};

use tempfile::TempPath;

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::str;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

use super::save::BufferPool;

/// Upper bound on the number of headers a single part may carry.
const MAX_PART_HEADERS: usize = 32;

#[derive(Copy, Clone, Debug)]
struct StrHeader<'a> {
    name: &'a str,
    val: &'a str,
}

/// The headers that (may) appear before a `multipart/form-data` field.
#[derive(Debug)]
pub struct FieldHeaders {
    /// The `Content-Disposition` header, required.
    pub cont_disp: ContentDisp,
    /// The `Content-Type` header, optional.
    pub cont_type: Option<Mime>,
}

impl FieldHeaders {
    /// Split a raw part into its headers and its content.
    ///
    /// The headers are `None` if the part is not a named `form-data` field; such parts are
    /// skipped by the form extractor.
    pub fn parse(part: &[u8]) -> Result<(Option<FieldHeaders>, &[u8])> {
        // A part with no headers and no content has lost its header terminator to the
        // delimiter line.
        if part.is_empty() {
            return Ok((None, part));
        }

        if let Some((consumed, headers)) = Self::parse_block(part)? {
            return Ok((headers, &part[consumed..]));
        }

        // A part with no content: the blank line ending its headers was taken as the line
        // break before the next delimiter.
        let terminator: &[u8] = if part.ends_with(b"\r\n") {
            b"\r\n"
        } else if part.ends_with(b"\n") {
            b"\n"
        } else {
            return Err(Error::malformed("part headers are incomplete"));
        };

        let mut terminated = Vec::with_capacity(part.len() + terminator.len());
        terminated.extend_from_slice(part);
        terminated.extend_from_slice(terminator);

        match Self::parse_block(&terminated)? {
            Some((_, headers)) => Ok((headers, &part[part.len()..])),
            None => Err(Error::malformed("part headers are incomplete")),
        }
    }

    /// Parse the header block at the start of `buf`; `None` if it is not terminated.
    fn parse_block(buf: &[u8]) -> Result<Option<(usize, Option<FieldHeaders>)>> {
        let mut raw_headers = [EMPTY_HEADER; MAX_PART_HEADERS];

        let (consumed, raw_headers) = match httparse::parse_headers(buf, &mut raw_headers) {
            Ok(Status::Complete(complete)) => complete,
            Ok(Status::Partial) => return Ok(None),
            Err(e) => return Err(Error::malformed(format!("invalid part headers: {}", e))),
        };

        let mut headers = Vec::with_capacity(raw_headers.len());

        for raw in raw_headers {
            headers.push(StrHeader {
                name: raw.name,
                val: str_utf8(raw.value)?,
            });
        }

        debug!("Parsed field headers: {:?}", headers);

        Ok(Some((consumed, Self::read_from(&headers))))
    }

    fn read_from(headers: &[StrHeader]) -> Option<FieldHeaders> {
        let cont_disp = match ContentDisp::read_from(headers) {
            Some(cont_disp) => cont_disp,
            None => {
                debug!("Failed to read Content-Disposition");
                return None;
            }
        };

        let cont_type = find_header(headers, "Content-Type").map(|header| {
            debug!("Found Content-Type: {:?}", header.val);
            read_content_type(header.val.trim())
        });

        Some(FieldHeaders {
            cont_disp: cont_disp,
            cont_type: cont_type,
        })
    }

    /// The content type of a file part: the declared one, else a guess from the filename.
    pub fn file_content_type(&self, filename: &str) -> Mime {
        match self.cont_type {
            Some(ref mime) => mime.clone(),
            None => ::mime_guess::from_path(filename).first_or_octet_stream(),
        }
    }
}

/// The `Content-Disposition` header.
#[derive(Debug, PartialEq, Eq)]
pub struct ContentDisp {
    /// The name of the `multipart/form-data` field.
    pub field_name: String,
    /// The filename, if the `filename` (or `filename*`) parameter was present.
    ///
    /// Reduced to its final path component; a parameter that is present but empty stays empty.
    pub filename: Option<String>,
}

impl ContentDisp {
    fn read_from(headers: &[StrHeader]) -> Option<ContentDisp> {
        let header = match find_header(headers, "Content-Disposition") {
            Some(header) => header,
            None => {
                debug!("Field headers did not contain Content-Disposition header");
                return None;
            }
        };

        Self::parse(header.val)
    }

    /// Parse a `Content-Disposition` value. `None` unless it is `form-data` with a `name`.
    pub fn parse(value: &str) -> Option<ContentDisp> {
        let mut segments = split_params(value).into_iter();

        let disp_type = segments.next().unwrap_or("").trim();

        if !disp_type.eq_ignore_ascii_case("form-data") {
            debug!("Unexpected Content-Disposition value: {:?}", disp_type);
            return None;
        }

        let mut field_name = None;
        let mut filename = None;
        let mut ext_filename = None;

        for segment in segments {
            let (key, val) = match segment.split_once('=') {
                Some((key, val)) => (key.trim(), unquote(val.trim())),
                None => continue,
            };

            if key.eq_ignore_ascii_case("name") {
                field_name = Some(val);
            } else if key.eq_ignore_ascii_case("filename") {
                filename = Some(val);
            } else if key.eq_ignore_ascii_case("filename*") {
                ext_filename = decode_ext_value(&val);
            }
        }

        let field_name = match field_name {
            Some(name) if !name.is_empty() => name,
            _ => {
                debug!("Content-Disposition has no field name: {:?}", value);
                return None;
            }
        };

        Some(ContentDisp {
            field_name: field_name,
            filename: ext_filename.or(filename).map(|name| base_name(&name).to_owned()),
        })
    }
}

/// Split header parameters on `;`, ignoring separators inside quoted strings.
fn split_params(s: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => (),
        }
    }

    segments.push(&s[start..]);
    segments
}

fn unquote(s: &str) -> String {
    if s.len() < 2 || !s.starts_with('"') || !s.ends_with('"') {
        return s.to_owned();
    }

    let mut out = String::with_capacity(s.len() - 2);
    let mut chars = s[1..s.len() - 1].chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }

    out
}

/// Decode an RFC 5987 extended value such as `UTF-8''na%C3%AFve.txt`.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;

    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("us-ascii") {
        debug!("Unsupported charset in extended parameter: {:?}", charset);
        return None;
    }

    let mut bytes = Vec::with_capacity(encoded.len());
    let mut iter = encoded.bytes();

    while let Some(b) = iter.next() {
        if b == b'%' {
            let hi = hex_val(iter.next()?)?;
            let lo = hex_val(iter.next()?)?;
            bytes.push(hi << 4 | lo);
        } else {
            bytes.push(b);
        }
    }

    String::from_utf8(bytes).ok()
}

fn hex_val(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// The last component of a client-supplied path, with either separator style.
fn base_name(filename: &str) -> &str {
    let trimmed = filename.trim_end_matches(|c| c == '/' || c == '\\');

    trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed)
}

fn read_content_type(cont_type: &str) -> Mime {
    cont_type.parse().ok().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

fn str_utf8(buf: &[u8]) -> Result<&str> {
    str::from_utf8(buf).map_err(|_| Error::malformed("part header is not valid UTF-8"))
}

fn find_header<'a, 'b>(headers: &'a [StrHeader<'b>], name: &str) -> Option<&'a StrHeader<'b>> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
}

pub(crate) enum Storage {
    Memory(Arc<[u8]>),
    /// Spilled to a temporary file which is deleted when dropped.
    Spilled(TempPath),
    /// Moved to a caller-chosen path; no longer ours to delete.
    Persisted(PathBuf),
    Released,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Storage::Memory(ref data) => write!(f, "Memory({} bytes)", data.len()),
            Storage::Spilled(ref path) => write!(f, "Spilled({:?})", path),
            Storage::Persisted(ref path) => write!(f, "Persisted({:?})", path),
            Storage::Released => f.write_str("Released"),
        }
    }
}

/// A file uploaded as part of a multipart form.
///
/// Small files are held in memory; files that did not fit under the memory threshold live in
/// a temporary file which is deleted once the last clone of this handle is dropped, or when the
/// form is released.
///
/// Clones share the same storage.
///
/// ##Warning
/// You should treat the filename as untrustworthy because it is an arbitrary string provided by
/// the client. It has been reduced to its final path component but may still be `..` or contain
/// characters your filesystem does not accept.
#[derive(Clone)]
pub struct FilePart {
    filename: String,
    content_type: Mime,
    size: u64,
    storage: Arc<Mutex<Storage>>,
}

impl FilePart {
    pub(crate) fn in_memory(filename: String, content_type: Mime, data: &[u8]) -> Self {
        FilePart {
            filename: filename,
            content_type: content_type,
            size: data.len() as u64,
            storage: Arc::new(Mutex::new(Storage::Memory(data.into()))),
        }
    }

    pub(crate) fn spilled(filename: String, content_type: Mime, size: u64, path: TempPath) -> Self {
        FilePart {
            filename: filename,
            content_type: content_type,
            size: size,
            storage: Arc::new(Mutex::new(Storage::Spilled(path))),
        }
    }

    /// The filename the client sent. May be empty.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The declared `Content-Type`, else one guessed from the filename, else
    /// `application/octet-stream`.
    pub fn content_type(&self) -> &Mime {
        &self.content_type
    }

    /// The size of the file's content in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `true` if the content is held in memory rather than in a file.
    pub fn is_in_memory(&self) -> bool {
        matches!(*self.lock(), Storage::Memory(_))
    }

    /// The path of the file holding the content, if it is not in memory.
    pub fn path(&self) -> Option<PathBuf> {
        match *self.lock() {
            Storage::Spilled(ref path) => Some(path.to_path_buf()),
            Storage::Persisted(ref path) => Some(path.clone()),
            _ => None,
        }
    }

    /// Open the content for reading from the start.
    pub fn open(&self) -> Result<PartReader> {
        let inner = match *self.lock() {
            Storage::Memory(ref data) => Inner::Memory(Cursor::new(data.clone())),
            Storage::Spilled(ref path) => Inner::File(File::open(path)?),
            Storage::Persisted(ref path) => Inner::File(File::open(path)?),
            Storage::Released => return Err(released().into()),
        };

        Ok(PartReader(inner))
    }

    /// Read the whole content into memory.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size as usize);
        self.open()?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Write the whole content to `out`, returning the number of bytes written.
    ///
    /// In-memory content is written in one call; file content is copied through a buffer
    /// borrowed from `pool`.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W, pool: &BufferPool) -> Result<u64> {
        match self.open()?.0 {
            Inner::Memory(cursor) => {
                let data = cursor.into_inner();
                out.write_all(&data)?;
                Ok(data.len() as u64)
            }
            Inner::File(mut file) => Ok(pool.copy(&mut file, out)?),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<Storage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delete any temporary file now. The content is unavailable afterwards, to every clone.
    pub(crate) fn release(&self) -> io::Result<()> {
        let storage = ::std::mem::replace(&mut *self.lock(), Storage::Released);

        match storage {
            Storage::Spilled(path) => match path.close() {
                Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                res => res,
            },
            Storage::Persisted(path) => {
                *self.lock() = Storage::Persisted(path);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .field("storage", &*self.lock())
            .finish()
    }
}

pub(crate) fn released() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "file part storage was released")
}

/// Reads the content of a [`FilePart`].
#[derive(Debug)]
pub struct PartReader(Inner);

impl PartReader {
    /// The underlying file, if the content is not held in memory.
    pub fn as_file_mut(&mut self) -> Option<&mut File> {
        match self.0 {
            Inner::File(ref mut file) => Some(file),
            Inner::Memory(_) => None,
        }
    }
}

#[derive(Debug)]
enum Inner {
    Memory(Cursor<Arc<[u8]>>),
    File(File),
}

impl Read for PartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0 {
            Inner::Memory(ref mut cursor) => cursor.read(buf),
            Inner::File(ref mut file) => file.read(buf),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn disp(value: &str) -> Option<ContentDisp> {
        ContentDisp::parse(value)
    }

    #[test]
    fn content_disposition_name_and_filename() {
        let cd = disp(r#"form-data; name="upload"; filename="report.pdf""#).unwrap();
        assert_eq!(cd.field_name, "upload");
        assert_eq!(cd.filename.as_deref(), Some("report.pdf"));

        let cd = disp("form-data; name=plain").unwrap();
        assert_eq!(cd.field_name, "plain");
        assert_eq!(cd.filename, None);
    }

    #[test]
    fn quoted_params_keep_separators_and_escapes() {
        let cd = disp(r#"form-data; name="a;b"; filename="say \"hi\".txt""#).unwrap();
        assert_eq!(cd.field_name, "a;b");
        assert_eq!(cd.filename.as_deref(), Some("say \"hi\".txt"));
    }

    #[test]
    fn filename_is_reduced_to_base_name() {
        let cd = disp(r#"form-data; name="f"; filename="C:\\Users\\me\\notes.txt""#).unwrap();
        assert_eq!(cd.filename.as_deref(), Some("notes.txt"));

        let cd = disp(r#"form-data; name="f"; filename="../../etc/passwd""#).unwrap();
        assert_eq!(cd.filename.as_deref(), Some("passwd"));
    }

    #[test]
    fn empty_filename_is_kept_as_present() {
        let cd = disp(r#"form-data; name="f"; filename="""#).unwrap();
        assert_eq!(cd.filename.as_deref(), Some(""));
    }

    #[test]
    fn extended_filename_wins() {
        let cd = disp("form-data; name=f; filename=\"fallback.txt\"; filename*=UTF-8''na%C3%AFve.txt")
            .unwrap();
        assert_eq!(cd.filename.as_deref(), Some("na\u{ef}ve.txt"));
    }

    #[test]
    fn non_form_data_or_unnamed_is_skipped() {
        assert!(disp("attachment; name=f").is_none());
        assert!(disp("form-data; filename=x.txt").is_none());
        assert!(disp("form-data; name=\"\"").is_none());
    }

    #[test]
    fn parse_headers_and_content() {
        let _ = ::env_logger::try_init();

        let part = b"content-disposition: form-data; name=\"doc\"; filename=\"a.json\"\r\n\r\n{}";
        let (headers, content) = FieldHeaders::parse(part).unwrap();
        let headers = headers.unwrap();

        assert_eq!(headers.cont_disp.field_name, "doc");
        assert_eq!(headers.cont_type, None);
        assert_eq!(headers.file_content_type("a.json"), mime::APPLICATION_JSON);
        assert_eq!(content, b"{}");
    }

    #[test]
    fn declared_content_type_is_used() {
        let part = b"Content-Disposition: form-data; name=f; filename=x\r\n\
                     Content-Type: image/png\r\n\r\ndata";
        let (headers, _) = FieldHeaders::parse(part).unwrap();
        assert_eq!(headers.unwrap().file_content_type("x"), mime::IMAGE_PNG);
    }

    #[test]
    fn headers_without_content() {
        for part in [&b"Content-Disposition: form-data; name=v\r\n"[..], b"Content-Disposition: form-data; name=v\n"] {
            let (headers, content) = FieldHeaders::parse(part).unwrap();
            assert_eq!(headers.unwrap().cont_disp.field_name, "v");
            assert!(content.is_empty());
        }
    }

    #[test]
    fn unterminated_headers_are_malformed() {
        let part = b"Content-Disposition: form-data; name=f";
        assert!(matches!(FieldHeaders::parse(part), Err(Error::Malformed(_))));
    }

    #[test]
    fn in_memory_file_part() {
        let part = FilePart::in_memory("a.txt".into(), mime::TEXT_PLAIN, b"hello");
        assert!(part.is_in_memory());
        assert_eq!(part.size(), 5);
        assert_eq!(part.bytes().unwrap(), b"hello");
        assert_eq!(part.path(), None);

        let mut out = Vec::new();
        assert_eq!(part.write_to(&mut out, &BufferPool::default()).unwrap(), 5);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn released_part_cannot_be_opened() {
        let part = FilePart::in_memory("a.txt".into(), mime::TEXT_PLAIN, b"hello");
        let clone = part.clone();
        part.release().unwrap();

        assert!(matches!(clone.open(), Err(Error::Io(_))));
    }
}
