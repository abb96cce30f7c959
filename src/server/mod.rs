// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The server-side extraction of `multipart/form-data` forms.
//!
//! Given the call's [`Metadata`] and the reassembled [`HttpBody`], [`ParsedForm::build()`]
//! splits the body into text values and [`FilePart`]s. File content that does not fit under the
//! memory threshold is spilled to temporary files, which are deleted once the form and every
//! file part handle taken from it are gone, or eagerly with [`ParsedForm::release()`].
//!
//! See [`save`] for persisting file parts.
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str;

use tempfile;

use crate::bind::RawValue;
use crate::error::{Error, Result};
use crate::marshal::HttpBody;
use crate::metadata::{resolve_boundary, Metadata};

#[doc(inline)]
pub use self::boundary::BoundaryReader;

#[doc(inline)]
pub use self::field::{FilePart, PartReader};

use self::field::FieldHeaders;

mod boundary;
mod field;

pub mod save;

/// Default in-memory budget for file content: 32 MiB.
pub const DEFAULT_MEMORY_THRESHOLD: u64 = 32 << 20;

/// Extra in-memory budget granted to text values on top of the memory threshold.
pub const TEXT_VALUE_HEADROOM: u64 = 10 << 20;

/// Prefix of spill files created in the temporary directory.
pub const SPILL_FILE_PREFIX: &str = "multipart-";

/// Limits and locations used while extracting a form.
///
/// ```
/// use gateway_multipart::FormConfig;
///
/// let config = FormConfig::default()
///     .memory_threshold(1 << 20)
///     .size_limit(64 << 20);
///
/// assert_eq!(config.get_memory_threshold(), 1 << 20);
/// assert_eq!(config.get_size_limit(), Some(64 << 20));
/// ```
#[derive(Clone, Debug)]
pub struct FormConfig {
    memory_threshold: u64,
    size_limit: Option<u64>,
    temp_dir: Option<PathBuf>,
}

impl Default for FormConfig {
    fn default() -> Self {
        FormConfig {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            size_limit: None,
            temp_dir: None,
        }
    }
}

impl FormConfig {
    /// Set how many bytes of file content may be held in memory before the remaining file
    /// parts are spilled to temporary files.
    pub fn memory_threshold(mut self, threshold: u64) -> Self {
        self.memory_threshold = threshold;
        self
    }

    /// Set the largest envelope that will be parsed.
    ///
    /// Can be `u64` or `Option<u64>`. If `None`, clears the limit.
    pub fn size_limit<L: Into<Option<u64>>>(mut self, limit: L) -> Self {
        self.size_limit = limit.into();
        self
    }

    /// Set the directory spill files are created in. Defaults to the system temporary directory.
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// The in-memory budget for file content.
    pub fn get_memory_threshold(&self) -> u64 {
        self.memory_threshold
    }

    /// The envelope size limit, if any.
    pub fn get_size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    /// The directory spill files go to, if not the system default.
    pub fn get_temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    fn spill_file(&self) -> ::std::io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SPILL_FILE_PREFIX);

        match self.temp_dir {
            Some(ref dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

/// A multipart form extracted from a request body.
///
/// Values and file parts under each key keep the order they had in the body.
#[derive(Debug, Default)]
pub struct ParsedForm {
    values: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<FilePart>>,
}

impl ParsedForm {
    /// Extract the form from `body`, using the boundary resolved from `metadata`.
    pub fn build(metadata: &Metadata, body: &HttpBody, config: &FormConfig) -> Result<ParsedForm> {
        let boundary = resolve_boundary(metadata)?;
        Self::parse(&body.data, &boundary, config)
    }

    /// Extract the form from a raw multipart body split on `boundary`.
    ///
    /// On error, every spill file created so far is deleted.
    pub fn parse(data: &[u8], boundary: &str, config: &FormConfig) -> Result<ParsedForm> {
        if let Some(limit) = config.size_limit {
            if data.len() as u64 > limit {
                return Err(Error::SizeLimitExceeded(limit, data.len() as u64));
            }
        }

        let max_memory = config.memory_threshold.saturating_add(TEXT_VALUE_HEADROOM);
        let mut in_memory = 0u64;
        let mut file_memory = 0u64;

        let mut form = ParsedForm::default();
        let mut reader = BoundaryReader::new(data, boundary);

        while let Some(part) = reader.next_part()? {
            let (headers, content) = FieldHeaders::parse(part)?;

            let headers = match headers {
                Some(headers) => headers,
                None => {
                    debug!("Skipping part without a form-data name");
                    continue;
                }
            };

            let len = content.len() as u64;
            let name = headers.cont_disp.field_name.clone();

            let filename = match headers.cont_disp.filename {
                Some(ref filename) => filename.clone(),
                None => {
                    in_memory += len;

                    if in_memory > max_memory {
                        return Err(Error::SizeLimitExceeded(max_memory, in_memory));
                    }

                    let value = str::from_utf8(content).map_err(|_| {
                        Error::malformed(format!("value of field {:?} is not valid UTF-8", name))
                    })?;

                    trace!("Text field {:?}: {} bytes", name, len);
                    form.values.entry(name).or_default().push(value.to_owned());
                    continue;
                }
            };

            let content_type = headers.file_content_type(&filename);

            let part = if file_memory + len > config.memory_threshold {
                let mut file = config.spill_file()?;
                file.write_all(content)?;
                file.flush()?;

                debug!(
                    "Spilled file part {:?} of field {:?} ({} bytes) to {:?}",
                    filename,
                    name,
                    len,
                    file.path()
                );

                FilePart::spilled(filename, content_type, len, file.into_temp_path())
            } else {
                file_memory += len;
                in_memory += len;

                trace!("File part {:?} of field {:?}: {} bytes in memory", filename, name, len);
                FilePart::in_memory(filename, content_type, content)
            };

            form.files.entry(name).or_default().push(part);
        }

        debug!(
            "Parsed form with {} value keys and {} file keys",
            form.values.len(),
            form.files.len()
        );

        Ok(form)
    }

    /// The text values under `key`, in body order. Empty if there are none.
    pub fn values(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The file parts under `key`, in body order. Empty if there are none.
    ///
    /// Fails with `EmptyFilename` if any of them was sent with an empty filename.
    pub fn file_parts(&self, key: &str) -> Result<&[FilePart]> {
        let parts = self.files.get(key).map(Vec::as_slice).unwrap_or(&[]);

        if parts.iter().any(|part| part.filename().is_empty()) {
            return Err(Error::EmptyFilename(key.to_owned()));
        }

        Ok(parts)
    }

    /// The keys that have text values.
    pub fn value_keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The keys that have file parts.
    pub fn file_keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// `true` if the form has neither values nor files.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.files.is_empty()
    }

    /// Every value and file part as one map, text values first under each key.
    ///
    /// Fails with `EmptyFilename` like [`file_parts()`](#method.file_parts).
    pub fn raw_values(&self) -> Result<HashMap<String, Vec<RawValue>>> {
        let mut raw: HashMap<String, Vec<RawValue>> = self
            .values
            .iter()
            .map(|(key, values)| (key.clone(), values.iter().cloned().map(RawValue::Text).collect()))
            .collect();

        for key in self.files.keys() {
            let parts = self.file_parts(key)?;

            raw.entry(key.clone())
                .or_default()
                .extend(parts.iter().cloned().map(RawValue::File));
        }

        Ok(raw)
    }

    /// Delete every spill file now.
    ///
    /// File parts cloned out of this form (including ones bound into a destination) share the
    /// released storage and can no longer be read. Files already persisted elsewhere are kept.
    /// Every spill file is attempted; the first error is returned.
    pub fn release(&self) -> Result<()> {
        let mut first_err = None;

        for part in self.files.values().flatten() {
            if let Err(e) = part.release() {
                warn!("Failed to delete spill file of {:?}: {}", part.filename(), e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use mime;
    use tempfile::tempdir;

    const BOUNDARY: &str = "--------------------------boundary42";

    fn body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();

        for &(name, filename, content) in parts {
            write!(out, "--{}\r\nContent-Disposition: form-data; name=\"{}\"", BOUNDARY, name).unwrap();

            if let Some(filename) = filename {
                write!(out, "; filename=\"{}\"", filename).unwrap();
            }

            out.extend_from_slice(b"\r\n\r\n");
            out.extend_from_slice(content);
            out.extend_from_slice(b"\r\n");
        }

        write!(out, "--{}--\r\n", BOUNDARY).unwrap();
        out
    }

    fn metadata() -> Metadata {
        Metadata::forward_headers(vec![(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )])
    }

    #[test]
    fn values_and_files_in_order() {
        let _ = ::env_logger::try_init();

        let data = body(&[
            ("tag", None, b"first"),
            ("doc", Some("a.txt"), b"alpha"),
            ("tag", None, b"second"),
            ("doc", Some("b.png"), b"\x89PNG"),
        ]);

        let form = ParsedForm::build(&metadata(), &HttpBody::new("", data), &FormConfig::default()).unwrap();

        assert_eq!(form.values("tag"), &["first".to_string(), "second".to_string()]);
        assert!(form.values("doc").is_empty());

        let docs = form.file_parts("doc").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename(), "a.txt");
        assert_eq!(docs[0].content_type(), &mime::TEXT_PLAIN);
        assert_eq!(docs[0].bytes().unwrap(), b"alpha");
        assert_eq!(docs[1].content_type(), &mime::IMAGE_PNG);
        assert!(docs.iter().all(FilePart::is_in_memory));

        let raw = form.raw_values().unwrap();
        assert_eq!(raw["tag"].len(), 2);
        assert_eq!(raw["doc"].len(), 2);
    }

    #[test]
    fn content_may_contain_crlf() {
        let data = body(&[("text", None, b"line one\r\nline two\r\n")]);
        let form = ParsedForm::parse(&data, BOUNDARY, &FormConfig::default()).unwrap();
        assert_eq!(form.values("text"), &["line one\r\nline two\r\n".to_string()]);
    }

    #[test]
    fn large_files_spill_to_temp_dir() {
        let dir = tempdir().unwrap();
        let big = vec![b'x'; 2048];
        let data = body(&[("small", Some("s.bin"), b"tiny"), ("big", Some("b.bin"), &big)]);
        let config = FormConfig::default().memory_threshold(1024).temp_dir(dir.path());

        let form = ParsedForm::parse(&data, BOUNDARY, &config).unwrap();

        let small = &form.file_parts("small").unwrap()[0];
        assert!(small.is_in_memory());

        let big_part = form.file_parts("big").unwrap()[0].clone();
        assert!(!big_part.is_in_memory());
        assert_eq!(big_part.size(), 2048);

        let spill = big_part.path().unwrap();
        assert!(spill.starts_with(dir.path()));
        assert!(spill
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with(SPILL_FILE_PREFIX)));
        assert_eq!(big_part.bytes().unwrap(), big);

        drop(form);
        assert!(spill.exists(), "clones keep the spill file alive");

        drop(big_part);
        assert!(!spill.exists());
    }

    #[test]
    fn release_deletes_spill_files() {
        let dir = tempdir().unwrap();
        let data = body(&[("big", Some("b.bin"), &[0u8; 64][..])]);
        let config = FormConfig::default().memory_threshold(0).temp_dir(dir.path());

        let form = ParsedForm::parse(&data, BOUNDARY, &config).unwrap();
        let part = form.file_parts("big").unwrap()[0].clone();
        let spill = part.path().unwrap();

        form.release().unwrap();
        assert!(!spill.exists());
        assert!(part.open().is_err());

        // Releasing twice is harmless.
        form.release().unwrap();
    }

    #[test]
    fn empty_filename_is_reported_on_access() {
        let data = body(&[("upload", Some(""), b"data"), ("name", None, b"x")]);
        let form = ParsedForm::parse(&data, BOUNDARY, &FormConfig::default()).unwrap();

        assert_eq!(form.values("name"), &["x".to_string()]);
        assert!(matches!(form.file_parts("upload"), Err(Error::EmptyFilename(ref f)) if f == "upload"));
        assert!(matches!(form.raw_values(), Err(Error::EmptyFilename(_))));
    }

    #[test]
    fn size_limit_rejects_large_envelopes() {
        let data = body(&[("text", None, b"some value")]);
        let config = FormConfig::default().size_limit(10);

        match ParsedForm::parse(&data, BOUNDARY, &config) {
            Err(Error::SizeLimitExceeded(10, actual)) => assert_eq!(actual, data.len() as u64),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn text_values_count_against_memory() {
        let half = vec![b'v'; (TEXT_VALUE_HEADROOM / 2) as usize + 1];
        let data = body(&[("a", None, &half), ("b", None, &half)]);

        let config = FormConfig::default().memory_threshold(0);
        match ParsedForm::parse(&data, BOUNDARY, &config) {
            Err(Error::SizeLimitExceeded(limit, actual)) => {
                assert_eq!(limit, TEXT_VALUE_HEADROOM);
                assert_eq!(actual, 2 * half.len() as u64);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let config = FormConfig::default().memory_threshold(2);
        assert!(ParsedForm::parse(&data, BOUNDARY, &config).is_ok());
    }

    #[test]
    fn invalid_utf8_value_is_malformed() {
        let data = body(&[("text", None, b"\xff\xfe")]);
        assert!(matches!(
            ParsedForm::parse(&data, BOUNDARY, &FormConfig::default()),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn not_multipart_metadata() {
        let md = Metadata::forward_headers(vec![("Content-Type", "application/json")]);
        let err = ParsedForm::build(&md, &HttpBody::new("", Vec::new()), &FormConfig::default()).unwrap_err();
        assert!(err.is_content_type_error());
    }

    #[test]
    fn unnamed_parts_are_skipped() {
        let mut data = Vec::new();
        write!(
            data,
            "--{b}\r\nContent-Type: text/plain\r\n\r\norphan\r\n--{b}\r\n\
             Content-Disposition: form-data; name=\"kept\"\r\n\r\nyes\r\n--{b}--",
            b = BOUNDARY
        )
        .unwrap();

        let form = ParsedForm::parse(&data, BOUNDARY, &FormConfig::default()).unwrap();
        assert_eq!(form.value_keys().collect::<Vec<_>>(), vec!["kept"]);
    }

    #[test]
    fn part_ending_after_its_headers() {
        let data = b"--abc\r\nContent-Disposition: form-data; name=\"v\"\r\n\r\n--abc--\r\n";
        let form = ParsedForm::parse(data, "abc", &FormConfig::default()).unwrap();
        assert_eq!(form.values("v"), &["".to_string()]);

        let data = b"--abc\r\nContent-Disposition: form-data; name=\"f\"; filename=\"e.txt\"\r\n\r\n\
                     --abc\r\nContent-Disposition: form-data; name=\"v\"\r\n\r\nx\r\n--abc--";
        let form = ParsedForm::parse(data, "abc", &FormConfig::default()).unwrap();
        assert_eq!(form.file_parts("f").unwrap()[0].size(), 0);
        assert_eq!(form.values("v"), &["x".to_string()]);
    }

    #[test]
    fn dashed_line_in_file_content() {
        let data = body(&[("doc", Some("notes.txt"), b"line\r\n--abc-def")]);
        let data = String::from_utf8(data).unwrap().replace(BOUNDARY, "abc");

        let form = ParsedForm::parse(data.as_bytes(), "abc", &FormConfig::default()).unwrap();
        assert_eq!(form.file_parts("doc").unwrap()[0].bytes().unwrap(), b"line\r\n--abc-def");
    }

    #[test]
    fn empty_form() {
        let data = format!("--{}--\r\n", BOUNDARY).into_bytes();
        let form = ParsedForm::parse(&data, BOUNDARY, &FormConfig::default()).unwrap();
        assert!(form.is_empty());
    }
}
