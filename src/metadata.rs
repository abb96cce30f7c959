// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Request-scoped metadata as forwarded by the gateway, and boundary resolution.
//!
//! The gateway does not hand the original HTTP headers to the service. Instead it forwards each
//! header as a metadata entry whose key is the lowercased header name behind
//! [`METADATA_PREFIX`]; the original `Content-Type` therefore arrives as
//! `grpcgateway-content-type`.
use mime::{self, Mime};

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Prefix the gateway puts in front of every forwarded HTTP header.
pub const METADATA_PREFIX: &str = "grpcgateway-";

/// Case-insensitive, multi-valued metadata attached to one inbound call.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    entries: HashMap<String, Vec<String>>,
}

impl Metadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Metadata::default()
    }

    /// Metadata as the gateway builds it from incoming HTTP headers: every header is kept under
    /// its lowercased name prefixed with [`METADATA_PREFIX`].
    pub fn forward_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut metadata = Metadata::new();

        for (name, value) in headers {
            metadata.append(format!("{}{}", METADATA_PREFIX, name.as_ref()), value);
        }

        metadata
    }

    /// All values stored under `key`, in insertion order. Empty if the key is absent.
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace any values under `key` with `value`.
    pub fn insert<K: AsRef<str>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), vec![value.into()]);
        self
    }

    /// Add `value` after any values already under `key`.
    pub fn append<K: AsRef<str>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.entries
            .entry(key.as_ref().to_ascii_lowercase())
            .or_insert_with(Vec::new)
            .push(value.into());
        self
    }

    /// The original request's `Content-Type`, if the gateway forwarded one.
    pub fn content_type(&self) -> Option<&str> {
        self.get(&content_type_key()).first().map(String::as_str)
    }
}

fn content_type_key() -> String {
    format!("{}{}", METADATA_PREFIX, "content-type")
}

/// Get the multipart boundary from the forwarded `Content-Type`.
///
/// Fails with `NotMultipart` if the header is absent, unparseable, or names a media type other
/// than `multipart/form-data` or `multipart/mixed`, and with `MissingBoundary` if it is
/// multipart but has no `boundary` parameter.
pub fn resolve_boundary(metadata: &Metadata) -> Result<String> {
    let content_type = metadata.content_type().ok_or(Error::NotMultipart)?;

    let mime: Mime = content_type.parse().map_err(|e| {
        debug!("Unparseable Content-Type {:?}: {}", content_type, e);
        Error::NotMultipart
    })?;

    if !is_multipart(&mime) {
        debug!("Content-Type {:?} is not multipart", content_type);
        return Err(Error::NotMultipart);
    }

    let boundary = mime
        .get_param(mime::BOUNDARY)
        .map(|boundary| boundary.as_str().to_owned())
        .ok_or(Error::MissingBoundary)?;

    debug!("Boundary: {:?}", boundary);

    Ok(boundary)
}

fn is_multipart(mime: &Mime) -> bool {
    mime.type_() == mime::MULTIPART
        && (mime.subtype() == mime::FORM_DATA || mime.subtype() == "mixed")
}

#[cfg(test)]
mod test {
    use super::*;

    fn with_content_type(content_type: &str) -> Metadata {
        let mut md = Metadata::new();
        md.insert(content_type_key(), content_type);
        md
    }

    #[test]
    fn resolves_form_data_boundary() {
        let md = with_content_type("multipart/form-data; boundary=abc123XYZ");
        assert_eq!(resolve_boundary(&md).unwrap(), "abc123XYZ");
    }

    #[test]
    fn resolves_quoted_mixed_boundary() {
        let md = with_content_type("multipart/mixed; boundary=\"simple boundary\"");
        assert_eq!(resolve_boundary(&md).unwrap(), "simple boundary");
    }

    #[test]
    fn missing_header_is_not_multipart() {
        let err = resolve_boundary(&Metadata::new()).unwrap_err();
        assert!(matches!(err, Error::NotMultipart), "{:?}", err);
    }

    #[test]
    fn other_media_types_are_not_multipart() {
        for ct in &["application/json", "text/plain; boundary=x", "multipart/related; boundary=x", "%%%"] {
            let err = resolve_boundary(&with_content_type(ct)).unwrap_err();
            assert!(matches!(err, Error::NotMultipart), "{}: {:?}", ct, err);
        }
    }

    #[test]
    fn multipart_without_boundary() {
        let err = resolve_boundary(&with_content_type("multipart/form-data")).unwrap_err();
        assert!(matches!(err, Error::MissingBoundary), "{:?}", err);
    }

    #[test]
    fn forwarded_headers_are_prefixed_and_case_insensitive() {
        let md = Metadata::forward_headers(vec![
            ("Content-Type", "multipart/form-data; boundary=b"),
            ("User-Agent", "curl/8.0"),
        ]);

        assert_eq!(md.get("grpcgateway-user-agent"), &["curl/8.0".to_string()]);
        assert_eq!(md.get("GRPCGATEWAY-USER-AGENT").len(), 1);
        assert!(md.get("user-agent").is_empty());
        assert_eq!(resolve_boundary(&md).unwrap(), "b");
    }
}
