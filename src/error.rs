// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The error type shared by extraction, binding and persistence.
use std::fmt;
use std::io;

/// Shorthand for results carrying this crate's [`Error`].
pub type Result<T> = ::std::result::Result<T, Error>;

/// The kind of scalar a form value failed to parse as.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseKind {
    /// A signed integer of any width.
    Int,
    /// An unsigned integer of any width.
    Uint,
    /// A floating-point number of any width.
    Float,
    /// A boolean.
    Bool,
}

impl fmt::Display for ParseKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ParseKind::Int => "int",
            ParseKind::Uint => "uint",
            ParseKind::Float => "float",
            ParseKind::Bool => "bool",
        })
    }
}

quick_error! {
    /// Everything that can go wrong between receiving the envelope and binding or saving a form.
    #[derive(Debug)]
    pub enum Error {
        /// The forwarded `Content-Type` is missing or is neither `multipart/form-data` nor
        /// `multipart/mixed`.
        NotMultipart {
            display("request Content-Type isn't multipart/form-data or multipart/mixed")
        }
        /// The forwarded `Content-Type` is multipart but has no `boundary` parameter.
        MissingBoundary {
            display("no multipart boundary param in Content-Type")
        }
        /// A file part under the named field was sent without a filename.
        EmptyFilename(field: String) {
            display("file part in field {:?} has an empty filename", field)
        }
        /// A form value could not be parsed as the scalar its destination field expects.
        Parse(kind: ParseKind, value: String) {
            display("failed to parse {} from {:?}", kind, value)
        }
        /// The destination field has a kind the binder cannot populate.
        UnsupportedKind(desc: String) {
            display("unsupported kind {}", desc)
        }
        /// The destination field is a map whose keys are not strings.
        UnsupportedKeyType(desc: String) {
            display("unsupported map key type {}", desc)
        }
        /// A form value bound to a struct or map field was not a valid JSON document for it.
        Json(err: ::serde_json::Error) {
            from()
            source(err)
            display("JSON decode error: {}", err)
        }
        /// Opening, creating, copying or renaming a file failed.
        Io(err: io::Error) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
        /// The request, or the in-memory share of it, is larger than the configured limit.
        SizeLimitExceeded(limit: u64, actual: u64) {
            display("size limit exceeded: {} bytes (limit {})", actual, limit)
        }
        /// The multipart body does not follow the multipart grammar.
        Malformed(desc: String) {
            display("malformed multipart body: {}", desc)
        }
    }
}

impl Error {
    pub(crate) fn malformed<D: Into<String>>(desc: D) -> Self {
        Error::Malformed(desc.into())
    }

    /// `true` if this error came from the request not being (well-formed) multipart.
    pub fn is_content_type_error(&self) -> bool {
        matches!(*self, Error::NotMultipart | Error::MissingBoundary)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_names_kind() {
        let err = Error::Parse(ParseKind::Int, "300".into());
        assert_eq!(err.to_string(), "failed to parse int from \"300\"");
    }

    #[test]
    fn io_converts_with_source() {
        use std::error::Error as StdError;

        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.source().is_some());
    }
}
