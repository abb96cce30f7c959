// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Client- and server-side support for `multipart/form-data` uploads behind an RPC gateway.
//!
//! A gateway that marshals every inbound request as one structured document cannot natively
//! accept a browser-style file upload. This crate closes that gap:
//!
//! * [`marshal`] provides the inbound decoder which, when asked for an [`HttpBody`], streams the
//!   raw request bytes in fixed-size chunks instead of decoding a document.
//! * [`metadata`] resolves the multipart boundary from the forwarded `Content-Type` metadata.
//! * [`server`] parses the raw envelope into a [`ParsedForm`] of text values and [`FilePart`]s,
//!   spilling large files to temporary storage, and persists file parts to disk.
//! * [`bind`] populates any type implementing [`Bind`] from a parsed form.
//!
//! ```no_run
//! #[macro_use] extern crate gateway_multipart;
//!
//! use gateway_multipart::{FilePart, FormConfig, HttpBody, Metadata};
//! use gateway_multipart::bind::parse_multipart_form;
//!
//! #[derive(Default, Debug)]
//! struct Upload {
//!     name: String,
//!     age: i64,
//!     files: Vec<FilePart>,
//! }
//!
//! form_binding!(Upload { name, age, files = "attachments" });
//!
//! fn handle(metadata: &Metadata, body: &HttpBody) -> gateway_multipart::Result<Upload> {
//!     parse_multipart_form::<Upload>(metadata, body, &FormConfig::default()).into_result()
//! }
//! # fn main() {}
//! ```
#[macro_use]
extern crate log;
#[macro_use]
extern crate quick_error;

extern crate httparse;
extern crate mime;
extern crate mime_guess;
extern crate rand;
extern crate serde;
extern crate serde_json;
extern crate tempfile;
extern crate twoway;

#[cfg(test)]
extern crate env_logger;

#[doc(hidden)]
pub mod __private {
    pub use std::sync::OnceLock;

    use crate::bind::{FormField, Kind};

    /// The kind of the field `field` projects to. Only the type of `field` is used.
    pub fn kind_of<T, F: FormField>(field: fn(&T) -> &F) -> Kind {
        let _ = field;
        F::kind()
    }
}

pub mod error;

#[macro_use]
pub mod bind;

pub mod marshal;
pub mod metadata;
pub mod server;

#[cfg(feature = "client")]
pub mod client;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bind::{Bind, BindResult, FormField, Json, Kind, RawValue};
pub use error::{Error, ParseKind, Result};
pub use marshal::{HttpBody, MultipartFormMarshaler};
pub use metadata::{resolve_boundary, Metadata};
pub use server::save::{persist, BufferPool};
pub use server::{FilePart, FormConfig, ParsedForm};

/// Generate a random alphanumeric sequence of length `len`
#[cfg(feature = "client")]
fn random_alphanumeric(len: usize) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
