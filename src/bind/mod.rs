// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Binding an extracted form into a destination type.
//!
//! A destination type describes its fields once, through [`form_binding!`](../macro.form_binding.html),
//! as a [`Schema`]: for each field its name, the form key it is read from, its [`Kind`] and a
//! setter. [`bind()`] walks the schema in declaration order, skipping fields whose key is absent
//! from the form and stopping at the first field that fails to bind.
//!
//! ```
//! #[macro_use] extern crate gateway_multipart;
//!
//! use gateway_multipart::bind::{bind_values, RawValue};
//! use std::collections::HashMap;
//!
//! #[derive(Default, Debug)]
//! struct Signup {
//!     name: String,
//!     age: Option<u8>,
//!     tags: Vec<String>,
//! }
//!
//! form_binding!(Signup { name, age, tags = "tag" });
//!
//! # fn main() {
//! let mut input = HashMap::new();
//! input.insert("name".to_string(), vec![RawValue::Text("Ada".into())]);
//! input.insert("tag".to_string(), vec![RawValue::Text("a".into()), RawValue::Text("b".into())]);
//!
//! let signup: Signup = bind_values(&input).into_result().unwrap();
//! assert_eq!(signup.name, "Ada");
//! assert_eq!(signup.age, None);
//! assert_eq!(signup.tags, ["a", "b"]);
//! # }
//! ```
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::marshal::HttpBody;
use crate::metadata::Metadata;
use crate::server::{FilePart, FormConfig, ParsedForm};

pub use self::field::{FormField, Json, Kind, MapKey, SequenceElement};

mod field;

/// Form values keyed by field name, text values before file parts under each key.
pub type FormInput = HashMap<String, Vec<RawValue>>;

/// One value sent under a form key.
#[derive(Clone, Debug)]
pub enum RawValue {
    /// A text value.
    Text(String),
    /// An uploaded file.
    File(FilePart),
}

impl RawValue {
    /// Borrow this value as text, if possible.
    pub fn as_text(&self) -> Option<&str> {
        match *self {
            RawValue::Text(ref s) => Some(s),
            _ => None,
        }
    }

    /// Borrow this value as a file part, if possible.
    pub fn as_file(&self) -> Option<&FilePart> {
        match *self {
            RawValue::File(ref part) => Some(part),
            _ => None,
        }
    }
}

/// A type that can be populated from a form. Implement with
/// [`form_binding!`](../macro.form_binding.html).
pub trait Bind: Default + Sized + 'static {
    /// The field descriptors of this type, computed once.
    fn schema() -> &'static Schema<Self>;
}

/// The ordered field descriptors of a destination type.
pub struct Schema<T> {
    fields: Vec<FieldDescriptor<T>>,
}

impl<T> Schema<T> {
    /// A schema binding `fields` in the given order.
    pub fn new(fields: Vec<FieldDescriptor<T>>) -> Self {
        Schema { fields: fields }
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor<T>] {
        &self.fields
    }

    /// The field read from `key`, if any.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.iter().find(|field| field.key == key)
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(&self.fields).finish()
    }
}

/// How one field of `T` is bound.
pub struct FieldDescriptor<T> {
    name: &'static str,
    key: &'static str,
    kind: Kind,
    setter: fn(&mut T, &[RawValue]) -> Result<()>,
}

impl<T> FieldDescriptor<T> {
    /// Describe the field `name` of kind `kind`, read from `key`. `setter` converts and assigns
    /// the raw values.
    pub fn new(
        name: &'static str,
        key: &'static str,
        kind: Kind,
        setter: fn(&mut T, &[RawValue]) -> Result<()>,
    ) -> Self {
        FieldDescriptor {
            name: name,
            key: key,
            kind: kind,
            setter: setter,
        }
    }

    /// The field's name in the destination type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The form key the field is read from.
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// The field's kind.
    pub fn kind(&self) -> &Kind {
        &self.kind
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Check that a field of `kind` can be bound from `raws` at all.
pub fn check_kind(kind: &Kind, raws: &[RawValue]) -> Result<()> {
    match *kind {
        Kind::Pointer(ref inner) => check_kind(inner, raws),
        Kind::Sequence(ref elem) => {
            if raws.is_empty() {
                return Err(Error::UnsupportedKind(format!(
                    "{}: no value to infer the element type from",
                    kind
                )));
            }

            check_kind(elem, raws)
        }
        Kind::Map { ref key } if **key != Kind::String => {
            Err(Error::UnsupportedKeyType(key.to_string()))
        }
        Kind::Unsupported(name) => Err(Error::UnsupportedKind(name.to_owned())),
        _ => Ok(()),
    }
}

/// The result of binding a form.
#[derive(Debug)]
pub enum BindResult<T> {
    /// Every field present in the form was bound.
    Full(T),
    /// Binding stopped at a field that failed; fields before it are populated.
    Partial(T, Error),
    /// The form could not be extracted; there is no destination.
    Error(Error),
}

impl<T> BindResult<T> {
    /// The destination, if any, discarding the error.
    pub fn into_partial(self) -> Option<T> {
        match self {
            BindResult::Full(dst) | BindResult::Partial(dst, _) => Some(dst),
            BindResult::Error(_) => None,
        }
    }

    /// Decompose `self` to `(Option<T>, Option<Error>)`.
    pub fn into_opt(self) -> (Option<T>, Option<Error>) {
        match self {
            BindResult::Full(dst) => (Some(dst), None),
            BindResult::Partial(dst, err) => (Some(dst), Some(err)),
            BindResult::Error(err) => (None, Some(err)),
        }
    }

    /// `Ok` only if binding completed; a partial destination is dropped.
    pub fn into_result(self) -> Result<T> {
        match self {
            BindResult::Full(dst) => Ok(dst),
            BindResult::Partial(_, err) | BindResult::Error(err) => Err(err),
        }
    }

    /// `true` if every field present in the form was bound.
    pub fn is_full(&self) -> bool {
        matches!(*self, BindResult::Full(_))
    }
}

/// Bind `input` onto `dst`, in the declaration order of `T`'s fields.
///
/// Stops at the first failing field; fields bound before it keep their values.
pub fn bind_into<T: Bind>(dst: &mut T, input: &FormInput) -> Result<()> {
    for field in T::schema().fields() {
        let raws = match input.get(field.key) {
            Some(raws) => raws,
            None => {
                trace!("No value for field {:?} (key {:?})", field.name, field.key);
                continue;
            }
        };

        debug!(
            "Binding {} value(s) into field {:?} ({})",
            raws.len(),
            field.name,
            field.kind
        );

        check_kind(&field.kind, raws)?;
        (field.setter)(dst, raws)?;
    }

    Ok(())
}

/// Bind `input` into a fresh `T`.
pub fn bind_values<T: Bind>(input: &FormInput) -> BindResult<T> {
    let mut dst = T::default();

    match bind_into(&mut dst, input) {
        Ok(()) => BindResult::Full(dst),
        Err(err) => {
            debug!("Binding stopped: {}", err);
            BindResult::Partial(dst, err)
        }
    }
}

/// Bind a parsed form into a fresh `T`.
///
/// File parts bound into the destination share storage with the form, so spill files stay
/// alive as long as the destination holds them.
pub fn bind<T: Bind>(form: &ParsedForm) -> BindResult<T> {
    match form.raw_values() {
        Ok(input) => bind_values(&input),
        Err(err) => BindResult::Partial(T::default(), err),
    }
}

/// Extract the form from `body` and bind it into a fresh `T`.
///
/// Spill files not bound into the destination are deleted before this returns.
pub fn parse_multipart_form<T: Bind>(
    metadata: &Metadata,
    body: &HttpBody,
    config: &FormConfig,
) -> BindResult<T> {
    let form = match ParsedForm::build(metadata, body, config) {
        Ok(form) => form,
        Err(err) => return BindResult::Error(err),
    };

    bind(&form)
}

/// Implement [`Bind`](bind/trait.Bind.html) for a struct by listing the fields to bind.
///
/// Each field is read from the form key of the same name, or from the key given after `=`.
/// Every listed field's type must implement [`FormField`](bind/trait.FormField.html); fields
/// that are not listed keep their default value.
///
/// ```
/// #[macro_use] extern crate gateway_multipart;
///
/// use gateway_multipart::FilePart;
///
/// #[derive(Default)]
/// struct Upload {
///     title: String,
///     files: Vec<FilePart>,
///     internal_note: String,
/// }
///
/// form_binding!(Upload { title, files = "attachment" });
/// # fn main() {}
/// ```
///
/// The type must not be generic.
#[macro_export]
macro_rules! form_binding {
    (@key $field:ident) => { stringify!($field) };
    (@key $field:ident $key:literal) => { $key };
    ($ty:ty { $($field:ident $(= $key:literal)?),* $(,)? }) => {
        impl $crate::bind::Bind for $ty {
            fn schema() -> &'static $crate::bind::Schema<Self> {
                static SCHEMA: $crate::__private::OnceLock<$crate::bind::Schema<$ty>> =
                    $crate::__private::OnceLock::new();

                SCHEMA.get_or_init(|| {
                    $crate::bind::Schema::new(vec![$(
                        $crate::bind::FieldDescriptor::new(
                            stringify!($field),
                            $crate::form_binding!(@key $field $($key)?),
                            $crate::__private::kind_of(|dst: &$ty| &dst.$field),
                            |dst: &mut $ty, raws: &[$crate::bind::RawValue]| {
                                $crate::bind::FormField::assign(&mut dst.$field, raws)
                            },
                        ),
                    )*])
                })
            }
        }
    };
}

/// Make a deserializable type bindable from a JSON text value, as a struct-kind field or the
/// element of a bound `Vec`.
///
/// ```
/// #[macro_use] extern crate gateway_multipart;
/// #[macro_use] extern crate serde;
///
/// #[derive(Deserialize, Default, Debug)]
/// struct Dimensions {
///     width: u32,
///     height: u32,
/// }
///
/// form_json!(Dimensions);
/// # fn main() {}
/// ```
#[macro_export]
macro_rules! form_json {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::bind::FormField for $ty {
            fn kind() -> $crate::bind::Kind {
                $crate::bind::Kind::Struct(stringify!($ty))
            }

            fn from_raw(raw: &$crate::bind::RawValue) -> $crate::Result<Self> {
                <$crate::bind::Json<$ty> as $crate::bind::FormField>::from_raw(raw).map(|json| json.0)
            }
        }

        impl $crate::bind::SequenceElement for $ty {}
    )+};
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::error::ParseKind;
    use chrono::{DateTime, Utc};
    use mime;
    use serde::Deserialize;

    use std::collections::BTreeMap;
    use std::sync::mpsc::Sender;

    #[derive(Deserialize, Debug, Default, PartialEq)]
    struct Meta {
        author: String,
        created: Option<DateTime<Utc>>,
        labels: BTreeMap<String, String>,
    }

    form_json!(Meta);

    #[derive(Debug, Default)]
    struct Profile {
        name: String,
        age: i32,
        active: bool,
        score: Option<f64>,
        scores: Vec<u16>,
        nickname: Box<String>,
        avatar: Option<FilePart>,
        files: Vec<FilePart>,
        meta: Meta,
        extra: HashMap<String, u32>,
        raw: Vec<u8>,
        anything: Option<RawValue>,
        untouched: String,
    }

    form_binding!(Profile {
        name,
        age,
        active = "is_active",
        score,
        scores = "score_list",
        nickname,
        avatar,
        files = "attachments",
        meta = "metadata",
        extra,
        raw,
        anything,
    });

    fn text(v: &str) -> RawValue {
        RawValue::Text(v.to_owned())
    }

    fn file(name: &str, data: &[u8]) -> RawValue {
        RawValue::File(FilePart::in_memory(name.into(), mime::TEXT_PLAIN, data))
    }

    fn input(entries: Vec<(&str, Vec<RawValue>)>) -> FormInput {
        entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn schema_is_cached_in_declaration_order() {
        let schema = Profile::schema();
        assert!(::std::ptr::eq(schema, Profile::schema()));

        let keys: Vec<_> = schema.fields().iter().map(FieldDescriptor::key).collect();
        assert_eq!(keys[..3], ["name", "age", "is_active"]);
        assert_eq!(schema.field("attachments").map(FieldDescriptor::name), Some("files"));
        assert!(schema.field("untouched").is_none());

        assert_eq!(schema.field("score").unwrap().kind(), &Kind::Pointer(Box::new(Kind::Float(64))));
        assert_eq!(schema.field("raw").unwrap().kind(), &Kind::Bytes);
        assert_eq!(schema.field("anything").unwrap().kind(), &Kind::Pointer(Box::new(Kind::Interface)));
    }

    #[derive(Debug, Default)]
    struct Counter {
        count: u8,
    }

    impl Bind for Counter {
        fn schema() -> &'static Schema<Self> {
            static SCHEMA: ::std::sync::OnceLock<Schema<Counter>> = ::std::sync::OnceLock::new();

            SCHEMA.get_or_init(|| {
                Schema::new(vec![FieldDescriptor::new(
                    "count",
                    "n",
                    <u8 as FormField>::kind(),
                    |dst: &mut Counter, raws: &[RawValue]| FormField::assign(&mut dst.count, raws),
                )])
            })
        }
    }

    #[test]
    fn hand_written_schema() {
        assert_eq!(Counter::schema().field("n").unwrap().kind(), &Kind::Uint(8));

        let counter: Counter = bind_values(&input(vec![("n", vec![text("7")])]))
            .into_result()
            .unwrap();
        assert_eq!(counter.count, 7);
    }

    #[test]
    fn binds_every_kind() {
        let _ = ::env_logger::try_init();

        let form = input(vec![
            ("name", vec![text("John Doe")]),
            ("age", vec![text("30")]),
            ("is_active", vec![text("t")]),
            ("score", vec![text("9.5")]),
            ("score_list", vec![text("1"), text("2"), text("3")]),
            ("nickname", vec![text("JD")]),
            ("avatar", vec![file("me.png", b"png")]),
            ("attachments", vec![file("a.txt", b"a"), file("b.txt", b"b")]),
            (
                "metadata",
                vec![text(r#"{"author":"jd","created":"2024-01-02T03:04:05Z","labels":{"k":"v"}}"#)],
            ),
            ("extra", vec![text(r#"{"x": 1}"#)]),
            ("raw", vec![text("bytes\u{0}here")]),
            ("anything", vec![file("any.bin", b"?")]),
            ("untouched", vec![text("ignored")]),
        ]);

        let profile: Profile = bind_values(&form).into_result().unwrap();

        assert_eq!(profile.name, "John Doe");
        assert_eq!(profile.age, 30);
        assert!(profile.active);
        assert_eq!(profile.score, Some(9.5));
        assert_eq!(profile.scores, vec![1, 2, 3]);
        assert_eq!(*profile.nickname, "JD");
        assert_eq!(profile.avatar.as_ref().map(FilePart::filename), Some("me.png"));
        assert_eq!(profile.files.len(), 2);
        assert_eq!(profile.files[1].bytes().unwrap(), b"b");
        assert_eq!(profile.meta.author, "jd");
        assert_eq!(
            profile.meta.created.map(|c| c.to_rfc3339()),
            Some("2024-01-02T03:04:05+00:00".to_string())
        );
        assert_eq!(profile.meta.labels["k"], "v");
        assert_eq!(profile.extra["x"], 1);
        assert_eq!(profile.raw, b"bytes\0here");
        assert!(profile.anything.as_ref().and_then(RawValue::as_file).is_some());
        assert_eq!(profile.untouched, "");
    }

    #[test]
    fn absent_keys_keep_defaults() {
        let profile: Profile = bind_values(&input(vec![("name", vec![text("x")])]))
            .into_result()
            .unwrap();

        assert_eq!(profile.age, 0);
        assert_eq!(profile.score, None);
        assert!(profile.files.is_empty());
    }

    #[test]
    fn first_failure_returns_partial_destination() {
        let form = input(vec![
            ("name", vec![text("John")]),
            ("age", vec![text("thirty")]),
            ("is_active", vec![text("true")]),
        ]);

        match bind_values::<Profile>(&form) {
            BindResult::Partial(profile, Error::Parse(ParseKind::Int, value)) => {
                assert_eq!(value, "thirty");
                assert_eq!(profile.name, "John");
                assert!(!profile.active, "binding stops at the failing field");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn invalid_nested_json() {
        let form = input(vec![("metadata", vec![text("{not json")])]);
        let (profile, err) = bind_values::<Profile>(&form).into_opt();

        assert!(profile.is_some());
        assert!(matches!(err, Some(Error::Json(_))), "{:?}", err);
    }

    #[test]
    fn narrow_integer_overflow() {
        #[derive(Default, Debug)]
        struct Small {
            level: i8,
        }

        form_binding!(Small { level });

        let err = bind_values::<Small>(&input(vec![("level", vec![text("300")])]))
            .into_result()
            .unwrap_err();

        assert!(matches!(err, Error::Parse(ParseKind::Int, ref v) if v == "300"), "{:?}", err);
    }

    #[test]
    fn empty_sequence_cannot_be_bound() {
        let form = input(vec![("attachments", vec![])]);
        let err = bind_values::<Profile>(&form).into_result().unwrap_err();
        assert!(matches!(err, Error::UnsupportedKind(_)), "{:?}", err);
    }

    #[test]
    fn unsupported_field_kinds() {
        #[derive(Default)]
        struct Odd {
            events: Option<Sender<u8>>,
            by_id: HashMap<u32, String>,
        }

        form_binding!(Odd { events, by_id });

        let err = bind_values::<Odd>(&input(vec![("events", vec![text("x")])]))
            .into_result()
            .err();
        assert!(matches!(err, Some(Error::UnsupportedKind(ref k)) if k == "chan"));

        let err = bind_values::<Odd>(&input(vec![("by_id", vec![text("{}")])]))
            .into_result()
            .err();
        assert!(matches!(err, Some(Error::UnsupportedKeyType(ref k)) if k == "uint32"));
    }

    #[test]
    fn check_kind_validates_centrally() {
        assert!(check_kind(&Kind::String, &[]).is_ok());
        assert!(check_kind(&Kind::Sequence(Box::new(Kind::String)), &[]).is_err());
        assert!(check_kind(
            &Kind::Pointer(Box::new(Kind::Unsupported("func"))),
            &[text("x")]
        )
        .is_err());
        assert!(check_kind(
            &Kind::Map { key: Box::new(Kind::String) },
            &[text("{}")]
        )
        .is_ok());
    }
}
