// Copyright 2026 `gateway-multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Field kinds and conversion of raw form values into field types.

use serde::de::DeserializeOwned;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::mpsc::{Sender, SyncSender};

use crate::error::{Error, ParseKind, Result};
use crate::server::FilePart;

use super::RawValue;

/// The shape of a destination field, which decides how raw values are converted into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// An optional or boxed value; allocated on first assignment.
    Pointer(Box<Kind>),
    /// One element per raw value.
    Sequence(Box<Kind>),
    /// A byte buffer, filled with the first text value verbatim.
    Bytes,
    /// A composite value decoded from JSON, or a [`FilePart`].
    Struct(&'static str),
    /// A map decoded from JSON; only string keys are supported.
    Map {
        /// The kind of the map's keys.
        key: Box<Kind>,
    },
    String,
    /// A signed integer of the given bit width.
    Int(u32),
    /// An unsigned integer of the given bit width.
    Uint(u32),
    /// A float of the given bit width.
    Float(u32),
    Bool,
    /// A [`RawValue`], assigned as-is.
    Interface,
    /// Something no form value can be converted into, such as a channel or a function.
    Unsupported(&'static str),
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Kind::Pointer(ref inner) => write!(f, "ptr to {}", inner),
            Kind::Sequence(ref elem) => write!(f, "slice of {}", elem),
            Kind::Bytes => f.write_str("bytes"),
            Kind::Struct(name) => write!(f, "struct {}", name),
            Kind::Map { ref key } => write!(f, "map with {} keys", key),
            Kind::String => f.write_str("string"),
            Kind::Int(bits) => write!(f, "int{}", bits),
            Kind::Uint(bits) => write!(f, "uint{}", bits),
            Kind::Float(bits) => write!(f, "float{}", bits),
            Kind::Bool => f.write_str("bool"),
            Kind::Interface => f.write_str("interface"),
            Kind::Unsupported(name) => f.write_str(name),
        }
    }
}

/// A type a form field can be bound into.
///
/// Implemented for strings, integers, floats, `bool`, `Vec<u8>`, vectors of any
/// [`SequenceElement`], `Option`/`Box` of any `FormField`, string-keyed maps and [`Json`]
/// wrappers of deserializable values, [`FilePart`] and [`RawValue`]. Use
/// [`form_json!`](../macro.form_json.html) to bind your own types from JSON text values.
pub trait FormField: Sized {
    /// The shape of this type.
    fn kind() -> Kind;

    /// Convert one raw value.
    fn from_raw(raw: &RawValue) -> Result<Self>;

    /// Convert all raw values sent under the field's key. Scalars take the first one.
    fn from_raws(raws: &[RawValue]) -> Result<Self> {
        match raws.first() {
            Some(raw) => Self::from_raw(raw),
            None => Err(Error::UnsupportedKind(format!("{} without a value", Self::kind()))),
        }
    }

    /// Bind raw values into an existing field.
    fn assign(&mut self, raws: &[RawValue]) -> Result<()> {
        *self = Self::from_raws(raws)?;
        Ok(())
    }
}

/// Types that may be the element of a bound `Vec`.
///
/// `u8` is not one: `Vec<u8>` binds as bytes.
pub trait SequenceElement: FormField {}

/// Types that may be the key of a bound map. Only `String` is accepted at bind time.
pub trait MapKey: DeserializeOwned {
    /// The shape of this key type.
    fn kind() -> Kind;
}

fn text<'a, T: FormField>(raw: &'a RawValue) -> Result<&'a str> {
    match *raw {
        RawValue::Text(ref text) => Ok(text),
        RawValue::File(_) => Err(Error::UnsupportedKind(format!("{} from a file part", T::kind()))),
    }
}

impl FormField for String {
    fn kind() -> Kind {
        Kind::String
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        text::<Self>(raw).map(str::to_owned)
    }
}

impl SequenceElement for String {}

impl MapKey for String {
    fn kind() -> Kind {
        Kind::String
    }
}

macro_rules! int_fields {
    ($($ty:ty),*) => ($(
        impl FormField for $ty {
            fn kind() -> Kind {
                Kind::Int(<$ty>::BITS)
            }

            fn from_raw(raw: &RawValue) -> Result<Self> {
                let text = text::<Self>(raw)?;
                text.parse().map_err(|_| Error::Parse(ParseKind::Int, text.to_owned()))
            }
        }

        impl SequenceElement for $ty {}

        impl MapKey for $ty {
            fn kind() -> Kind {
                Kind::Int(<$ty>::BITS)
            }
        }
    )*)
}

int_fields!(i8, i16, i32, i64, isize);

macro_rules! uint_fields {
    ($($ty:ty),*) => ($(
        impl FormField for $ty {
            fn kind() -> Kind {
                Kind::Uint(<$ty>::BITS)
            }

            fn from_raw(raw: &RawValue) -> Result<Self> {
                let text = text::<Self>(raw)?;

                if text.starts_with('+') {
                    return Err(Error::Parse(ParseKind::Uint, text.to_owned()));
                }

                text.parse().map_err(|_| Error::Parse(ParseKind::Uint, text.to_owned()))
            }
        }

        impl MapKey for $ty {
            fn kind() -> Kind {
                Kind::Uint(<$ty>::BITS)
            }
        }
    )*)
}

uint_fields!(u8, u16, u32, u64, usize);

impl SequenceElement for u16 {}
impl SequenceElement for u32 {}
impl SequenceElement for u64 {}
impl SequenceElement for usize {}

macro_rules! float_fields {
    ($($ty:ident $bits:expr),*) => ($(
        impl FormField for $ty {
            fn kind() -> Kind {
                Kind::Float($bits)
            }

            fn from_raw(raw: &RawValue) -> Result<Self> {
                let text = text::<Self>(raw)?;
                let err = || Error::Parse(ParseKind::Float, text.to_owned());

                let val: $ty = text.parse().map_err(|_| err())?;

                // Out-of-range literals parse as infinity; only spelled-out infinities may.
                if val.is_infinite() && !is_infinity_literal(text) {
                    return Err(err());
                }

                Ok(val)
            }
        }

        impl SequenceElement for $ty {}
    )*)
}

float_fields!(f32 32, f64 64);

fn is_infinity_literal(text: &str) -> bool {
    let unsigned = text.trim_start_matches(|c| c == '+' || c == '-');
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

impl FormField for bool {
    fn kind() -> Kind {
        Kind::Bool
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        match text::<Self>(raw)? {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            other => Err(Error::Parse(ParseKind::Bool, other.to_owned())),
        }
    }
}

impl SequenceElement for bool {}

impl MapKey for bool {
    fn kind() -> Kind {
        Kind::Bool
    }
}

impl FormField for Vec<u8> {
    fn kind() -> Kind {
        Kind::Bytes
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        text::<Self>(raw).map(|text| text.as_bytes().to_vec())
    }
}

impl SequenceElement for Vec<u8> {}

impl<T: SequenceElement> FormField for Vec<T> {
    fn kind() -> Kind {
        Kind::Sequence(Box::new(T::kind()))
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        Ok(vec![T::from_raw(raw)?])
    }

    fn from_raws(raws: &[RawValue]) -> Result<Self> {
        if raws.is_empty() {
            return Err(Error::UnsupportedKind(format!("{} without values", Self::kind())));
        }

        raws.iter().map(T::from_raw).collect()
    }
}

impl<T: FormField> FormField for Option<T> {
    fn kind() -> Kind {
        Kind::Pointer(Box::new(T::kind()))
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        T::from_raw(raw).map(Some)
    }

    fn from_raws(raws: &[RawValue]) -> Result<Self> {
        T::from_raws(raws).map(Some)
    }

    fn assign(&mut self, raws: &[RawValue]) -> Result<()> {
        match *self {
            Some(ref mut inner) => inner.assign(raws),
            None => {
                *self = Some(T::from_raws(raws)?);
                Ok(())
            }
        }
    }
}

impl<T: FormField> FormField for Box<T> {
    fn kind() -> Kind {
        Kind::Pointer(Box::new(T::kind()))
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        T::from_raw(raw).map(Box::new)
    }

    fn from_raws(raws: &[RawValue]) -> Result<Self> {
        T::from_raws(raws).map(Box::new)
    }

    fn assign(&mut self, raws: &[RawValue]) -> Result<()> {
        (**self).assign(raws)
    }
}

fn map_from_json<M: DeserializeOwned, K: MapKey>(raw: &RawValue, kind: Kind) -> Result<M> {
    if K::kind() != Kind::String {
        return Err(Error::UnsupportedKeyType(K::kind().to_string()));
    }

    match *raw {
        RawValue::Text(ref text) => Ok(::serde_json::from_str(text)?),
        RawValue::File(_) => Err(Error::UnsupportedKind(format!("{} from a file part", kind))),
    }
}

impl<K, V> FormField for HashMap<K, V>
where
    K: MapKey + Eq + Hash,
    V: DeserializeOwned,
{
    fn kind() -> Kind {
        Kind::Map {
            key: Box::new(K::kind()),
        }
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        map_from_json::<Self, K>(raw, Self::kind())
    }
}

impl<K, V> FormField for BTreeMap<K, V>
where
    K: MapKey + Ord,
    V: DeserializeOwned,
{
    fn kind() -> Kind {
        Kind::Map {
            key: Box::new(K::kind()),
        }
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        map_from_json::<Self, K>(raw, Self::kind())
    }
}

/// A field bound by decoding its text value as JSON.
///
/// ```
/// use gateway_multipart::{FormField, Json, RawValue};
///
/// let raw = RawValue::Text(r#"["red", "green"]"#.into());
/// let labels = Json::<Vec<String>>::from_raw(&raw).unwrap();
/// assert_eq!(labels.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the decoded value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: DeserializeOwned> FormField for Json<T> {
    fn kind() -> Kind {
        Kind::Struct(::std::any::type_name::<T>())
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        let text = text::<Self>(raw)?;
        Ok(Json(::serde_json::from_str(text)?))
    }
}

impl<T: DeserializeOwned> SequenceElement for Json<T> {}

impl FormField for FilePart {
    fn kind() -> Kind {
        Kind::Struct("FilePart")
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        match *raw {
            RawValue::File(ref part) => Ok(part.clone()),
            RawValue::Text(_) => Err(Error::UnsupportedKind(format!("{} from a text value", Self::kind()))),
        }
    }
}

impl SequenceElement for FilePart {}

impl FormField for RawValue {
    fn kind() -> Kind {
        Kind::Interface
    }

    fn from_raw(raw: &RawValue) -> Result<Self> {
        Ok(raw.clone())
    }
}

impl SequenceElement for RawValue {}

macro_rules! unsupported_fields {
    ($($name:expr => [$($generics:tt)*] $ty:ty),*) => ($(
        impl<$($generics)*> FormField for $ty {
            fn kind() -> Kind {
                Kind::Unsupported($name)
            }

            fn from_raw(_: &RawValue) -> Result<Self> {
                Err(Error::UnsupportedKind($name.to_owned()))
            }
        }
    )*)
}

unsupported_fields!(
    "chan" => [T] Sender<T>,
    "chan" => [T] SyncSender<T>,
    "func" => [R] fn() -> R,
    "unsafe pointer" => [T] *const T,
    "unsafe pointer" => [T] *mut T
);
