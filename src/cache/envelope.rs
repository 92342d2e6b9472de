//! Envelope Module
//!
//! Every cached value is stored as a `{"type": ..., "value": ...}` JSON
//! document. The type tag comes from a closed set; anything outside it is
//! refused before it reaches the store.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::ser;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

// == Value Kind ==
/// Type tag written next to every stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Array,
    Object,
    Boolean,
    Integer,
    Float,
    String,
    Null,
}

// == Cache Value ==
/// A value the cache can store, one variant per type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Array(Vec<Value>),
    Object(Map<String, Value>),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Null,
}

impl CacheValue {
    /// Classifies any serializable value.
    ///
    /// Returns None for values outside the supported kinds: values whose
    /// serialization fails (e.g. maps with non-string keys), values holding a
    /// NaN or infinite float anywhere, and integers that do not fit in an
    /// `i64`.
    pub fn classify<T: Serialize + ?Sized>(value: &T) -> Option<Self> {
        value.serialize(FiniteFloats).ok()?;
        let json = serde_json::to_value(value).ok()?;
        Self::from_json(json)
    }

    /// Converts a JSON value, refusing integers outside the `i64` range.
    pub fn from_json(json: Value) -> Option<Self> {
        Some(match json {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Boolean(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CacheValue::Integer(i)
                } else if n.is_f64() {
                    CacheValue::Float(n.as_f64()?)
                } else {
                    return None;
                }
            }
            Value::String(s) => CacheValue::String(s),
            Value::Array(items) => CacheValue::Array(items),
            Value::Object(map) => CacheValue::Object(map),
        })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            CacheValue::Array(_) => ValueKind::Array,
            CacheValue::Object(_) => ValueKind::Object,
            CacheValue::Boolean(_) => ValueKind::Boolean,
            CacheValue::Integer(_) => ValueKind::Integer,
            CacheValue::Float(_) => ValueKind::Float,
            CacheValue::String(_) => ValueKind::String,
            CacheValue::Null => ValueKind::Null,
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            CacheValue::Array(items) => Value::Array(items),
            CacheValue::Object(map) => Value::Object(map),
            CacheValue::Boolean(b) => Value::Bool(b),
            CacheValue::Integer(i) => Value::from(i),
            // Non-finite floats have no JSON form
            CacheValue::Float(f) => Value::from(f),
            CacheValue::String(s) => Value::String(s),
            CacheValue::Null => Value::Null,
        }
    }

    /// Decodes the value into a concrete Rust type.
    pub fn into_typed<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(self.into_json())
    }

    /// Rebuilds a value from its tag and payload, None if they disagree.
    fn from_parts(kind: ValueKind, value: Value) -> Option<Self> {
        let parsed = Self::from_json(value)?;
        match (kind, parsed) {
            // Whole floats may come back from JSON as integers
            (ValueKind::Float, CacheValue::Integer(i)) => Some(CacheValue::Float(i as f64)),
            (kind, parsed) if parsed.kind() == kind => Some(parsed),
            _ => None,
        }
    }
}

impl Serialize for CacheValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CacheValue::Float(f) => serializer.serialize_f64(*f),
            other => other.clone().into_json().serialize(serializer),
        }
    }
}

// == Finite Float Check ==
/// Walks a value without producing output, failing on the first NaN or
/// infinite float. serde_json would silently write those as `null`.
#[derive(Debug, Clone, Copy)]
struct FiniteFloats;

#[derive(Debug)]
struct Unsupported(String);

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Unsupported {}

impl ser::Error for Unsupported {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Unsupported(msg.to_string())
    }
}

macro_rules! accept_scalars {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(fn $method(self, _: $ty) -> Result<(), Unsupported> { Ok(()) })*
    };
}

impl Serializer for FiniteFloats {
    type Ok = ();
    type Error = Unsupported;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept_scalars! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    }

    fn serialize_f32(self, v: f32) -> Result<(), Unsupported> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), Unsupported> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(Unsupported(format!("non-finite float: {}", v)))
        }
    }

    fn serialize_none(self) -> Result<(), Unsupported> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Unsupported> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Unsupported> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<(), Unsupported> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), Unsupported> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), Unsupported> {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, Unsupported> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self, Unsupported> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self, Unsupported> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, Unsupported> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self, Unsupported> {
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, Unsupported> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, Unsupported> {
        Ok(self)
    }
}

macro_rules! check_elements {
    ($($compound:ident::$method:ident),* $(,)?) => {
        $(
            impl ser::$compound for FiniteFloats {
                type Ok = ();
                type Error = Unsupported;

                fn $method<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Unsupported> {
                    value.serialize(FiniteFloats)
                }

                fn end(self) -> Result<(), Unsupported> {
                    Ok(())
                }
            }
        )*
    };
}

check_elements! {
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field,
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = Unsupported;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Unsupported> {
        key.serialize(FiniteFloats)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Unsupported> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Unsupported> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = Unsupported;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), Unsupported> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Unsupported> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = Unsupported;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), Unsupported> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), Unsupported> {
        Ok(())
    }
}

// == Envelope ==
/// Wire form of a stored value.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: ValueKind,
    value: Value,
}

/// Encodes a value into its stored envelope.
pub fn encode(value: CacheValue) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Envelope {
        kind: value.kind(),
        value: value.into_json(),
    })
}

/// Decodes stored bytes. Anything that is not a well-formed envelope is None.
pub fn decode(bytes: &[u8]) -> Option<CacheValue> {
    let envelope: Envelope = serde_json::from_slice(bytes).ok()?;
    CacheValue::from_parts(envelope.kind, envelope.value)
}
