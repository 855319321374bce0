use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use bytes::{Buf, BufMut, BytesMut};
use crate::core::config::BasicType;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;

/// A value type an enum store can deduplicate.
///
/// `compare` is the exact ordering. `compare_folded` and `hash_folded` ignore case for
/// strings and coincide with the exact versions for numbers. Values serialize
/// big-endian; strings are NUL-terminated.
pub trait EnumValue: Clone + Send + Sync + fmt::Debug + 'static {
    const BASIC_TYPE: BasicType;

    fn compare(&self, other: &Self) -> Ordering;

    fn compare_folded(&self, other: &Self) -> Ordering {
        self.compare(other)
    }

    fn hash_folded(&self) -> u64;

    fn serialize(&self, buf: &mut BytesMut);

    fn deserialize(buf: &mut &[u8]) -> Result<Self>;

    /// Serialized size in bytes.
    fn size(&self) -> usize;

    /// The value of a document that has none.
    fn default_value() -> Self;

    fn as_number(&self) -> f64;

    fn from_field(value: &FieldValue) -> Option<Self>;

    fn to_field(&self) -> FieldValue;

    fn is_foldable() -> bool {
        false
    }
}

fn hash_one(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn need(buf: &&[u8], wanted: usize, what: &str) -> Result<()> {
    if buf.remaining() < wanted {
        return Err(Error::corrupt(format!(
            "truncated {} value: need {} bytes, have {}",
            what,
            wanted,
            buf.remaining()
        )));
    }
    Ok(())
}

macro_rules! integer_enum_value {
    ($ty:ty, $basic:expr, $put:ident, $get:ident) => {
        impl EnumValue for $ty {
            const BASIC_TYPE: BasicType = $basic;

            fn compare(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }

            fn hash_folded(&self) -> u64 {
                hash_one(*self)
            }

            fn serialize(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn deserialize(buf: &mut &[u8]) -> Result<Self> {
                need(buf, std::mem::size_of::<$ty>(), stringify!($ty))?;
                Ok(buf.$get())
            }

            fn size(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            fn default_value() -> Self {
                <$ty>::MIN
            }

            fn as_number(&self) -> f64 {
                *self as f64
            }

            fn from_field(value: &FieldValue) -> Option<Self> {
                value.as_i64().and_then(|v| <$ty>::try_from(v).ok())
            }

            fn to_field(&self) -> FieldValue {
                FieldValue::Integer(*self as i64)
            }
        }
    };
}

integer_enum_value!(i8, BasicType::Int8, put_i8, get_i8);
integer_enum_value!(i16, BasicType::Int16, put_i16, get_i16);
integer_enum_value!(i32, BasicType::Int32, put_i32, get_i32);
integer_enum_value!(i64, BasicType::Int64, put_i64, get_i64);

/// NaN sorts first; otherwise numeric order with -0 equal to 0.
fn compare_float(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn float_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

macro_rules! float_enum_value {
    ($ty:ty, $basic:expr, $put:ident, $get:ident) => {
        impl EnumValue for $ty {
            const BASIC_TYPE: BasicType = $basic;

            fn compare(&self, other: &Self) -> Ordering {
                compare_float(*self as f64, *other as f64)
            }

            fn hash_folded(&self) -> u64 {
                hash_one(float_bits(*self as f64))
            }

            fn serialize(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn deserialize(buf: &mut &[u8]) -> Result<Self> {
                need(buf, std::mem::size_of::<$ty>(), stringify!($ty))?;
                Ok(buf.$get())
            }

            fn size(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            fn default_value() -> Self {
                <$ty>::NAN
            }

            fn as_number(&self) -> f64 {
                *self as f64
            }

            fn from_field(value: &FieldValue) -> Option<Self> {
                value.as_f64().map(|v| v as $ty)
            }

            fn to_field(&self) -> FieldValue {
                FieldValue::Number(*self as f64)
            }
        }
    };
}

float_enum_value!(f32, BasicType::Float, put_f32, get_f32);
float_enum_value!(f64, BasicType::Double, put_f64, get_f64);

fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase)
}

impl EnumValue for String {
    const BASIC_TYPE: BasicType = BasicType::String;

    fn compare(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }

    fn compare_folded(&self, other: &Self) -> Ordering {
        fold(self).cmp(fold(other))
    }

    fn hash_folded(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for c in fold(self) {
            c.hash(&mut hasher);
        }
        hasher.finish()
    }

    // Length-prefixed: values may contain NUL.
    fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u32(self.len() as u32);
        buf.put_slice(self.as_bytes());
    }

    fn deserialize(buf: &mut &[u8]) -> Result<Self> {
        need(buf, 4, "string length")?;
        let len = buf.get_u32() as usize;
        need(buf, len, "string")?;
        let value = std::str::from_utf8(&buf[..len])
            .map_err(|e| Error::corrupt(format!("string value is not utf-8: {}", e)))?
            .to_string();
        buf.advance(len);
        Ok(value)
    }

    fn size(&self) -> usize {
        self.len() + 4
    }

    fn default_value() -> Self {
        String::new()
    }

    fn as_number(&self) -> f64 {
        self.trim().parse().unwrap_or(0.0)
    }

    fn from_field(value: &FieldValue) -> Option<Self> {
        value.as_text().map(str::to_string)
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn is_foldable() -> bool {
        true
    }
}
