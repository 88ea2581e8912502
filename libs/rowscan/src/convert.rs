use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::error::ConversionError;

/// Field-level value converter.
///
/// Solves one task: turn one raw column buffer into a typed field value.
/// An empty buffer is both NULL and the empty value; scalars read it as
/// their default, `Option<T>` reads it as `None`.
///
/// Implement it for your own field types to make them decodable.
pub trait FromColumn: Sized {
    fn from_column(raw: &[u8]) -> Result<Self, ConversionError>;
}

fn utf8(raw: &[u8]) -> Result<&str, ConversionError> {
    std::str::from_utf8(raw).map_err(|e| ConversionError::with_source("invalid UTF-8", e))
}

fn parse<T>(raw: &[u8], what: &'static str) -> Result<T, ConversionError>
where
    T: FromStr + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if raw.is_empty() {
        return Ok(T::default());
    }
    let text = utf8(raw)?;
    text.trim()
        .parse()
        .map_err(|e| ConversionError::with_source(format!("cannot parse {text:?} as {what}"), e))
}

macro_rules! from_column_parse {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromColumn for $ty {
                fn from_column(raw: &[u8]) -> Result<Self, ConversionError> {
                    parse(raw, stringify!($ty))
                }
            }
        )*
    };
}

from_column_parse!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl FromColumn for String {
    fn from_column(raw: &[u8]) -> Result<Self, ConversionError> {
        utf8(raw).map(str::to_owned)
    }
}

impl FromColumn for Vec<u8> {
    fn from_column(raw: &[u8]) -> Result<Self, ConversionError> {
        Ok(raw.to_vec())
    }
}

impl FromColumn for bool {
    fn from_column(raw: &[u8]) -> Result<Self, ConversionError> {
        match raw {
            b"" => Ok(false),
            b"1" | b"t" | b"T" | b"true" | b"TRUE" | b"True" => Ok(true),
            b"0" | b"f" | b"F" | b"false" | b"FALSE" | b"False" => Ok(false),
            other => Err(ConversionError::new(format!(
                "cannot parse {:?} as bool",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl FromColumn for char {
    fn from_column(raw: &[u8]) -> Result<Self, ConversionError> {
        let text = utf8(raw)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(char::default()),
            (Some(c), None) => Ok(c),
            _ => Err(ConversionError::new(format!("cannot parse {text:?} as char"))),
        }
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(raw: &[u8]) -> Result<Self, ConversionError> {
        if raw.is_empty() {
            Ok(None)
        } else {
            T::from_column(raw).map(Some)
        }
    }
}

/// Column holding a JSON document, decoded with `serde_json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
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

impl<T: DeserializeOwned> FromColumn for Json<T> {
    fn from_column(raw: &[u8]) -> Result<Self, ConversionError> {
        serde_json::from_slice(raw)
            .map(Json)
            .map_err(|e| ConversionError::with_source("invalid JSON column", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(i64::from_column(b"-42").unwrap(), -42);
        assert_eq!(u8::from_column(b" 7 ").unwrap(), 7);
        assert_eq!(f64::from_column(b"1.5").unwrap(), 1.5);
        assert_eq!(i32::from_column(b"").unwrap(), 0);
        assert!(u8::from_column(b"300").is_err());
        assert!(i64::from_column(b"abc").is_err());
    }

    #[test]
    fn bools_follow_driver_spellings() {
        for raw in [&b"1"[..], b"t", b"TRUE", b"True"] {
            assert!(bool::from_column(raw).unwrap());
        }
        for raw in [&b"0"[..], b"f", b"false", b""] {
            assert!(!bool::from_column(raw).unwrap());
        }
        assert!(bool::from_column(b"yes").is_err());
    }

    #[test]
    fn strings_require_utf8() {
        assert_eq!(String::from_column(b"abc").unwrap(), "abc");
        assert_eq!(String::from_column(b"").unwrap(), "");
        let err = String::from_column(&[0xff, 0xfe]).unwrap_err();
        assert!(err.to_string().starts_with("invalid UTF-8"));
    }

    #[test]
    fn option_reads_empty_as_none() {
        assert_eq!(Option::<i64>::from_column(b"").unwrap(), None);
        assert_eq!(Option::<i64>::from_column(b"5").unwrap(), Some(5));
        assert_eq!(Option::<String>::from_column(b"").unwrap(), None);
    }

    #[test]
    fn chars() {
        assert_eq!(char::from_column("é".as_bytes()).unwrap(), 'é');
        assert!(char::from_column(b"ab").is_err());
    }

    #[test]
    fn json_column() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Tags {
            tags: Vec<String>,
        }
        let Json(tags) = Json::<Tags>::from_column(br#"{"tags":["a","b"]}"#).unwrap();
        assert_eq!(tags, Tags { tags: vec!["a".into(), "b".into()] });
        assert!(Json::<Tags>::from_column(b"{").is_err());
    }
}
