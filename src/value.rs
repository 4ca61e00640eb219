//! Registry value kinds, typed payloads and value snapshots.

use crate::error::{ExplorerError, Result};
use crate::utils::read_utf16_string;
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

/// Registry value data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    /// String (null-terminated).
    String,

    /// String with environment variables.
    ExpandString,

    /// Binary data.
    Binary,

    /// 32-bit little-endian integer.
    DWord,

    /// 64-bit little-endian integer.
    QWord,

    /// Multiple strings.
    MultiString,

    /// No value type.
    None,

    /// Any other registry type (links, resource lists, big-endian DWORDs, ...).
    Unknown,
}

impl ValueKind {
    /// Maps a raw registry type code to a kind.
    ///
    /// Codes 0-11 are predefined by the registry format; the ones this crate
    /// has no dedicated handling for fold into [`ValueKind::Unknown`].
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueKind::None,
            1 => ValueKind::String,
            2 => ValueKind::ExpandString,
            3 => ValueKind::Binary,
            4 => ValueKind::DWord,
            7 => ValueKind::MultiString,
            11 => ValueKind::QWord,
            _ => ValueKind::Unknown,
        }
    }

    /// Returns the registry name of this value type.
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::String => "REG_SZ",
            ValueKind::ExpandString => "REG_EXPAND_SZ",
            ValueKind::Binary => "REG_BINARY",
            ValueKind::DWord => "REG_DWORD",
            ValueKind::QWord => "REG_QWORD",
            ValueKind::MultiString => "REG_MULTI_SZ",
            ValueKind::None => "REG_NONE",
            ValueKind::Unknown => "REG_UNKNOWN",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed registry value payload.
///
/// The variant is the value's kind; matching on it is exhaustive, so there is
/// no way to pair a payload with the wrong type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueData {
    /// String value.
    String(String),

    /// Expandable string value.
    ExpandString(String),

    /// Binary data.
    Binary(Vec<u8>),

    /// 32-bit integer.
    DWord(i32),

    /// 64-bit integer.
    QWord(i64),

    /// Multiple strings.
    MultiString(Vec<String>),

    /// No data.
    None,

    /// Unknown or unsupported type, kept as raw bytes.
    Unknown(Vec<u8>),
}

impl ValueData {
    /// Parses registry-encoded value bytes based on the value kind.
    ///
    /// Strings are UTF-16LE with trailing NULs trimmed, integers are
    /// little-endian, multi-strings are NUL-separated.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are too short for an integer kind or
    /// are not valid UTF-16 for a string kind.
    pub fn parse(data: &[u8], kind: ValueKind) -> Result<Self> {
        match kind {
            ValueKind::None => Ok(ValueData::None),

            ValueKind::String => Ok(ValueData::String(read_utf16_string(data)?)),

            ValueKind::ExpandString => {
                Ok(ValueData::ExpandString(read_utf16_string(data)?))
            }

            ValueKind::Binary => Ok(ValueData::Binary(data.to_vec())),

            ValueKind::DWord => {
                if data.len() < 4 {
                    return Err(ExplorerError::TruncatedData {
                        expected: 4,
                        actual: data.len(),
                    });
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::DWord(cursor.read_i32::<LittleEndian>()?))
            }

            ValueKind::QWord => {
                if data.len() < 8 {
                    return Err(ExplorerError::TruncatedData {
                        expected: 8,
                        actual: data.len(),
                    });
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::QWord(cursor.read_i64::<LittleEndian>()?))
            }

            ValueKind::MultiString => {
                let full_string = read_utf16_string(data)?;
                let strings = full_string
                    .split('\0')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(ValueData::MultiString(strings))
            }

            ValueKind::Unknown => Ok(ValueData::Unknown(data.to_vec())),
        }
    }

    /// Returns the kind tag of this payload.
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueData::String(_) => ValueKind::String,
            ValueData::ExpandString(_) => ValueKind::ExpandString,
            ValueData::Binary(_) => ValueKind::Binary,
            ValueData::DWord(_) => ValueKind::DWord,
            ValueData::QWord(_) => ValueKind::QWord,
            ValueData::MultiString(_) => ValueKind::MultiString,
            ValueData::None => ValueKind::None,
            ValueData::Unknown(_) => ValueKind::Unknown,
        }
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::String(s) | ValueData::ExpandString(s) => f.write_str(s),
            ValueData::Binary(b) | ValueData::Unknown(b) => write!(f, "{:02X?}", b),
            ValueData::DWord(d) => write!(f, "{}", d),
            ValueData::QWord(q) => write!(f, "{}", q),
            ValueData::MultiString(strings) => f.write_str(&strings.join(", ")),
            ValueData::None => f.write_str("(none)"),
        }
    }
}

/// One named value of a key, captured when the key's values were enumerated.
///
/// An empty name denotes the key's unnamed default value. `data` is `None`
/// when the store reported the value but returned no payload for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    name: String,
    kind: ValueKind,
    data: Option<ValueData>,
}

impl Value {
    /// Creates a value snapshot; the kind is taken from the payload.
    pub fn new(name: impl Into<String>, data: ValueData) -> Self {
        Self {
            name: name.into(),
            kind: data.kind(),
            data: Some(data),
        }
    }

    /// Creates a value snapshot without a payload.
    pub fn absent(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            data: None,
        }
    }

    /// Returns the value name (empty for the default value).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns the payload, if the store provided one.
    pub fn data(&self) -> Option<&ValueData> {
        self.data.as_ref()
    }

    /// Returns true if this is the key's unnamed default value.
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn test_value_kind_from_u32() {
        assert_eq!(ValueKind::from_u32(1), ValueKind::String);
        assert_eq!(ValueKind::from_u32(4), ValueKind::DWord);
        assert_eq!(ValueKind::from_u32(5), ValueKind::Unknown);
        assert_eq!(ValueKind::from_u32(11), ValueKind::QWord);
        assert_eq!(ValueKind::from_u32(0xFFFF), ValueKind::Unknown);
        assert_eq!(ValueKind::String.name(), "REG_SZ");
    }

    #[test]
    fn test_parse_string_trims_nul() {
        let data = utf16("hello\0");
        let parsed = ValueData::parse(&data, ValueKind::String).unwrap();
        assert_eq!(parsed, ValueData::String("hello".to_string()));
    }

    #[test]
    fn test_parse_dword_is_signed() {
        let parsed = ValueData::parse(&[0xFF, 0xFF, 0xFF, 0xFF], ValueKind::DWord).unwrap();
        assert_eq!(parsed, ValueData::DWord(-1));
    }

    #[test]
    fn test_parse_truncated_qword() {
        let result = ValueData::parse(&[1, 2, 3], ValueKind::QWord);
        assert!(matches!(
            result,
            Err(ExplorerError::TruncatedData { expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_parse_multi_string() {
        let data = utf16("one\0two\0\0");
        let parsed = ValueData::parse(&data, ValueKind::MultiString).unwrap();
        assert_eq!(
            parsed,
            ValueData::MultiString(vec!["one".to_string(), "two".to_string()])
        );
    }

    #[test]
    fn test_value_kind_follows_payload() {
        let value = Value::new("Count", ValueData::QWord(7));
        assert_eq!(value.kind(), ValueKind::QWord);
        assert!(!value.is_default());

        let absent = Value::absent("", ValueKind::String);
        assert!(absent.data().is_none());
        assert!(absent.is_default());
    }
}
