//! Human-readable rendering of value payloads.
//!
//! The same rules are used for the detail rows of a selected key and for
//! search results, so both views show a value identically.

use crate::utils::{group_thousands, utf16_len};
use crate::value::{Value, ValueData, ValueKind};

/// Name shown for the unnamed default value.
pub const DEFAULT_VALUE_NAME: &str = "(Default)";

/// Placeholder shown for a key that has no values at all.
pub const VALUE_NOT_SET: &str = "(value not set)";

/// Marker shown when the store returned no payload.
pub const NULL_MARKER: &str = "(null)";

/// A rendered value: display text plus an optional size descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedValue {
    /// Text shown in the value column.
    pub display: String,
    /// `"<N> bytes"`, `"<N> chars"` or empty.
    pub length: String,
}

impl FormattedValue {
    fn new(display: String, length: String) -> Self {
        Self { display, length }
    }
}

/// Renders a payload for display.
///
/// Rules, in order: binary as space-separated uppercase hex pairs with a byte
/// count; DWORD as `0x<HEX> (<decimal>)`; QWORD the same in lowercase;
/// strings verbatim with a UTF-16 character count; a missing payload as
/// `(null)`; everything else in its natural string form.
///
/// # Examples
///
/// ```rust
/// use reg_explorer::format::format_value;
/// use reg_explorer::ValueData;
///
/// let formatted = format_value(Some(&ValueData::DWord(255)));
/// assert_eq!(formatted.display, "0xFF (255)");
/// assert_eq!(formatted.length, "");
/// ```
pub fn format_value(data: Option<&ValueData>) -> FormattedValue {
    match data {
        Some(ValueData::Binary(bytes)) => FormattedValue::new(
            hex_pairs(bytes),
            format!("{} bytes", group_thousands(bytes.len())),
        ),
        Some(ValueData::DWord(d)) => FormattedValue::new(format!("0x{:X} ({})", d, d), String::new()),
        Some(ValueData::QWord(q)) => FormattedValue::new(format!("0x{:x} ({})", q, q), String::new()),
        Some(ValueData::String(s)) | Some(ValueData::ExpandString(s)) => FormattedValue::new(
            s.clone(),
            format!("{} chars", group_thousands(utf16_len(s))),
        ),
        None => FormattedValue::new(NULL_MARKER.to_string(), String::new()),
        Some(ValueData::Unknown(bytes)) => FormattedValue::new(hex_pairs(bytes), String::new()),
        Some(other @ (ValueData::MultiString(_) | ValueData::None)) => {
            FormattedValue::new(other.to_string(), String::new())
        }
    }
}

/// `[0x41, 0x42]` -> `"41 42"`.
fn hex_pairs(bytes: &[u8]) -> String {
    let encoded = hex::encode_upper(bytes);
    let mut out = String::with_capacity(encoded.len() + bytes.len());
    for (i, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.extend(pair.iter().map(|&b| b as char));
    }
    out
}

/// Returns the name a value is displayed under.
pub fn display_name(name: &str) -> &str {
    if name.is_empty() {
        DEFAULT_VALUE_NAME
    } else {
        name
    }
}

/// One line of the value grid for a selected key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRow {
    /// Value name, `(Default)` for the unnamed value.
    pub name: String,
    /// Value kind.
    pub kind: ValueKind,
    /// Rendered payload.
    pub value: String,
    /// Size descriptor, possibly empty.
    pub length: String,
}

impl DetailRow {
    /// Row shown for a key with no values. Never produced by search.
    pub fn value_not_set() -> Self {
        Self {
            name: DEFAULT_VALUE_NAME.to_string(),
            kind: ValueKind::String,
            value: VALUE_NOT_SET.to_string(),
            length: String::new(),
        }
    }

    fn from_value(value: &Value) -> Self {
        let formatted = format_value(value.data());
        Self {
            name: display_name(value.name()).to_string(),
            kind: value.kind(),
            value: formatted.display,
            length: formatted.length,
        }
    }
}

/// Builds the value grid for one key, sorted by value name.
pub fn detail_rows(values: &[Value]) -> Vec<DetailRow> {
    if values.is_empty() {
        return vec![DetailRow::value_not_set()];
    }

    let mut sorted: Vec<&Value> = values.iter().collect();
    sorted.sort_by(|a, b| {
        a.name()
            .to_lowercase()
            .cmp(&b.name().to_lowercase())
            .then_with(|| a.name().cmp(b.name()))
    });
    sorted.into_iter().map(DetailRow::from_value).collect()
}
