//! Attribute normalization
//!
//! The IPA wire format returns almost every attribute as a JSON array, even
//! single-valued ones, and is inconsistent about booleans (real booleans in
//! some places, `"TRUE"`/`"True"`/`"true"` strings in others). Everything read
//! from the directory passes through here once, at ingest, so providers only
//! ever compare canonical values.

use serde_json::{Map, Value};
use thiserror::Error;

/// Raised when a raw attribute is in none of the expected forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Unable to convert LDAP attribute {attribute} from {found} to Boolean")]
    NotBoolean { attribute: String, found: String },

    #[error("Unable to convert LDAP attribute {attribute} from {found} to {expected}")]
    UnexpectedShape {
        attribute: String,
        expected: &'static str,
        found: String,
    },

    #[error("Directory entry has no '{attribute}' naming attribute")]
    MissingName { attribute: String },

    #[error("Expected a list of directory entries, found {found}")]
    NotAList { found: String },
}

pub type Result<T> = std::result::Result<T, NormalizeError>;

/// Canonical form of one directory attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AttrValue {
    /// Not returned at all (missing key or JSON null).
    #[default]
    Absent,
    /// Returned as an empty collection.
    Empty,
    /// Single value, unwrapped from a one-element collection if needed.
    Scalar(Value),
    /// Genuinely multi-valued.
    List(Vec<Value>),
}

impl AttrValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Single string value. Absent and empty become `None`.
    pub fn into_string(self, attribute: &str) -> Result<Option<String>> {
        match self {
            Self::Absent | Self::Empty => Ok(None),
            Self::Scalar(v) => value_to_string(attribute, &v).map(Some),
            Self::List(values) => Err(NormalizeError::UnexpectedShape {
                attribute: attribute.to_string(),
                expected: "a single value",
                found: format!("a list of {}", values.len()),
            }),
        }
    }

    /// Keep only the first value of a multi-valued attribute.
    ///
    /// Single-valued properties read through this so that an entry carrying
    /// extra values still loads.
    pub fn first(self) -> Self {
        match self {
            Self::List(mut values) if !values.is_empty() => Self::Scalar(values.swap_remove(0)),
            other => other,
        }
    }

    /// First value of a possibly multi-valued attribute (e.g. principal aliases).
    pub fn into_first_string(self, attribute: &str) -> Result<Option<String>> {
        self.first().into_string(attribute)
    }

    /// Every value as a string; a scalar becomes a one-element list.
    pub fn into_strings(self, attribute: &str) -> Result<Vec<String>> {
        match self {
            Self::Absent | Self::Empty => Ok(Vec::new()),
            Self::Scalar(v) => Ok(vec![value_to_string(attribute, &v)?]),
            Self::List(values) => values
                .iter()
                .map(|v| value_to_string(attribute, v))
                .collect(),
        }
    }

    /// Numeric value; IPA sends numbers both as JSON numbers and as strings.
    pub fn into_u32(self, attribute: &str) -> Result<Option<u32>> {
        let shape_error = |found: String| NormalizeError::UnexpectedShape {
            attribute: attribute.to_string(),
            expected: "an unsigned integer",
            found,
        };
        match self {
            Self::Absent | Self::Empty => Ok(None),
            Self::Scalar(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| shape_error(n.to_string())),
            Self::Scalar(Value::String(s)) => s
                .trim()
                .parse::<u32>()
                .map(Some)
                .map_err(|_| shape_error(format!("\"{s}\""))),
            Self::Scalar(other) => Err(shape_error(value_kind(&other).to_string())),
            Self::List(values) => Err(shape_error(format!("a list of {}", values.len()))),
        }
    }

    /// Back to JSON for passthrough comparisons: absent is null, empty is `[]`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Empty => Value::Array(Vec::new()),
            Self::Scalar(v) => v.clone(),
            Self::List(values) => Value::Array(values.clone()),
        }
    }
}

/// Collapse the collection wrapping of a raw attribute.
pub fn scalarize(raw: Option<&Value>) -> AttrValue {
    match raw {
        None | Some(Value::Null) => AttrValue::Absent,
        Some(Value::Array(values)) => match values.len() {
            0 => AttrValue::Empty,
            1 => AttrValue::Scalar(values[0].clone()),
            _ => AttrValue::List(values.clone()),
        },
        Some(other) => AttrValue::Scalar(other.clone()),
    }
}

/// Comparable form of a passthrough attribute value.
///
/// Numbers become strings, since the directory sends everything as text.
/// Collections are scalarized like directory attributes and multi-valued
/// ones are sorted, so a value typed in YAML compares equal to what the
/// directory returns for it.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Array(values) => match values.as_slice() {
            [] => Value::Array(Vec::new()),
            [single] => canonical(single),
            many => {
                let mut values: Vec<Value> = many.iter().map(canonical).collect();
                values.sort_by_cached_key(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                Value::Array(values)
            }
        },
        other => other.clone(),
    }
}

/// Scalarized value of `key` in a directory entry.
pub fn attribute(entry: &Map<String, Value>, key: &str) -> AttrValue {
    scalarize(entry.get(key))
}

/// Map a loosely-typed boolean onto `bool`.
///
/// Truthy: `true`, `"true"` and `"yes"` in any case. Falsy: `false`,
/// `"false"`, `"no"`, `"absent"` in any case, and null. Anything else is an
/// error, never a guess.
pub fn boolify(value: &Value) -> Result<bool> {
    boolify_named("value", value)
}

fn boolify_named(attribute: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" | "absent" => Ok(false),
            _ => Err(NormalizeError::NotBoolean {
                attribute: attribute.to_string(),
                found: format!("\"{s}\""),
            }),
        },
        other => Err(NormalizeError::NotBoolean {
            attribute: attribute.to_string(),
            found: value_kind(other).to_string(),
        }),
    }
}

/// Boolean attribute of a directory entry.
///
/// `None` means the directory did not return the attribute; `Some(false)`
/// means it did, and it is off.
pub fn attribute_bool(entry: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match attribute(entry, key) {
        AttrValue::Absent | AttrValue::Empty => Ok(None),
        AttrValue::Scalar(v) => boolify_named(key, &v).map(Some),
        AttrValue::List(values) => Err(NormalizeError::NotBoolean {
            attribute: key.to_string(),
            found: format!("a list of {}", values.len()),
        }),
    }
}

/// Lower-case every key of an entry. Raw-mode responses mix `idnsName` and
/// `idnsname` styles depending on server version.
pub fn lowercase_keys(entry: Map<String, Value>) -> Map<String, Value> {
    entry
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}

/// Split a `*_find` payload into entries with normalized keys.
pub fn entries(payload: Value) -> Result<Vec<Map<String, Value>>> {
    match payload {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(entry) => Ok(lowercase_keys(entry)),
                other => Err(NormalizeError::NotAList {
                    found: format!("an array containing {}", value_kind(&other)),
                }),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(NormalizeError::NotAList {
            found: value_kind(&other).to_string(),
        }),
    }
}

/// Naming attribute of an entry; a present entry must always have one.
pub fn required_name(entry: &Map<String, Value>, key: &str) -> Result<String> {
    attribute(entry, key)
        .into_first_string(key)?
        .filter(|name| !name.is_empty())
        .ok_or_else(|| NormalizeError::MissingName {
            attribute: key.to_string(),
        })
}

fn value_to_string(attribute: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(NormalizeError::UnexpectedShape {
            attribute: attribute.to_string(),
            expected: "a string",
            found: value_kind(other).to_string(),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
