use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Smallest descriptor dimensionality accepted from the cache source.
pub const MIN_DESCRIPTOR_LEN: usize = 64;

/// Distance reported when two descriptors cannot be compared, or when there
/// is nothing to compare against.
pub const SENTINEL_DISTANCE: f32 = f32::MAX;

#[derive(Error, Debug, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor is missing")]
    Missing,
    #[error("descriptor has {0} values, need at least {min}", min = MIN_DESCRIPTOR_LEN)]
    TooShort(usize),
    #[error("descriptor value at index {0} is not a finite number")]
    BadValue(usize),
    #[error("unsupported descriptor encoding: {0}")]
    Encoding(String),
}

/// Face descriptor vector produced by the external recognition model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Descriptors of different lengths are not comparable and yield
    /// [`SENTINEL_DISTANCE`].
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        if self.values.len() != other.values.len() {
            return SENTINEL_DISTANCE;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Parse a descriptor from its serialized form in an API record.
    ///
    /// Accepted encodings:
    /// - a JSON array of numbers,
    /// - a string holding a JSON array, or comma-separated numbers,
    /// - an object keyed `"0"`, `"1"`, ... (a serialized `Float32Array`).
    pub fn from_json(value: &Value) -> Result<Self, DescriptorError> {
        let values = match value {
            Value::Null => return Err(DescriptorError::Missing),
            Value::Array(items) => numbers_from_array(items)?,
            Value::String(s) => numbers_from_str(s)?,
            Value::Object(map) => {
                let mut indexed = Vec::with_capacity(map.len());
                for (key, v) in map {
                    let idx: usize = key
                        .parse()
                        .map_err(|_| DescriptorError::Encoding(format!("object key {key:?}")))?;
                    indexed.push((idx, v));
                }
                indexed.sort_by_key(|(idx, _)| *idx);
                let mut out = Vec::with_capacity(indexed.len());
                for (pos, (idx, v)) in indexed.into_iter().enumerate() {
                    if idx != pos {
                        return Err(DescriptorError::Encoding(format!("missing index {pos}")));
                    }
                    out.push(number(v, pos)?);
                }
                out
            }
            other => {
                return Err(DescriptorError::Encoding(format!("{other}")));
            }
        };

        if values.len() < MIN_DESCRIPTOR_LEN {
            return Err(DescriptorError::TooShort(values.len()));
        }
        Ok(Self { values })
    }
}

fn number(value: &Value, idx: usize) -> Result<f32, DescriptorError> {
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or(DescriptorError::BadValue(idx))?;

    let v = v as f32;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(DescriptorError::BadValue(idx))
    }
}

fn numbers_from_array(items: &[Value]) -> Result<Vec<f32>, DescriptorError> {
    items.iter().enumerate().map(|(i, v)| number(v, i)).collect()
}

fn numbers_from_str(raw: &str) -> Result<Vec<f32>, DescriptorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DescriptorError::Missing);
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        let parsed: Value = serde_json::from_str(trimmed)
            .map_err(|e| DescriptorError::Encoding(format!("embedded JSON: {e}")))?;
        return match parsed {
            Value::String(_) => Err(DescriptorError::Encoding("nested string".into())),
            other => Descriptor::from_json(&other).map(|d| d.values),
        };
    }
    trimmed
        .split(',')
        .enumerate()
        .map(|(i, part)| {
            part.trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(DescriptorError::BadValue(i))
        })
        .collect()
}

/// Employee record as returned by the attendance API, before its descriptor
/// has been parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEmployee {
    #[serde(default, alias = "employeeCode")]
    pub code: String,
    #[serde(default, rename = "fullName", alias = "name")]
    pub full_name: String,
    #[serde(default)]
    pub descriptor: Value,
}

/// An enrolled employee with a parsed descriptor, as held by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeFaceRecord {
    pub code: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub descriptor: Descriptor,
}

impl TryFrom<RawEmployee> for EmployeeFaceRecord {
    type Error = DescriptorError;

    fn try_from(raw: RawEmployee) -> Result<Self, Self::Error> {
        let descriptor = Descriptor::from_json(&raw.descriptor)?;
        Ok(Self {
            code: raw.code.trim().to_string(),
            full_name: raw.full_name.trim().to_string(),
            descriptor,
        })
    }
}

/// Nearest enrolled employee for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub code: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub distance: f32,
}

impl MatchCandidate {
    /// The "no match" value: empty code, sentinel distance.
    pub fn none() -> Self {
        Self {
            code: String::new(),
            full_name: String::new(),
            distance: SENTINEL_DISTANCE,
        }
    }

    pub fn is_none(&self) -> bool {
        self.code.is_empty()
    }
}
