use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AttendanceType {
    #[default]
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl AttendanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceType::In => "IN",
            AttendanceType::Out => "OUT",
        }
    }
}

impl fmt::Display for AttendanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(AttendanceType::In),
            "OUT" => Ok(AttendanceType::Out),
            other => Err(format!("expected IN or OUT, got {other:?}")),
        }
    }
}

/// How a log entry was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Scan,
    Manual,
    Face,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gps {
    pub lat: f64,
    pub lng: f64,
    pub acc: Option<f64>,
}

impl Gps {
    pub fn new(lat: f64, lng: f64, acc: Option<f64>) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ApiError::Validation(format!(
                "GPS position out of range: {lat}, {lng}"
            )));
        }
        if acc.is_some_and(|a| !a.is_finite() || a < 0.0) {
            return Err(ApiError::Validation("GPS accuracy must be non-negative".into()));
        }
        Ok(Self { lat, lng, acc })
    }
}

/// Metadata of a captured photo, sent with the log entry it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedInfo {
    pub w: u32,
    pub h: u32,
    pub size: usize,
    pub time: String,
}

/// One attendance log entry as posted with `saveManualLog`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub employee_code: String,
    #[serde(rename = "type")]
    pub kind: AttendanceType,
    pub note: String,
    pub gps: Option<Gps>,
    pub source: LogSource,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured: Option<CapturedInfo>,
    pub client_time: String,
}

impl LogEntry {
    pub fn new(employee_code: &str, kind: AttendanceType, source: LogSource, device: &str) -> Self {
        Self {
            employee_code: employee_code.trim().to_string(),
            kind,
            note: String::new(),
            gps: None,
            source,
            device: device.to_string(),
            captured: None,
            client_time: client_time_now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.employee_code.is_empty() {
            return Err(ApiError::Validation("employee code is required".into()));
        }
        if self.source == LogSource::Manual && self.note.trim().is_empty() {
            return Err(ApiError::Validation(
                "a reason is required for manual entries".into(),
            ));
        }
        Ok(())
    }
}

/// Current time as an ISO-8601 UTC timestamp with milliseconds.
pub fn client_time_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// File attached to a multipart request.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(field: &str, file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            field: field.to_string(),
            file_name: file_name.to_string(),
            mime: mime_for(file_name).to_string(),
            bytes,
        }
    }

    pub async fn from_path(field: &str, path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| field.to_string());
        Ok(Self::new(field, &file_name, bytes))
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Server acknowledgement of a saved log entry.
#[derive(Debug, Clone)]
pub struct SavedLog {
    pub recorded_at: Option<String>,
    pub slot: Option<String>,
    pub raw: Value,
}

impl SavedLog {
    pub fn from_response(raw: Value) -> Self {
        let recorded_at = lookup_str(&raw, &["time", "timestamp", "recordedAt"]);
        let slot = lookup_str(&raw, &["slot", "type"]);
        Self {
            recorded_at,
            slot,
            raw,
        }
    }
}

/// First string (or number) found under any of `keys`, at the top level or
/// inside a `data` object.
fn lookup_str(value: &Value, keys: &[&str]) -> Option<String> {
    let scopes = [Some(value), value.get("data")];
    for scope in scopes.into_iter().flatten() {
        for key in keys {
            match scope.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
    }
    None
}

/// Admin token from a `loginAdmin` response: `token`, then `data.token`,
/// then the literal `"ok"`.
pub fn extract_token(response: &Value) -> String {
    response
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            response
                .get("data")
                .and_then(|d| d.get("token"))
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or("ok")
        .to_string()
}
