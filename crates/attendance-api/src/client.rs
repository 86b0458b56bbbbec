//! HTTP client for the attendance backend.
//!
//! Every action is a POST to one endpoint URL. Plain actions send a JSON
//! body `{ "action": ..., ...payload }`; actions that carry files send a
//! multipart form with the action and payload fields as text parts.

use crate::error::{ApiError, Result};
use crate::types::{extract_token, Attachment, LogEntry, SavedLog};
use attendance_core::RawEmployee;
use reqwest::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{multipart, Client, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;

const CLIENT_USER_AGENT: &str = concat!("attendance-cli/", env!("CARGO_PKG_VERSION"));

pub struct ApiClient {
    client: Client,
    url: Url,
}

impl ApiClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = parse_endpoint(url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Post a JSON action.
    pub async fn post(&self, action: &str, payload: Value) -> Result<Value> {
        let body = json_body(action, payload)?;
        tracing::debug!(action, "posting JSON action");

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT))
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        interpret_response(status, &text)
    }

    /// Post an action with file attachments as a multipart form.
    pub async fn post_multipart(
        &self,
        action: &str,
        payload: Value,
        files: Vec<Attachment>,
    ) -> Result<Value> {
        let mut form = multipart::Form::new().text("action", action.to_string());
        for (key, value) in form_fields(payload)? {
            form = form.text(key, value);
        }

        let file_count = files.len();
        for file in files {
            let part = multipart::Part::bytes(file.bytes)
                .file_name(file.file_name)
                .mime_str(&file.mime)?;
            form = form.part(file.field, part);
        }
        tracing::debug!(action, files = file_count, "posting multipart action");

        let response = self
            .client
            .post(self.url.clone())
            .header(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT))
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        interpret_response(status, &text)
    }

    /// Cheap round trip to check the endpoint answers.
    pub async fn ping(&self) -> Result<Value> {
        self.post(
            "getTodaySummary",
            json!({ "ts": chrono::Utc::now().timestamp_millis() }),
        )
        .await
    }

    pub async fn today_summary(&self, date: Option<&str>) -> Result<Value> {
        self.post("getTodaySummary", json!({ "date": date })).await
    }

    pub async fn today_by_code(&self, employee_code: &str, date: Option<&str>) -> Result<Value> {
        let code = required(employee_code, "employee code")?;
        self.post("getTodayByCode", json!({ "employeeCode": code, "date": date }))
            .await
    }

    /// Save a log entry with optional photo and evidence attachments.
    pub async fn save_log(
        &self,
        entry: &LogEntry,
        photo: Option<Attachment>,
        evidence: Option<Attachment>,
    ) -> Result<SavedLog> {
        entry.validate()?;
        let payload = serde_json::to_value(entry).map_err(|e| ApiError::Decode(e.to_string()))?;
        let files = [photo, evidence].into_iter().flatten().collect();
        let raw = self.post_multipart("saveManualLog", payload, files).await?;
        tracing::info!(
            code = %entry.employee_code,
            kind = %entry.kind,
            source = ?entry.source,
            "log saved"
        );
        Ok(SavedLog::from_response(raw))
    }

    /// Log in as HR admin, returning the session token.
    pub async fn login_admin(&self, username: &str, password: &str) -> Result<String> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "username and password are required".into(),
            ));
        }
        let raw = self
            .post("loginAdmin", json!({ "username": username, "password": password }))
            .await?;
        Ok(extract_token(&raw))
    }

    /// Register (or replace) the reference face photo for an employee.
    pub async fn upload_employee_face(&self, employee_code: &str, face: Attachment) -> Result<Value> {
        let code = required(employee_code, "employee code")?;
        if face.bytes.is_empty() {
            return Err(ApiError::Validation("face image is empty".into()));
        }
        let face = Attachment {
            field: "face".into(),
            ..face
        };
        self.post_multipart("uploadEmployeeFace", json!({ "employeeCode": code }), vec![face])
            .await
    }

    /// Fetch enrolled employees with their stored descriptors.
    pub async fn employees(&self) -> Result<Vec<RawEmployee>> {
        let raw = self.post("getEmployees", json!({})).await?;
        parse_employees(raw)
    }
}

fn parse_endpoint(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::NotConfigured);
    }
    let url = Url::parse(trimmed).map_err(|_| ApiError::InvalidUrl(trimmed.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ApiError::InvalidUrl(trimmed.to_string())),
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::Validation(format!("{what} is required")))
    } else {
        Ok(trimmed)
    }
}

fn json_body(action: &str, payload: Value) -> Result<Value> {
    let mut body = Map::new();
    body.insert("action".into(), Value::String(action.to_string()));
    match payload {
        Value::Object(fields) => body.extend(fields),
        Value::Null => {}
        other => {
            return Err(ApiError::Validation(format!(
                "payload must be an object, got {other}"
            )))
        }
    }
    Ok(Value::Object(body))
}

/// Flatten a payload object into multipart text fields. Nulls are omitted,
/// nested values are JSON-encoded.
fn form_fields(payload: Value) -> Result<Vec<(String, String)>> {
    let fields = match payload {
        Value::Object(fields) => fields,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ApiError::Validation(format!(
                "payload must be an object, got {other}"
            )))
        }
    };
    Ok(fields
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Turn a raw HTTP response into a JSON value or an error.
///
/// Non-JSON bodies become `{ "ok": <2xx>, "raw": <text> }`. A 2xx body
/// reporting `ok: false` is an error too ([`ApiError::Rejected`]): a 2xx
/// status alone does not make a response successful.
pub fn interpret_response(status: u16, text: &str) -> Result<Value> {
    let success = (200..300).contains(&status);
    let data: Value =
        serde_json::from_str(text).unwrap_or_else(|_| json!({ "ok": success, "raw": text }));

    if !success {
        let message = body_message(&data).unwrap_or_else(|| format!("HTTP {status}"));
        return Err(ApiError::Status { status, message });
    }
    if data.get("ok") == Some(&Value::Bool(false)) {
        let message = body_message(&data).unwrap_or_else(|| "request rejected".to_string());
        return Err(ApiError::Rejected(message));
    }
    Ok(data)
}

fn body_message(data: &Value) -> Option<String> {
    ["message", "error"].iter().find_map(|key| match data.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(Value::String(_)) => None,
        Some(other) => Some(other.to_string()),
    })
}

/// Employee list: a bare array, or an array under `employees` or `data`.
fn parse_employees(raw: Value) -> Result<Vec<RawEmployee>> {
    let list = match raw {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("employees").or_else(|| obj.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ApiError::Decode(
                    "employee list missing from response".into(),
                ))
            }
        },
        other => return Err(ApiError::Decode(format!("employee list: {other}"))),
    };

    let mut employees = Vec::with_capacity(list.len());
    for item in list {
        match serde_json::from_value::<RawEmployee>(item) {
            Ok(e) => employees.push(e),
            Err(e) => tracing::debug!(error = %e, "skipping unreadable employee entry"),
        }
    }
    Ok(employees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_body_merges_action() {
        let body = json_body("getTodayByCode", json!({ "employeeCode": "E1" })).unwrap();
        assert_eq!(body, json!({ "action": "getTodayByCode", "employeeCode": "E1" }));
        assert!(json_body("x", json!([1, 2])).is_err());
    }

    #[test]
    fn test_form_fields_encoding() {
        let mut fields = form_fields(json!({
            "employeeCode": "E1",
            "gps": { "lat": 1.5, "lng": 2.5, "acc": null },
            "note": "",
            "captured": null,
            "size": 42,
        }))
        .unwrap();
        fields.sort();

        let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["employeeCode", "gps", "note", "size"]);
        assert_eq!(fields[0].1, "E1");
        let gps: Value = serde_json::from_str(&fields[1].1).unwrap();
        assert_eq!(gps, json!({ "lat": 1.5, "lng": 2.5, "acc": null }));
        assert_eq!(fields[2].1, "");
        assert_eq!(fields[3].1, "42");
    }

    #[test]
    fn test_interpret_success() {
        let v = interpret_response(200, r#"{"ok":true,"count":3}"#).unwrap();
        assert_eq!(v["count"], 3);
    }

    #[test]
    fn test_interpret_non_json_body() {
        let v = interpret_response(200, "<html>done</html>").unwrap();
        assert_eq!(v, json!({ "ok": true, "raw": "<html>done</html>" }));
    }

    #[test]
    fn test_interpret_error_status_messages() {
        match interpret_response(400, r#"{"message":"unknown employee"}"#) {
            Err(ApiError::Status { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "unknown employee");
            }
            other => panic!("unexpected: {other:?}"),
        }
        match interpret_response(500, r#"{"error":"sheet locked"}"#) {
            Err(ApiError::Status { message, .. }) => assert_eq!(message, "sheet locked"),
            other => panic!("unexpected: {other:?}"),
        }
        match interpret_response(502, "Bad Gateway") {
            Err(ApiError::Status { message, .. }) => assert_eq!(message, "HTTP 502"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_interpret_ok_false_is_rejected() {
        let err = interpret_response(200, r#"{"ok":false,"message":"already clocked in"}"#)
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "already clocked in"));
        assert!(err.is_domain());

        let err = interpret_response(201, r#"{"ok":false}"#).unwrap_err();
        assert_eq!(err.to_string(), "request rejected");
        assert!(interpret_response(200, r#"{"ok":true}"#).is_ok());
    }

    #[test]
    fn test_parse_endpoint() {
        assert!(matches!(parse_endpoint("  "), Err(ApiError::NotConfigured)));
        assert!(matches!(parse_endpoint("ftp://x"), Err(ApiError::InvalidUrl(_))));
        assert!(matches!(parse_endpoint("not a url"), Err(ApiError::InvalidUrl(_))));
        let url = parse_endpoint(" https://script.google.com/macros/s/abc/exec ").unwrap();
        assert_eq!(url.host_str(), Some("script.google.com"));
    }

    #[test]
    fn test_parse_employees_shapes() {
        let bare = parse_employees(json!([{ "code": "E1", "fullName": "A" }])).unwrap();
        assert_eq!(bare.len(), 1);

        let wrapped = parse_employees(json!({
            "ok": true,
            "employees": [{ "employeeCode": "E2", "name": "B" }, 17]
        }))
        .unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].code, "E2");

        let data = parse_employees(json!({ "data": [] })).unwrap();
        assert!(data.is_empty());

        assert!(parse_employees(json!({ "ok": true })).is_err());
    }

    #[test]
    fn test_required_trims() {
        assert_eq!(required(" E1 ", "code").unwrap(), "E1");
        assert!(matches!(required("", "code"), Err(ApiError::Validation(_))));
    }
}
