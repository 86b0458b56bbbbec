//! attendance-api — Client for the spreadsheet-backed attendance API.

pub mod client;
pub mod error;
pub mod types;

pub use client::{interpret_response, ApiClient};
pub use error::{ApiError, Result};
pub use types::{
    client_time_now, extract_token, Attachment, AttendanceType, CapturedInfo, Gps, LogEntry,
    LogSource, SavedLog,
};
