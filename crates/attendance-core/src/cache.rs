//! Shared snapshot of enrolled employees.
//!
//! Readers take an `Arc` snapshot and compare against it for the whole tick.
//! A refresh builds a new sequence off to the side and swaps the pointer, so
//! an in-progress comparison never observes a partially updated gallery.

use crate::types::{EmployeeFaceRecord, RawEmployee};
use std::sync::{Arc, PoisonError, RwLock};

/// Outcome of loading raw API records into the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct EmployeeCache {
    records: RwLock<Arc<[EmployeeFaceRecord]>>,
}

impl Default for EmployeeCache {
    fn default() -> Self {
        Self {
            records: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl EmployeeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current gallery snapshot. Cheap: clones the `Arc`, not the records.
    pub fn snapshot(&self) -> Arc<[EmployeeFaceRecord]> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole gallery.
    pub fn replace(&self, records: Vec<EmployeeFaceRecord>) {
        let next: Arc<[EmployeeFaceRecord]> = records.into();
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Parse raw API records and replace the gallery with the usable ones.
    ///
    /// Records with an empty code or a missing/malformed descriptor are
    /// skipped individually.
    pub fn refresh(&self, raw: Vec<RawEmployee>) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut records = Vec::with_capacity(raw.len());

        for employee in raw {
            if employee.code.trim().is_empty() {
                report.skipped += 1;
                tracing::debug!("skipping employee record without code");
                continue;
            }
            let code = employee.code.clone();
            match EmployeeFaceRecord::try_from(employee) {
                Ok(record) => records.push(record),
                Err(e) => {
                    report.skipped += 1;
                    tracing::debug!(code = %code, error = %e, "skipping employee record");
                }
            }
        }

        report.loaded = records.len();
        self.replace(records);
        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped,
            "employee face cache refreshed"
        );
        report
    }
}
