//! attendance-core — Face descriptor matching for the attendance client.
//!
//! Finds the nearest enrolled employee for each sampled descriptor and
//! debounces those per-frame matches into a commit-eligible lock.

pub mod cache;
pub mod matcher;
pub mod stabilizer;
pub mod types;

pub use cache::{EmployeeCache, RefreshReport};
pub use matcher::{EuclideanMatcher, Matcher};
pub use stabilizer::{
    Observation, ScanStatus, StabilizationState, Stabilizer, StabilizerConfig, StabilizerError,
    DEFAULT_MATCH_THRESHOLD, STABLE_MATCH_COUNT,
};
pub use types::{
    Descriptor, DescriptorError, EmployeeFaceRecord, MatchCandidate, RawEmployee,
    MIN_DESCRIPTOR_LEN, SENTINEL_DISTANCE,
};
