//! Nearest-neighbor search over the enrolled employee gallery.

use crate::types::{Descriptor, EmployeeFaceRecord, MatchCandidate, SENTINEL_DISTANCE};

/// Strategy for finding the closest enrolled employee to a probe descriptor.
pub trait Matcher {
    fn nearest(&self, probe: &Descriptor, gallery: &[EmployeeFaceRecord]) -> MatchCandidate;
}

/// Linear-scan Euclidean matcher.
///
/// Records with an empty code are ignored, as are records whose descriptor
/// length differs from the probe. On equal distances the record encountered
/// first in gallery order wins.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest(&self, probe: &Descriptor, gallery: &[EmployeeFaceRecord]) -> MatchCandidate {
        let mut best_dist = SENTINEL_DISTANCE;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            if record.code.is_empty() || record.descriptor.is_empty() {
                continue;
            }
            let dist = probe.euclidean_distance(&record.descriptor);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) => MatchCandidate {
                code: gallery[idx].code.clone(),
                full_name: gallery[idx].full_name.clone(),
                distance: best_dist,
            },
            None => MatchCandidate::none(),
        }
    }
}
