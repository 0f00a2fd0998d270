//! Per-analysis reordering of samples.

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::record::{ErrorKind, ErrorRecord, ResultRecord, Sample};

/// The default number of samples held back per analysis.
pub const REORDER_DEPTH_DEFAULT: usize = 8;

/// How samples that arrive out of order are handled.
///
/// Up to `depth` samples of each analysis are held back and released in
/// order of their independent variable. A sample older than one already
/// released is dropped and reported with an
/// [`ErrorKind::OutOfOrderSample`] record. A depth of 0 releases samples
/// immediately, rejecting every sample that goes backwards.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReorderPolicy {
    /// The number of samples held back per analysis.
    pub depth: usize,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        Self {
            depth: REORDER_DEPTH_DEFAULT,
        }
    }
}

#[derive(Debug, Default)]
struct Held {
    samples: Vec<Sample>,
    released: Option<f64>,
}

impl Held {
    fn release_one(&mut self) -> Sample {
        let sample = self.samples.remove(0);
        self.released = Some(sample.x);
        sample
    }
}

#[derive(Debug)]
pub(crate) struct Reorderer {
    depth: usize,
    analyses: IndexMap<ArcStr, Held>,
}

impl Reorderer {
    pub(crate) fn new(policy: ReorderPolicy) -> Self {
        Self {
            depth: policy.depth,
            analyses: IndexMap::new(),
        }
    }

    /// Accepts a sample, returning the records that are ready for delivery.
    pub(crate) fn push(&mut self, sample: Sample) -> Vec<ResultRecord> {
        let held = self.analyses.entry(sample.analysis.clone()).or_default();
        if let Some(released) = held.released {
            if sample.x < released {
                tracing::warn!(
                    analysis = %sample.analysis,
                    x = sample.x,
                    released,
                    "dropping out-of-order sample"
                );
                return vec![ResultRecord::Error(ErrorRecord {
                    kind: ErrorKind::OutOfOrderSample,
                    message: format!(
                        "{} sample at {} arrived after the sample at {}",
                        sample.analysis, sample.x, released
                    ),
                    reference: None,
                    location: None,
                })];
            }
        }

        let at = held.samples.partition_point(|s| s.x <= sample.x);
        held.samples.insert(at, sample);

        let mut ready = Vec::new();
        while held.samples.len() > self.depth {
            ready.push(ResultRecord::Sample(held.release_one()));
        }
        ready
    }

    /// Releases every held sample, analysis by analysis.
    pub(crate) fn flush(&mut self) -> Vec<ResultRecord> {
        let mut ready = Vec::new();
        for held in self.analyses.values_mut() {
            while !held.samples.is_empty() {
                ready.push(ResultRecord::Sample(held.release_one()));
            }
        }
        ready
    }
}
