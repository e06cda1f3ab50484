// CrabSift - GPL-3.0-or-later
// This file is part of CrabSift.
//
// Copyright (C) 2025 The CrabSift contributors
//
// CrabSift is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// CrabSift is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with CrabSift.  If not, see <https://www.gnu.org/licenses/>.

use crate::core::{RankedResult, RunContext, Stage};
use crate::error::RarityError;
use crate::rarity::coordinator::{Acceptance, RareRecord, TruncationCoordinator};
use crate::similarity::{SimilarityAccumulator, TfIdfModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Rarity filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RarityParams {
    /// Similarities above this value count as close matches
    pub threshold: f64,
    /// Close matches a record may have and still be rare
    pub allowance: usize,
    /// Return exactly the N rarest records instead of using `threshold`
    pub top_n: Option<usize>,
    /// Scan rows on the rayon pool
    pub parallel: bool,
}

impl Default for RarityParams {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            allowance: 0,
            top_n: None,
            parallel: false,
        }
    }
}

impl RarityParams {
    pub fn validate(&self) -> Result<(), RarityError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(RarityError::InvalidParameter(format!(
                "threshold must lie in [0, 1], got {}",
                self.threshold
            )));
        }
        if self.top_n == Some(0) {
            return Err(RarityError::InvalidParameter(
                "top_n must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Window the scan starts with. Top-N mode starts wide open and lets
    /// only exact duplicates count against a record.
    const fn initial_acceptance(&self) -> Acceptance {
        match self.top_n {
            Some(_) => Acceptance {
                threshold: 1.0,
                allowance: 1,
            },
            None => Acceptance {
                threshold: self.threshold,
                allowance: self.allowance,
            },
        }
    }
}

/// Result of one rarity scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RarityReport {
    /// Retained records, rarest first
    pub records: Vec<RareRecord>,
    /// Threshold in effect at the end of the scan
    pub threshold: f64,
    /// Rows fully evaluated
    pub scanned: usize,
    /// Scan stopped early; `records` reflects the rows scanned so far
    pub cancelled: bool,
}

impl RarityReport {
    /// Records ranked by rarity score, `1 - max similarity`.
    #[must_use]
    pub fn ranked(&self) -> RankedResult {
        RankedResult::from_scores(self.records.iter().map(|r| (r.index, r.rarity())))
    }
}

/// Selects the records least similar to the rest of the corpus.
#[derive(Debug, Clone, Copy)]
pub struct RarityFilter<'m> {
    model: &'m TfIdfModel,
    params: RarityParams,
}

impl<'m> RarityFilter<'m> {
    pub fn new(model: &'m TfIdfModel, params: RarityParams) -> Result<Self, RarityError> {
        if model.is_empty() {
            return Err(RarityError::EmptyCorpus);
        }
        params.validate()?;
        Ok(Self { model, params })
    }

    #[must_use]
    pub const fn params(&self) -> &RarityParams {
        &self.params
    }

    /// Scan every row of the model.
    ///
    /// Cancellation is polled before each row; rows already accepted stay
    /// in the report.
    #[must_use]
    pub fn run(&self, ctx: &RunContext<'_>) -> RarityReport {
        profiling::function_scope!();
        let n = self.model.len();
        let coordinator =
            TruncationCoordinator::new(self.params.initial_acceptance(), self.params.top_n);
        let tracker = ctx.tracker(Stage::RarityScan);
        let scanned = AtomicUsize::new(0);

        tracing::info!(
            "Rarity scan over {n} records ({}{})",
            self.params.top_n.map_or_else(
                || format!(
                    "threshold {}, allowance {}",
                    self.params.threshold, self.params.allowance
                ),
                |top| format!("top {top}")
            ),
            if self.params.parallel { ", parallel" } else { "" }
        );

        let visit = |row: usize| {
            if ctx.is_cancelled() {
                return;
            }
            let acceptance = coordinator.acceptance();
            let retained = match self.scan_row(row, acceptance) {
                Some(record) => coordinator.offer(record),
                None => {
                    tracing::trace!("Record {row} has too many close matches");
                    coordinator.retained_len()
                }
            };
            scanned.fetch_add(1, Ordering::Relaxed);
            tracker.tick_retained(retained);
        };

        if self.params.parallel {
            (0..n).into_par_iter().for_each(visit);
        } else {
            for row in 0..n {
                if ctx.is_cancelled() {
                    break;
                }
                visit(row);
            }
        }
        tracker.finish();

        let scanned = scanned.into_inner();
        let cancelled = scanned < n;
        let (records, acceptance) = coordinator.finish();
        if cancelled {
            tracing::info!("Rarity scan cancelled after {scanned} of {n} records");
        }
        tracing::info!(
            "Kept {} rare records at threshold {:.4} in {:?}",
            records.len(),
            acceptance.threshold,
            tracker.elapsed()
        );

        RarityReport {
            records,
            threshold: acceptance.threshold,
            scanned,
            cancelled,
        }
    }

    /// Compare `row` with every other record, giving up as soon as it has
    /// more close matches than the window allows.
    fn scan_row(&self, row: usize, acceptance: Acceptance) -> Option<RareRecord> {
        profiling::scope!("scan_row");
        let mut stats = SimilarityAccumulator::default();
        let mut close = 0usize;
        for other in (0..self.model.len()).filter(|&other| other != row) {
            let similarity = self.model.similarity(row, other);
            if similarity > acceptance.threshold {
                close += 1;
                if close > acceptance.allowance {
                    return None;
                }
            }
            stats.push(similarity);
        }
        Some(RareRecord {
            index: row,
            stats: stats.finish(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CancelToken, Corpus, NoProgress};

    fn model(lines: &[&str]) -> TfIdfModel {
        TfIdfModel::build(&Corpus::new(lines)).expect("non-empty corpus")
    }

    fn indices(report: &RarityReport) -> Vec<usize> {
        let mut out: Vec<usize> = report.records.iter().map(|r| r.index).collect();
        out.sort_unstable();
        out
    }

    const MIXED: [&str; 8] = [
        "user alice logged in from gateway",
        "user alice logged in from gateway",
        "user bob logged in from gateway",
        "disk quota exceeded on volume seven",
        "user alice logged in from gateway",
        "kernel panic while mounting root filesystem",
        "user bob logged in from gateway",
        "user carol logged in from gateway",
    ];

    #[test]
    fn test_fixed_threshold_keeps_dissimilar_records() {
        let model = model(&MIXED);
        let params = RarityParams {
            threshold: 0.3,
            ..RarityParams::default()
        };
        let report = RarityFilter::new(&model, params)
            .expect("valid params")
            .run(&RunContext::default());

        assert_eq!(indices(&report), vec![3, 5]);
        assert!(!report.cancelled);
        assert_eq!(report.scanned, MIXED.len());
        for record in &report.records {
            assert!(record.stats.max <= 0.3);
            assert!(record.stats.min <= record.stats.mean);
        }
    }

    #[test]
    fn test_allowance_tolerates_close_matches() {
        let model = model(&MIXED);
        let strict = RarityParams {
            threshold: 0.99,
            allowance: 0,
            ..RarityParams::default()
        };
        let lenient = RarityParams {
            allowance: 1,
            ..strict
        };
        let strict = RarityFilter::new(&model, strict)
            .expect("valid")
            .run(&RunContext::default());
        let lenient = RarityFilter::new(&model, lenient)
            .expect("valid")
            .run(&RunContext::default());

        // The two "bob" lines only have each other as exact duplicate
        assert!(!indices(&strict).contains(&2));
        assert!(indices(&lenient).contains(&2));
        assert!(indices(&lenient).contains(&6));
        assert!(!indices(&lenient).contains(&0), "alice appears three times");
    }

    #[test]
    fn test_top_n_returns_lowest_max_similarity() {
        let model = model(&MIXED);
        let params = RarityParams {
            top_n: Some(3),
            ..RarityParams::default()
        };
        let report = RarityFilter::new(&model, params)
            .expect("valid")
            .run(&RunContext::default());

        assert_eq!(report.records.len(), 3);
        let all: Vec<f64> = (0..model.len())
            .map(|i| model.similarity_stats(i).max)
            .collect();
        let kept_worst = report
            .records
            .iter()
            .map(|r| r.stats.max)
            .fold(f64::NEG_INFINITY, f64::max);
        let dropped_best = (0..model.len())
            .filter(|i| !indices(&report).contains(i))
            .map(|i| all[i])
            .fold(f64::INFINITY, f64::min);
        assert!(kept_worst <= dropped_best);
        assert!(report.threshold < 1.0, "threshold tightened");
    }

    #[test]
    fn test_parallel_scan_matches_sequential() {
        let lines: Vec<String> = (0..120)
            .map(|i| match i % 4 {
                0 => format!("session {} opened", i % 3),
                1 => "heartbeat ok".to_owned(),
                2 => format!("request {} served in {} ms", i % 5, i % 2),
                _ => format!("unique event number{i} token{i}"),
            })
            .collect();
        let model = TfIdfModel::build(&Corpus::new(&lines)).expect("corpus");
        let sequential = RarityParams {
            top_n: Some(10),
            ..RarityParams::default()
        };
        let parallel = RarityParams {
            parallel: true,
            ..sequential
        };
        let a = RarityFilter::new(&model, sequential)
            .expect("valid")
            .run(&RunContext::default());
        let b = RarityFilter::new(&model, parallel)
            .expect("valid")
            .run(&RunContext::default());
        assert_eq!(indices(&a), indices(&b));
        assert_eq!(a.records.len(), 10);
    }

    #[test]
    fn test_single_record_is_retained_with_zero_stats() {
        let model = model(&["only line"]);
        let report = RarityFilter::new(&model, RarityParams::default())
            .expect("valid")
            .run(&RunContext::default());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].stats.max, 0.0);
        assert_eq!(report.ranked().entries()[0].score, 1.0);
    }

    #[test]
    fn test_cancelled_scan_reports_partial() {
        let model = model(&MIXED);
        let token = CancelToken::new();
        token.cancel();
        let ctx = RunContext::new(&NoProgress, token);
        let report = RarityFilter::new(&model, RarityParams::default())
            .expect("valid")
            .run(&ctx);
        assert!(report.cancelled);
        assert_eq!(report.scanned, 0);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let model = model(&MIXED);
        let bad_threshold = RarityParams {
            threshold: 1.5,
            ..RarityParams::default()
        };
        let bad_top = RarityParams {
            top_n: Some(0),
            ..RarityParams::default()
        };
        assert!(matches!(
            RarityFilter::new(&model, bad_threshold),
            Err(RarityError::InvalidParameter(_))
        ));
        assert!(matches!(
            RarityFilter::new(&model, bad_top),
            Err(RarityError::InvalidParameter(_))
        ));
    }
}
