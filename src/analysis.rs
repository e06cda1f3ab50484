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

//! End-to-end pipelines: corpus in, ranked records plus a run summary out.
//!
//! Each call owns its state from start to finish. Nothing is shared between
//! two analyses except what the caller passes in.

use crate::anomaly::{ForestParams, OutlierRanking, OutlierScorer};
use crate::core::{Corpus, RankedResult, RunContext};
use crate::error::AnalysisError;
use crate::rarity::{RarityFilter, RarityParams, RarityReport};
use crate::similarity::TfIdfModel;
use crate::vectorize::{self, VectorizeMode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Bookkeeping of one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_records: usize,
    /// Records that made it into the scoring stage
    pub vectorized: usize,
    pub skipped: usize,
    /// Skip totals keyed by [`SkipReason::label`](crate::vectorize::SkipReason::label)
    pub skipped_by_reason: BTreeMap<&'static str, usize>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Result of [`detect_outliers`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub ranking: OutlierRanking,
    pub summary: RunSummary,
}

impl OutlierReport {
    #[must_use]
    pub const fn ranked(&self) -> &RankedResult {
        &self.ranking.ranked
    }
}

/// Result of [`find_rare`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RareReport {
    pub rarity: RarityReport,
    pub summary: RunSummary,
}

impl RareReport {
    #[must_use]
    pub fn ranked(&self) -> RankedResult {
        self.rarity.ranked()
    }
}

/// Vectorize `corpus` with `mode` and rank every vectorized record by its
/// isolation-forest anomaly score.
///
/// Skipped records are only counted in the summary. If vectorization is
/// cancelled the records vectorized so far are still scored by a fully
/// trained forest, and the summary is marked cancelled.
pub fn detect_outliers(
    corpus: &Corpus<'_>,
    mode: &VectorizeMode,
    params: &ForestParams,
    ctx: &RunContext<'_>,
) -> Result<OutlierReport, AnalysisError> {
    profiling::function_scope!();
    let start = Instant::now();
    let vectorized = vectorize::vectorize(corpus, mode, ctx)?;

    let mut summary = RunSummary {
        total_records: corpus.len(),
        vectorized: vectorized.len(),
        skipped: vectorized.skipped.len(),
        skipped_by_reason: vectorized.skip_counts(),
        cancelled: vectorized.cancelled,
        elapsed: Duration::ZERO,
    };

    if vectorized.is_empty() {
        if vectorized.cancelled {
            summary.elapsed = start.elapsed();
            return Ok(OutlierReport {
                ranking: OutlierRanking {
                    ranked: RankedResult::default(),
                    trees: 0,
                    partial: true,
                },
                summary,
            });
        }
        return Err(AnalysisError::NothingToScore {
            skipped: summary.skipped,
        });
    }

    // A cancelled vectorization still leaves a usable prefix; score it in full
    let scoring_ctx = if vectorized.cancelled {
        tracing::info!(
            "Scoring the {} records vectorized before cancellation",
            vectorized.len()
        );
        ctx.detached()
    } else {
        ctx.clone()
    };
    let ranking = OutlierScorer::new(*params).rank(&vectorized, &scoring_ctx)?;
    summary.cancelled |= ranking.partial;
    summary.elapsed = start.elapsed();
    tracing::info!(
        "Outlier detection over {} records finished in {:?}",
        summary.total_records,
        summary.elapsed
    );
    Ok(OutlierReport { ranking, summary })
}

/// Build a TF-IDF model over `corpus` and keep the records least similar
/// to the rest.
pub fn find_rare(
    corpus: &Corpus<'_>,
    params: &RarityParams,
    ctx: &RunContext<'_>,
) -> Result<RareReport, AnalysisError> {
    profiling::function_scope!();
    let start = Instant::now();
    params.validate()?;
    let model = TfIdfModel::build(corpus)?;
    tracing::debug!(
        "Similarity model over {} records, {} terms",
        model.len(),
        model.vocabulary_len()
    );

    let rarity = RarityFilter::new(&model, *params)?.run(ctx);
    let summary = RunSummary {
        total_records: corpus.len(),
        vectorized: model.len(),
        skipped: 0,
        skipped_by_reason: BTreeMap::new(),
        cancelled: rarity.cancelled,
        elapsed: start.elapsed(),
    };
    tracing::info!(
        "Rarity analysis over {} records finished in {:?}",
        summary.total_records,
        summary.elapsed
    );
    Ok(RareReport { rarity, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CancelToken, NoProgress, ProgressEvent, ProgressSink};
    use crate::error::VectorizeError;
    use crate::vectorize::{KeywordSet, NumberParams};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn seeded_forest(seed: u64) -> ForestParams {
        ForestParams {
            seed: Some(seed),
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_identical_lines_with_one_distinct() {
        let mut lines = vec!["service heartbeat acknowledged by controller"; 1000];
        lines.push("certificate for mail relay expired yesterday");
        let corpus = Corpus::new(&lines);
        let ctx = RunContext::default();

        for keywords in [vec![], vec!["no such keyword".to_owned()]] {
            let mode = VectorizeMode::Keyword(KeywordSet::Custom(keywords));
            let vectorized = vectorize::vectorize(&corpus, &mode, &ctx).expect("vectorized");
            assert_eq!(vectorized.len(), 1001);
            assert!(
                vectorized.vectors.iter().flatten().all(|&x| x == 0.0),
                "nothing can match, every vector is zero"
            );
        }

        let params = RarityParams {
            threshold: 0.99,
            allowance: 0,
            ..RarityParams::default()
        };
        let report = find_rare(&corpus, &params, &ctx).expect("rarity scan");
        let kept: Vec<usize> = report.rarity.records.iter().map(|r| r.index).collect();
        assert_eq!(kept, vec![1000]);
        assert_eq!(report.summary.total_records, 1001);
        assert!(!report.summary.cancelled);
    }

    #[test]
    fn test_uniform_numbers_score_flat() {
        let lines: Vec<String> = (1..=100).map(|i| format!("id={i}")).collect();
        let corpus = Corpus::new(&lines);
        let mode = VectorizeMode::Number(NumberParams::default());
        let ctx = RunContext::default();

        let vectorized = vectorize::vectorize(&corpus, &mode, &ctx).expect("vectorized");
        let expected: Vec<Vec<f64>> = (1..=100).map(|i| vec![f64::from(i)]).collect();
        assert_eq!(vectorized.vectors, expected);

        let report = detect_outliers(&corpus, &mode, &seeded_forest(7), &ctx).expect("scored");
        assert_eq!(report.ranked().len(), 100);

        let mut by_index = vec![0.0; 100];
        for entry in report.ranked() {
            by_index[entry.index] = entry.score;
        }
        for pair in by_index.windows(2) {
            assert!(
                (pair[0] - pair[1]).abs() < 0.1,
                "neighbours score alike: {pair:?}"
            );
        }
        let max = by_index.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = by_index.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(max - min < 0.35, "score spread {min}..{max} too wide");
        assert!(max < 0.75, "no point stands out, max {max}");
    }

    #[test]
    fn test_sql_injection_ranks_first() {
        let mut lines: Vec<String> = (0..50)
            .map(|i| {
                format!(
                    "GET /catalog/item?id={i} HTTP/1.1 200 served by node{}",
                    i % 3
                )
            })
            .collect();
        lines.insert(
            23,
            "GET /catalog/item?id=1' OR 1=1 UNION SELECT password FROM users-- HTTP/1.1 200"
                .to_owned(),
        );
        let corpus = Corpus::new(&lines);
        let mode = VectorizeMode::Keyword(KeywordSet::SqlInjection);

        let report = detect_outliers(&corpus, &mode, &seeded_forest(42), &RunContext::default())
            .expect("scored");
        assert_eq!(report.ranked().entries()[0].index, 23);
        assert_eq!(report.summary.vectorized, 51);
        assert_eq!(report.summary.skipped, 0);
    }

    fn unique_and_duplicates() -> (Vec<String>, BTreeSet<String>) {
        let unique = [
            "kernel oops in usbcore module",
            "certificate chain validation failed for mail relay",
            "battery temperature critical shutting down",
            "raid array degraded disk sdb missing",
            "license server unreachable retrying later",
        ];
        let patterns = [
            "connection accepted from load balancer",
            "cache refresh completed successfully",
            "scheduled backup job started",
        ];
        let mut lines: Vec<String> = unique.iter().map(|&s| s.to_owned()).collect();
        lines.extend((0..95).map(|i| patterns[i % 3].to_owned()));
        let expected = unique.iter().map(|&s| s.to_owned()).collect();
        (lines, expected)
    }

    fn rare_set(lines: &[String], params: &RarityParams) -> BTreeSet<String> {
        let corpus = Corpus::new(lines);
        let report = find_rare(&corpus, params, &RunContext::default()).expect("rarity scan");
        assert_eq!(report.rarity.records.len(), 5);
        report
            .rarity
            .records
            .iter()
            .map(|r| lines[r.index].clone())
            .collect()
    }

    #[test]
    fn test_top_n_finds_unique_lines_in_any_order() {
        let (mut lines, expected) = unique_and_duplicates();
        let sequential = RarityParams {
            top_n: Some(5),
            ..RarityParams::default()
        };
        let parallel = RarityParams {
            parallel: true,
            ..sequential
        };

        assert_eq!(rare_set(&lines, &sequential), expected);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..4 {
            lines.shuffle(&mut rng);
            assert_eq!(rare_set(&lines, &sequential), expected);
            assert_eq!(rare_set(&lines, &parallel), expected);
        }
    }

    #[test]
    fn test_skips_are_summarized() {
        let lines = ["latency=12 ms", "no digits here", "latency=15 ms", "latency=9 ms"];
        let corpus = Corpus::new(&lines);
        let mode = VectorizeMode::Number(NumberParams::default());
        let report = detect_outliers(&corpus, &mode, &seeded_forest(1), &RunContext::default())
            .expect("scored");

        assert_eq!(report.summary.total_records, 4);
        assert_eq!(report.summary.vectorized, 3);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.skipped_by_reason.get("no_numbers"), Some(&1));
        assert!(report.ranked().indices().all(|i| i != 1));
    }

    #[test]
    fn test_all_records_skipped_is_an_error() {
        let lines = ["alpha", "beta"];
        let corpus = Corpus::new(&lines);
        let mode = VectorizeMode::Walu;
        assert_eq!(
            detect_outliers(&corpus, &mode, &seeded_forest(1), &RunContext::default()).err(),
            Some(AnalysisError::NothingToScore { skipped: 2 })
        );
    }

    #[test]
    fn test_empty_corpus_is_rejected() {
        let corpus = Corpus::default();
        let mode = VectorizeMode::Keyword(KeywordSet::SqlInjection);
        assert_eq!(
            detect_outliers(&corpus, &mode, &seeded_forest(1), &RunContext::default()).err(),
            Some(AnalysisError::Vectorize(VectorizeError::EmptyCorpus))
        );
    }

    /// Cancels its token as soon as the first progress event arrives.
    struct CancelOnFirstEvent {
        token: CancelToken,
    }

    impl ProgressSink for CancelOnFirstEvent {
        fn report(&self, _event: ProgressEvent) {
            self.token.cancel();
        }
    }

    #[test]
    fn test_cancelled_vectorization_scores_the_prefix() {
        let lines = ["x=0", "x=1", "x=1000", "x=2", "x=3", "x=4", "x=5"];
        let corpus = Corpus::new(&lines);
        let token = CancelToken::new();
        let sink = CancelOnFirstEvent {
            token: token.clone(),
        };
        let ctx = RunContext::new(&sink, token).with_progress_every(3);
        let params = ForestParams {
            num_trees: 100,
            ..seeded_forest(5)
        };

        let report = detect_outliers(
            &corpus,
            &VectorizeMode::Number(NumberParams::default()),
            &params,
            &ctx,
        )
        .expect("cancellation is not an error");

        assert!(report.summary.cancelled);
        assert_eq!(report.summary.vectorized, 3);
        assert_eq!(report.ranking.trees, 100, "forest trained in full");
        assert!(!report.ranking.partial);
        let entries = report.ranked().entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].index, 2, "x=1000 stands out");
        assert!(entries[0].score > entries[2].score);
    }

    #[test]
    fn test_cancelled_run_returns_partial_report() {
        let lines = ["a=1", "a=2", "a=3"];
        let corpus = Corpus::new(&lines);
        let token = CancelToken::new();
        token.cancel();
        let ctx = RunContext::new(&NoProgress, token);

        let outliers = detect_outliers(
            &corpus,
            &VectorizeMode::Number(NumberParams::default()),
            &seeded_forest(1),
            &ctx,
        )
        .expect("cancellation is not an error");
        assert!(outliers.summary.cancelled);
        assert!(outliers.ranked().is_empty());

        let rare = find_rare(&corpus, &RarityParams::default(), &ctx).expect("partial");
        assert!(rare.summary.cancelled);
    }
}
