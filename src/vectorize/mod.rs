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

//! Vectorizer family: turns log lines into equal-width feature vectors.
//!
//! All modes share one driver loop which polls cancellation, reports
//! progress and enforces that every retained vector has the width of the
//! first one. Records that cannot be vectorized are skipped and counted,
//! never silently padded or truncated.

pub mod keyword;
pub mod number;
pub mod walu;

pub use keyword::KeywordSet;
pub use number::NumberParams;

use crate::core::{Corpus, FeatureVector, Record, RunContext, Stage};
use crate::error::VectorizeError;
use crate::similarity::TfIdfModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Vectorization strategy of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizeMode {
    /// TF-IDF weights over the corpus vocabulary
    Tfidf,
    /// Occurrence counts of a keyword list
    Keyword(KeywordSet),
    /// HTTP request-line heuristics
    Walu,
    /// Signed decimals found in the line
    Number(NumberParams),
}

impl fmt::Display for VectorizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tfidf => write!(f, "tfidf"),
            Self::Keyword(KeywordSet::SqlInjection) => write!(f, "keyword/sql"),
            Self::Keyword(KeywordSet::CommandInjection) => write!(f, "keyword/cmd"),
            Self::Keyword(KeywordSet::DirectoryTraversal) => write!(f, "keyword/traversal"),
            Self::Keyword(KeywordSet::Custom(list)) => {
                write!(f, "keyword/custom({} keywords)", list.len())
            }
            Self::Walu => write!(f, "walu"),
            Self::Number(_) => write!(f, "number"),
        }
    }
}

/// Why a record did not yield a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No quoted HTTP request in the line
    NoRequestToken,
    /// The request yielded too few features to be trusted
    ShortRequestVector { width: usize },
    /// Configured prefix or suffix not present
    DelimiterNotFound,
    /// No number in the scanned part of the line
    NoNumbers,
    /// Vector width differs from the first retained vector
    WidthMismatch { expected: usize, found: usize },
}

impl SkipReason {
    /// Stable label used to aggregate skips in summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NoRequestToken => "no_request_token",
            Self::ShortRequestVector { .. } => "short_request_vector",
            Self::DelimiterNotFound => "delimiter_not_found",
            Self::NoNumbers => "no_numbers",
            Self::WidthMismatch { .. } => "width_mismatch",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRequestToken => write!(f, "no quoted request found"),
            Self::ShortRequestVector { width } => {
                write!(f, "request yielded only {width} features")
            }
            Self::DelimiterNotFound => write!(f, "delimiter not found"),
            Self::NoNumbers => write!(f, "no numbers found"),
            Self::WidthMismatch { expected, found } => {
                write!(f, "found {found} values, expected {expected}")
            }
        }
    }
}

/// A record left out of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: SkipReason,
}

/// Output of one vectorization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vectorized {
    /// Corpus index of each vector, ascending
    pub indices: Vec<usize>,
    /// Retained vectors, all of width [`Self::width`]
    pub vectors: Vec<FeatureVector>,
    pub skipped: Vec<SkippedRecord>,
    /// Width shared by all vectors (0 when nothing was retained)
    pub width: usize,
    /// The run stopped early; `vectors` covers a prefix of the corpus
    pub cancelled: bool,
}

impl Vectorized {
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// `(corpus index, vector)` pairs in corpus order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[f64])> + '_ {
        self.indices
            .iter()
            .copied()
            .zip(self.vectors.iter().map(Vec::as_slice))
    }

    /// Number of skipped records per [`SkipReason::label`].
    #[must_use]
    pub fn skip_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for skipped in &self.skipped {
            *counts.entry(skipped.reason.label()).or_insert(0) += 1;
        }
        counts
    }
}

/// Vectorize every record of `corpus` with `mode`.
///
/// Per-record failures are collected in [`Vectorized::skipped`]; only
/// contract violations (empty corpus, bad parameters, an empty vocabulary,
/// or a width mismatch in strict number mode) are errors.
pub fn vectorize(
    corpus: &Corpus<'_>,
    mode: &VectorizeMode,
    ctx: &RunContext<'_>,
) -> Result<Vectorized, VectorizeError> {
    profiling::function_scope!();
    if corpus.is_empty() {
        return Err(VectorizeError::EmptyCorpus);
    }
    tracing::info!("Vectorizing {} records with mode {mode}", corpus.len());

    let result = match mode {
        VectorizeMode::Tfidf => {
            let model = TfIdfModel::build(corpus)?;
            drive(corpus, ctx, false, |record| {
                Ok(model.vector_for(record.index).unwrap_or_default())
            })
        }
        VectorizeMode::Keyword(set) => {
            let keywords = set.keywords();
            drive(corpus, ctx, false, |record| {
                Ok(keyword::keyword_vector(record.text, &keywords))
            })
        }
        VectorizeMode::Walu => drive(corpus, ctx, false, walu_record),
        VectorizeMode::Number(params) => {
            params.validate()?;
            drive(corpus, ctx, params.strict, |record| {
                number::extract_numbers(record.text, params)
            })
        }
    }?;

    if !result.skipped.is_empty() {
        tracing::warn!(
            "Skipped {} of {} records: {:?}",
            result.skipped.len(),
            corpus.len(),
            result.skip_counts()
        );
    }
    tracing::info!(
        "Vectorized {} records, width {}{}",
        result.len(),
        result.width,
        if result.cancelled { " (cancelled)" } else { "" }
    );
    Ok(result)
}

fn walu_record(record: Record<'_>) -> Result<FeatureVector, SkipReason> {
    let request = walu::request_token(record.text).ok_or(SkipReason::NoRequestToken)?;
    let vector = walu::walu_vector(request);
    if vector.len() > walu::MIN_WALU_FEATURES {
        Ok(vector)
    } else {
        Err(SkipReason::ShortRequestVector {
            width: vector.len(),
        })
    }
}

/// Shared loop over the corpus.
///
/// The first retained vector fixes the width of the run. A later vector of
/// another width is skipped, or aborts the run when `strict_width` is set.
fn drive<F>(
    corpus: &Corpus<'_>,
    ctx: &RunContext<'_>,
    strict_width: bool,
    mut vectorize_one: F,
) -> Result<Vectorized, VectorizeError>
where
    F: FnMut(Record<'_>) -> Result<FeatureVector, SkipReason>,
{
    let tracker = ctx.tracker(Stage::Vectorize);
    let mut out = Vectorized::default();
    let mut width: Option<usize> = None;

    for record in corpus.records() {
        if ctx.is_cancelled() {
            tracing::info!("Vectorization cancelled after {} records", record.index);
            out.cancelled = true;
            break;
        }

        let outcome = vectorize_one(record).and_then(|vector| match width {
            Some(expected) if expected != vector.len() => Err(SkipReason::WidthMismatch {
                expected,
                found: vector.len(),
            }),
            _ => Ok(vector),
        });

        match outcome {
            Ok(vector) => {
                width.get_or_insert(vector.len());
                out.indices.push(record.index);
                out.vectors.push(vector);
                tracker.tick(true);
            }
            Err(SkipReason::WidthMismatch { expected, found }) if strict_width => {
                return Err(VectorizeError::InconsistentWidth {
                    index: record.index,
                    expected,
                    found,
                });
            }
            Err(reason) => {
                tracing::trace!("Skipping record {}: {reason}", record.index);
                out.skipped.push(SkippedRecord {
                    index: record.index,
                    reason,
                });
                tracker.tick(false);
            }
        }
    }

    tracker.finish();
    out.width = width.unwrap_or(0);
    Ok(out)
}
