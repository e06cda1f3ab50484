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

//! Error types for the analysis pipeline.
//!
//! Only global contract violations end up here. Problems with a single
//! record are recovered locally and reported as
//! [`SkippedRecord`](crate::vectorize::SkippedRecord)s instead.

use std::fmt;

/// Errors raised by [`vectorize`](crate::vectorize::vectorize) before or
/// during a vectorization run.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorizeError {
    EmptyCorpus,
    /// The tfidf mode found no indexable terms in the whole corpus.
    EmptyVocabulary,
    InvalidParameter(String),
    /// Strict number mode only: a record produced a vector of another width.
    InconsistentWidth {
        index: usize,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for VectorizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCorpus => write!(f, "cannot vectorize an empty corpus"),
            Self::EmptyVocabulary => write!(f, "corpus contains no indexable terms"),
            Self::InvalidParameter(msg) => write!(f, "invalid vectorizer parameter: {msg}"),
            Self::InconsistentWidth {
                index,
                expected,
                found,
            } => write!(
                f,
                "record {index} yielded {found} numbers, previous records yielded {expected}"
            ),
        }
    }
}

impl std::error::Error for VectorizeError {}

/// Errors raised while building a TF-IDF model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityError {
    EmptyCorpus,
    EmptyVocabulary,
}

impl fmt::Display for SimilarityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCorpus => write!(f, "cannot build a TF-IDF model from an empty corpus"),
            Self::EmptyVocabulary => write!(f, "corpus contains no indexable terms"),
        }
    }
}

impl std::error::Error for SimilarityError {}

impl From<SimilarityError> for VectorizeError {
    fn from(err: SimilarityError) -> Self {
        match err {
            SimilarityError::EmptyCorpus => Self::EmptyCorpus,
            SimilarityError::EmptyVocabulary => Self::EmptyVocabulary,
        }
    }
}

/// Errors raised while training or querying an isolation forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForestError {
    NoVectors,
    InvalidParameter(String),
    RaggedVectors {
        index: usize,
        expected: usize,
        found: usize,
    },
    /// A scored vector is narrower or wider than the training data
    WidthMismatch {
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for ForestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoVectors => write!(f, "cannot train an isolation forest on zero vectors"),
            Self::InvalidParameter(msg) => write!(f, "invalid forest parameter: {msg}"),
            Self::RaggedVectors {
                index,
                expected,
                found,
            } => write!(
                f,
                "vector {index} has {found} features, expected {expected}"
            ),
            Self::WidthMismatch { expected, found } => write!(
                f,
                "cannot score a vector of width {found} with a forest trained on width {expected}"
            ),
        }
    }
}

impl std::error::Error for ForestError {}

/// Errors raised by the rarity filter.
#[derive(Debug, Clone, PartialEq)]
pub enum RarityError {
    EmptyCorpus,
    InvalidParameter(String),
}

impl fmt::Display for RarityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCorpus => write!(f, "cannot filter an empty corpus"),
            Self::InvalidParameter(msg) => write!(f, "invalid rarity parameter: {msg}"),
        }
    }
}

impl std::error::Error for RarityError {}

/// Top-level error of the end-to-end pipelines in [`crate::analysis`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    Vectorize(VectorizeError),
    Similarity(SimilarityError),
    Forest(ForestError),
    Rarity(RarityError),
    /// Every record of the corpus was skipped by the vectorizer.
    NothingToScore { skipped: usize },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vectorize(e) => write!(f, "vectorization failed: {e}"),
            Self::Similarity(e) => write!(f, "similarity model failed: {e}"),
            Self::Forest(e) => write!(f, "outlier scoring failed: {e}"),
            Self::Rarity(e) => write!(f, "rarity filter failed: {e}"),
            Self::NothingToScore { skipped } => {
                write!(f, "no record could be vectorized ({skipped} skipped)")
            }
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Vectorize(e) => Some(e),
            Self::Similarity(e) => Some(e),
            Self::Forest(e) => Some(e),
            Self::Rarity(e) => Some(e),
            Self::NothingToScore { .. } => None,
        }
    }
}

impl From<VectorizeError> for AnalysisError {
    fn from(err: VectorizeError) -> Self {
        Self::Vectorize(err)
    }
}

impl From<SimilarityError> for AnalysisError {
    fn from(err: SimilarityError) -> Self {
        Self::Similarity(err)
    }
}

impl From<ForestError> for AnalysisError {
    fn from(err: ForestError) -> Self {
        Self::Forest(err)
    }
}

impl From<RarityError> for AnalysisError {
    fn from(err: RarityError) -> Self {
        Self::Rarity(err)
    }
}

/// Errors reading or writing an [`AnalysisConfig`](crate::config::AnalysisConfig).
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    /// The platform has no per-user configuration directory.
    NoConfigDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config file I/O failed: {e}"),
            Self::Parse(e) => write!(f, "malformed config file: {e}"),
            Self::NoConfigDir => write!(f, "could not determine config directory"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::NoConfigDir => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err)
    }
}
