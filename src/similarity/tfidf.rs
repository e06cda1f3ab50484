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

//! Bag-of-words TF-IDF document model over a corpus.
//!
//! Every document is stored as a sparse, L2-normalized weight vector sorted
//! by term id, so cosine similarity reduces to a merge-join dot product.

use crate::core::{Corpus, FeatureVector};
use crate::error::SimilarityError;
use crate::similarity::stopwords::tokenize;
use crate::similarity::SimilarityStat;
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;

/// `(term id, weight)` pairs sorted by term id
type SparseVector = Vec<(usize, f64)>;

/// TF-IDF model built once per run and discarded afterwards.
#[derive(Debug, Clone)]
pub struct TfIdfModel {
    /// Terms in first-seen corpus order; position = term id
    vocabulary: IndexSet<String>,
    /// Inverse document frequency per term id
    idf: Vec<f64>,
    /// Normalized weights per document, in corpus order
    documents: Vec<SparseVector>,
}

impl TfIdfModel {
    /// Build the model in one pass over all documents.
    ///
    /// Term frequency is the raw count, IDF is smoothed as
    /// `ln((1 + n) / (1 + df)) + 1` so terms present in every document keep
    /// a positive weight.
    pub fn build(corpus: &Corpus<'_>) -> Result<Self, SimilarityError> {
        profiling::function_scope!();
        if corpus.is_empty() {
            return Err(SimilarityError::EmptyCorpus);
        }

        let tokenized: Vec<Vec<String>> = corpus
            .lines()
            .par_iter()
            .map(|line| tokenize(line))
            .collect();

        // Term ids are assigned sequentially so the vocabulary order only
        // depends on the corpus order
        let mut vocabulary: IndexSet<String> = IndexSet::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        let mut term_counts: Vec<IndexMap<usize, u32>> = Vec::with_capacity(tokenized.len());
        for tokens in tokenized {
            let mut counts: IndexMap<usize, u32> = IndexMap::new();
            for token in tokens {
                let (term_id, inserted) = vocabulary.insert_full(token);
                if inserted {
                    doc_freq.push(0);
                }
                *counts.entry(term_id).or_insert(0) += 1;
            }
            for &term_id in counts.keys() {
                doc_freq[term_id] += 1;
            }
            term_counts.push(counts);
        }

        if vocabulary.is_empty() {
            return Err(SimilarityError::EmptyVocabulary);
        }

        let n = term_counts.len() as f64;
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let documents: Vec<SparseVector> = term_counts
            .par_iter()
            .map(|counts| {
                let mut weights: SparseVector = counts
                    .iter()
                    .map(|(&term_id, &count)| (term_id, f64::from(count) * idf[term_id]))
                    .collect();
                weights.sort_unstable_by_key(|&(term_id, _)| term_id);
                normalize(&mut weights);
                weights
            })
            .collect();

        tracing::debug!(
            "Built TF-IDF model: {} documents, {} terms",
            documents.len(),
            vocabulary.len()
        );

        Ok(Self {
            vocabulary,
            idf,
            documents,
        })
    }

    /// Number of documents in the model.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[must_use]
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// IDF weight of `term`, if it occurs in the corpus.
    #[must_use]
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.vocabulary
            .get_index_of(term)
            .map(|term_id| self.idf[term_id])
    }

    /// Dense TF-IDF weights of document `doc`, one entry per vocabulary term.
    ///
    /// Returns `None` if `doc` is out of range.
    #[must_use]
    pub fn vector_for(&self, doc: usize) -> Option<FeatureVector> {
        let weights = self.documents.get(doc)?;
        let mut dense = vec![0.0; self.vocabulary.len()];
        for &(term_id, weight) in weights {
            dense[term_id] = weight;
        }
        Some(dense)
    }

    /// Cosine similarity of two documents in `[0, 1]`.
    ///
    /// Symmetric, and `1.0` for a document with itself. Two documents without
    /// any term are considered identical.
    ///
    /// # Panics
    ///
    /// If either index is not smaller than [`Self::len`].
    #[must_use]
    pub fn similarity(&self, doc_a: usize, doc_b: usize) -> f64 {
        debug_assert!(
            doc_a < self.len() && doc_b < self.len(),
            "document index out of range: ({doc_a}, {doc_b}) with {} documents",
            self.len()
        );
        if doc_a == doc_b {
            return 1.0;
        }
        let a = &self.documents[doc_a];
        let b = &self.documents[doc_b];
        match (a.is_empty(), b.is_empty()) {
            (true, true) => 1.0,
            (true, false) | (false, true) => 0.0,
            (false, false) => sparse_dot(a, b).clamp(0.0, 1.0),
        }
    }

    /// Min, mean and max similarity of `doc` against every other document.
    ///
    /// A single-document model has nothing to compare against and reports
    /// all zeros.
    ///
    /// # Panics
    ///
    /// If `doc` is not smaller than [`Self::len`].
    #[must_use]
    pub fn similarity_stats(&self, doc: usize) -> SimilarityStat {
        let mut stat = SimilarityAccumulator::default();
        for other in (0..self.len()).filter(|&other| other != doc) {
            stat.push(self.similarity(doc, other));
        }
        stat.finish()
    }
}

/// Running min/mean/max over a row of similarities.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityAccumulator {
    min: f64,
    max: f64,
    sum: f64,
    count: usize,
}

impl Default for SimilarityAccumulator {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }
}

impl SimilarityAccumulator {
    pub fn push(&mut self, similarity: f64) {
        self.min = self.min.min(similarity);
        self.max = self.max.max(similarity);
        self.sum += similarity;
        self.count += 1;
    }

    #[must_use]
    pub fn finish(self) -> SimilarityStat {
        if self.count == 0 {
            return SimilarityStat::default();
        }
        SimilarityStat {
            min: self.min,
            mean: self.sum / self.count as f64,
            max: self.max,
        }
    }
}

fn normalize(weights: &mut SparseVector) {
    let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, w) in weights {
            *w /= norm;
        }
    }
}

fn sparse_dot(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}
