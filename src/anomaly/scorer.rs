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

use crate::anomaly::forest::{ForestParams, IsolationForest};
use crate::core::{RankedResult, RunContext};
use crate::error::ForestError;
use crate::vectorize::Vectorized;
use serde::Serialize;

/// Outcome of scoring one vectorized corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierRanking {
    /// Every vectorized record, most anomalous first
    pub ranked: RankedResult,
    /// Trees the scores are based on
    pub trees: usize,
    /// Training was cancelled; scores come from a partial forest
    pub partial: bool,
}

/// Isolation-forest based outlier scorer.
///
/// Trains one forest per call and scores every vector it was trained on, so
/// no record that reaches this stage is ever dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlierScorer {
    params: ForestParams,
}

impl OutlierScorer {
    #[must_use]
    pub const fn new(params: ForestParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub const fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Train a forest on the given vectors.
    pub fn fit(
        &self,
        vectorized: &Vectorized,
        ctx: &RunContext<'_>,
    ) -> Result<IsolationForest, ForestError> {
        IsolationForest::fit(&vectorized.vectors, &self.params, ctx)
    }

    /// Train on `vectorized` and rank its records by anomaly score.
    pub fn rank(
        &self,
        vectorized: &Vectorized,
        ctx: &RunContext<'_>,
    ) -> Result<OutlierRanking, ForestError> {
        let forest = self.fit(vectorized, ctx)?;
        let scores = forest.score_all(&vectorized.vectors, ctx)?;
        let ranked = RankedResult::from_scores(vectorized.indices.iter().copied().zip(scores));

        if let Some(top) = ranked.entries().first() {
            tracing::info!(
                "Scored {} records with {} trees, top record {} at {:.3}",
                ranked.len(),
                forest.num_trees(),
                top.index,
                top.score
            );
        }

        Ok(OutlierRanking {
            ranked,
            trees: forest.num_trees(),
            partial: forest.is_partial(),
        })
    }
}
