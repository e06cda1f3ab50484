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

//! Isolation forest.
//!
//! Points that random axis-parallel cuts separate quickly from the rest of
//! the data are anomalous. Each tree is grown on an independent subsample;
//! a point's score is derived from its average isolation depth over all
//! trees, normalized by the expected depth of an unsuccessful search in a
//! binary search tree of the subsample size.
//!
//! Liu, Ting & Zhou, "Isolation Forest", ICDM 2008.

use crate::core::{FeatureVector, RunContext, Stage};
use crate::error::ForestError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Training parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub num_trees: usize,
    /// Subsample drawn per tree (capped at the number of vectors)
    pub sample_size: usize,
    /// Depth limit; `None` uses `ceil(log2(subsample))`
    pub max_depth: Option<usize>,
    /// Fixed seed for reproducible runs; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: 1000,
            sample_size: 256,
            max_depth: None,
            seed: None,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.num_trees == 0 {
            return Err(ForestError::InvalidParameter(
                "num_trees must be at least 1".to_string(),
            ));
        }
        if self.sample_size == 0 {
            return Err(ForestError::InvalidParameter(
                "sample_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

/// One randomly grown isolation tree.
#[derive(Debug, Clone)]
pub struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    /// Path length of `vector`, including the expected remaining depth of
    /// the leaf it ends in. `None` if a split tests a feature `vector` lacks.
    #[must_use]
    pub fn path_length(&self, vector: &[f64]) -> Option<f64> {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if *vector.get(*feature)? <= *threshold {
                        left
                    } else {
                        right
                    };
                    depth += 1.0;
                }
                Node::Leaf { size } => return Some(depth + average_path_length(*size)),
            }
        }
    }
}

/// Grows one tree from a subsample.
struct TreeBuilder<'a> {
    data: &'a [FeatureVector],
    rng: StdRng,
    /// Feature ids, partially shuffled while searching for a usable split
    features: Vec<usize>,
    max_depth: usize,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, rows: &mut [usize], depth: usize) -> Node {
        if depth >= self.max_depth || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }
        let Some((feature, min, max)) = self.pick_feature(rows) else {
            // Every feature is constant here: the rows are indistinguishable
            return Node::Leaf { size: rows.len() };
        };

        let threshold = self.rng.gen_range(min..max);

        // min <= threshold < max, so both sides end up non-empty
        let mut split = 0;
        for i in 0..rows.len() {
            if self.data[rows[i]][feature] <= threshold {
                rows.swap(i, split);
                split += 1;
            }
        }
        let (left_rows, right_rows) = rows.split_at_mut(split);

        let left = Box::new(self.grow(left_rows, depth + 1));
        let right = Box::new(self.grow(right_rows, depth + 1));
        Node::Split {
            feature,
            threshold,
            left,
            right,
        }
    }

    /// Draw features without replacement until one varies across `rows`.
    fn pick_feature(&mut self, rows: &[usize]) -> Option<(usize, f64, f64)> {
        let mut remaining = self.features.len();
        while remaining > 0 {
            let pick = self.rng.gen_range(0..remaining);
            let feature = self.features[pick];
            let (min, max) = rows.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(min, max), &row| {
                    let value = self.data[row][feature];
                    (min.min(value), max.max(value))
                },
            );
            if max > min && (max - min).is_finite() {
                return Some((feature, min, max));
            }
            remaining -= 1;
            self.features.swap(pick, remaining);
        }
        None
    }
}

/// Ensemble of isolation trees.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Subsample size the trees were grown on
    subsample: usize,
    width: usize,
    cancelled: bool,
}

impl IsolationForest {
    /// Train a forest on `vectors`.
    ///
    /// Trees are grown in parallel. Every tree draws its own seed from the
    /// master generator up front, so a fixed [`ForestParams::seed`] yields the
    /// same forest regardless of thread scheduling. On cancellation the
    /// trees finished so far are kept and [`Self::is_partial`] is set.
    pub fn fit(
        vectors: &[FeatureVector],
        params: &ForestParams,
        ctx: &RunContext<'_>,
    ) -> Result<Self, ForestError> {
        profiling::function_scope!();
        params.validate()?;
        let Some(first) = vectors.first() else {
            return Err(ForestError::NoVectors);
        };
        let width = first.len();
        if let Some((index, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != width) {
            return Err(ForestError::RaggedVectors {
                index,
                expected: width,
                found: v.len(),
            });
        }

        let subsample = params.sample_size.min(vectors.len());
        let max_depth = params
            .max_depth
            .unwrap_or_else(|| (subsample as f64).log2().ceil() as usize);

        let mut master = params
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let seeds: Vec<u64> = (0..params.num_trees).map(|_| master.gen()).collect();

        tracing::debug!(
            "Training isolation forest: {} trees, subsample {subsample}, depth limit {max_depth}, {} vectors of width {width}",
            params.num_trees,
            vectors.len()
        );

        let tracker = ctx.tracker(Stage::TrainForest);
        let grown: Vec<Option<IsolationTree>> = seeds
            .par_iter()
            .map(|&seed| {
                if ctx.is_cancelled() {
                    return None;
                }
                profiling::scope!("grow_tree");
                let mut rng = StdRng::seed_from_u64(seed);
                let mut rows = rand::seq::index::sample(&mut rng, vectors.len(), subsample)
                    .into_vec();
                let mut builder = TreeBuilder {
                    data: vectors,
                    rng,
                    features: (0..width).collect(),
                    max_depth,
                };
                let root = builder.grow(&mut rows, 0);
                tracker.tick(true);
                Some(IsolationTree { root })
            })
            .collect();
        tracker.finish();

        let trees: Vec<IsolationTree> = grown.into_iter().flatten().collect();
        let cancelled = trees.len() < params.num_trees;
        if cancelled {
            tracing::info!(
                "Forest training cancelled with {} of {} trees",
                trees.len(),
                params.num_trees
            );
        }

        Ok(Self {
            trees,
            subsample,
            width,
            cancelled,
        })
    }

    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Feature width the forest was trained on.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Training stopped before all requested trees were grown.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.cancelled
    }

    const fn check_width(&self, vector: &[f64]) -> Result<(), ForestError> {
        if vector.len() == self.width {
            Ok(())
        } else {
            Err(ForestError::WidthMismatch {
                expected: self.width,
                found: vector.len(),
            })
        }
    }

    /// Average path length of `vector` over all trees.
    pub fn mean_path_length(&self, vector: &[f64]) -> Result<f64, ForestError> {
        self.check_width(vector)?;
        if self.trees.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree
                .path_length(vector)
                .ok_or(ForestError::WidthMismatch {
                    expected: self.width,
                    found: vector.len(),
                })?;
        }
        Ok(total / self.trees.len() as f64)
    }

    /// Anomaly score in `(0, 1]`: around 0.5 and below is ordinary, close to
    /// 1 is easy to isolate. Shorter average paths always score higher.
    ///
    /// Fails with [`ForestError::WidthMismatch`] unless `vector` has the
    /// width the forest was trained on.
    pub fn score(&self, vector: &[f64]) -> Result<f64, ForestError> {
        self.check_width(vector)?;
        if self.trees.is_empty() {
            return Ok(0.0);
        }
        let c = average_path_length(self.subsample);
        if c <= 0.0 {
            // A subsample of one cannot tell points apart
            return Ok(0.5);
        }
        Ok(2f64.powf(-self.mean_path_length(vector)? / c))
    }

    /// Score every vector, preserving order.
    pub fn score_all(
        &self,
        vectors: &[FeatureVector],
        ctx: &RunContext<'_>,
    ) -> Result<Vec<f64>, ForestError> {
        profiling::function_scope!();
        let tracker = ctx.tracker(Stage::ScoreOutliers);
        let scores = vectors
            .par_iter()
            .map(|v| {
                let score = self.score(v);
                tracker.tick(score.is_ok());
                score
            })
            .collect();
        tracker.finish();
        scores
    }
}

/// Expected path length `c(n)` of an unsuccessful BST search over `n` points.
#[must_use]
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
