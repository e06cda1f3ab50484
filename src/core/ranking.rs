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

//! Ranked `(record index, score)` lists handed back to the caller.

use serde::Serialize;
use std::cmp::Ordering;

/// One scored record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedEntry {
    /// Position of the record in the corpus
    pub index: usize,
    /// Primary score, higher = more interesting
    pub score: f64,
}

impl RankedEntry {
    /// Ranking order: descending score, ties broken by ascending index.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Records sorted by descending score with a stable index tie-break.
///
/// Identical input always yields the identical order, so repeated runs can
/// be diffed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RankedResult {
    entries: Vec<RankedEntry>,
}

impl RankedResult {
    /// Sort the given entries into ranking order.
    #[must_use]
    pub fn from_entries(mut entries: Vec<RankedEntry>) -> Self {
        entries.sort_by(RankedEntry::rank_cmp);
        Self { entries }
    }

    /// Rank `(index, score)` pairs.
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        Self::from_entries(
            scores
                .into_iter()
                .map(|(index, score)| RankedEntry { index, score })
                .collect(),
        )
    }

    #[must_use]
    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `n` highest ranked entries.
    #[must_use]
    pub fn top(&self, n: usize) -> &[RankedEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Record indices in ranking order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|e| e.index)
    }

    /// Each entry's score placed on 0-100 between the lowest ranked (0) and
    /// the highest ranked (100) entry, in ranking order.
    ///
    /// A flat ranking has no spread and puts everything at 50.
    #[must_use]
    pub fn relative_scores(&self) -> Vec<f64> {
        let (Some(best), Some(worst)) = (self.entries.first(), self.entries.last()) else {
            return Vec::new();
        };
        let span = best.score - worst.score;
        if span.is_nan() || span < 1e-10 {
            return vec![50.0; self.entries.len()];
        }
        self.entries
            .iter()
            .map(|e| (e.score - worst.score) / span * 100.0)
            .collect()
    }
}

impl IntoIterator for RankedResult {
    type Item = RankedEntry;
    type IntoIter = std::vec::IntoIter<RankedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a RankedResult {
    type Item = &'a RankedEntry;
    type IntoIter = std::slice::Iter<'a, RankedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_with_index_tie_break() {
        let ranked = RankedResult::from_scores([(3, 0.5), (0, 0.9), (2, 0.5), (1, 0.1)]);
        let order: Vec<usize> = ranked.indices().collect();
        assert_eq!(order, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_relative_scores_follow_ranking_order() {
        let ranked = RankedResult::from_scores([(0, 0.5), (1, 1.0), (2, 0.75)]);
        assert_eq!(ranked.relative_scores(), vec![100.0, 50.0, 0.0]);

        let flat = RankedResult::from_scores([(4, 0.3), (9, 0.3)]);
        assert_eq!(flat.relative_scores(), vec![50.0, 50.0]);
        assert!(RankedResult::default().relative_scores().is_empty());
    }

    #[test]
    fn test_top_is_clamped() {
        let ranked = RankedResult::from_scores([(0, 1.0), (1, 0.0)]);
        assert_eq!(ranked.top(1).len(), 1);
        assert_eq!(ranked.top(10).len(), 2);
    }
}
