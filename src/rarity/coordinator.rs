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

//! Serialization point for the adaptive top-N state.
//!
//! The retained set, the similarity threshold and the allowance are only
//! ever changed under one lock. Scan workers take a snapshot of the
//! acceptance window before a row and hand finished rows back through
//! [`TruncationCoordinator::offer`]. A snapshot can only be looser than the
//! current window because the threshold never grows, so a row rejected
//! under a stale snapshot is rejected under the current one as well.

use crate::similarity::SimilarityStat;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::{Mutex, PoisonError};

/// A record that passed the rarity scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RareRecord {
    pub index: usize,
    pub stats: SimilarityStat,
}

impl RareRecord {
    /// Rarity score, `1 - max similarity`.
    #[must_use]
    pub fn rarity(&self) -> f64 {
        1.0 - self.stats.max
    }

    /// Rarest first: ascending max similarity, then ascending index.
    #[must_use]
    pub fn rarity_cmp(&self, other: &Self) -> Ordering {
        self.stats
            .max
            .total_cmp(&other.stats.max)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Acceptance window a row is judged against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceptance {
    /// Similarities above this count as close matches
    pub threshold: f64,
    /// Close matches tolerated before a record is discarded
    pub allowance: usize,
}

#[derive(Debug)]
struct State {
    retained: Vec<RareRecord>,
    acceptance: Acceptance,
}

/// Owns the retained set and the acceptance window of one rarity scan.
#[derive(Debug)]
pub struct TruncationCoordinator {
    state: Mutex<State>,
    top_n: Option<usize>,
}

impl TruncationCoordinator {
    /// Coordinator with a fixed window, or an adaptive one when `top_n` is set.
    #[must_use]
    pub const fn new(acceptance: Acceptance, top_n: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                retained: Vec::new(),
                acceptance,
            }),
            top_n,
        }
    }

    /// Current acceptance window.
    #[must_use]
    pub fn acceptance(&self) -> Acceptance {
        self.lock().acceptance
    }

    #[must_use]
    pub fn retained_len(&self) -> usize {
        self.lock().retained.len()
    }

    /// Add a record that survived its row scan.
    ///
    /// In top-N mode an insertion that grows the set beyond N re-sorts it,
    /// truncates it to the N rarest records and tightens the threshold to
    /// the max similarity of the new Nth record. Returns the retained count.
    pub fn offer(&self, record: RareRecord) -> usize {
        let mut state = self.lock();
        state.retained.push(record);

        if let Some(n) = self.top_n {
            if state.retained.len() > n {
                state.retained.sort_by(RareRecord::rarity_cmp);
                state.retained.truncate(n);
                let nth_max = state.retained[n - 1].stats.max;
                if nth_max < state.acceptance.threshold {
                    tracing::trace!(
                        "Tightening rarity threshold {:.4} -> {nth_max:.4}",
                        state.acceptance.threshold
                    );
                    state.acceptance.threshold = nth_max;
                }
            }
        }
        state.retained.len()
    }

    /// Retained records, rarest first, and the final acceptance window.
    #[must_use]
    pub fn finish(self) -> (Vec<RareRecord>, Acceptance) {
        let mut state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        state.retained.sort_by(RareRecord::rarity_cmp);
        (state.retained, state.acceptance)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // The state stays consistent even if a holder panicked mid-scan
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, max: f64) -> RareRecord {
        RareRecord {
            index,
            stats: SimilarityStat {
                min: 0.0,
                mean: max / 2.0,
                max,
            },
        }
    }

    #[test]
    fn test_fixed_window_keeps_everything() {
        let coordinator = TruncationCoordinator::new(
            Acceptance {
                threshold: 0.8,
                allowance: 0,
            },
            None,
        );
        for i in 0..5 {
            coordinator.offer(record(i, 0.1 * i as f64));
        }
        let (retained, acceptance) = coordinator.finish();
        assert_eq!(retained.len(), 5);
        assert_eq!(acceptance.threshold, 0.8);
    }

    #[test]
    fn test_top_n_truncates_and_tightens() {
        let coordinator = TruncationCoordinator::new(
            Acceptance {
                threshold: 1.0,
                allowance: 1,
            },
            Some(2),
        );
        assert_eq!(coordinator.offer(record(0, 0.9)), 1);
        assert_eq!(coordinator.offer(record(1, 0.5)), 2);
        assert_eq!(coordinator.acceptance().threshold, 1.0);

        assert_eq!(coordinator.offer(record(2, 0.7)), 2);
        assert_eq!(coordinator.acceptance().threshold, 0.7);

        assert_eq!(coordinator.offer(record(3, 0.2)), 2);
        assert_eq!(coordinator.acceptance().threshold, 0.5);

        let (retained, _) = coordinator.finish();
        let indices: Vec<usize> = retained.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![3, 1]);
    }

    #[test]
    fn test_ties_keep_lower_index() {
        let coordinator = TruncationCoordinator::new(
            Acceptance {
                threshold: 1.0,
                allowance: 1,
            },
            Some(1),
        );
        coordinator.offer(record(5, 0.4));
        coordinator.offer(record(2, 0.4));
        let (retained, _) = coordinator.finish();
        assert_eq!(retained[0].index, 2);
    }
}
