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

//! TF-IDF similarity engine.
//!
//! Used directly by the rarity filter and as the `tfidf` vectorization mode.

pub mod stopwords;
pub mod tfidf;

pub use tfidf::{SimilarityAccumulator, TfIdfModel};

use serde::Serialize;

/// Similarity of one record against every other record of the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimilarityStat {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}
