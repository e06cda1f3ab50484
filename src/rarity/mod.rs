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

//! Content rarity: records whose text is unlike the rest of the corpus.
//!
//! Works on the similarity model directly instead of on feature vectors.
//! A fixed-threshold scan keeps every record with at most `allowance`
//! neighbours above `threshold`. The top-N scan converges on the N records
//! with the lowest maximum similarity in one pass by tightening the
//! threshold whenever the retained set overflows.

pub mod coordinator;
pub mod filter;

pub use coordinator::{Acceptance, RareRecord, TruncationCoordinator};
pub use filter::{RarityFilter, RarityParams, RarityReport};
