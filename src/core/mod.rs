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

pub mod corpus;
pub mod progress;
pub mod ranking;

pub use corpus::{Corpus, Record};
pub use progress::{
    CancelToken, NoProgress, ProgressEvent, ProgressSink, ProgressTracker, RunContext, Stage,
    DEFAULT_PROGRESS_EVERY,
};
pub use ranking::{RankedEntry, RankedResult};

/// Numeric encoding of one record. All vectors of one run share a width.
pub type FeatureVector = Vec<f64>;
