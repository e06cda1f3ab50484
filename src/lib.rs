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

//! Feature extraction and unsupervised anomaly scoring for log records.
//!
//! A [`Corpus`](core::Corpus) of log lines is either turned into feature
//! vectors ([`vectorize`]) and ranked by an isolation forest
//! ([`anomaly`]), or compared line against line through a TF-IDF model
//! ([`similarity`]) to keep only the records unlike everything else
//! ([`rarity`]). [`analysis`] wires both paths together.

pub mod analysis;
pub mod anomaly;
pub mod config;
pub mod core;
pub mod error;
pub mod rarity;
pub mod similarity;
pub mod vectorize;
