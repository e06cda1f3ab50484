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

//! The ordered set of log lines analysed in one run.

/// One log line together with its stable position in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub index: usize,
    pub text: &'a str,
}

/// Borrowed view over the lines selected for analysis.
///
/// The order of the lines defines the index used to correlate vectors,
/// scores and similarity results back to the original text. The corpus never
/// owns the text; it lives as long as the caller's buffer.
#[derive(Debug, Clone, Default)]
pub struct Corpus<'a> {
    lines: Vec<&'a str>,
}

impl<'a> Corpus<'a> {
    /// Build a corpus from anything that yields string slices.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a S>,
        S: AsRef<str> + ?Sized + 'a,
    {
        Self {
            lines: lines.into_iter().map(<S as AsRef<str>>::as_ref).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Text of the line at `index`, if it exists.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.lines.get(index).copied()
    }

    /// All lines in corpus order.
    #[must_use]
    pub fn lines(&self) -> &[&'a str] {
        &self.lines
    }

    /// Iterate over the records in corpus order.
    pub fn records(&self) -> impl Iterator<Item = Record<'a>> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(|(index, &text)| Record { index, text })
    }
}

impl<'a> FromIterator<&'a str> for Corpus<'a> {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}
