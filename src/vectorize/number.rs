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

//! Numeric-extraction vectorization.
//!
//! Pulls every signed decimal out of a line, optionally restricted to the
//! text between a prefix and a suffix delimiter. Useful for lines that
//! carry measurements (`latency=12.5ms size=4096`) where the values, not
//! the words, are what deviates.

use crate::error::VectorizeError;
use crate::vectorize::SkipReason;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Parameters of the number mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberParams {
    /// Only text after the first occurrence of this delimiter is scanned
    pub prefix: Option<String>,
    /// Only text before the first occurrence of this delimiter (after the
    /// prefix cut) is scanned
    pub suffix: Option<String>,
    /// Abort the run on the first record whose number count differs from the
    /// first retained record instead of skipping it
    pub strict: bool,
}

impl NumberParams {
    /// Reject empty delimiters, they would match everywhere.
    pub fn validate(&self) -> Result<(), VectorizeError> {
        if self.prefix.as_deref() == Some("") {
            return Err(VectorizeError::InvalidParameter(
                "number prefix must not be empty".to_string(),
            ));
        }
        if self.suffix.as_deref() == Some("") {
            return Err(VectorizeError::InvalidParameter(
                "number suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Extract the numbers of one line.
pub fn extract_numbers(line: &str, params: &NumberParams) -> Result<Vec<f64>, SkipReason> {
    let mut text = line;

    if let Some(prefix) = params.prefix.as_deref() {
        let pos = text.find(prefix).ok_or(SkipReason::DelimiterNotFound)?;
        text = &text[pos + prefix.len()..];
    }
    if let Some(suffix) = params.suffix.as_deref() {
        let pos = text.find(suffix).ok_or(SkipReason::DelimiterNotFound)?;
        text = &text[..pos];
    }

    let numbers: Vec<f64> = NUMBER_PATTERN
        .find_iter(text)
        .filter_map(Result::ok)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();

    if numbers.is_empty() {
        Err(SkipReason::NoNumbers)
    } else {
        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_decimals() {
        let numbers = extract_numbers("temp=-3.5 load=+2 count=17", &NumberParams::default())
            .expect("line has numbers");
        assert_eq!(numbers, vec![-3.5, 2.0, 17.0]);
    }

    #[test]
    fn test_prefix_and_suffix_cut() {
        let params = NumberParams {
            prefix: Some("took ".to_string()),
            suffix: Some("ms".to_string()),
            strict: false,
        };
        let numbers = extract_numbers("req 42 took 118.25ms (retry 3)", &params)
            .expect("delimiters present");
        assert_eq!(numbers, vec![118.25]);
    }

    #[test]
    fn test_missing_delimiter_skips() {
        let params = NumberParams {
            prefix: Some("took ".to_string()),
            ..NumberParams::default()
        };
        assert_eq!(
            extract_numbers("req 42 done", &params),
            Err(SkipReason::DelimiterNotFound)
        );
    }

    #[test]
    fn test_no_numbers_skips() {
        assert_eq!(
            extract_numbers("nothing to see", &NumberParams::default()),
            Err(SkipReason::NoNumbers)
        );
    }

    #[test]
    fn test_empty_delimiter_is_rejected() {
        let params = NumberParams {
            suffix: Some(String::new()),
            ..NumberParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(VectorizeError::InvalidParameter(_))
        ));
    }
}
