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

//! Keyword-count vectorization.
//!
//! Each keyword set is a fixed, ordered list of suspicious substrings. The
//! vector holds one occurrence count per keyword, so its width always equals
//! the list length. Matching is case-sensitive; lists carry the spellings
//! seen in the wild.

use serde::{Deserialize, Serialize};

/// Substrings typical for SQL injection attempts
pub const SQL_INJECTION_KEYWORDS: &[&str] = &[
    "select", "SELECT", "union", "UNION", "insert", "INSERT", "update", "UPDATE", "delete",
    "DELETE", "drop", "DROP", " or ", " OR ", " and ", " AND ", "where", "WHERE", "from", "FROM",
    "sleep(", "SLEEP(", "benchmark(", "concat(", "CONCAT(", "char(", "CHAR(",
    "information_schema", "@@version", "--", "/*", "*/", "'", ";", "1=1", "%27", "%22", "%3B",
    "%3b", "%2D%2D", "0x",
];

/// Substrings typical for OS command injection attempts
pub const COMMAND_INJECTION_KEYWORDS: &[&str] = &[
    ";", "|", "&&", "||", "`", "$(", "${", "%0a", "%0A", "%0d", "%0D", "%3b", "%3B", "%7c",
    "%7C", "%26", "%60", "/bin/", "sh ", "bash", "cmd.exe", "powershell", "wget", "curl",
    "nc ", "netcat", "whoami", "uname", "ping ", "cat ", "chmod", "/etc/passwd", "/tmp/",
];

/// Substrings typical for directory traversal attempts
pub const DIRECTORY_TRAVERSAL_KEYWORDS: &[&str] = &[
    "../", "..\\", "..%2f", "..%2F", "%2e%2e", "%2E%2E", "%252e", "%252E", "..%5c", "..%5C",
    "%c0%ae", "....//", "/etc", "/passwd", "/shadow", "/proc/self", "boot.ini", "win.ini",
    "c:\\", "C:\\", "WEB-INF", ".htaccess", "%00",
];

/// Which keyword list a keyword-count run uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordSet {
    SqlInjection,
    CommandInjection,
    DirectoryTraversal,
    /// Caller supplied list, counted exactly like the built-in ones
    Custom(Vec<String>),
}

impl KeywordSet {
    /// The ordered keyword list of this set.
    #[must_use]
    pub fn keywords(&self) -> Vec<&str> {
        match self {
            Self::SqlInjection => SQL_INJECTION_KEYWORDS.to_vec(),
            Self::CommandInjection => COMMAND_INJECTION_KEYWORDS.to_vec(),
            Self::DirectoryTraversal => DIRECTORY_TRAVERSAL_KEYWORDS.to_vec(),
            Self::Custom(list) => list.iter().map(String::as_str).collect(),
        }
    }

    /// Vector width produced by this set.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            Self::SqlInjection => SQL_INJECTION_KEYWORDS.len(),
            Self::CommandInjection => COMMAND_INJECTION_KEYWORDS.len(),
            Self::DirectoryTraversal => DIRECTORY_TRAVERSAL_KEYWORDS.len(),
            Self::Custom(list) => list.len(),
        }
    }
}

/// Count non-overlapping occurrences of every keyword in `line`.
///
/// Empty keywords never match.
#[must_use]
pub fn keyword_vector(line: &str, keywords: &[&str]) -> Vec<f64> {
    keywords
        .iter()
        .map(|kw| {
            if kw.is_empty() {
                0.0
            } else {
                line.matches(kw).count() as f64
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_injection_counts() {
        let keywords = KeywordSet::SqlInjection.keywords();
        let vector = keyword_vector("id=1' OR 1=1 UNION SELECT password FROM users--", &keywords);

        assert_eq!(vector.len(), SQL_INJECTION_KEYWORDS.len());
        let count = |kw: &str| {
            let pos = SQL_INJECTION_KEYWORDS
                .iter()
                .position(|k| *k == kw)
                .expect("keyword is in the list");
            vector[pos]
        };
        assert_eq!(count("UNION"), 1.0);
        assert_eq!(count("SELECT"), 1.0);
        assert_eq!(count("select"), 0.0, "matching is case-sensitive");
        assert_eq!(count("'"), 1.0);
        assert_eq!(count("--"), 1.0);
        assert_eq!(count("1=1"), 1.0);
    }

    #[test]
    fn test_traversal_counts_repeats() {
        let keywords = KeywordSet::DirectoryTraversal.keywords();
        let vector = keyword_vector("GET /static/../../../etc/passwd HTTP/1.1", &keywords);
        assert_eq!(vector[0], 3.0, "three ../ segments");
        assert!(vector.iter().sum::<f64>() > 3.0);
    }

    #[test]
    fn test_width_matches_every_set() {
        for set in [
            KeywordSet::SqlInjection,
            KeywordSet::CommandInjection,
            KeywordSet::DirectoryTraversal,
            KeywordSet::Custom(vec!["a".into(), "b".into()]),
        ] {
            let keywords = set.keywords();
            assert_eq!(keyword_vector("anything", &keywords).len(), set.width());
        }
    }

    #[test]
    fn test_empty_custom_list_gives_empty_vector() {
        let set = KeywordSet::Custom(Vec::new());
        assert!(keyword_vector("x' OR 1=1", &set.keywords()).is_empty());
    }

    #[test]
    fn test_benign_line_is_all_zero() {
        let keywords = KeywordSet::CommandInjection.keywords();
        let vector = keyword_vector("GET /index.html HTTP/1.1", &keywords);
        assert!(vector.iter().all(|&v| v == 0.0));
    }
}
