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

//! HTTP request-line heuristics ("walu" vectors).
//!
//! Web access logs quote the request line (`"GET /path?query HTTP/1.1"`).
//! The vector describes its shape: where encoding starts, how much
//! punctuation and percent-encoding it carries, and how many traversal or
//! separator patterns appear. Benign requests look alike under this lens,
//! probing and injection attempts do not.

/// Width of a complete walu vector
pub const WALU_WIDTH: usize = 29;

/// Vectors of this width or less are rejected as malformed requests
pub const MIN_WALU_FEATURES: usize = 20;

const PUNCTUATION: [char; 10] = ['<', '>', '\'', '(', ')', ';', '&', '|', '$', '*'];

/// Encoded `=`, `/`, `\` and `%`, compared lowercase
const ENCODED_CHARS: [&str; 4] = ["%3d", "%2f", "%5c", "%25"];

const SEPARATOR_PATTERNS: [&str; 7] = ["/%", "//", "/.", "..", "=/", "./", "/?"];

/// Extract the quoted request token, i.e. the second `"`-separated field.
#[must_use]
pub fn request_token(line: &str) -> Option<&str> {
    line.split('"')
        .nth(1)
        .filter(|token| !token.trim().is_empty())
}

/// Build the heuristic vector for one request line.
///
/// The segment features need a request target; for a request without one
/// only the request-wide features are produced and the result stays below
/// [`MIN_WALU_FEATURES`].
#[must_use]
pub fn walu_vector(request: &str) -> Vec<f64> {
    let mut vector = Vec::with_capacity(WALU_WIDTH);

    vector.push(first_index(request, '%'));
    vector.push(first_index(request, ':'));

    for c in PUNCTUATION {
        vector.push(request.matches(c).count() as f64);
    }

    let lowered = request.to_ascii_lowercase();
    for encoded in ENCODED_CHARS {
        vector.push(lowered.matches(encoded).count() as f64);
    }
    vector.push(request.matches("%20").count() as f64);

    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or_default();
    vector.push(if method == "POST" { 1.0 } else { 0.0 });

    vector.push(longest_non_alphanumeric_run(request) as f64);
    vector.push(count_non_alphanumeric(request) as f64);

    let Some(target) = parts.next() else {
        return vector;
    };

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    vector.push(count_non_alphanumeric(&percent_decode(path)) as f64);
    vector.push(count_non_alphanumeric(&percent_decode(query)) as f64);

    for pattern in SEPARATOR_PATTERNS {
        vector.push(request.matches(pattern).count() as f64);
    }

    vector
}

/// Byte offset of the first `needle`, or -1 when absent.
fn first_index(haystack: &str, needle: char) -> f64 {
    haystack.find(needle).map_or(-1.0, |idx| idx as f64)
}

fn count_non_alphanumeric(text: &str) -> usize {
    text.chars().filter(|c| !c.is_alphanumeric()).count()
}

fn longest_non_alphanumeric_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c.is_alphanumeric() {
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }
    longest
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim.
fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                decoded.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APACHE_LINE: &str = r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326"#;

    #[test]
    fn test_request_token() {
        assert_eq!(request_token(APACHE_LINE), Some("GET /apache_pb.gif HTTP/1.0"));
        assert_eq!(request_token("no quotes at all"), None);
        assert_eq!(request_token(r#"empty "" request"#), None);
    }

    #[test]
    fn test_benign_request_vector() {
        let vector = walu_vector("GET /apache_pb.gif HTTP/1.0");
        assert_eq!(vector.len(), WALU_WIDTH);
        assert_eq!(vector[0], -1.0, "no percent sign");
        assert_eq!(vector[1], -1.0, "no colon");
        assert_eq!(vector[17], 0.0, "not a POST");
        assert_eq!(vector[18], 2.0, "' /' is the longest run");
        assert_eq!(vector[19], 7.0);
        assert_eq!(vector[20], 3.0, "'/', '_' and '.' in the path");
        assert_eq!(vector[21], 0.0, "no query");
        assert!(vector[22..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_traversal_request_stands_out() {
        let benign = walu_vector("GET /index.html HTTP/1.1");
        let hostile = walu_vector("POST /cgi-bin/..%2f..%2f/etc/passwd?x=/bin/sh HTTP/1.1");

        assert_eq!(hostile.len(), WALU_WIDTH);
        assert_eq!(hostile[17], 1.0, "POST flag");
        assert_eq!(hostile[13], 2.0, "two encoded slashes");
        assert!(hostile[0] > 0.0, "percent sign found");
        assert!(hostile[25] >= 2.0, "'..' pattern counted");
        assert!(hostile[19] > benign[19]);
    }

    #[test]
    fn test_request_without_target_is_short() {
        let vector = walu_vector("GARBAGE");
        assert!(vector.len() <= MIN_WALU_FEATURES);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b%2Fc"), "a b/c");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
