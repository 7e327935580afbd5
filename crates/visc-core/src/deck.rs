//! Locating and rewriting the `(distribution, Mw, PDI)` line of a solver input.
//!
//! Solver inputs open with a fixed header block. The first line after it that
//! carries at least three numeric tokens is read positionally as
//! distribution code, weight-averaged molar mass and polydispersity.

use serde::{Deserialize, Serialize};

/// Number of leading lines never considered as a candidate.
pub const HEADER_LINES: usize = 5;

/// The candidate line found in an input deck.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateLine {
    /// Zero-based line index within the file.
    pub index: usize,
    pub distribution_code: i64,
    pub molecular_weight: f64,
    pub polydispersity: f64,
}

/// Parses the first three whitespace tokens of a line. The distribution code
/// is the truncated integer of the first token.
pub fn parse_candidate_tokens(line: &str) -> Option<(i64, f64, f64)> {
    let mut tokens = line.split_whitespace();
    let code = parse_finite(tokens.next()?)?;
    let mw = parse_finite(tokens.next()?)?;
    let pdi = parse_finite(tokens.next()?)?;
    Some((code.trunc() as i64, mw, pdi))
}

fn parse_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Returns the first candidate line past the header.
pub fn find_candidate(text: &str) -> Option<CandidateLine> {
    text.lines()
        .enumerate()
        .skip(HEADER_LINES)
        .find_map(|(index, line)| {
            parse_candidate_tokens(line).map(|(code, mw, pdi)| CandidateLine {
                index,
                distribution_code: code,
                molecular_weight: mw,
                polydispersity: pdi,
            })
        })
}

/// Result of rewriting an input deck.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub text: String,
    /// Index of the rewritten line, `None` when no candidate was found and the
    /// text is returned unchanged.
    pub line_index: Option<usize>,
}

/// Rewrites the first candidate line. `mw` always replaces the second token,
/// `dist` and `pdi` only when given. Tokens of the rewritten line are rejoined
/// with single spaces and its line terminator is kept; every other byte is
/// left untouched.
pub fn rewrite_candidate(text: &str, mw: f64, dist: Option<i64>, pdi: Option<f64>) -> Rewrite {
    let mut out = String::with_capacity(text.len() + 32);
    let mut line_index = None;
    for (index, segment) in text.split_inclusive('\n').enumerate() {
        if line_index.is_none() && index >= HEADER_LINES {
            let (body, terminator) = split_terminator(segment);
            if parse_candidate_tokens(body).is_some() {
                let mut tokens: Vec<String> =
                    body.split_whitespace().map(str::to_string).collect();
                if let Some(code) = dist {
                    tokens[0] = code.to_string();
                }
                tokens[1] = format!("{mw:.6}");
                if let Some(value) = pdi {
                    tokens[2] = format!("{value:.6}");
                }
                out.push_str(&tokens.join(" "));
                out.push_str(terminator);
                line_index = Some(index);
                continue;
            }
        }
        out.push_str(segment);
    }
    Rewrite {
        text: out,
        line_index,
    }
}

fn split_terminator(segment: &str) -> (&str, &str) {
    if let Some(body) = segment.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = segment.strip_suffix('\n') {
        (body, "\n")
    } else {
        (segment, "")
    }
}
