//! Column parsers for the solver's time- and frequency-domain outputs.

use serde::{Deserialize, Serialize};

/// Valid rows of one output file plus the number of discarded lines.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series<T> {
    pub points: Vec<T>,
    pub malformed: usize,
}

impl<T> Series<T> {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Leading numeric columns of a line; `None` when fewer than `N` finite
/// numbers open the line. Extra columns are ignored.
fn leading_numbers<const N: usize>(line: &str) -> Option<[f64; N]> {
    let mut values = [0.0; N];
    let mut tokens = line.split_whitespace();
    for slot in values.iter_mut() {
        *slot = tokens
            .next()?
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())?;
    }
    Some(values)
}

fn parse_rows<const N: usize, T>(text: &str, build: impl Fn([f64; N]) -> T) -> Series<T> {
    let mut series = Series {
        points: Vec::new(),
        malformed: 0,
    };
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        match leading_numbers::<N>(line) {
            Some(values) => series.points.push(build(values)),
            None => series.malformed += 1,
        }
    }
    series
}

/// `gtp.dat`: frequency, storage modulus, loss modulus.
pub fn parse_dynamic(text: &str) -> Series<(f64, f64, f64)> {
    parse_rows::<3, _>(text, |[frequency, storage, loss]| (frequency, storage, loss))
}

/// `gt.dat`: time, relaxation modulus.
pub fn parse_relaxation(text: &str) -> Series<(f64, f64)> {
    parse_rows::<2, _>(text, |[time, modulus]| (time, modulus))
}
