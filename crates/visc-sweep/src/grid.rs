use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use visc_core::{ErrorInfo, ParameterCombination, SweepError};

/// The three sweep dimensions. Empty distribution or polydispersity lists hold
/// that dimension at "unspecified".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridSpec {
    pub molecular_weights: Vec<f64>,
    #[serde(default)]
    pub distributions: Vec<i64>,
    #[serde(default)]
    pub polydispersities: Vec<f64>,
}

impl GridSpec {
    pub fn expand(&self) -> Vec<ParameterCombination> {
        expand(
            &self.molecular_weights,
            &self.distributions,
            &self.polydispersities,
        )
    }

    /// Replaces each dimension for which a list is given. An empty list
    /// clears the optional dimensions back to "unspecified".
    pub fn override_with(
        &mut self,
        molecular_weights: Option<&str>,
        distributions: Option<&str>,
        polydispersities: Option<&str>,
    ) -> Result<(), SweepError> {
        if let Some(text) = molecular_weights {
            self.molecular_weights = parse_list(text)?;
        }
        if let Some(text) = distributions {
            self.distributions = parse_list(text)?;
        }
        if let Some(text) = polydispersities {
            self.polydispersities = parse_list(text)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.molecular_weights.is_empty() {
            return Err(SweepError::Config(
                ErrorInfo::new("grid_empty", "at least one molecular weight is required")
                    .with_hint("set grid.molecular_weights"),
            ));
        }
        if let Some(bad) = self
            .molecular_weights
            .iter()
            .find(|mw| !mw.is_finite() || **mw <= 0.0)
        {
            return Err(SweepError::Config(ErrorInfo::new(
                "grid_molecular_weight",
                format!("molecular weight {bad} must be a positive finite number"),
            )));
        }
        if let Some(bad) = self
            .polydispersities
            .iter()
            .find(|pdi| !pdi.is_finite() || **pdi <= 0.0)
        {
            return Err(SweepError::Config(ErrorInfo::new(
                "grid_polydispersity",
                format!("polydispersity {bad} must be a positive finite number"),
            )));
        }
        if let Some(bad) = self.distributions.iter().find(|code| **code < 0) {
            return Err(SweepError::Config(ErrorInfo::new(
                "grid_distribution",
                format!("distribution code {bad} must not be negative"),
            )));
        }
        Ok(())
    }
}

/// Cartesian product in enumeration order molecular weight, then
/// distribution, then polydispersity. Duplicates are dropped before the
/// product (first occurrence wins); non-positive weights are ignored.
pub fn expand(mw: &[f64], dist: &[i64], pdi: &[f64]) -> Vec<ParameterCombination> {
    let weights: Vec<f64> = dedup_floats(mw)
        .into_iter()
        .filter(|value| value.is_finite() && *value > 0.0)
        .collect();
    let codes = optional_dimension(dedup_by(dist, |code| *code));
    let dispersities = optional_dimension(dedup_floats(pdi));

    let mut grid = Vec::with_capacity(weights.len() * codes.len() * dispersities.len());
    for &molecular_weight in &weights {
        for &distribution_code in &codes {
            for &polydispersity in &dispersities {
                grid.push(ParameterCombination::new(
                    molecular_weight,
                    distribution_code,
                    polydispersity,
                ));
            }
        }
    }
    grid
}

fn optional_dimension<T: Copy>(values: Vec<T>) -> Vec<Option<T>> {
    if values.is_empty() {
        vec![None]
    } else {
        values.into_iter().map(Some).collect()
    }
}

fn dedup_floats(values: &[f64]) -> Vec<f64> {
    // adding 0.0 maps -0.0 onto 0.0 so equal values share a key
    dedup_by(values, |value| (value + 0.0).to_bits())
}

fn dedup_by<T: Copy, K: Eq + std::hash::Hash>(values: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|value| seen.insert(key(*value)))
        .copied()
        .collect()
}

/// Parses a comma or whitespace separated list, as typed on the command line.
pub fn parse_list<T>(text: &str) -> Result<Vec<T>, SweepError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse::<T>().map_err(|err| {
                SweepError::Config(
                    ErrorInfo::new("grid_list", format!("cannot parse '{token}': {err}"))
                        .with_context("list", text),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        assert_eq!(dedup_floats(&[3.0, 1.0, 3.0, 2.0, 1.0]), vec![3.0, 1.0, 2.0]);
        assert_eq!(dedup_by(&[2i64, 2, 0], |c| *c), vec![2, 0]);
    }

    #[test]
    fn lists_accept_mixed_separators() {
        let values: Vec<f64> = parse_list("1e4, 2.5e4;50000 75000").expect("parse");
        assert_eq!(values, vec![10000.0, 25000.0, 50000.0, 75000.0]);
        assert!(parse_list::<i64>("1, x").is_err());
    }
}
