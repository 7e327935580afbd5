//! Parameter combinations and the run directory naming scheme.
//!
//! Every combination maps to exactly one directory name of the form
//! `Mw_<mw>__D<dist>__PDI_<pdi>`. Absent dimensions render as `NA` so the
//! name stays decodable.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Token written for a dimension that was held at "unspecified".
pub const MISSING_TOKEN: &str = "NA";

/// Prefix shared by every run directory name.
pub const RUN_DIR_PREFIX: &str = "Mw_";

/// One point of the sweep grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterCombination {
    pub molecular_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polydispersity: Option<f64>,
}

impl ParameterCombination {
    pub fn new(
        molecular_weight: f64,
        distribution_code: Option<i64>,
        polydispersity: Option<f64>,
    ) -> Self {
        Self {
            molecular_weight,
            distribution_code,
            polydispersity,
        }
    }

    pub fn mw_token(&self) -> String {
        float_token(self.molecular_weight)
    }

    pub fn dist_token(&self) -> String {
        self.distribution_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| MISSING_TOKEN.to_string())
    }

    pub fn pdi_token(&self) -> String {
        self.polydispersity
            .map(float_token)
            .unwrap_or_else(|| MISSING_TOKEN.to_string())
    }

    /// Run directory name, e.g. `Mw_10000_0__DNA__PDI_2_5`.
    pub fn dir_name(&self) -> String {
        format!(
            "{RUN_DIR_PREFIX}{}__D{}__PDI_{}",
            self.mw_token(),
            self.dist_token(),
            self.pdi_token()
        )
    }

    /// Suffix shared by job names and batch script names: `MW<mw>_D<d>_PDI<p>`.
    pub fn job_suffix(&self) -> String {
        format!(
            "MW{}_D{}_PDI{}",
            self.mw_token(),
            self.dist_token(),
            self.pdi_token()
        )
    }

    /// Name of the rewritten solver input derived from the template file name.
    pub fn input_file_name(&self, template_name: &str) -> String {
        let (stem, ext) = split_extension(template_name);
        format!(
            "{stem}_MW_{}_D{}_PDI_{}{ext}",
            self.mw_token(),
            self.dist_token(),
            self.pdi_token()
        )
    }

    /// Decodes a directory name produced by [`ParameterCombination::dir_name`].
    ///
    /// Older names without the `__D` or `__PDI_` segments are also accepted.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let tokens = DirTokens::parse(name)?;
        Some(Self {
            molecular_weight: tokens.molecular_weight?,
            distribution_code: tokens.distribution_code,
            polydispersity: tokens.polydispersity,
        })
    }

    pub fn distribution_label(&self) -> Option<&'static str> {
        self.distribution_code.and_then(distribution_label)
    }
}

impl fmt::Display for ParameterCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// Partial decode of a run directory name. Each field is `None` when the
/// segment is absent, `NA`, or unparsable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirTokens {
    pub molecular_weight: Option<f64>,
    pub distribution_code: Option<i64>,
    pub polydispersity: Option<f64>,
}

impl DirTokens {
    /// Returns `None` when the name does not follow the run directory pattern.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim_end_matches('/');
        let captures = dir_pattern()?.captures(name)?;
        let molecular_weight = captures.get(1).and_then(|m| parse_float_token(m.as_str()));
        let distribution_code = captures
            .get(2)
            .filter(|m| m.as_str() != MISSING_TOKEN)
            .and_then(|m| m.as_str().parse::<i64>().ok());
        let polydispersity = captures.get(3).and_then(|m| parse_float_token(m.as_str()));
        Some(Self {
            molecular_weight,
            distribution_code,
            polydispersity,
        })
    }
}

fn dir_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^Mw_([0-9_.]+|NA)(?:__D(\d+|NA))?(?:__PDI_([0-9_.]+|NA))?$").ok()
        })
        .as_ref()
}

/// Renders a value the way it appears in directory names: shortest round-trip
/// decimal, always with a fractional part, `.` replaced by `_`.
pub fn float_token(value: f64) -> String {
    decimal_repr(value).replace('.', "_")
}

/// Shortest round-trip decimal string with a mandatory fractional part
/// (`10000.0`, `2.5`).
pub fn decimal_repr(value: f64) -> String {
    let mut text = format!("{value}");
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

fn parse_float_token(token: &str) -> Option<f64> {
    if token == MISSING_TOKEN {
        return None;
    }
    token
        .replace('_', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}

/// Label of a molar-mass distribution code as written by the solver.
pub fn distribution_label(code: i64) -> Option<&'static str> {
    match code {
        0 => Some("Monodisperse"),
        1 => Some("Gaussian"),
        2 => Some("Log-normal"),
        3 => Some("Poisson"),
        4 => Some("Flory"),
        _ => None,
    }
}

/// Inverse of [`distribution_label`].
pub fn distribution_code(label: &str) -> Option<i64> {
    (0..=4).find(|code| distribution_label(*code) == Some(label))
}
