//! Recovers a run's parameters from whatever the run directory offers.
//!
//! Each [`MetadataSource`] returns a partial [`RunMetadata`]; sources are
//! consulted in order and every field keeps the first value found.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visc_core::{distribution_label, find_candidate, DirTokens};

/// Solver summary written next to the outputs.
pub const SUMMARY_FILE: &str = "info.txt";

/// Complex viscosity in the summary is reported in micro-units.
const COMPLEX_VISCOSITY_SCALE: f64 = 1.0e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub molecular_weight: Option<f64>,
    pub polydispersity: Option<f64>,
    pub distribution_label: Option<String>,
    pub zero_shear_viscosity: Option<f64>,
    pub complex_viscosity: Option<f64>,
}

impl RunMetadata {
    /// Fills every missing field from `other`.
    pub fn merge(&mut self, other: RunMetadata) {
        fill(&mut self.molecular_weight, other.molecular_weight);
        fill(&mut self.polydispersity, other.polydispersity);
        fill(&mut self.distribution_label, other.distribution_label);
        fill(&mut self.zero_shear_viscosity, other.zero_shear_viscosity);
        fill(&mut self.complex_viscosity, other.complex_viscosity);
    }

    /// Whether the parameter triple is known. Viscosities only ever come
    /// from the summary, so they do not keep the chain going.
    pub fn parameters_known(&self) -> bool {
        self.molecular_weight.is_some()
            && self.polydispersity.is_some()
            && self.distribution_label.is_some()
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// One link of the resolver chain.
pub trait MetadataSource {
    fn name(&self) -> &'static str;

    fn resolve(&self, run_dir: &Path) -> Option<RunMetadata>;
}

/// Labelled fields of `info.txt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryFile;

/// Tokens of the `Mw_<mw>__D<d>__PDI_<pdi>` directory name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryName;

/// First `(distribution, Mw, PDI)` line of any other `.dat` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputScan;

fn mw_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\[M\]_w\s*=\s*([0-9.+\-eE]+)",
            r"\bMw\b\s*=\s*([0-9.+\-eE]+)",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

fn value_after_equals(line: &str) -> Option<f64> {
    let (_, rest) = line.split_once('=')?;
    rest.split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parses summary text. Later occurrences of a field override earlier ones.
pub fn parse_summary(text: &str) -> RunMetadata {
    let mut meta = RunMetadata::default();
    for line in text.lines() {
        for pattern in mw_patterns() {
            if let Some(value) = pattern
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .filter(|value| value.is_finite())
            {
                meta.molecular_weight = Some(value);
            }
        }
        if line.contains("zero-shear viscosity") {
            if let Some(value) = value_after_equals(line) {
                meta.zero_shear_viscosity = Some(value);
            }
        }
        if line.contains("complex-viscosity") {
            if let Some(value) = value_after_equals(line) {
                meta.complex_viscosity = Some(value * COMPLEX_VISCOSITY_SCALE);
            }
        }
    }
    meta
}

impl MetadataSource for SummaryFile {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn resolve(&self, run_dir: &Path) -> Option<RunMetadata> {
        let bytes = fs::read(run_dir.join(SUMMARY_FILE)).ok()?;
        Some(parse_summary(&String::from_utf8_lossy(&bytes)))
    }
}

impl MetadataSource for DirectoryName {
    fn name(&self) -> &'static str {
        "directory-name"
    }

    fn resolve(&self, run_dir: &Path) -> Option<RunMetadata> {
        let name = run_dir.file_name()?.to_string_lossy();
        let tokens = DirTokens::parse(&name)?;
        Some(RunMetadata {
            molecular_weight: tokens.molecular_weight,
            polydispersity: tokens.polydispersity,
            distribution_label: tokens
                .distribution_code
                .and_then(distribution_label)
                .map(str::to_string),
            ..RunMetadata::default()
        })
    }
}

fn scan_candidate(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".dat") && lower != "gt.dat" && lower != "gtp.dat" && !lower.starts_with("gpcls")
}

impl MetadataSource for InputScan {
    fn name(&self) -> &'static str {
        "input-scan"
    }

    fn resolve(&self, run_dir: &Path) -> Option<RunMetadata> {
        let mut names: Vec<String> = fs::read_dir(run_dir)
            .ok()?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| scan_candidate(name))
            .collect();
        names.sort();
        names.iter().find_map(|name| {
            let bytes = fs::read(run_dir.join(name)).ok()?;
            let line = find_candidate(&String::from_utf8_lossy(&bytes))?;
            debug!(file = %name, line = line.index, "parameters recovered from input deck");
            Some(RunMetadata {
                molecular_weight: Some(line.molecular_weight),
                polydispersity: Some(line.polydispersity),
                distribution_label: distribution_label(line.distribution_code).map(str::to_string),
                ..RunMetadata::default()
            })
        })
    }
}

/// Summary, then directory name, then input scan.
pub fn default_chain() -> Vec<Box<dyn MetadataSource>> {
    vec![
        Box::new(SummaryFile),
        Box::new(DirectoryName),
        Box::new(InputScan),
    ]
}

/// Runs the chain. The input scan is only consulted while part of the
/// parameter triple is still unknown.
pub fn resolve_metadata(run_dir: &Path, chain: &[Box<dyn MetadataSource>]) -> RunMetadata {
    let mut meta = RunMetadata::default();
    for source in chain {
        if meta.parameters_known() {
            break;
        }
        if let Some(partial) = source.resolve(run_dir) {
            debug!(source = source.name(), run_dir = %run_dir.display(), "metadata source hit");
            meta.merge(partial);
        }
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_fields() {
        let meta = parse_summary(
            "polymer summary\n[M]_w = 1.25e5\nzero-shear viscosity = 3.5e4\ncomplex-viscosity = 2.0e6 Pa s\n",
        );
        assert_eq!(meta.molecular_weight, Some(1.25e5));
        assert_eq!(meta.zero_shear_viscosity, Some(3.5e4));
        assert_eq!(meta.complex_viscosity, Some(2.0));
    }

    #[test]
    fn plain_mw_label_is_recognised() {
        assert_eq!(parse_summary("Mw = 8000\n").molecular_weight, Some(8000.0));
        assert_eq!(parse_summary("Mwx = 8000\n").molecular_weight, None);
    }

    #[test]
    fn scan_skips_outputs() {
        assert!(scan_candidate("inp_MW_1_0_DNA_PDI_NA.dat"));
        assert!(!scan_candidate("gt.dat"));
        assert!(!scan_candidate("GPCLS_1.dat"));
        assert!(!scan_candidate("info.txt"));
    }
}
