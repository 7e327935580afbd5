//! Conda activation resolved once per sweep.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};
use visc_core::SweepError;
use visc_remote::{shell_quote, RemoteSession};

use crate::config::EnvironmentSettings;

/// Sourced when no `conda.sh` can be located.
pub const FALLBACK_PROFILE: &str = "~/.bashrc";

const BASHRC_SCAN: &str = r"grep -E 'conda\.sh' ~/.bashrc 2>/dev/null || true";

/// Shell commands run before the solver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Activation {
    commands: Vec<String>,
}

impl Activation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn conda(conda_sh: &str, env: &str) -> Self {
        Self {
            commands: vec![
                format!("source {}", quote_home_path(conda_sh)),
                r#"eval "$(conda shell.bash hook)""#.to_string(),
                format!("conda activate {}", shell_quote(env)),
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Joined for a single `&&` chain.
    pub fn chained(&self) -> Option<String> {
        if self.commands.is_empty() {
            None
        } else {
            Some(self.commands.join(" && "))
        }
    }
}

/// Quotes a path, leaving a leading `~/` outside the quotes so it expands.
pub fn quote_home_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "~/".to_string(),
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None => shell_quote(path),
    }
}

fn primary_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"(?:^|[;\s])(?:source|\.)\s*["']?(?P<path>[^"' ]*?/etc/profile\.d/conda\.sh)["']?"#,
            )
            .ok()
        })
        .as_ref()
}

fn fallback_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(/[^"'\s]*?/etc/profile\.d/conda\.sh)"#).ok())
        .as_ref()
}

/// Extracts the `conda.sh` path from `grep` output over `~/.bashrc`.
pub fn parse_conda_sh(text: &str) -> Option<String> {
    for line in text.lines() {
        if let Some(path) = primary_pattern()
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.name("path"))
        {
            return Some(path.as_str().to_string());
        }
    }
    fallback_pattern()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Finds `conda.sh` on the host: an explicit setting wins, then the
/// `~/.bashrc` scan, then [`FALLBACK_PROFILE`].
pub fn resolve_conda_sh<S: RemoteSession + ?Sized>(
    session: &S,
    settings: &EnvironmentSettings,
) -> Result<String, SweepError> {
    if let Some(explicit) = settings.conda_sh.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(explicit.to_string());
    }
    match session.exec(BASHRC_SCAN) {
        Ok(output) => {
            if let Some(path) = parse_conda_sh(&output.stdout) {
                debug!(path = %path, "conda.sh located from ~/.bashrc");
                return Ok(path);
            }
        }
        Err(err) if err.is_fatal_for_sweep() => return Err(err),
        Err(err) => warn!(error = %err, "scanning ~/.bashrc for conda.sh failed"),
    }
    warn!("conda.sh not found, sourcing {FALLBACK_PROFILE}");
    Ok(FALLBACK_PROFILE.to_string())
}

/// Builds the activation for a sweep. Without a configured environment there
/// is nothing to activate and the host is not contacted.
pub fn resolve_activation<S: RemoteSession + ?Sized>(
    session: &S,
    settings: &EnvironmentSettings,
) -> Result<Activation, SweepError> {
    let Some(env) = settings.conda_env.as_deref().filter(|e| !e.trim().is_empty()) else {
        return Ok(Activation::none());
    };
    let conda_sh = resolve_conda_sh(session, settings)?;
    Ok(Activation::conda(&conda_sh, env))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_lines_are_recognised() {
        let text = "# >>> conda initialize >>>\n    . \"/opt/miniconda3/etc/profile.d/conda.sh\"\n";
        assert_eq!(
            parse_conda_sh(text).as_deref(),
            Some("/opt/miniconda3/etc/profile.d/conda.sh")
        );
        let text = "if [ -f x ]; then source /home/a/anaconda3/etc/profile.d/conda.sh; fi";
        assert_eq!(
            parse_conda_sh(text).as_deref(),
            Some("/home/a/anaconda3/etc/profile.d/conda.sh")
        );
    }

    #[test]
    fn bare_paths_use_the_fallback_pattern() {
        let text = "export CONDA_SH=/srv/conda/etc/profile.d/conda.sh";
        assert_eq!(
            parse_conda_sh(text).as_deref(),
            Some("/srv/conda/etc/profile.d/conda.sh")
        );
        assert_eq!(parse_conda_sh("alias ll='ls -l'"), None);
    }

    #[test]
    fn home_paths_stay_expandable() {
        assert_eq!(quote_home_path("~/.bashrc"), "~/'.bashrc'");
        assert_eq!(quote_home_path("/opt/c.sh"), "'/opt/c.sh'");
        let activation = Activation::conda("~/.bashrc", "bob");
        assert_eq!(
            activation.chained().as_deref(),
            Some(r#"source ~/'.bashrc' && eval "$(conda shell.bash hook)" && conda activate 'bob'"#)
        );
    }
}
