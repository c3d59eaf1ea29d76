use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No available formula with the name \"{name}\"{}", suggestion_suffix(.suggestions))]
    FormulaUnavailable {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("Formulae found in multiple taps: {}. Please use the fully-qualified name", .candidates.join(", "))]
    AmbiguousFormula {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("SHA256 mismatch for {url}\nExpected: {expected}\n  Actual: {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to build {formula}: {message}\n{log}")]
    BuildError {
        formula: String,
        message: String,
        log: String,
    },

    #[error("{name} {version} is already installed")]
    AlreadyInstalled { name: String, version: String },

    #[error("Refusing to uninstall {formula} because it is required by {}", .dependents.join(", "))]
    DependentsExist {
        formula: String,
        dependents: Vec<String>,
    },

    #[error("Could not symlink {formula}; target files already exist:\n{}", display_paths(.conflicts))]
    LinkConflict {
        formula: String,
        conflicts: Vec<PathBuf>,
    },

    #[error("Failed to write to cache at {}: {source}", .path.display())]
    CacheWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No bottle available for {formula} on {tag}")]
    BottleUnavailable { formula: String, tag: String },

    #[error("Invalid formula {name}: {reason}")]
    InvalidFormula { name: String, reason: String },

    #[error("Invalid tap {0}")]
    InvalidTap(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether a fetch that failed with this error may be attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NetworkError(_))
    }
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(". Did you mean {}?", suggestions.join(", "))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_path() {
        let err = Error::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_unavailable_with_suggestions() {
        let err = Error::FormulaUnavailable {
            name: "testbal".into(),
            suggestions: vec!["testball".into()],
        };
        assert!(err.to_string().contains("Did you mean testball?"));

        let err = Error::FormulaUnavailable {
            name: "zzz".into(),
            suggestions: vec![],
        };
        assert_eq!(err.to_string(), "No available formula with the name \"zzz\"");
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(Error::NetworkError("reset".into()).is_transient());
        assert!(
            !Error::ChecksumMismatch {
                url: "u".into(),
                expected: "a".into(),
                actual: "b".into()
            }
            .is_transient()
        );
    }
}
