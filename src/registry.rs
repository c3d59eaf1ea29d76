//! Formula registry - resolves a requested name to exactly one definition.
//!
//! The registry holds no state of its own: every lookup re-reads the tap
//! directories, so taps added or removed by another process are visible
//! immediately.
//!
//! # Name forms
//!
//! - `path/to/foo.json` - a formula file outside any tap
//! - `user/repo/foo` - a formula in a specific tap
//! - `foo` - searched in every tap, formulae first, then aliases
//!
//! # Precedence for bare names
//!
//! When several taps define the same name the first rule that yields a single
//! tap wins:
//! 1. the tap recorded in the receipt of an installed copy
//! 2. the only pinned tap among the candidates
//! 3. `homebrew/core`
//!
//! Otherwise the lookup fails with [`Error::AmbiguousFormula`].

use crate::config::Config;
use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::receipt::ReceiptStore;
use crate::tap::{self, Tap};
use rayon::prelude::*;
use std::path::Path;
use tracing::debug;

/// Minimum Jaro-Winkler similarity for "did you mean" suggestions
const SUGGESTION_THRESHOLD: f64 = 0.8;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone)]
pub struct Registry {
    config: Config,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn taps(&self) -> Result<Vec<Tap>> {
        tap::list_taps(&self.config)
    }

    /// Resolve a name (or alias, or path) to its formula
    pub fn lookup(&self, name: &str) -> Result<Formula> {
        if name.ends_with(".json") && Path::new(name).is_file() {
            return Formula::load(Path::new(name), None);
        }

        let lowered = name.to_lowercase();
        let taps = self.taps()?;

        // Fully-qualified user/repo/name
        if let Some((tap_name, formula_name)) = split_qualified(&lowered) {
            let tap = taps
                .iter()
                .find(|t| t.name() == tap_name)
                .ok_or_else(|| self.unavailable(name, &taps))?;
            return self
                .load_from_tap(tap, formula_name)?
                .ok_or_else(|| self.unavailable(name, &taps));
        }

        let mut candidates = Vec::new();
        for tap in &taps {
            if tap.formula_file(&lowered).is_file() {
                candidates.push((tap, lowered.clone()));
            }
        }
        if candidates.is_empty() {
            for tap in &taps {
                if let Some(target) = tap.resolve_alias(&lowered)? {
                    debug!(alias = %lowered, target = %target, tap = %tap.name(), "resolved alias");
                    candidates.push((tap, target));
                }
            }
        }

        let chosen = match candidates.len() {
            0 => return Err(self.unavailable(name, &taps)),
            1 => candidates.remove(0),
            _ => self.pick_candidate(&lowered, candidates)?,
        };

        let (tap, formula_name) = chosen;
        self.load_from_tap(tap, &formula_name)?
            .ok_or_else(|| self.unavailable(name, &taps))
    }

    fn load_from_tap(&self, tap: &Tap, name: &str) -> Result<Option<Formula>> {
        let path = tap.formula_file(name);
        if path.is_file() {
            return Formula::load(&path, Some(&tap.name())).map(Some);
        }
        match tap.resolve_alias(name)? {
            Some(target) if tap.formula_file(&target).is_file() => {
                Formula::load(&tap.formula_file(&target), Some(&tap.name())).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn pick_candidate<'a>(
        &self,
        name: &str,
        candidates: Vec<(&'a Tap, String)>,
    ) -> Result<(&'a Tap, String)> {
        let store = ReceiptStore::new(&self.config);
        let installed_tap = store
            .for_formula(name)?
            .into_iter()
            .find_map(|r| r.source.and_then(|s| s.tap));
        if let Some(installed_tap) = installed_tap
            && let Some(found) = candidates.iter().find(|(t, _)| t.name() == installed_tap)
        {
            debug!(formula = %name, tap = %installed_tap, "preferring installed provider");
            return Ok(found.clone());
        }

        let pinned: Vec<_> = candidates.iter().filter(|(t, _)| t.pinned).collect();
        if pinned.len() == 1 {
            return Ok(pinned[0].clone());
        }

        if let Some(core) = candidates.iter().find(|(t, _)| t.is_core()) {
            return Ok(core.clone());
        }

        let mut names: Vec<String> = candidates
            .iter()
            .map(|(t, f)| format!("{}/{}", t.name(), f))
            .collect();
        names.sort();
        Err(Error::AmbiguousFormula {
            name: name.to_string(),
            candidates: names,
        })
    }

    fn unavailable(&self, name: &str, taps: &[Tap]) -> Error {
        let wanted = name.to_lowercase();
        let wanted = wanted.rsplit('/').next().unwrap_or(&wanted);

        let mut scored: Vec<(f64, String)> = taps
            .iter()
            .flat_map(|t| t.formula_names().unwrap_or_default())
            .map(|candidate| (strsim::jaro_winkler(wanted, &candidate), candidate))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.dedup_by(|a, b| a.1 == b.1);

        Error::FormulaUnavailable {
            name: name.to_string(),
            suggestions: scored
                .into_iter()
                .take(MAX_SUGGESTIONS)
                .map(|(_, n)| n)
                .collect(),
        }
    }

    /// Load every formula of the given taps in parallel. Each entry pairs the
    /// qualified name with its load result.
    pub fn load_all(&self, taps: &[Tap]) -> Result<Vec<(String, Result<Formula>)>> {
        let mut files = Vec::new();
        for tap in taps {
            for name in tap.formula_names()? {
                files.push((tap.clone(), name));
            }
        }

        Ok(files
            .into_par_iter()
            .map(|(tap, name)| {
                let result = Formula::load(&tap.formula_file(&name), Some(&tap.name()));
                (format!("{}/{}", tap.name(), name), result)
            })
            .collect())
    }

    /// Resolve every alias of the given taps; each entry pairs the qualified
    /// alias with the formula it points at.
    pub fn check_aliases(&self, taps: &[Tap]) -> Result<Vec<(String, Result<Formula>)>> {
        let mut results = Vec::new();
        for tap in taps {
            for alias in tap.alias_names()? {
                let qualified = format!("{}/{}", tap.name(), alias);
                let result = match tap.resolve_alias(&alias) {
                    Ok(Some(target)) => Formula::load(&tap.formula_file(&target), Some(&tap.name())),
                    Ok(None) => Err(self.unavailable(&alias, taps)),
                    Err(e) => Err(e),
                };
                results.push((qualified, result));
            }
        }
        Ok(results)
    }
}

/// Split `user/repo/name` into (`user/repo`, `name`)
fn split_qualified(name: &str) -> Option<(String, &str)> {
    let parts: Vec<&str> = name.split('/').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    let repo = parts[1].strip_prefix("homebrew-").unwrap_or(parts[1]);
    Some((format!("{}/{}", parts[0], repo), parts[2]))
}
