//! Missing-dependency audit over install receipts.

use crate::config::Config;
use crate::error::Result;
use crate::receipt::ReceiptStore;
use std::collections::{BTreeMap, BTreeSet};

/// Runtime dependencies recorded by installed formulae that are no longer
/// installed. Sorted and deduplicated. When `only` is non-empty, just those
/// formulae's receipts are checked.
pub fn missing(config: &Config, only: &[String]) -> Result<BTreeSet<String>> {
    Ok(missing_by_formula(config, only)?
        .into_values()
        .flatten()
        .collect())
}

/// Same audit keyed by the formula that records each missing dependency
pub fn missing_by_formula(
    config: &Config,
    only: &[String],
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let store = ReceiptStore::new(config);
    let receipts = store.all()?;
    let installed: BTreeSet<&str> = receipts.iter().map(|r| r.name.as_str()).collect();

    let mut result: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for receipt in &receipts {
        if !only.is_empty() && !only.iter().any(|n| n.eq_ignore_ascii_case(&receipt.name)) {
            continue;
        }
        for dep in &receipt.runtime_dependencies {
            // Tap-qualified names record the bare name in the Cellar
            let bare = dep.full_name.rsplit('/').next().unwrap_or(&dep.full_name);
            if !installed.contains(bare) {
                result
                    .entry(receipt.name.clone())
                    .or_default()
                    .insert(bare.to_string());
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::{InstallReceipt, ReceiptDependency};
    use std::fs;
    use tempfile::TempDir;

    fn receipt(config: &Config, name: &str, runtime: &[&str], build: &[&str]) {
        let keg = config.keg_path(name, "1.0");
        fs::create_dir_all(&keg).unwrap();
        let deps = |names: &[&str]| -> Vec<ReceiptDependency> {
            names
                .iter()
                .map(|n| ReceiptDependency {
                    full_name: n.to_string(),
                    version: "1.0".to_string(),
                })
                .collect()
        };
        InstallReceipt {
            name: name.to_string(),
            version: "1.0".to_string(),
            installed_with: "kettle/test".to_string(),
            used_options: vec![],
            built_as_bottle: false,
            poured_from_bottle: false,
            installed_as_dependency: false,
            installed_on_request: true,
            time: 0,
            runtime_dependencies: deps(runtime),
            build_dependencies: deps(build),
            source: None,
            arch: None,
        }
        .write(&keg)
        .unwrap();
    }

    #[test]
    fn test_reports_missing_runtime_dependencies_sorted() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        receipt(&config, "b", &["zlib", "foo"], &["cmake"]);
        receipt(&config, "c", &["foo"], &[]);

        let missing = missing(&config, &[]).unwrap();
        assert_eq!(missing.into_iter().collect::<Vec<_>>(), vec!["foo", "zlib"]);
    }

    #[test]
    fn test_installed_dependency_is_not_missing() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        receipt(&config, "a", &[], &[]);
        receipt(&config, "b", &["a"], &[]);
        assert!(missing(&config, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_restricted_to_named_formulae() {
        let tmp = TempDir::new().unwrap();
        let config = Config::new(tmp.path());
        receipt(&config, "b", &["x"], &[]);
        receipt(&config, "c", &["y"], &[]);

        let by_formula = missing_by_formula(&config, &["c".to_string()]).unwrap();
        assert_eq!(by_formula.len(), 1);
        assert!(by_formula["c"].contains("y"));
    }
}
