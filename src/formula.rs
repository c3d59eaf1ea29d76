//! Formula definitions and their validated loader.
//!
//! Formulae are plain JSON documents stored in a tap's `Formula/` directory:
//!
//! ```json
//! {
//!   "url": "https://example.com/foo-1.0.tar.gz",
//!   "sha256": "1dfb13ce0f6143fe675b525fc9e168adb2215c5d5965c9f57306bb993170914f",
//!   "dependencies": ["bar", { "name": "cmake", "kind": "build" }],
//!   "build": [["make", "install", "PREFIX={prefix}"]],
//!   "bottle": { "all": { "url": "...", "sha256": "..." } }
//! }
//! ```
//!
//! Loading produces an immutable [`Formula`]; nothing mutates it afterwards.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// How a dependency participates in an install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    #[default]
    Runtime,
    Build,
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyKind,
}

/// Declared build option (`--with-foo` style)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOption {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Bottle file for one platform tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottleFile {
    pub url: String,
    pub sha256: String,
}

/// Something the cache can fetch: a source tarball or a bottle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: Option<String>,
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    Source,
    Bottle { tag: String },
}

/// A loaded, validated formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Formula {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: Option<String>,
    pub desc: Option<String>,
    pub homepage: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub options: Vec<BuildOption>,
    pub keg_only: bool,
    pub build_steps: Vec<Vec<String>>,
    pub bottles: BTreeMap<String, BottleFile>,
    /// Tap this formula was loaded from (`None` for an explicit file path)
    pub tap: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FormulaFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    url: String,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    dependencies: Vec<DependencySpec>,
    #[serde(default)]
    options: Vec<BuildOption>,
    #[serde(default)]
    keg_only: bool,
    #[serde(default)]
    build: Vec<Vec<String>>,
    #[serde(default)]
    bottle: BTreeMap<String, BottleFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencySpec {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        kind: DependencyKind,
    },
}

impl From<DependencySpec> for Dependency {
    fn from(spec: DependencySpec) -> Self {
        match spec {
            DependencySpec::Name(name) => Dependency {
                name: name.to_lowercase(),
                kind: DependencyKind::Runtime,
            },
            DependencySpec::Detailed { name, kind } => Dependency {
                name: name.to_lowercase(),
                kind,
            },
        }
    }
}

impl Formula {
    /// Load and validate a formula file. `tap` names the owning tap, if any.
    pub fn load(path: &Path, tap: Option<&str>) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::InvalidFormula {
                name: path.display().to_string(),
                reason: "file name is not valid UTF-8".to_string(),
            })?
            .to_lowercase();

        let contents = fs::read_to_string(path).map_err(|e| Error::InvalidFormula {
            name: stem.clone(),
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let file: FormulaFile =
            serde_json::from_str(&contents).map_err(|e| Error::InvalidFormula {
                name: stem.clone(),
                reason: e.to_string(),
            })?;

        Self::from_file(file, stem, tap, path)
    }

    fn from_file(file: FormulaFile, stem: String, tap: Option<&str>, path: &Path) -> Result<Self> {
        let name = file.name.map(|n| n.to_lowercase()).unwrap_or(stem);
        let invalid = |reason: String| Error::InvalidFormula {
            name: name.clone(),
            reason,
        };

        if !is_valid_name(&name) {
            return Err(invalid("name must be non-empty [a-z0-9@._+-]".to_string()));
        }
        if file.url.trim().is_empty() {
            return Err(invalid("url is empty".to_string()));
        }

        let version = match file.version {
            Some(v) if !v.trim().is_empty() => v,
            _ => version_from_url(&file.url)
                .ok_or_else(|| invalid(format!("cannot determine version from {}", file.url)))?,
        };

        let sha256 = file.sha256.map(|s| s.to_lowercase());
        if let Some(sum) = &sha256
            && !is_sha256(sum)
        {
            return Err(invalid(format!("malformed sha256 {}", sum)));
        }
        for (tag, bottle) in &file.bottle {
            if !is_sha256(&bottle.sha256.to_lowercase()) {
                return Err(invalid(format!("malformed sha256 for {} bottle", tag)));
            }
        }

        let dependencies: Vec<Dependency> = file.dependencies.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for dep in &dependencies {
            if dep.name == name {
                return Err(invalid("depends on itself".to_string()));
            }
            if !seen.insert(dep.name.as_str()) {
                return Err(invalid(format!("duplicate dependency {}", dep.name)));
            }
        }

        if file.build.iter().any(|step| step.is_empty()) {
            return Err(invalid("empty build step".to_string()));
        }

        Ok(Self {
            name,
            version,
            url: file.url,
            sha256,
            desc: file.desc,
            homepage: file.homepage,
            dependencies,
            options: file.options,
            keg_only: file.keg_only,
            build_steps: file.build,
            bottles: file
                .bottle
                .into_iter()
                .map(|(tag, b)| {
                    (
                        tag,
                        BottleFile {
                            url: b.url,
                            sha256: b.sha256.to_lowercase(),
                        },
                    )
                })
                .collect(),
            tap: tap.map(str::to_string),
            path: path.to_path_buf(),
        })
    }

    /// Fully-qualified `user/repo/name` when loaded from a tap
    pub fn full_name(&self) -> String {
        match &self.tap {
            Some(tap) if tap != crate::tap::CORE_TAP => format!("{}/{}", tap, self.name),
            _ => self.name.clone(),
        }
    }

    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Runtime)
    }

    /// Bottle for `tag`, falling back to a platform-independent `all` bottle
    pub fn bottle_for(&self, tag: &str) -> Option<(&str, &BottleFile)> {
        self.bottles
            .get_key_value(tag)
            .or_else(|| self.bottles.get_key_value("all"))
            .map(|(t, b)| (t.as_str(), b))
    }

    pub fn source_artifact(&self) -> Artifact {
        Artifact {
            name: self.name.clone(),
            version: self.version.clone(),
            url: self.url.clone(),
            sha256: self.sha256.clone(),
            kind: ArtifactKind::Source,
        }
    }

    pub fn bottle_artifact(&self, tag: &str) -> Option<Artifact> {
        self.bottle_for(tag).map(|(tag, bottle)| Artifact {
            name: self.name.clone(),
            version: self.version.clone(),
            url: bottle.url.clone(),
            sha256: Some(bottle.sha256.clone()),
            kind: ArtifactKind::Bottle {
                tag: tag.to_string(),
            },
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "@._+-".contains(c))
}

fn is_sha256(sum: &str) -> bool {
    sum.len() == 64 && sum.chars().all(|c| c.is_ascii_hexdigit())
}

/// Archive extension of a URL's file name, e.g. `.tar.gz`
pub fn archive_extension(url: &str) -> String {
    let file = url_file_name(url);
    const KNOWN: &[&str] = &[
        ".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tbz", ".tbz2", ".txz", ".tar", ".zip",
    ];
    for ext in KNOWN {
        if file.ends_with(ext) {
            return ext.to_string();
        }
    }
    match file.rfind('.') {
        Some(pos) if pos > 0 => file[pos..].to_string(),
        _ => String::new(),
    }
}

fn url_file_name(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
}

/// Guess a version from a URL file name: `foo-1.2.3.tar.gz` → `1.2.3`
pub fn version_from_url(url: &str) -> Option<String> {
    let file = url_file_name(url);
    let stem = file.strip_suffix(&archive_extension(url)).unwrap_or(file);

    let candidate = stem
        .rsplit_once('-')
        .map(|(_, v)| v)
        .or_else(|| stem.rsplit_once('_').map(|(_, v)| v))
        .unwrap_or(stem);
    let candidate = candidate.strip_prefix('v').unwrap_or(candidate);

    if candidate.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        Some(candidate.to_string())
    } else {
        None
    }
}
