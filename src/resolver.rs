//! Dependency resolution.
//!
//! Walks the dependency graph depth-first from a requested formula, colouring
//! each node white (unseen), gray (on the current path) or black (finished).
//! Meeting a gray node means the current path loops back on itself and the
//! resolution fails with the cycle spelled out.
//!
//! Nodes are appended to the install order as they finish, so every dependency
//! lands before the formulae that need it and the root is always last:
//!
//! ```text
//!        a            order: d, b, c, a
//!       / \
//!      b   c
//!       \ /
//!        d
//! ```

use crate::error::{Error, Result};
use crate::formula::{DependencyKind, Formula};
use crate::registry::Registry;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Anything that can turn a formula name into a definition
pub trait FormulaSource {
    fn lookup(&self, name: &str) -> Result<Formula>;
}

impl FormulaSource for Registry {
    fn lookup(&self, name: &str) -> Result<Formula> {
        Registry::lookup(self, name)
    }
}

impl FormulaSource for HashMap<String, Formula> {
    fn lookup(&self, name: &str) -> Result<Formula> {
        self.get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::FormulaUnavailable {
                name: name.to_string(),
                suggestions: vec![],
            })
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Follow build-time dependencies
    pub include_build: bool,
    /// Options requested for the root (`with-foo` pulls in optional `foo`)
    pub options: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            include_build: true,
            options: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: DependencyKind,
}

/// Result of one resolution: every reachable formula, the edges between them,
/// and the order they must be installed in.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    root: String,
    nodes: BTreeMap<String, Formula>,
    edges: Vec<Edge>,
    order: Vec<String>,
}

impl DependencyGraph {
    pub fn root(&self) -> &Formula {
        &self.nodes[&self.root]
    }

    pub fn get(&self, name: &str) -> Option<&Formula> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Names in install order (dependencies first, root last)
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Formulae in install order
    pub fn install_order(&self) -> Vec<&Formula> {
        self.order.iter().map(|name| &self.nodes[name]).collect()
    }

    /// Direct dependencies of `name` that made it into the graph
    pub fn dependencies_of(&self, name: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == name).collect()
    }

    /// Everything except the root, in install order
    pub fn dependencies(&self) -> Vec<&Formula> {
        self.order
            .iter()
            .filter(|name| **name != self.root)
            .map(|name| &self.nodes[name])
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

pub struct Resolver<'a, S: FormulaSource> {
    source: &'a S,
    options: ResolveOptions,
}

impl<'a, S: FormulaSource> Resolver<'a, S> {
    pub fn new(source: &'a S, options: ResolveOptions) -> Self {
        Self { source, options }
    }

    pub fn resolve(&self, root: &str) -> Result<DependencyGraph> {
        let root_formula = self.source.lookup(root)?;
        let root_name = root_formula.name.clone();

        let mut walk = Walk {
            source: self.source,
            options: &self.options,
            root: root_name.clone(),
            colors: HashMap::new(),
            aliases: HashMap::new(),
            path: Vec::new(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            order: Vec::new(),
        };
        walk.visit(root_formula)?;

        debug!(root = %root_name, order = ?walk.order, "resolved dependencies");

        Ok(DependencyGraph {
            root: root_name,
            nodes: walk.nodes,
            edges: walk.edges,
            order: walk.order,
        })
    }
}

struct Walk<'a, S: FormulaSource> {
    source: &'a S,
    options: &'a ResolveOptions,
    root: String,
    colors: HashMap<String, Color>,
    /// Requested name → canonical name, so aliases are looked up once
    aliases: HashMap<String, String>,
    path: Vec<String>,
    nodes: BTreeMap<String, Formula>,
    edges: Vec<Edge>,
    order: Vec<String>,
}

impl<S: FormulaSource> Walk<'_, S> {
    fn visit(&mut self, formula: Formula) -> Result<()> {
        let name = formula.name.clone();
        self.colors.insert(name.clone(), Color::Gray);
        self.path.push(name.clone());

        for dep in &formula.dependencies {
            if !self.follows(&name, dep.kind, &dep.name) {
                continue;
            }

            let canonical = match self.aliases.get(&dep.name) {
                Some(canonical) => canonical.clone(),
                None => {
                    let dep_formula = self.source.lookup(&dep.name)?;
                    let canonical = dep_formula.name.clone();
                    self.aliases.insert(dep.name.clone(), canonical.clone());
                    if !self.colors.contains_key(&canonical) {
                        self.edges.push(Edge {
                            from: name.clone(),
                            to: canonical.clone(),
                            kind: dep.kind,
                        });
                        self.visit(dep_formula)?;
                        continue;
                    }
                    canonical
                }
            };

            match self.colors.get(&canonical) {
                Some(Color::Gray) => return Err(self.cycle_error(&canonical)),
                Some(Color::Black) => {
                    self.edges.push(Edge {
                        from: name.clone(),
                        to: canonical,
                        kind: dep.kind,
                    });
                }
                None => {
                    let dep_formula = self.source.lookup(&canonical)?;
                    self.edges.push(Edge {
                        from: name.clone(),
                        to: canonical,
                        kind: dep.kind,
                    });
                    self.visit(dep_formula)?;
                }
            }
        }

        self.path.pop();
        self.colors.insert(name.clone(), Color::Black);
        self.order.push(name.clone());
        self.nodes.insert(name, formula);
        Ok(())
    }

    fn follows(&self, from: &str, kind: DependencyKind, dep: &str) -> bool {
        match kind {
            DependencyKind::Runtime => true,
            DependencyKind::Build => self.options.include_build,
            DependencyKind::Optional => {
                from == self.root && self.options.options.iter().any(|o| {
                    o.trim_start_matches("--").strip_prefix("with-") == Some(dep)
                })
            }
        }
    }

    fn cycle_error(&self, back_to: &str) -> Error {
        let start = self
            .path
            .iter()
            .position(|n| n == back_to)
            .unwrap_or(0);
        let mut cycle: Vec<String> = self.path[start..].to_vec();
        cycle.push(back_to.to_string());
        Error::CyclicDependency { cycle }
    }
}

/// Resolve against the on-disk registry
pub fn resolve(registry: &Registry, root: &str, options: ResolveOptions) -> Result<DependencyGraph> {
    Resolver::new(registry, options).resolve(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Dependency;
    use std::path::PathBuf;

    fn formula(name: &str, deps: &[(&str, DependencyKind)]) -> Formula {
        Formula {
            name: name.to_string(),
            version: "1.0".to_string(),
            url: format!("https://example.com/{}-1.0.tar.gz", name),
            sha256: None,
            desc: None,
            homepage: None,
            dependencies: deps
                .iter()
                .map(|(n, k)| Dependency {
                    name: n.to_string(),
                    kind: *k,
                })
                .collect(),
            options: vec![],
            keg_only: false,
            build_steps: vec![],
            bottles: BTreeMap::new(),
            tap: Some("homebrew/core".to_string()),
            path: PathBuf::new(),
        }
    }

    fn graph(entries: &[(&str, &[&str])]) -> HashMap<String, Formula> {
        entries
            .iter()
            .map(|(name, deps)| {
                let deps: Vec<_> = deps.iter().map(|d| (*d, DependencyKind::Runtime)).collect();
                (name.to_string(), formula(name, &deps))
            })
            .collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_no_dependencies_is_singleton() {
        let source = graph(&[("a", &[])]);
        let resolved = Resolver::new(&source, ResolveOptions::default())
            .resolve("a")
            .unwrap();
        assert_eq!(resolved.order(), ["a"]);
        assert!(resolved.dependencies().is_empty());
    }

    #[test]
    fn test_diamond_dedups_shared_dependency() {
        let source = graph(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        let resolved = Resolver::new(&source, ResolveOptions::default())
            .resolve("a")
            .unwrap();
        let order = resolved.order();

        assert_eq!(order.len(), 4);
        assert_eq!(order.iter().filter(|n| *n == "d").count(), 1);
        assert!(position(order, "d") < position(order, "b"));
        assert!(position(order, "d") < position(order, "c"));
        assert!(position(order, "b") < position(order, "a"));
        assert!(position(order, "c") < position(order, "a"));
        assert_eq!(order.last().map(String::as_str), Some("a"));
        assert_eq!(resolved.edges().len(), 4);
    }

    #[test]
    fn test_cycle_is_named() {
        let source = graph(&[("a", &["b"]), ("b", &["a"])]);
        let err = Resolver::new(&source, ResolveOptions::default())
            .resolve("a")
            .unwrap_err();
        match err {
            Error::CyclicDependency { cycle } => assert_eq!(cycle, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_loop_through_longer_path() {
        let source = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["b"])]);
        let err = Resolver::new(&source, ResolveOptions::default())
            .resolve("a")
            .unwrap_err();
        assert_eq!(err.to_string(), "Dependency cycle detected: b -> c -> b");
    }

    #[test]
    fn test_missing_dependency_fails() {
        let source = graph(&[("a", &["ghost"])]);
        let err = Resolver::new(&source, ResolveOptions::default())
            .resolve("a")
            .unwrap_err();
        assert!(matches!(err, Error::FormulaUnavailable { name, .. } if name == "ghost"));
    }

    #[test]
    fn test_build_dependencies_follow_option() {
        let mut source = HashMap::new();
        source.insert(
            "a".to_string(),
            formula("a", &[("cmake", DependencyKind::Build), ("b", DependencyKind::Runtime)]),
        );
        source.insert("b".to_string(), formula("b", &[]));
        source.insert("cmake".to_string(), formula("cmake", &[]));

        let with_build = Resolver::new(&source, ResolveOptions::default())
            .resolve("a")
            .unwrap();
        assert_eq!(with_build.order(), ["cmake", "b", "a"]);

        let runtime_only = Resolver::new(
            &source,
            ResolveOptions {
                include_build: false,
                options: vec![],
            },
        )
        .resolve("a")
        .unwrap();
        assert_eq!(runtime_only.order(), ["b", "a"]);
    }

    #[test]
    fn test_optional_dependency_only_when_requested_for_root() {
        let mut source = HashMap::new();
        source.insert(
            "a".to_string(),
            formula("a", &[("zlib", DependencyKind::Optional), ("b", DependencyKind::Runtime)]),
        );
        source.insert(
            "b".to_string(),
            formula("b", &[("zlib", DependencyKind::Optional)]),
        );
        source.insert("zlib".to_string(), formula("zlib", &[]));

        let plain = Resolver::new(&source, ResolveOptions::default())
            .resolve("a")
            .unwrap();
        assert_eq!(plain.order(), ["b", "a"]);

        let with_zlib = Resolver::new(
            &source,
            ResolveOptions {
                include_build: true,
                options: vec!["--with-zlib".to_string()],
            },
        )
        .resolve("a")
        .unwrap();
        assert_eq!(with_zlib.order(), ["zlib", "b", "a"]);
    }
}
