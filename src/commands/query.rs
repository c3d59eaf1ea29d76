use crate::commands::package_manager;
use kettle::{Config, ResolveOptions, Result};

/// Print `formula`'s dependencies in the order they would be installed
pub fn deps(config: &Config, formula: &str, include_build: bool) -> Result<()> {
    let pm = package_manager(config);
    let options = ResolveOptions {
        include_build,
        ..Default::default()
    };

    let graph = pm.resolve(formula, options)?;
    for dep in graph.dependencies() {
        println!("{}", dep.name);
    }
    Ok(())
}
