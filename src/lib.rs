//! kettle - a dependency-resolving package manager for formulae and bottles.
//!
//! The engine is usable in-process; the `kettle` binary is a thin CLI over
//! [`PackageManager`]:
//!
//! ```text
//! name ─► Registry ─► Resolver ─► for each formula in order:
//!                                   CacheManager ─► Installer ─► Receipt ─► Linker
//! ```
//!
//! All filesystem locations come from a [`Config`] built once by the caller.

pub mod audit;
pub mod bottle;
pub mod builder;
pub mod cache;
pub mod cellar;
pub mod cleanup;
pub mod config;
pub mod doctor;
pub mod download;
pub mod error;
pub mod extract;
pub mod formula;
pub mod installer;
pub mod lock;
pub mod package_manager;
pub mod platform;
pub mod receipt;
pub mod registry;
pub mod resolver;
pub mod symlink;
pub mod tap;
pub mod uninstall;

pub use cache::{CacheEntry, CacheManager, PruneScope};
pub use cleanup::{CleanupOptions, CleanupReport};
pub use config::Config;
pub use error::{Error, Result};
pub use formula::{Dependency, DependencyKind, Formula};
pub use installer::{InstallOptions, InstallOutcome, InstallState, Installer};
pub use package_manager::{OutdatedPackage, PackageManager, UpgradeResult};
pub use receipt::{InstallReceipt, ReceiptStore};
pub use registry::Registry;
pub use resolver::{DependencyGraph, ResolveOptions, Resolver};
pub use symlink::{Linker, normalize_path};
pub use uninstall::UninstallReport;
