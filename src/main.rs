mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use kettle::{Config, InstallOptions, PruneScope};

#[derive(Parser)]
#[command(name = "kettle")]
#[command(author, version, about = "A dependency-resolving package manager for formulae and bottles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print the install prefix, or the keg a formula installs into
    #[arg(long, num_args = 0..=1, value_name = "FORMULA")]
    prefix: Option<Option<String>>,

    /// Print the Cellar, or a formula's directory inside it
    #[arg(long, num_args = 0..=1, value_name = "FORMULA")]
    cellar: Option<Option<String>>,

    /// Print the download cache, or where a formula's download is kept
    #[arg(long, num_args = 0..=1, value_name = "FORMULA")]
    cache: Option<Option<String>>,

    /// Print the repository, or the checkout of a tap
    #[arg(long, num_args = 0..=1, value_name = "TAP")]
    repository: Option<Option<String>>,

    /// Print the build environment
    #[arg(long)]
    env: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install formulae and their dependencies
    Install {
        /// Formula names or paths to formula files
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Reinstall even if this version is already installed
        #[arg(long)]
        force: bool,

        /// Compile from source even if a bottle is available
        #[arg(short = 's', long)]
        build_from_source: bool,

        /// Build from source, preparing the result for bottling
        #[arg(long)]
        build_bottle: bool,

        /// Install from a bottle or fail
        #[arg(long)]
        force_bottle: bool,

        /// Enable an optional dependency (repeatable)
        #[arg(long = "with", value_name = "DEP")]
        with: Vec<String>,

        /// Leave the keg unlinked
        #[arg(long)]
        no_link: bool,
    },

    /// Uninstall formulae
    #[command(alias = "remove", alias = "rm")]
    Uninstall {
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Ignore dependents and remove every installed version
        #[arg(short, long)]
        force: bool,
    },

    /// Upgrade outdated formulae (all of them if none are named)
    Upgrade {
        formulae: Vec<String>,

        /// Compile from source even if a bottle is available
        #[arg(short = 's', long)]
        build_from_source: bool,
    },

    /// Remove superseded versions and stale downloads
    Cleanup {
        /// Restrict version cleanup to these formulae
        formulae: Vec<String>,

        /// Also remove a linked version that is not the newest
        #[arg(long)]
        force: bool,

        /// Which downloads to prune: `stale` or `all`
        #[arg(long, default_value = "stale", value_name = "SCOPE")]
        prune: PruneScope,

        /// Show what would be removed without removing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Print dependencies recorded as installed but missing from the Cellar
    Missing {
        formulae: Vec<String>,
    },

    /// List installed formulae
    #[command(alias = "ls")]
    List {
        /// Show every installed version
        #[arg(long)]
        versions: bool,
    },

    /// Show the install order of a formula's dependencies
    Deps {
        formula: String,

        /// Include build-time dependencies
        #[arg(long)]
        include_build: bool,
    },

    /// Download artifacts into the cache without installing
    Fetch {
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Fetch the source archive even if a bottle is available
        #[arg(short = 's', long)]
        build_from_source: bool,
    },

    /// Symlink an installed keg into the prefix
    #[command(alias = "ln")]
    Link {
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Link keg-only formulae
        #[arg(long)]
        force: bool,
    },

    /// Remove a formula's symlinks from the prefix
    Unlink {
        #[arg(required = true)]
        formulae: Vec<String>,
    },

    /// Pack installed formulae into bottle archives in the current directory
    Bottle {
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Overwrite an existing bottle instead of numbering a rebuild
        #[arg(long)]
        no_revision: bool,
    },

    /// List taps, or tap a new formula repository
    Tap {
        /// Tap name (user/repo)
        tap: Option<String>,

        /// Git URL to clone instead of the GitHub default
        url: Option<String>,

        /// List official taps
        #[arg(long, conflicts_with_all = ["tap", "list_pinned"])]
        list_official: bool,

        /// List pinned taps
        #[arg(long, conflicts_with = "tap")]
        list_pinned: bool,
    },

    /// Remove a tap
    Untap {
        #[arg(required = true)]
        taps: Vec<String>,
    },

    /// Give a tap's formulae precedence over core
    TapPin {
        #[arg(required = true)]
        taps: Vec<String>,
    },

    /// Remove a tap's pin
    TapUnpin {
        #[arg(required = true)]
        taps: Vec<String>,
    },

    /// Show information about taps
    TapInfo {
        taps: Vec<String>,

        /// Show every installed tap
        #[arg(long)]
        installed: bool,

        /// Print JSON (only `v1` is supported)
        #[arg(long, value_name = "VERSION")]
        json: Option<String>,
    },

    /// Load every formula in the installed taps, failing on any error
    Readall {
        /// Limit to one tap
        tap: Option<String>,

        /// Also resolve every alias
        #[arg(long)]
        aliases: bool,

        /// Check JSON syntax of every formula file first
        #[arg(long)]
        syntax: bool,
    },

    /// Check the system for potential problems
    #[command(alias = "dr")]
    Doctor {
        /// Run only these checks
        checks: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    commands::init_colors();

    let config = Config::from_env();

    if let Err(e) = run(cli, &config).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &Config) -> kettle::Result<()> {
    let Some(command) = cli.command else {
        if let Some(formula) = cli.prefix {
            return commands::prefix(config, formula.as_deref());
        }
        if let Some(formula) = cli.cellar {
            return commands::cellar(config, formula.as_deref());
        }
        if let Some(formula) = cli.cache {
            return commands::cache(config, formula.as_deref());
        }
        if let Some(tap) = cli.repository {
            return commands::repository(config, tap.as_deref());
        }
        if cli.env {
            return commands::env(config);
        }
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Install {
            formulae,
            force,
            build_from_source,
            build_bottle,
            force_bottle,
            with,
            no_link,
        } => {
            let options = InstallOptions {
                force,
                build_from_source,
                build_bottle,
                force_bottle,
                options: with.iter().map(|dep| format!("with-{}", dep)).collect(),
                no_link,
            };
            commands::install(config, &formulae, &options).await
        }
        Commands::Uninstall { formulae, force } => {
            commands::uninstall(config, &formulae, force).await
        }
        Commands::Upgrade {
            formulae,
            build_from_source,
        } => {
            let options = InstallOptions {
                build_from_source,
                ..Default::default()
            };
            commands::upgrade(config, &formulae, &options).await
        }
        Commands::Cleanup {
            formulae,
            force,
            prune,
            dry_run,
        } => {
            let options = kettle::CleanupOptions {
                force,
                prune,
                dry_run,
                formulae,
            };
            commands::cleanup(config, &options)
        }
        Commands::Missing { formulae } => commands::missing(config, &formulae),
        Commands::List { versions } => commands::list(config, versions),
        Commands::Deps {
            formula,
            include_build,
        } => commands::deps(config, &formula, include_build),
        Commands::Fetch {
            formulae,
            build_from_source,
        } => {
            let options = InstallOptions {
                build_from_source,
                ..Default::default()
            };
            commands::fetch(config, &formulae, &options).await
        }
        Commands::Link { formulae, force } => commands::link(config, &formulae, force),
        Commands::Unlink { formulae } => commands::unlink(config, &formulae),
        Commands::Bottle {
            formulae,
            no_revision,
        } => commands::bottle(config, &formulae, no_revision),
        Commands::Tap {
            tap,
            url,
            list_official,
            list_pinned,
        } => {
            if list_official {
                commands::list_official_taps()
            } else if list_pinned {
                commands::list_pinned_taps(config)
            } else {
                commands::tap(config, tap.as_deref(), url.as_deref())
            }
        }
        Commands::Untap { taps } => commands::untap(config, &taps),
        Commands::TapPin { taps } => commands::tap_pin(config, &taps),
        Commands::TapUnpin { taps } => commands::tap_unpin(config, &taps),
        Commands::TapInfo {
            taps,
            installed,
            json,
        } => commands::tap_info(config, &taps, installed, json.as_deref()),
        Commands::Readall {
            tap,
            aliases,
            syntax,
        } => commands::readall(config, tap.as_deref(), aliases, syntax),
        Commands::Doctor { checks } => commands::doctor(config, &checks),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "kettle", &mut std::io::stdout());
            Ok(())
        }
    }
}
