use anyhow::Result;
use bindery_core::{
    CleanReport, CoreError, Manifest, PipelineOptions, RoutePlan, RouteStats, clean_tree,
    compute_routes, run_build, run_clean, run_install, run_pipeline, run_test,
};
use clap::{Parser, Subcommand};
use console::{Term, style};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod template;

/// bindery - packaging pipeline driver
///
/// Drives clean/build/test/install of a source tree and routes the build
/// artifacts into output bundles, as declared in rules.lua.
#[derive(Parser)]
#[command(name = "bindery")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: clean, build, test, install
    Run {
        /// Path to the rules file (default: rules.lua)
        #[arg(default_value = "rules.lua")]
        config: PathBuf,

        /// Skip the test stage
        #[arg(long)]
        no_test: bool,
    },

    /// Run the clean stage and sweep derived artifacts
    Clean {
        /// Path to the rules file (default: rules.lua)
        #[arg(default_value = "rules.lua")]
        config: PathBuf,

        /// Show what would be removed without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the build stage, then docs/man generation
    Build {
        /// Path to the rules file (default: rules.lua)
        #[arg(default_value = "rules.lua")]
        config: PathBuf,
    },

    /// Run the test stage with its declared environment
    Test {
        /// Path to the rules file (default: rules.lua)
        #[arg(default_value = "rules.lua")]
        config: PathBuf,
    },

    /// Route build artifacts into their bundles
    Install {
        /// Path to the rules file (default: rules.lua)
        #[arg(default_value = "rules.lua")]
        config: PathBuf,
    },

    /// Show the routing plan without copying anything
    Plan {
        /// Path to the rules file (default: rules.lua)
        #[arg(default_value = "rules.lua")]
        config: PathBuf,

        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scaffold a new rules.lua
    Init {
        /// Directory to initialize (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show platform and version information
    Status,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .without_time()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, no_test } => cmd_run(&config, no_test),
        Commands::Clean { config, dry_run } => cmd_clean(&config, dry_run, cli.verbose),
        Commands::Build { config } => cmd_build(&config),
        Commands::Test { config } => cmd_test(&config),
        Commands::Install { config } => cmd_install(&config),
        Commands::Plan { config, json } => cmd_plan(&config, json, cli.verbose),
        Commands::Init { path } => cmd_init(&path),
        Commands::Status => cmd_status(),
    }
}

/// Load and validate the manifest, or exit with a styled error
fn load_manifest(term: &Term, config: &Path) -> Result<Manifest> {
    if !config.exists() {
        term.write_line(&format!(
            "{} Rules file not found: {}",
            style("error:").red().bold(),
            config.display()
        ))?;
        std::process::exit(1);
    }

    term.write_line(&format!(
        "{} Evaluating {}",
        style("::").cyan().bold(),
        config.display()
    ))?;

    match Manifest::from_config(config) {
        Ok(m) => Ok(m),
        Err(e) => {
            term.write_line(&format!(
                "{} Failed to evaluate rules: {}",
                style("error:").red().bold(),
                e
            ))?;
            std::process::exit(1);
        }
    }
}

/// Report a failed operation and exit with the propagated code
fn fail(term: &Term, e: CoreError) -> ! {
    let _ = term.write_line(&format!("{} {}", style("error:").red().bold(), e));
    std::process::exit(e.exit_code());
}

fn cmd_run(config: &Path, no_test: bool) -> Result<()> {
    let term = Term::stderr();
    let manifest = load_manifest(&term, config)?;

    let options = PipelineOptions { skip_test: no_test };

    let report = match run_pipeline(&manifest, &options) {
        Ok(r) => r,
        Err(e) => fail(&term, e),
    };

    term.write_line(&format!(
        "{} Pipeline complete for '{}'",
        style("::").green().bold(),
        manifest.project.name
    ))?;
    term.write_line(&format!(
        "  Derived removed: {}",
        report.cleaned.derived_removed
    ))?;
    term.write_line(&format!(
        "  Tested:          {}",
        if report.tested { "yes" } else { "skipped" }
    ))?;
    print_route_stats(&term, &report.installed)?;

    Ok(())
}

fn cmd_clean(config: &Path, dry_run: bool, verbose: bool) -> Result<()> {
    let term = Term::stderr();
    let manifest = load_manifest(&term, config)?;

    let result = if dry_run {
        // Dry run never touches the tree, so the external clean command
        // is skipped along with the deletions
        clean_tree(&manifest.root, &manifest.derived, &manifest.scrub, true)
    } else {
        run_clean(&manifest)
    };

    let report = match result {
        Ok(r) => r,
        Err(e) => fail(&term, e),
    };

    print_clean_report(&term, &report, dry_run, verbose)?;

    Ok(())
}

fn cmd_build(config: &Path) -> Result<()> {
    let term = Term::stderr();
    let manifest = load_manifest(&term, config)?;

    if let Err(e) = run_build(&manifest) {
        fail(&term, e);
    }

    term.write_line(&format!("{} Build complete", style("::").green().bold()))?;

    Ok(())
}

fn cmd_test(config: &Path) -> Result<()> {
    let term = Term::stderr();
    let manifest = load_manifest(&term, config)?;

    if let Err(e) = run_test(&manifest) {
        fail(&term, e);
    }

    term.write_line(&format!("{} Tests passed", style("::").green().bold()))?;

    Ok(())
}

fn cmd_install(config: &Path) -> Result<()> {
    let term = Term::stderr();
    let manifest = load_manifest(&term, config)?;

    let stats = match run_install(&manifest) {
        Ok(s) => s,
        Err(e) => fail(&term, e),
    };

    term.write_line(&format!(
        "{} Install complete",
        style("::").green().bold()
    ))?;
    print_route_stats(&term, &stats)?;

    Ok(())
}

fn cmd_plan(config: &Path, json: bool, verbose: bool) -> Result<()> {
    let term = Term::stderr();
    let manifest = load_manifest(&term, config)?;

    let plan = match compute_routes(&manifest.root, &manifest.bundles) {
        Ok(p) => p,
        Err(e) => fail(&term, e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if plan.is_empty() {
        term.write_line(&format!(
            "{} Nothing to install",
            style("::").cyan().bold()
        ))?;
        return Ok(());
    }

    print_plan(&term, &plan, verbose)?;

    term.write_line("")?;
    term.write_line(&format!(
        "{} Would copy {} file(s)",
        style("::").cyan().bold(),
        plan.copy_count()
    ))?;

    Ok(())
}

fn cmd_init(path: &Path) -> Result<()> {
    let term = Term::stderr();

    let rules_path = path.join("rules.lua");
    if rules_path.exists() {
        term.write_line(&format!(
            "{} {} already exists",
            style("error:").red().bold(),
            rules_path.display()
        ))?;
        std::process::exit(1);
    }

    std::fs::create_dir_all(path)?;
    std::fs::write(&rules_path, template::RULES_LUA_TEMPLATE)?;

    term.write_line(&format!(
        "{} Initialized packaging rules at {}",
        style("::").green().bold(),
        rules_path.display()
    ))?;

    Ok(())
}

fn cmd_status() -> Result<()> {
    let term = Term::stderr();
    let platform = bindery_platform::PlatformInfo::current();

    term.write_line(&format!(
        "{} bindery v{}",
        style("::").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    ))?;
    term.write_line("")?;
    term.write_line(&format!("  Platform: {}", platform.platform))?;
    term.write_line(&format!("  OS:       {}", platform.os.as_str()))?;
    term.write_line(&format!("  Arch:     {}", platform.arch.as_str()))?;
    term.write_line(&format!("  User:     {}", platform.username))?;
    term.write_line(&format!("  Hostname: {}", platform.hostname))?;

    Ok(())
}

fn print_plan(term: &Term, plan: &RoutePlan, verbose: bool) -> Result<()> {
    for purge in &plan.purges {
        term.write_line(&format!(
            "  {} {} {}",
            style("-").red().bold(),
            purge.path.display(),
            style(format!("({}: purge)", purge.bundle)).dim()
        ))?;
    }

    for copy in &plan.copies {
        let symbol = if copy.missing {
            style("!").yellow().bold()
        } else {
            style("+").green().bold()
        };

        term.write_line(&format!(
            "  {} {} {}",
            symbol,
            copy.source.display(),
            style(format!("({}: {})", copy.bundle, copy.description())).dim()
        ))?;

        if verbose && !copy.missing {
            term.write_line(&format!("      {}", style(copy.dest.display()).dim()))?;
        }
    }

    for keep in &plan.keeps {
        term.write_line(&format!(
            "  {} {} {}",
            style("~").yellow().bold(),
            keep.root.display(),
            style(format!("({}: keep only '{}')", keep.bundle, keep.pattern)).dim()
        ))?;
    }

    Ok(())
}

fn print_clean_report(
    term: &Term,
    report: &CleanReport,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let heading = if dry_run {
        "Clean (dry run)"
    } else {
        "Clean complete"
    };

    term.write_line(&format!("{} {}", style("::").green().bold(), heading))?;
    term.write_line(&format!(
        "  Derived removed: {}",
        report.stats.derived_removed
    ))?;
    term.write_line(&format!("  Dirs scrubbed:   {}", report.stats.dirs_scrubbed))?;
    term.write_line(&format!("  Bytes freed:     {}", report.stats.bytes_freed))?;

    if verbose {
        for path in &report.removed_paths {
            term.write_line(&format!("      {}", style(path.display()).dim()))?;
        }
    }

    Ok(())
}

fn print_route_stats(term: &Term, stats: &RouteStats) -> Result<()> {
    term.write_line(&format!("  Files copied:    {}", stats.files_copied))?;
    term.write_line(&format!("  Trees purged:    {}", stats.trees_purged))?;
    term.write_line(&format!("  Files pruned:    {}", stats.files_pruned))?;

    Ok(())
}
