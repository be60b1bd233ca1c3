//! nomad-reconcile CLI entrypoint.
//!
//! This is the main entrypoint for the nomad-reconcile command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use nomad_reconcile::cli::{Cli, Commands, OutputFormatter, StateCommands};
use nomad_reconcile::config::{
    find_config_file, ConfigParser, ConfigValidator, ManifestConfig, DEFAULT_STATE_DIR,
};
use nomad_reconcile::error::{NomadReconcileError, Result};
use nomad_reconcile::listing::{ListingKind, ListingProjector};
use nomad_reconcile::nomad::NomadClient;
use nomad_reconcile::planner::{ApplyPlan, PlanExecutor};
use nomad_reconcile::resource::ResourceKind;
use nomad_reconcile::state::{
    generate_holder_id, state_key, HistoryEntry, LocalStateStore, ReconcileState, StateOperation,
    StateStore,
};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan { refresh } => cmd_plan(config, refresh, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
            refresh,
        } => cmd_apply(config, yes, continue_on_error, refresh, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config, yes, &formatter).await,
        Commands::Import {
            kind,
            handle,
            identity,
        } => cmd_import(config, kind, &handle, &identity, &formatter).await,
        Commands::Show { show_sensitive } => cmd_show(config, show_sensitive, &formatter).await,
        Commands::List { kind } => cmd_list(config, kind, &formatter).await,
        Commands::State { command } => cmd_state(config, command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing nomad-reconcile project in: {}", path.display());

    let config_path = path.join("nomad-reconcile.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Manifest already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/nomad-reconcile.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    let state_entry = format!("{DEFAULT_STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let has_env = existing.lines().any(|l| l.trim() == ".env");
        let has_state = existing.contains(DEFAULT_STATE_DIR);
        if !has_env || !has_state {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# nomad-reconcile")?;
            if !has_env {
                writeln!(file, ".env")?;
            }
            if !has_state {
                writeln!(file, "{state_entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized.");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set NOMAD_TOKEN");
    eprintln!("  2. Edit nomad-reconcile.yaml");
    eprintln!("  3. Run 'nomad-reconcile validate'");
    eprintln!("  4. Run 'nomad-reconcile plan', then 'nomad-reconcile apply'");

    Ok(())
}

/// Validate the manifest.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating manifest: {}", config_file.display());

    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let manifest = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&manifest);
    println!("{}", formatter.format_validation(&result, show_warnings));

    if !result.is_valid() {
        return Err(NomadReconcileError::internal(format!(
            "{} validation error(s)",
            result.error_count()
        )));
    }

    eprintln!("Manifest summary:");
    eprintln!("  Cluster: {}", manifest.cluster.address);
    for kind in ResourceKind::ALL {
        eprintln!("  {kind}: {}", manifest.handles(kind).len());
    }
    Ok(())
}

/// Show what apply would change.
async fn cmd_plan(config_path: Option<&Path>, refresh: bool, formatter: &OutputFormatter) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let state = ctx.load_state().await?;

    let observed = if refresh {
        let client = ctx.client()?;
        Some(ctx.executor(&client).refresh(&state).await?)
    } else {
        None
    };

    let plan = ApplyPlan::build(&ctx.manifest.entries(), &state, observed.as_ref());
    println!("{}", formatter.format_plan(&plan));
    Ok(())
}

/// Converge the cluster onto the manifest.
async fn cmd_apply(
    config_path: Option<&Path>,
    auto_approve: bool,
    continue_on_error: bool,
    refresh: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let client = ctx.client()?;
    let executor = ctx.executor(&client).with_continue_on_error(continue_on_error);

    ctx.locked(async {
        let mut state = ctx.load_state().await?;
        let observed = if refresh {
            Some(executor.refresh(&state).await?)
        } else {
            None
        };

        let plan = ApplyPlan::build(&ctx.manifest.entries(), &state, observed.as_ref());
        if plan.is_empty() {
            formatter.success("No changes to apply.");
            return Ok(());
        }

        println!("{}", formatter.format_plan(&plan));
        if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
            eprintln!("Apply cancelled.");
            return Ok(());
        }

        let result = executor.execute(&plan, &mut state, StateOperation::Apply).await;
        ctx.store.save(&state).await?;
        println!("{}", formatter.format_execution(&result));

        if result.all_successful() {
            Ok(())
        } else {
            Err(NomadReconcileError::internal(format!(
                "apply did not complete: {} failed, {} skipped",
                result.failed, result.skipped
            )))
        }
    })
    .await
}

/// Delete every recorded resource.
async fn cmd_destroy(config_path: Option<&Path>, auto_approve: bool, formatter: &OutputFormatter) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let client = ctx.client()?;
    let executor = ctx.executor(&client);

    ctx.locked(async {
        let mut state = ctx.load_state().await?;
        let plan = ApplyPlan::destroy(&state);
        if plan.is_empty() {
            formatter.success("Nothing recorded, nothing to destroy.");
            return Ok(());
        }

        println!("{}", formatter.format_plan(&plan));
        if !auto_approve
            && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")?
        {
            eprintln!("Destroy cancelled.");
            return Ok(());
        }

        let result = executor.execute(&plan, &mut state, StateOperation::Destroy).await;
        ctx.store.save(&state).await?;
        println!("{}", formatter.format_execution(&result));

        if result.all_successful() {
            Ok(())
        } else {
            Err(NomadReconcileError::internal(format!(
                "destroy did not complete: {} failed, {} skipped",
                result.failed, result.skipped
            )))
        }
    })
    .await
}

/// Adopt an existing object into the state.
async fn cmd_import(
    config_path: Option<&Path>,
    kind: ResourceKind,
    handle: &str,
    identity: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let client = ctx.client()?;
    let executor = ctx.executor(&client);

    ctx.locked(async {
        let mut state = ctx.load_state().await?;
        if let Some(existing) = state.get(kind, handle) {
            return Err(NomadReconcileError::internal(format!(
                "{} is already recorded as '{}'; forget it first",
                state_key(kind, handle),
                existing.identity
            )));
        }

        executor.import(kind, handle, identity, &mut state).await?;
        ctx.store.save(&state).await?;

        let snapshot = state.get(kind, handle).map(|r| r.to_remote());
        println!(
            "{}",
            formatter.format_remote(&[(state_key(kind, handle), snapshot)], false)
        );
        formatter.success(&format!("Imported {kind} '{identity}' as '{handle}'"));
        if !ctx.manifest.handles(kind).contains(&handle) {
            formatter.warning(&format!(
                "'{handle}' is not declared in the manifest; the next apply will delete it"
            ));
        }
        Ok(())
    })
    .await
}

/// Read recorded resources back from the cluster.
async fn cmd_show(config_path: Option<&Path>, show_sensitive: bool, formatter: &OutputFormatter) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let client = ctx.client()?;
    let state = ctx.load_state().await?;

    let observed = ctx.executor(&client).refresh(&state).await?;
    let snapshots: Vec<_> = observed.into_iter().collect();
    println!("{}", formatter.format_remote(&snapshots, show_sensitive));
    Ok(())
}

/// Print a read-only cluster listing.
async fn cmd_list(config_path: Option<&Path>, kind: ListingKind, formatter: &OutputFormatter) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let client = ctx.client()?;

    let listing = ListingProjector::new(&client).project(kind).await?;
    println!("{}", formatter.format_listing(&listing));
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let ctx = Context::load(config_path)?;

    match command {
        StateCommands::Show => {
            if let Some(state) = ctx.store.load().await? {
                println!("{}", formatter.format_state(&state, false));
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::LockInfo => {
            let lock = ctx.store.get_lock_info().await?;
            println!("{}", formatter.format_lock(lock.as_ref()));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock_info) = ctx.store.get_lock_info().await? {
                    ctx.store.release_lock(&lock_info.lock_id).await?;
                    formatter.warning(&format!("Lock held by {} forcefully released.", lock_info.holder));
                }
            } else if let Some(id) = lock_id {
                ctx.store.release_lock(&id).await?;
                formatter.success("State unlocked.");
            } else {
                formatter.error("Please provide --lock-id or use --force");
            }
        }
        StateCommands::Forget { kind, handle } => {
            ctx.locked(async {
                let mut state = ctx.load_state().await?;
                let Some(record) = state.remove(kind, &handle) else {
                    return Err(NomadReconcileError::internal(format!(
                        "{} is not recorded",
                        state_key(kind, &handle)
                    )));
                };
                state.add_history(HistoryEntry::new(
                    StateOperation::Forget,
                    vec![state_key(kind, &handle)],
                ));
                ctx.store.save(&state).await?;
                formatter.success(&format!(
                    "Forgot {kind} '{}'; the object is left on the cluster",
                    record.identity
                ));
                Ok(())
            })
            .await?;
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// A loaded, validated manifest and the state store next to it.
struct Context {
    manifest: ManifestConfig,
    store: LocalStateStore,
}

impl Context {
    /// Loads `.env`, the manifest with environment overrides, and validates it.
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = resolve_config_path(config_path)?;
        debug!("Loading manifest from: {}", config_file.display());

        let parser = parser_for(&config_file);
        parser.load_dotenv()?;
        let manifest = parser.load_with_env(&config_file)?;

        let result = ConfigValidator::new().validate(&manifest)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        let state_dir = PathBuf::from(&manifest.state.path);
        let state_dir = if state_dir.is_absolute() {
            state_dir
        } else {
            base_dir(&config_file).join(state_dir)
        };

        Ok(Self {
            manifest,
            store: LocalStateStore::with_base_dir(state_dir),
        })
    }

    /// Creates the Nomad client from the manifest and `NOMAD_TOKEN`.
    fn client(&self) -> Result<NomadClient> {
        let cluster = &self.manifest.cluster;
        let token = ConfigParser::nomad_token();
        if token.is_none() {
            warn!("NOMAD_TOKEN is not set; requests are sent anonymously");
        }
        Ok(
            NomadClient::with_timeout(&cluster.address, token.as_deref(), cluster.timeout_secs)?
                .with_region(cluster.region.as_deref()),
        )
    }

    fn executor<'a>(&self, client: &'a NomadClient) -> PlanExecutor<'a, NomadClient> {
        PlanExecutor::new(client).with_retry(self.manifest.retry.to_policy())
    }

    /// Loads the recorded state, or starts an empty one.
    async fn load_state(&self) -> Result<ReconcileState> {
        let address = &self.manifest.cluster.address;
        match self.store.load().await? {
            Some(state) => {
                if state.cluster != *address {
                    warn!(
                        "State was recorded against {} but the manifest targets {address}",
                        state.cluster
                    );
                }
                Ok(state)
            }
            None => Ok(ReconcileState::new(address)),
        }
    }

    /// Runs `work` while holding the state lock, releasing it afterwards.
    async fn locked<T>(&self, work: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let lock = self.store.acquire_lock(&generate_holder_id()).await?;
        let result = work.await;
        if let Err(e) = self.store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock {}: {e}", lock.lock_id);
        }
        result
    }
}

/// Resolves the manifest path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))
}

fn base_dir(config_file: &Path) -> &Path {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn parser_for(config_file: &Path) -> ConfigParser {
    ConfigParser::new().with_base_path(base_dir(config_file))
}

/// Asks for confirmation on stderr; true if the answer matches `expected`.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}
