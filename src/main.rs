use std::path::{Path, PathBuf};

/// Reset SIGPIPE to default behavior so piping (e.g. `miniform output | jq`) exits
/// cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

mod address;
mod ast;
mod datasource;
mod error;
mod executor;
mod graph;
mod lexer;
mod loader;
mod parser;
mod planner;
mod provider;
mod resolver;
mod scope;
mod state;

use executor::Executor;
use planner::PlanAction;
use provider::ProviderRegistry;
use state::{CurrentState, StateStore};

/// miniform - a miniature infrastructure-as-code engine
#[derive(Parser)]
#[command(name = "miniform", version, about, long_about = None)]
struct Cli {
    /// Path to the root config directory (must contain main.mini)
    #[arg(short, long, default_value = ".")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Working directory for .miniform state
    #[arg(short, long, default_value = ".")]
    working_dir: String,

    /// Maximum parallelism within a single execution layer
    #[arg(short, long, default_value = "8")]
    parallelism: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the working directory and an empty state file
    Init,

    /// Parse and load the configuration without planning
    Validate {
        /// Config path override
        path: Option<String>,
    },

    /// Show the execution plan (create/update/delete)
    Plan {
        /// Write the plan to a file for later `apply`
        #[arg(long)]
        out: Option<String>,
    },

    /// Apply a plan (recomputing it first, or from a saved plan file)
    Apply {
        /// A plan file produced by `plan --out`
        plan_file: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print root module outputs
    Output {
        #[arg(long)]
        json: bool,

        #[arg(long)]
        state: Option<String>,
    },

    /// Inspect or manage state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// List all resources tracked in state
    List,
    /// Show the full record for one resource
    Show { address: String },
    /// Rename a resource's address in state without touching real infrastructure
    Mv { source: String, destination: String },
    /// Remove a resource from state without destroying it
    Rm { address: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct PlanFile {
    version: u32,
    timestamp: String,
    #[serde(rename = "configHash")]
    config_hash: String,
    actions: Vec<PlanAction>,
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Init => cmd_init(&cli).await,
        Commands::Validate { path } => cmd_validate(&cli, path.as_deref()).await,
        Commands::Plan { out } => cmd_plan(&cli, out.as_deref()).await,
        Commands::Apply { plan_file, yes } => cmd_apply(&cli, plan_file.as_deref(), *yes).await,
        Commands::Output { json, state } => cmd_output(&cli, *json, state.as_deref()).await,
        Commands::State { command } => cmd_state(&cli, command).await,
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn root_dir(cli: &Cli) -> PathBuf {
    PathBuf::from(&cli.config)
}

fn store_for(cli: &Cli) -> StateStore {
    StateStore::default_location(&cli.working_dir)
}

fn executor_for(cli: &Cli) -> Executor {
    Executor::new(ProviderRegistry::with_reference_providers()).with_concurrency(cli.parallelism)
}

fn config_hash(root: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_dir(root, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn hash_dir(dir: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            hash_dir(&path, hasher)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("mini")
            || path.extension().and_then(|e| e.to_str()) == Some("mf")
        {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(std::fs::read(&path)?);
        }
    }
    Ok(())
}

fn print_action(action: &PlanAction) {
    match action {
        PlanAction::Create { address, .. } => {
            println!("  {} {}", "+".green().bold(), address.green());
        }
        PlanAction::Update { address, changes, .. } => {
            println!("  {} {}", "~".yellow().bold(), address.yellow());
            for (attr, change) in changes {
                println!("      {} = {} -> {}", attr, change.old, change.new);
            }
        }
        PlanAction::Delete { address, .. } => {
            println!("  {} {}", "-".red().bold(), address.red());
        }
        PlanAction::NoOp { .. } => {}
    }
}

fn print_plan_summary(actions: &[PlanAction]) {
    let creates = actions.iter().filter(|a| matches!(a, PlanAction::Create { .. })).count();
    let updates = actions.iter().filter(|a| matches!(a, PlanAction::Update { .. })).count();
    let deletes = actions.iter().filter(|a| matches!(a, PlanAction::Delete { .. })).count();

    if creates == 0 && updates == 0 && deletes == 0 {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("miniform will perform the following actions:\n");
    for action in actions {
        print_action(action);
    }
    println!(
        "\nPlan: {} to create, {} to update, {} to delete.",
        creates.to_string().green(),
        updates.to_string().yellow(),
        deletes.to_string().red()
    );
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;
    println!("\n{} Only '{}' will be accepted.", prompt, "yes".bold());
    print!("  Enter a value: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_init(cli: &Cli) -> Result<()> {
    let working_dir = Path::new(&cli.working_dir).join(".miniform");
    std::fs::create_dir_all(&working_dir)
        .with_context(|| format!("failed to create {}", working_dir.display()))?;

    let store = store_for(cli);
    if !store.path().exists() {
        store.write(&CurrentState::default())?;
    }

    println!("{} Initialized miniform working directory at {}", "+".green().bold(), working_dir.display());
    Ok(())
}

async fn cmd_validate(cli: &Cli, path: Option<&str>) -> Result<()> {
    let root = path.map(PathBuf::from).unwrap_or_else(|| root_dir(cli));
    let load = loader::load_root(&root)?;

    println!(
        "{} {} resource(s), {} data source(s), {} module(s), {} output(s)",
        "✓".green().bold(),
        load.resources.len(),
        load.data_sources.len(),
        load.modules.len(),
        load.outputs.len(),
    );
    Ok(())
}

async fn cmd_plan(cli: &Cli, out: Option<&str>) -> Result<()> {
    let root = root_dir(cli);
    let store = store_for(cli);
    let state = store.read()?;

    let executor = executor_for(cli);
    let result = executor.plan(&root, &state).await?;

    print_plan_summary(&result.actions);

    if let Some(out_path) = out {
        let plan_file = PlanFile {
            version: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            config_hash: config_hash(&root)?,
            actions: result.actions,
        };
        let json = serde_json::to_string_pretty(&plan_file)?;
        std::fs::write(out_path, json).with_context(|| format!("failed to write {}", out_path))?;
        println!("\nSaved plan to {}", out_path);
    }

    Ok(())
}

async fn cmd_apply(cli: &Cli, plan_file_path: Option<&str>, yes: bool) -> Result<()> {
    let root = root_dir(cli);
    let store = store_for(cli);
    let executor = executor_for(cli);

    // A saved plan file pins the exact actions to run: once approved here,
    // `apply_plan` executes them verbatim rather than recomputing a fresh
    // plan against whatever the state happens to be at apply time.
    let saved_actions = if let Some(path) = plan_file_path {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read plan file {}", path))?;
        let plan_file: PlanFile = serde_json::from_str(&content).context("malformed plan file")?;

        let current_hash = config_hash(&root)?;
        if plan_file.config_hash != current_hash {
            bail!("the configuration has changed since this plan was generated; re-run `miniform plan`");
        }

        print_plan_summary(&plan_file.actions);
        if !yes && !confirm("Do you want to perform these actions?")? {
            println!("{}", "Apply cancelled.".yellow());
            return Ok(());
        }
        Some(plan_file.actions)
    } else {
        let state = store.read()?;
        let result = executor.plan(&root, &state).await?;
        print_plan_summary(&result.actions);

        if result.actions.iter().all(|a| matches!(a, PlanAction::NoOp { .. })) {
            return Ok(());
        }

        if !yes && !confirm("Do you want to perform these actions?")? {
            println!("{}", "Apply cancelled.".yellow());
            return Ok(());
        }
        None
    };

    let result = match saved_actions {
        Some(actions) => executor.apply_plan(&root, &store, actions).await?,
        None => executor.apply(&root, &store).await?,
    };

    println!();
    for action in &result.actions {
        match action {
            PlanAction::Create { address, .. } => println!("{} {}: creation complete", "✓".green().bold(), address),
            PlanAction::Update { address, .. } => println!("{} {}: modifications complete", "✓".green().bold(), address),
            PlanAction::Delete { address, .. } => println!("{} {}: destruction complete", "✓".green().bold(), address),
            PlanAction::NoOp { .. } => {}
        }
    }

    if result.outputs.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
        println!("\nOutputs:\n");
        println!("{}", serde_json::to_string_pretty(&result.outputs)?);
    }

    Ok(())
}

async fn cmd_output(cli: &Cli, json: bool, state_override: Option<&str>) -> Result<()> {
    let store = match state_override {
        Some(path) => StateStore::new(PathBuf::from(path)),
        None => store_for(cli),
    };
    let state = store.read()?;

    // Root outputs aren't persisted standalone; re-resolve them against a
    // fresh load of the config and the data sources it references.
    let root = root_dir(cli);
    let load = loader::load_root(&root)?;
    let data = datasource::evaluate_all(&load.data_sources, &load.scope, &ProviderRegistry::with_reference_providers()).await?;

    let mut out = serde_json::Map::new();
    for o in &load.outputs {
        if o.scope.is_empty() {
            let value = resolver::resolve(&o.value, &[], &load.scope, &state, &data)?;
            out.insert(o.name.clone(), value);
        }
    }
    let value = serde_json::Value::Object(out);

    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match value.as_object() {
            Some(map) if !map.is_empty() => {
                for (k, v) in map {
                    println!("{} = {}", k.bold(), v);
                }
            }
            _ => println!("{}", "No outputs.".dimmed()),
        }
    }
    Ok(())
}

async fn cmd_state(cli: &Cli, command: &StateCommands) -> Result<()> {
    let store = store_for(cli);

    match command {
        StateCommands::List => {
            let state = store.read()?;
            if state.resources.is_empty() {
                println!("{}", "No resources in state.".dimmed());
                return Ok(());
            }
            let mut addresses: Vec<&String> = state.resources.keys().collect();
            addresses.sort();
            for address in addresses {
                println!("{}", address);
            }
        }

        StateCommands::Show { address } => {
            let state = store.read()?;
            let record = state
                .resources
                .get(address)
                .with_context(|| format!("resource '{}' not found in state", address))?;
            println!("{}", serde_json::to_string_pretty(record)?);
        }

        StateCommands::Mv { source, destination } => {
            let lock = store.lock()?;
            let mut state = store.read()?;
            let mut record = state
                .resources
                .remove(source)
                .with_context(|| format!("resource '{}' not found in state", source))?;
            record.name = destination.rsplit('.').next().unwrap_or(destination).to_string();
            state.resources.insert(destination.clone(), record);
            store.write(&state)?;
            let _ = lock.release();
            println!("{} Moved {} to {}", "✓".green().bold(), source, destination);
        }

        StateCommands::Rm { address } => {
            let lock = store.lock()?;
            let mut state = store.read()?;
            state
                .resources
                .remove(address)
                .with_context(|| format!("resource '{}' not found in state", address))?;
            store.write(&state)?;
            let _ = lock.release();
            println!("{} Removed {} from state", "✓".green().bold(), address);
        }
    }

    Ok(())
}
