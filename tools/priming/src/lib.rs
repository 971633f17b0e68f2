pub mod apply;
pub mod catalog;
pub mod config;
pub mod dialog;
pub mod dialog_store;
pub mod document;
pub mod errors;
pub mod export;
pub mod frontmatter;
pub mod logging;
pub mod normalize;
pub mod recency;
pub mod record;
pub mod remap;
pub mod runtime;
pub mod scanner;
pub mod script_ref;
pub mod serialize;

use apply::apply_scripts;
use catalog::ScriptCatalog;
use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_config, CliOverrides, PrimingConfig};
use dialog_store::FsDialogStore;
use document::parse_script_document;
use errors::PrimingError;
use export::{save_course_as_script, ExportRequest};
use logging::{append_run_log, init_run_logger, JsonlLogger};
use recency::RecentUsageStore;
use runtime::ProductionRuntime;
use serde::Serialize;
use serde_json::json;
use serialize::serialize_document;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Parser)]
#[command(name = "priming")]
#[command(about = "Catalog, check, replay, and export priming scripts")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub scripts_root: Option<PathBuf>,
    #[arg(long, global = true)]
    pub dialogs_root: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Recent, individual, and team-shared scripts usable by an agent.
    List {
        #[arg(long)]
        agent: String,
    },
    Search {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        limit: Option<usize>,
        query: String,
    },
    /// Prints a script in canonical form.
    Show {
        #[arg(long)]
        agent: String,
        script_ref: String,
    },
    /// Parses and validates a script file without touching the catalog.
    Check { file: PathBuf },
    Apply {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        dialog: String,
        #[arg(required = true)]
        refs: Vec<String>,
    },
    Export {
        #[arg(long)]
        dialog: String,
        #[arg(long)]
        course: u32,
        #[arg(long)]
        slug: String,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
}

pub fn run() -> Result<i32, PrimingError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| PrimingError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, PrimingError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(PrimingError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        working_dir: cli.working_dir.clone(),
        scripts_root: cli.scripts_root.clone(),
        dialogs_root: cli.dialogs_root.clone(),
    };
    let cfg = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
    init_run_logger(JsonlLogger {
        path: cfg.logging.path.clone(),
        max_payload_bytes: cfg.logging.max_payload_bytes,
        budget_bytes: cfg.logging.budget_bytes,
    });

    let catalog = build_catalog(&cfg, runtime);
    match cli.command {
        Command::List { agent } => {
            let listing = catalog.list_applicable_scripts(&agent)?;
            write_json(runtime, &listing)?;
        }
        Command::Search {
            agent,
            limit,
            query,
        } => {
            let hits = catalog.search_scripts(&agent, &query, limit)?;
            write_json(runtime, &hits)?;
        }
        Command::Show { agent, script_ref } => {
            let loaded = catalog.load_script(&script_ref, &agent)?;
            let rendered = serialize_document(&loaded.document)?;
            runtime.terminal.write_line(rendered.trim_end())?;
        }
        Command::Check { file } => {
            let path = if file.is_absolute() {
                file
            } else {
                cwd.join(file)
            };
            let raw = runtime.file_system.read_to_string(&path)?;
            let document = parse_script_document(&raw).map_err(|error| {
                append_run_log(
                    "warn",
                    "script.parse.failed",
                    json!({
                        "path": path.display().to_string(),
                        "error": error.to_string(),
                    }),
                );
                error.in_script(&path.display().to_string())
            })?;
            runtime.terminal.write_line(&format!(
                "ok: {} record(s)",
                document.records.len()
            ))?;
            for record in &document.records {
                runtime
                    .terminal
                    .write_line(&format!("  {}", record.record_type()))?;
            }
        }
        Command::Apply {
            agent,
            dialog,
            refs,
        } => {
            let store = FsDialogStore::new(&cfg.dialogs.root, runtime.file_system.clone());
            let mut live = store.open_live(&dialog)?;
            let outcome = apply_scripts(
                &catalog,
                &store,
                runtime.clock.as_ref(),
                &mut live,
                &agent,
                &refs,
            )?;
            write_json(runtime, &outcome)?;
        }
        Command::Export {
            dialog,
            course,
            slug,
            overwrite,
        } => {
            let store = FsDialogStore::new(&cfg.dialogs.root, runtime.file_system.clone());
            let outcome = save_course_as_script(
                &catalog,
                &store,
                runtime.clock.as_ref(),
                &ExportRequest {
                    dialog_id: &dialog,
                    course,
                    slug: &slug,
                    overwrite,
                },
            )?;
            write_json(runtime, &outcome)?;
        }
    }
    Ok(0)
}

pub fn build_catalog(cfg: &PrimingConfig, runtime: &ProductionRuntime) -> ScriptCatalog {
    let recency = RecentUsageStore::new(
        &cfg.recency.dir,
        cfg.recency.capacity,
        runtime.file_system.clone(),
        runtime.clock.clone(),
    );
    ScriptCatalog::new(
        &cfg.scripts.root,
        runtime.file_system.clone(),
        recency,
        cfg.search.default_limit,
    )
}

fn write_json<T: Serialize>(runtime: &ProductionRuntime, value: &T) -> Result<(), PrimingError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|e| PrimingError::Io(e.to_string()))?;
    runtime.terminal.write_line(&rendered)
}
