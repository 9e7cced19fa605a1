mod editor;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgMatches, Args, Command, CommandFactory, FromArgMatches, Parser, Subcommand};
use pyracms_core::config::{CmsConfig, DEFAULT_LOG_FILTER, load_config};
use pyracms_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_runtime_initialized,
    init_layout, inspect_runtime, resolve_paths,
};
use pyracms_core::schema::{ASSOCIATIONS, MODELS, RelationshipKind, find_model};
use pyracms_core::seed::{SeedOptions, seed_database};
use pyracms_core::store::{
    StoredRow, insert_row, link, list_rows, open_existing, open_or_create, table_counts,
    update_row,
};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::editor::EditorRequest;

#[derive(Debug, Parser)]
#[command(
    name = "pyracms",
    version,
    about = "Content model toolkit: initialize, seed and edit the CMS database"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            project_root: matches.get_one::<PathBuf>("project_root").cloned(),
            data_dir: matches.get_one::<PathBuf>("data_dir").cloned(),
            config: matches.get_one::<PathBuf>("config").cloned(),
            diagnostics: matches.get_flag("diagnostics"),
        }
    }
}

struct Session {
    paths: ResolvedPaths,
    config: CmsConfig,
    diagnostics: bool,
}

impl Session {
    fn print_diagnostics(&self) {
        if self.diagnostics {
            println!("\n[diagnostics]\n{}", self.paths.diagnostics());
        }
    }

    fn open_store(&self) -> Result<Connection> {
        let status = inspect_runtime(&self.paths)?;
        ensure_runtime_initialized(&self.paths, &status)?;
        open_existing(&self.paths, self.config.busy_timeout())?.ok_or_else(|| {
            anyhow!(
                "{} has no schema; run `pyracms init`",
                normalize_path(&self.paths.db_path)
            )
        })
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the runtime layout, config file and database schema")]
    Init(InitArgs),
    #[command(about = "Create the schema and insert the sample site")]
    Seed(SeedArgs),
    #[command(about = "Describe every model, column and relationship")]
    Models(ModelsArgs),
    #[command(about = "List the rows of one model")]
    List(ListArgs),
    Db(DbArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .pyracms/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct SeedArgs {
    #[arg(long, value_name = "LOCALE", help = "Locale of the sample translation and user")]
    locale: Option<String>,
    #[arg(long, help = "Print the created ids as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ModelsArgs {
    #[arg(long, help = "Print the model metadata as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(value_name = "MODEL")]
    model: String,
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
    #[arg(long, help = "Print rows as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct DbArgs {
    #[command(subcommand)]
    command: DbSubcommand,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    #[command(about = "Row counts per table")]
    Stats,
}

fn main() -> Result<()> {
    let mut command = editor::augment(Cli::command());
    let matches = command.get_matches_mut();
    let runtime = RuntimeOptions::from_matches(&matches);

    if let Some((name, sub_matches)) = matches.subcommand()
        && editor::is_editor_command(name)
    {
        let mut request = editor::parse_request(name, sub_matches)?;
        if let EditorRequest::Help { command: help_for } = request {
            return print_editor_help(&mut command, help_for);
        }
        let session = open_session(&runtime)?;
        request.hash_passwords(session.config.password_rounds())?;
        return run_editor(&session, request);
    }

    let cli = Cli::from_arg_matches(&matches)?;
    match cli.command {
        Some(Commands::Init(args)) => run_init(&open_session(&runtime)?, args),
        Some(Commands::Seed(args)) => run_seed(&open_session(&runtime)?, args),
        Some(Commands::Models(args)) => run_models(args),
        Some(Commands::List(args)) => run_list(&open_session(&runtime)?, args),
        Some(Commands::Db(DbArgs { command })) => match command {
            DbSubcommand::Stats => run_db_stats(&open_session(&runtime)?),
        },
        None => {
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(session: &Session, args: InitArgs) -> Result<()> {
    let paths = &session.paths;
    let report = init_layout(
        paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;
    // Re-read so a freshly written config applies to the database settings.
    let config = load_config(&paths.config_path)?;
    open_or_create(paths, config.busy_timeout())?;

    println!("Initialized pyracms runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    println!("tables: {}", MODELS.len() + ASSOCIATIONS.len());
    session.print_diagnostics();
    Ok(())
}

fn run_seed(session: &Session, args: SeedArgs) -> Result<()> {
    let mut connection = open_or_create(&session.paths, session.config.busy_timeout())?;
    let report = seed_database(
        &mut connection,
        &SeedOptions {
            locale: args
                .locale
                .unwrap_or_else(|| session.config.default_locale().to_string()),
            password_rounds: session.config.password_rounds(),
        },
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("seed");
    println!("db_path: {}", normalize_path(&session.paths.db_path));
    println!("translations.id: {}", report.translations_id);
    println!("translation.id: {}", report.translation_id);
    println!("user.id: {}", report.user_id);
    println!("domain.id: {}", report.domain_id);
    println!("entity.id: {}", report.entity_id);
    println!("entity.related_id: {}", report.related_entity_id);
    session.print_diagnostics();
    Ok(())
}

fn run_models(args: ModelsArgs) -> Result<()> {
    if args.json {
        let document = serde_json::json!({
            "models": MODELS,
            "associations": ASSOCIATIONS,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    for model in MODELS {
        println!("model.{} table={} ({})", model.name, model.table, model.about);
        for column in model.columns {
            let mut line = format!("  column.{}: {}", column.name, column.ty.as_str());
            if column.primary_key {
                line.push_str(" primary_key");
            }
            if let Some(foreign_key) = column.foreign_key {
                line.push_str(&format!(" -> {}.{}", foreign_key.table, foreign_key.column));
            }
            println!("{line}");
        }
        for relationship in model.relationships {
            let kind = match relationship.kind {
                RelationshipKind::ManyToOne { via } => format!("many_to_one via {via}"),
                RelationshipKind::OneToMany { remote_column } => {
                    format!("one_to_many via {remote_column}")
                }
                RelationshipKind::ManyToMany { association } => {
                    format!("many_to_many via {association}")
                }
            };
            println!(
                "  relationship.{}: {} ({kind})",
                relationship.name, relationship.target
            );
        }
        for name in model.constraint_names() {
            println!("  constraint: {name}");
        }
    }
    for association in ASSOCIATIONS {
        println!("association.{} ({})", association.table, association.about);
        for name in association.constraint_names() {
            println!("  constraint: {name}");
        }
    }
    Ok(())
}

fn run_list(session: &Session, args: ListArgs) -> Result<()> {
    let model = find_model(&args.model).ok_or_else(|| {
        anyhow!(
            "unknown model `{}` (expected one of: {})",
            args.model,
            MODELS
                .iter()
                .map(|model| model.table)
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    let connection = session.open_store()?;
    let rows = list_rows(&connection, model, args.limit)?;

    if args.json {
        let document: Vec<serde_json::Map<String, serde_json::Value>> = rows
            .iter()
            .map(row_to_json)
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("list {}", model.table);
    println!("rows.count: {}", rows.len());
    for row in &rows {
        println!("{}", format_row(model.table, row));
    }
    session.print_diagnostics();
    Ok(())
}

fn run_db_stats(session: &Session) -> Result<()> {
    let status = inspect_runtime(&session.paths)?;

    println!("db stats");
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("data_dir_exists: {}", format_flag(status.data_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("db_path: {}", normalize_path(&session.paths.db_path));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    match open_existing(&session.paths, session.config.busy_timeout())? {
        Some(connection) => {
            for count in table_counts(&connection)? {
                println!("table.{}: {}", count.table, count.rows);
            }
        }
        None => println!("schema: <not created> (run `pyracms init`)"),
    }
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    session.print_diagnostics();
    Ok(())
}

fn print_editor_help(root: &mut Command, command: &str) -> Result<()> {
    let subcommand = root
        .find_subcommand_mut(command)
        .ok_or_else(|| anyhow!("`{command}` is not registered"))?;
    subcommand.print_help()?;
    println!();
    Ok(())
}

fn run_editor(session: &Session, request: EditorRequest) -> Result<()> {
    match request {
        EditorRequest::Help { command } => bail!("`{command}` needs a target"),
        EditorRequest::Add { row, dry_run: true }
        | EditorRequest::Edit {
            row, dry_run: true, ..
        } => {
            println!("{}", serde_json::to_string_pretty(&row)?);
            Ok(())
        }
        EditorRequest::Add { row, .. } => {
            let connection = session.open_store()?;
            let id = insert_row(&connection, &row)?;
            println!("added {}.{id}", row.model.table);
            Ok(())
        }
        EditorRequest::Edit { row, id, .. } => {
            let connection = session.open_store()?;
            update_row(&connection, row.model, id, &row.values)?;
            println!("updated {}.{id}", row.model.table);
            Ok(())
        }
        EditorRequest::Link {
            association,
            values,
        } => {
            let connection = session.open_store()?;
            link(&connection, association, &values)?;
            let pairs = values
                .iter()
                .map(|(column, id)| format!("{column}={id}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("linked {} {pairs}", association.table);
            Ok(())
        }
    }
}

fn open_session(runtime: &RuntimeOptions) -> Result<Session> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    init_logging(&config.log_filter());
    tracing::debug!(project_root = %normalize_path(&paths.project_root), "runtime resolved");
    Ok(Session {
        paths,
        config,
        diagnostics: runtime.diagnostics,
    })
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        dotenvy::from_path_override(&project_env)
            .with_context(|| format!("failed to load {}", project_env.display()))?;
    }

    resolve_paths(&context, &overrides)
}

fn row_to_json(row: &StoredRow) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut object = serde_json::Map::new();
    for (column, value) in row {
        object.insert((*column).to_string(), serde_json::to_value(value)?);
    }
    Ok(object)
}

fn format_row(table: &str, row: &StoredRow) -> String {
    let mut id = None;
    let mut fields = Vec::new();
    for (column, value) in row {
        if *column == "id" {
            id = Some(value.to_string());
        } else if !value.is_null() {
            fields.push(format!("{column}={value}"));
        }
    }
    match id {
        Some(id) => format!("{table}.{id}: {}", fields.join(" ")),
        None => format!("{table}: {}", fields.join(" ")),
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Command {
        editor::augment(Cli::command())
    }

    #[test]
    fn cli_definition_is_consistent() {
        root().debug_assert();
    }

    #[test]
    fn bare_editor_command_resolves_help_without_a_session() {
        let mut root = root();
        let matches = root
            .try_get_matches_from_mut(["pyracms", "--config", "/nonexistent/broken.toml", "add"])
            .expect("matches");
        let (name, sub_matches) = matches.subcommand().expect("subcommand");
        let request = editor::parse_request(name, sub_matches).expect("request");
        let EditorRequest::Help { command } = request else {
            panic!("expected help request");
        };
        assert_eq!(command, editor::ADD);
        for command in [editor::ADD, editor::EDIT, editor::LINK] {
            assert!(root.find_subcommand_mut(command).is_some(), "{command}");
        }
    }

    #[test]
    fn global_flags_reach_editor_commands() {
        let matches = root()
            .try_get_matches_from(["pyracms", "add", "domain", "--project-root", "/srv/site"])
            .expect("matches");
        let runtime = RuntimeOptions::from_matches(&matches);
        assert_eq!(runtime.project_root, Some(PathBuf::from("/srv/site")));
        assert!(!runtime.diagnostics);
    }

    #[test]
    fn format_row_skips_nulls_and_leads_with_id() {
        use pyracms_core::values::FieldValue;

        let row: StoredRow = vec![
            ("id", FieldValue::Integer(3)),
            ("name", FieldValue::from("test")),
            ("url", FieldValue::Null),
        ];
        assert_eq!(format_row("domain", &row), "domain.3: name=test");
    }
}
