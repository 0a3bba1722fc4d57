//! cpv CLI - browse and search the CPV code taxonomy

mod http;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use cpv_core::api::{self, codes, health};
use cpv_core::config::Config;
use cpv_core::domain::taxonomy::{CpvCode, Language, SearchResult, TaxonomyService};
use cpv_core::storage::Database;
use tracing::debug;

#[derive(Parser)]
#[command(name = "cpv")]
#[command(author, version, about = "Browse and search the CPV code taxonomy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file (overrides database.path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (results only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the children of a code, or the top-level codes
    List {
        /// Parent code
        #[arg(short, long)]
        parent: Option<String>,
        /// Language used to display labels
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Search labels; every match comes back with its ancestors
    Search {
        /// Web-search style query: "exact phrase", -exclude, a or b
        query: String,
        /// Restrict matching to one language (de, fr, it, en)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Import codes from a JSON file
    Import {
        /// Array of {"code", "label", "parentCode"} objects
        file: PathBuf,
    },

    /// Move a code and its subtree under a new parent
    Move {
        /// Code to move
        code: String,
        /// New parent; omit to make the code top-level
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show the configuration file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout carries results only
    let directive = if cli.quiet { "cpv_core=warn" } else { "cpv_core=info" };
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match directive.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<cpv_core::Error>() {
            Some(core) => {
                eprintln!("Error [{}]: {}", core.code(), core);
                if let Some(suggestion) = core.suggestion() {
                    eprintln!("Try: {}", suggestion);
                }
            }
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }

    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::List { parent, language } => {
            let language = parse_language(language.as_deref())?;
            let (db, service) = open(&config).await?;
            let result = cmd_list(&service, parent, language, format, quiet).await;
            db.close().await;
            result
        }

        Commands::Search { query, language } => {
            let (db, service) = open(&config).await?;
            let result = cmd_search(&service, query, language, format, quiet).await;
            db.close().await;
            result
        }

        Commands::Import { file } => {
            let (db, service) = open(&config).await?;
            let result = cmd_import(&service, &file, format, quiet).await;
            db.close().await;
            result
        }

        Commands::Move { code, parent } => {
            let (db, service) = open(&config).await?;
            let result = cmd_move(&service, &code, parent.as_deref(), format, quiet).await;
            db.close().await;
            result
        }

        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.set("server.bind", &bind)?;
            }
            let addr = config.bind_addr()?;
            let (db, service) = open(&config).await?;
            let result = http::serve(service, addr).await;
            db.close().await;
            result
        }

        Commands::Config { action } => cmd_config(action, quiet),

        Commands::Doctor => cmd_doctor(&config, format, quiet).await,
    }
}

async fn open(config: &Config) -> anyhow::Result<(Database, TaxonomyService)> {
    let db = api::open_database(config).await?;
    debug!(path = %db.path().display(), "Database ready");
    let service = api::taxonomy_service(&db, config);
    Ok((db, service))
}

fn parse_language(raw: Option<&str>) -> anyhow::Result<Option<Language>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Ok(Some(raw.parse::<Language>()?)),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_list(
    service: &TaxonomyService,
    parent: Option<String>,
    language: Option<Language>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let children = codes::list(service, &codes::ListCodesRequest { parent }).await?;

    if format == OutputFormat::Json {
        return print_json(&children);
    }

    if children.is_empty() && !quiet {
        println!("No codes found.");
    }
    for code in &children {
        println!("{}", list_line(code, language.unwrap_or(Language::En)));
    }
    Ok(())
}

fn list_line(code: &CpvCode, language: Language) -> String {
    let label = code.label.get_or_any(language).unwrap_or("(no label)");
    let marker = if code.has_children { " [+]" } else { "" };
    format!("{}  {}{}", code.code, label, marker)
}

async fn cmd_search(
    service: &TaxonomyService,
    query: String,
    language: Option<String>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let request = codes::SearchCodesRequest {
        query: Some(query),
        language,
    };
    let (_, display_language) = request.validate()?;
    let forest = codes::search(service, &request).await?;

    if format == OutputFormat::Json {
        return print_json(&forest);
    }

    if forest.is_empty() {
        if !quiet {
            println!("No codes match.");
        }
        return Ok(());
    }

    for line in tree_lines(&forest, display_language.unwrap_or(Language::En)) {
        println!("{}", line);
    }
    Ok(())
}

/// Indented pre-order rendering of a forest
fn tree_lines(forest: &[SearchResult], language: Language) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stack: Vec<(&SearchResult, usize)> = forest.iter().rev().map(|node| (node, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        let label = node.label.get_or_any(language).unwrap_or("(no label)");
        lines.push(format!("{}{}  {}", "  ".repeat(depth), node.code, label));
        stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
    }
    lines
}

async fn cmd_import(
    service: &TaxonomyService,
    file: &Path,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let written = codes::import_file(service, file).await?;

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "imported": written }));
    }
    if !quiet {
        println!("Imported {} codes from {}", written, file.display());
    }
    Ok(())
}

async fn cmd_move(
    service: &TaxonomyService,
    code: &str,
    parent: Option<&str>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let moved = codes::move_code(service, code, parent).await?;

    if format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "code": code, "parentCode": parent, "moved": moved }));
    }
    if !quiet {
        match parent {
            Some(parent) => println!("Moved {} under {} ({} codes updated)", code, parent, moved),
            None => println!("Moved {} to the top level ({} codes updated)", code, moved),
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(config: &Config, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let report = health::doctor(config).await;

    if format == OutputFormat::Json {
        print_json(&report)?;
    } else if !quiet {
        println!("cpv Health Check");
        println!("================");
        println!();
        for check in &report.checks {
            let marker = match check.status {
                health::HealthStatus::Ok => "[OK]",
                health::HealthStatus::Warning => "[--]",
                health::HealthStatus::Error => "[!!]",
            };
            println!(
                "{} {}: {}",
                marker,
                check.name,
                check.message.as_deref().unwrap_or("")
            );
        }
        let info = health::get_system_info(config);
        println!();
        println!("cpv {} (database: {})", info.version, info.database_path);
    }

    if report.overall_status == health::HealthStatus::Error {
        anyhow::bail!("Health check found errors");
    }
    Ok(())
}
