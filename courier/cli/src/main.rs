//! Courier CLI - run stored API definitions from the terminal

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use courier_lib::{
    Body, Collection, ConfigError, Environment, ExecutorConfig, JsonFileRepository, NetworkError,
    RecordKey, Repository, RequestExecutor, RequestParameters, ResponseBody, StoreError,
};
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "courier")]
#[command(version, about = "Run API definitions from your workspaces", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Store directory [default: ~/.courier]
    #[arg(long, value_name = "DIR", global = true)]
    store: Option<PathBuf>,

    /// Executor configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one API definition
    Run {
        /// Workspace owning the collection
        workspace: String,

        /// Collection containing the API definition
        collection: String,

        /// Name of the API definition
        api: String,

        /// Environment to resolve variables from
        #[arg(short, long, value_name = "NAME")]
        env: Option<String>,

        /// Path parameter (repeatable: -p id=1 -p todoId=2)
        #[arg(short = 'p', long = "path", value_name = "KEY=VALUE", value_parser = parse_path_param)]
        path_params: Vec<(String, String)>,

        /// Query parameter; omit the value for a flag (repeatable: -q page=2 -q verbose)
        #[arg(short = 'q', long = "query", value_name = "KEY[=VALUE]", value_parser = parse_query_param)]
        query_params: Vec<(String, Option<String>)>,

        /// JSON request body, replacing the definition's body
        #[arg(long, value_name = "JSON")]
        body: Option<String>,

        /// Print the full execution report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List collections and environments of a workspace
    List {
        /// The workspace to list
        workspace: String,
    },

    /// Import collections and environments from a JSON file
    Import {
        /// File with `collections` and/or `environments` arrays
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create HTTP client: {0}")]
    Client(#[from] NetworkError),

    #[error("invalid --body: {0}")]
    Body(serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid import file: {0}")]
    Import(serde_json::Error),

    #[error("failed to render report: {0}")]
    Render(serde_json::Error),

    #[error("could not determine the home directory; pass --store")]
    NoHome,
}

/// Contents of an import file.
#[derive(Debug, Default, Deserialize)]
struct ImportFile {
    #[serde(default)]
    collections: Vec<Collection>,
    #[serde(default)]
    environments: Vec<Environment>,
}

fn parse_path_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

fn parse_query_param(s: &str) -> Result<(String, Option<String>), String> {
    let (key, value) = match s.split_once('=') {
        Some((key, value)) => (key, Some(value.to_string())),
        None => (s, None),
    };
    if key.is_empty() {
        return Err(format!("expected KEY[=VALUE], got {s:?}"));
    }
    Ok((key.to_string(), value))
}

/// Initialize tracing subscriber based on verbosity and output format
fn init_tracing(verbose: u8, json: bool) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,courier_lib=info".to_string(),
            2 => "info,courier_lib=debug".to_string(),
            _ => "debug,courier_lib=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

fn store_dir(store: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match store {
        Some(dir) => Ok(dir),
        None => dirs::home_dir()
            .map(|home| home.join(".courier"))
            .ok_or(CliError::NoHome),
    }
}

fn load_config(path: Option<&Path>) -> Result<ExecutorConfig, CliError> {
    let config = match path {
        Some(path) => ExecutorConfig::load(path)?,
        None => ExecutorConfig::default(),
    };
    Ok(config.with_overrides(|var| std::env::var(var).ok())?)
}

fn render_body(body: &ResponseBody) -> Option<String> {
    match body {
        ResponseBody::Empty => None,
        ResponseBody::Json(value) => {
            Some(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
        }
        ResponseBody::Text(text) => Some(text.clone()),
        ResponseBody::Binary(bytes) => Some(format!("<{} bytes of binary data>", bytes.len())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    dir: &Path,
    config: ExecutorConfig,
    workspace: String,
    collection: String,
    api: String,
    env: Option<String>,
    path_params: Vec<(String, String)>,
    query_params: Vec<(String, Option<String>)>,
    body: Option<String>,
    json: bool,
) -> Result<bool, CliError> {
    let collections: JsonFileRepository<Collection> = JsonFileRepository::in_dir(dir);
    let environments: JsonFileRepository<Environment> = JsonFileRepository::in_dir(dir);

    let mut params = RequestParameters::new();
    for (key, value) in path_params {
        params = params.path(key, value);
    }
    for (key, value) in query_params {
        params = match value {
            Some(value) => params.query(key, value),
            None => params.flag(key),
        };
    }
    if let Some(body) = body {
        let value: serde_json::Value = serde_json::from_str(&body).map_err(CliError::Body)?;
        params = params.body(Body::Json(value));
    }

    let env_key = env.map(|name| RecordKey::new(&workspace, name));
    let executor = RequestExecutor::from_config(config)?;
    let report = executor
        .run_stored(
            &collections,
            &environments,
            &RecordKey::new(&workspace, collection),
            &api,
            env_key.as_ref(),
            &params,
        )
        .await?;

    if json {
        let rendered = serde_json::to_string_pretty(&report).map_err(CliError::Render)?;
        println!("{rendered}");
    } else if let Some(error) = &report.error {
        eprintln!("error [{}]: {error}", report.state().stage());
    } else if let Some(text) = report.response.as_ref().and_then(|r| render_body(&r.body)) {
        println!("{text}");
    }

    Ok(report.is_success())
}

fn list(dir: &Path, workspace: &str) -> Result<(), CliError> {
    let collections: JsonFileRepository<Collection> = JsonFileRepository::in_dir(dir);
    let environments: JsonFileRepository<Environment> = JsonFileRepository::in_dir(dir);

    for collection in collections.list(workspace)? {
        println!("{}", collection.name);
        for api in &collection.apis {
            println!("  {:<7} {:<24} {}", api.method.to_string(), api.name, api.url);
        }
    }

    let environments = environments.list(workspace)?;
    if !environments.is_empty() {
        println!();
        println!("environments:");
        for env in environments {
            println!("  {} ({} variables)", env.name, env.variables.len());
        }
    }
    Ok(())
}

fn import(dir: &Path, file: &Path) -> Result<(), CliError> {
    let source = std::fs::read_to_string(file).map_err(|source| CliError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    let import: ImportFile = serde_json::from_str(&source).map_err(CliError::Import)?;

    let collections: JsonFileRepository<Collection> = JsonFileRepository::in_dir(dir);
    let environments: JsonFileRepository<Environment> = JsonFileRepository::in_dir(dir);
    for collection in &import.collections {
        collections.save(collection)?;
    }
    for env in &import.environments {
        environments.save(env)?;
    }

    println!(
        "imported {} collection(s) and {} environment(s)",
        import.collections.len(),
        import.environments.len()
    );
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<bool, CliError> {
    let dir = store_dir(cli.store)?;

    match cli.command {
        Commands::Run {
            workspace,
            collection,
            api,
            env,
            path_params,
            query_params,
            body,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run(
                &dir,
                config,
                workspace,
                collection,
                api,
                env,
                path_params,
                query_params,
                body,
                json,
            )
            .await
        }
        Commands::List { workspace } => list(&dir, &workspace).map(|_| true),
        Commands::Import { file } => import(&dir, &file).map(|_| true),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_verbosity, cli.json_logs);

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_params() {
        assert_eq!(
            parse_path_param("id=a=b").unwrap(),
            ("id".to_string(), "a=b".to_string())
        );
        assert!(parse_path_param("id").is_err());
        assert!(parse_path_param("=1").is_err());
    }

    #[test]
    fn parses_query_params() {
        assert_eq!(
            parse_query_param("verbose").unwrap(),
            ("verbose".to_string(), None)
        );
        assert_eq!(
            parse_query_param("q=").unwrap(),
            ("q".to_string(), Some(String::new()))
        );
        assert!(parse_query_param("=x").is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
