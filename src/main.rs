//! Main module for the docsearch CLI application (dsearch).
//!
//! Loads the configuration, opens the search service (recovering whatever
//! embeddings are already on disk) and runs the requested subcommand.
//!
//! # Examples
//!
//! ```sh
//! dsearch init
//! dsearch load articles_law.txt
//! dsearch search "termination of a lease" -k 3
//! dsearch interactive
//! ```

use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use docsearch::{
    commands::{Cli, Commands},
    config::{self, DocSearchConfig},
    config_dir,
    embeddings::SentenceEmbeddingsModel,
    service::{QueryResponse, SearchService},
    store::EmbeddingStore,
};
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    io::{self, BufRead, Write, stdout},
    path::PathBuf,
    process::ExitCode,
};
use tracing::{debug, info};

static TRACING: OnceCell<()> = OnceCell::new();

type Service = SearchService<SentenceEmbeddingsModel>;

fn main() -> ExitCode {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => init(cli.config)?,
        Commands::Encode { documents } => {
            let status = connect(cli.config)?.ingest(&documents)?;
            println!("{} ({} documents)", status.message, status.documents);
        }
        Commands::Load { path } => {
            let status = connect(cli.config)?.ingest_from_source(&path)?;
            println!("{} ({} documents)", status.message, status.documents);
        }
        Commands::Search { query, top_k, json } => {
            let service = connect(cli.config)?;
            let response = match top_k {
                Some(k) => service.query(&query, k)?,
                None => service.query_default(&query)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_results(&response)?;
            }
        }
        Commands::Interactive => interactive(&connect(cli.config)?)?,
    }

    Ok(())
}

/// Load the configuration and open the service it describes.
fn connect(cli_override: Option<PathBuf>) -> Result<Service, Box<dyn Error>> {
    let config = load_or_default(cli_override)?;
    debug!("Config loaded: {:?}", config);
    open_service(&config)
}

fn config_path(cli_override: Option<PathBuf>) -> Result<PathBuf, Box<dyn Error>> {
    match cli_override {
        Some(path) => Ok(path),
        None => Ok(config_dir()?.join("config.yaml")),
    }
}

/// Explicit config files must exist; the default location may be absent.
fn load_or_default(cli_override: Option<PathBuf>) -> Result<DocSearchConfig, Box<dyn Error>> {
    let explicit = cli_override.is_some();
    let path = config_path(cli_override)?;
    if !explicit && !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(DocSearchConfig::default());
    }
    config::load_config(&path.to_string_lossy())
}

fn open_service(config: &DocSearchConfig) -> Result<Service, Box<dyn Error>> {
    let model = SentenceEmbeddingsModel::load(
        &config.model_id,
        &config.revision,
        config.normalize_embeddings,
    )?;
    let store = EmbeddingStore::new(&config.store_path);
    Ok(SearchService::open(model, store).with_default_top_k(config.default_top_k))
}

fn print_results(response: &QueryResponse) -> io::Result<()> {
    let mut stdout = stdout();
    stdout.execute(SetForegroundColor(Color::Blue))?;
    stdout.execute(SetAttribute(Attribute::Bold))?;
    stdout.execute(Print("Relevant documents:\n"))?;
    stdout.execute(SetAttribute(Attribute::Reset))?;
    stdout.execute(ResetColor)?;

    for hit in &response.results {
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        stdout.execute(Print(format!("[{}] ", hit.id)))?;
        stdout.execute(ResetColor)?;
        stdout.execute(Print(format!("{} ", hit.text)))?;
        stdout.execute(SetForegroundColor(Color::DarkGrey))?;
        stdout.execute(Print(format!("(score {:.2})\n", hit.score)))?;
        stdout.execute(ResetColor)?;
    }
    stdout.flush()
}

fn prompt(input: &mut impl BufRead, message: &str) -> io::Result<Option<String>> {
    print!("{message}");
    stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Menu loop: `1` encodes a file, `2` searches, `q` quits.
///
/// Operation errors are reported and the loop continues.
fn interactive(service: &Service) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        println!();
        println!("1. Encode documents from a file");
        println!("2. Search documents");
        println!("q. Quit");
        let Some(choice) = prompt(&mut input, "Choose an option: ")? else {
            return Ok(());
        };

        match choice.as_str() {
            "1" => {
                let Some(path) = prompt(&mut input, "Path of the text file to encode: ")? else {
                    return Ok(());
                };
                match service.ingest_from_source(&path) {
                    Ok(status) => println!("{} ({} documents)", status.message, status.documents),
                    Err(err) => eprintln!("Error: {err}"),
                }
            }
            "2" => {
                let Some(query) = prompt(&mut input, "Search query: ")? else {
                    return Ok(());
                };
                match service.query_default(&query) {
                    Ok(response) => print_results(&response)?,
                    Err(err) => eprintln!("Error: {err}"),
                }
            }
            "q" | "quit" => return Ok(()),
            _ => println!("Invalid choice."),
        }
    }
}

/// Writes a default `config.yaml`, refusing to overwrite an existing one.
fn init(cli_override: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let path = config_path(cli_override)?;
    if path.exists() {
        return Err(format!("{} already exists", path.display()).into());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    info!("Creating config file: {}", path.display());
    let config_yaml = serde_yaml::to_string(&DocSearchConfig::default())?;
    fs::write(&path, config_yaml)?;
    println!("Wrote {}", path.display());
    Ok(())
}
