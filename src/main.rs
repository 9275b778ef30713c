use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kgx::config::{AppConfig, LogSink, LoggingConfig, Neo4jConfig, StoreConfig, DEFAULT_CONFIG_PATH};
use kgx::ingestion::{ChatCompletionsClient, Extractor, IngestionPipeline, PromptTemplate, ResetPolicy};
use kgx::memory::{open_store, GraphWriter};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "kgx", version, about = "Extraction de graphes de connaissances depuis des documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,
    /// Overrides `logging.level` from the configuration file.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract entities and relations from a text document and merge them into the graph.
    Ingest {
        #[arg(long, required_unless_present = "stdin", conflicts_with = "stdin")]
        file: Option<PathBuf>,
        /// Read the document from standard input.
        #[arg(long)]
        stdin: bool,
        /// Delete every node and edge before writing.
        #[arg(long)]
        reset: bool,
    },
    /// Delete every node and edge in the graph.
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Print node and edge counts.
    Stats,
    /// Write a configuration file pre-filled with defaults.
    InitConfig {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        llm_endpoint: Option<String>,
        #[arg(long)]
        llm_model: Option<String>,
        /// HTTP(S) address of Neo4j. `bolt://host:7687` is accepted and mapped to `http://host:7474`.
        #[arg(long)]
        store_uri: Option<String>,
        #[arg(long)]
        store_user: Option<String>,
        #[arg(long)]
        store_password: Option<String>,
        /// Use a local JSON graph file instead of Neo4j.
        #[arg(long, conflicts_with_all = ["store_uri", "store_user", "store_password"])]
        store_file: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig {
        force,
        api_key,
        llm_endpoint,
        llm_model,
        store_uri,
        store_user,
        store_password,
        store_file,
    } = cli.command
    {
        let console = LoggingConfig {
            sinks: vec![LogSink::Console],
            ..LoggingConfig::default()
        };
        kgx::logging::init(&console, cli.log_level.as_deref())?;

        let mut config = AppConfig::default();
        if let Some(key) = api_key {
            config.llm.api_key = key;
        }
        if let Some(endpoint) = llm_endpoint {
            config.llm.endpoint = endpoint;
        }
        if let Some(model) = llm_model {
            config.llm.model = model;
        }
        config.store = match store_file {
            Some(path) => StoreConfig::File { path },
            None => {
                let defaults = Neo4jConfig::default();
                StoreConfig::Neo4j(Neo4jConfig {
                    uri: store_uri.unwrap_or(defaults.uri),
                    user: store_user.unwrap_or(defaults.user),
                    password: store_password.unwrap_or(defaults.password),
                    ..defaults
                })
            }
        };
        config.validate()?;
        config.write_to(&cli.config, force)?;
        info!(config = %cli.config.display(), "fichier de configuration créé");
        return Ok(());
    }

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("chargement de la configuration {:?}", cli.config))?;
    kgx::logging::init(&config.logging, cli.log_level.as_deref())?;

    let store = open_store(&config.store)?;
    let writer = Arc::new(GraphWriter::new(store));

    match cli.command {
        Commands::Ingest { file, stdin, reset } => {
            writer
                .store()
                .verify_connectivity()
                .context("la base de graphe ne répond pas")?;

            let llm = ChatCompletionsClient::new(
                config.llm.endpoint.clone(),
                config.llm.api_key.clone(),
                config.llm.model.clone(),
                config.llm.timeout(),
            )?;
            let extractor = Extractor::new(Arc::new(llm), PromptTemplate::default())
                .with_policy(config.llm.retry_policy());
            let pipeline = IngestionPipeline::new(extractor, Arc::clone(&writer));
            let reset = if reset {
                ResetPolicy::ResetBeforeWrite
            } else {
                ResetPolicy::Keep
            };

            let outcome = match file {
                Some(path) => pipeline.ingest_file(&path, reset)?,
                None if stdin => {
                    let mut text = String::new();
                    std::io::stdin()
                        .read_to_string(&mut text)
                        .context("lecture de l'entrée standard impossible")?;
                    anyhow::ensure!(!text.trim().is_empty(), "aucun texte reçu sur l'entrée standard");
                    pipeline.run(&text, reset)?
                }
                None => bail!("préciser --file ou --stdin"),
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("le vidage du graphe est irréversible: relancer avec --yes pour confirmer");
            }
            let removed = writer.reset()?;
            println!("{}", serde_json::to_string_pretty(&removed)?);
        }
        Commands::Stats => {
            let counts = writer.counts()?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        Commands::InitConfig { .. } => unreachable!("handled before loading the configuration"),
    }

    info!("programme terminé");
    Ok(())
}
