//! Folio command line entry point.

use std::io::Read;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use folio::{classify, EnrichmentStatus};
use folio_cli::config::{Overrides, Settings};
use folio_cli::render::{render_report, render_units};
use folio_cli::session::Session;

#[derive(Parser)]
#[command(
    name = "folio",
    about = "Project summaries for a personal profile page, generated on demand",
    version
)]
struct Cli {
    /// Path to a project catalog (JSON array of projects).
    #[arg(short, long, global = true)]
    catalog: Option<String>,

    /// Gemini API key. Also reads GEMINI_API_KEY.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Model name. Also reads FOLIO_MODEL.
    #[arg(long, global = true)]
    model: Option<String>,

    /// API base URL. Also reads FOLIO_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-attempt HTTP timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Retries for transient service failures.
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog projects (default).
    List,

    /// Generate summaries and wait for every one to settle.
    ///
    /// Exits non-zero when any project failed.
    Enrich {
        /// Project keys to summarize.
        keys: Vec<String>,

        /// Summarize every project in the catalog.
        #[arg(long, conflicts_with = "keys")]
        all: bool,
    },

    /// Classify text from a file (or stdin) into lists or paragraphs.
    Classify {
        /// Input file; reads stdin when omitted.
        file: Option<String>,
    },

    /// Print resolved configuration as JSON (API key redacted).
    Info,

    /// Launch interactive REPL mode.
    Repl,

    /// Start the HTTP API.
    #[cfg(feature = "http")]
    ServeHttp {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:3100")]
        addr: String,

        /// Bearer token for authentication.
        /// Also reads from FOLIO_TOKEN env var.
        #[arg(long)]
        token: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   folio completions bash > ~/.local/share/bash-completion/completions/folio
    ///   folio completions zsh > ~/.zfunc/_folio
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::resolve(&Overrides {
        catalog: cli.catalog.clone(),
        api_key: cli.api_key.clone(),
        model: cli.model.clone(),
        base_url: cli.base_url.clone(),
        timeout_secs: cli.timeout,
        max_retries: cli.retries,
    });

    match cli.command.unwrap_or(Commands::List) {
        Commands::List => {
            let catalog = settings.catalog.load()?;
            if cli.json {
                let projects: Vec<_> = catalog.iter().collect();
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                for entity in catalog.iter() {
                    println!("{:<28} {}", entity.key(), entity.title());
                    if let Some(summary) = entity.summary() {
                        println!("  {summary}");
                    }
                }
            }
        }

        Commands::Enrich { keys, all } => {
            let session = Session::open(&settings)?;
            let keys = if all {
                session.catalog().keys().map(str::to_string).collect()
            } else {
                keys
            };
            if keys.is_empty() {
                anyhow::bail!("no projects given; pass one or more keys or --all");
            }

            let reports = session.enrich_and_wait(&keys).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    println!("{}", render_report(report));
                }
            }

            let failed = reports
                .iter()
                .filter(|r| r.state.status() == EnrichmentStatus::Failed)
                .count();
            if failed > 0 {
                tracing::warn!("{failed} of {} projects failed", reports.len());
                std::process::exit(1);
            }
        }

        Commands::Classify { file } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let units = classify(&text);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&units)?);
            } else {
                print!("{}", render_units(&units, ""));
            }
        }

        Commands::Info => {
            let catalog = settings.catalog.load()?;
            let mut info = settings.redacted();
            info["entities"] = serde_json::json!(catalog.keys().collect::<Vec<_>>());
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Repl => {
            let session = Session::open(&settings)?;
            let handle = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || folio_cli::repl::run(session, handle)).await??;
        }

        #[cfg(feature = "http")]
        Commands::ServeHttp { addr, token } => {
            use folio_cli::config::resolve_token;
            use folio_cli::transport::HttpTransport;

            let session = Session::open(&settings)?;
            let transport = HttpTransport::new(session, resolve_token(token.as_deref()));
            transport.run(&addr).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "folio", &mut std::io::stdout());
        }
    }

    Ok(())
}
