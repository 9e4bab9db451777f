use api_probe::config::config_search_paths;
use api_probe::discovery::{self, data_len};
use api_probe::models::{fetch_models, MODELS_FILE};
use api_probe::plans::{news_plan, tools_plan, NewsMethod, NewsRequest, DEFAULT_LANGUAGE, DEFAULT_QUERY};
use api_probe::error::preview;
use api_probe::schema::extract::BlockNote;
use api_probe::{run_fallback, run_survey, Journal, OutputSink, ProbeConfig, ProbeResult, Prober};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TOOL_TEXT_PREVIEW: usize = 500;

#[derive(Parser)]
#[command(
    name = "api-probe",
    about = "Probe an OpenAI/Anthropic compatible relay and find out which request shapes it accepts",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for saved responses (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// JSONL journal of every attempt
    #[arg(long, default_value = "api-probe.jsonl")]
    journal: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Probe(ProbeCommand),
    /// Show the newest journal entries
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

/// Commands that talk to the server.
#[derive(Subcommand)]
enum ProbeCommand {
    /// Fetch international news through a fallback chain
    News {
        /// chat, messages or both
        #[arg(short, long, default_value_t = NewsMethod::Both)]
        method: NewsMethod,

        /// Lead with a messages attempt that declares the web search tool
        #[arg(long)]
        web_search: bool,

        #[arg(short, long, default_value = DEFAULT_QUERY)]
        query: String,

        /// Language the answer should be written in
        #[arg(short, long, default_value = DEFAULT_LANGUAGE)]
        language: String,
    },
    /// List models advertised on /v1/models
    Models,
    /// Survey paths and header schemes
    Endpoints,
    /// Survey tool-calling behaviour
    Tools,
    /// Print the resolved configuration and verify the key against /v1/models
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_probe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let command = match cli.command {
        Some(Command::History { limit }) => {
            print_history(&cli.journal, limit)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Command::Probe(command)) => command,
        None => ProbeCommand::News {
            method: NewsMethod::default(),
            web_search: false,
            query: DEFAULT_QUERY.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        },
    };

    let mut config = ProbeConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    info!("╔═══════════════════════════════════════════════════════╗");
    info!("║           api-probe v{}                           ║", env!("CARGO_PKG_VERSION"));
    info!("╚═══════════════════════════════════════════════════════╝");
    info!("  Base URL:      {}", config.base_url);
    info!("  API key:       {}", config.masked_api_key());
    info!("  Default model: {}", config.default_model);
    info!("  Chat model:    {}", config.chat_model);
    info!("  Output dir:    {}", config.output_dir.display());

    let sink = OutputSink::new(config.output_dir.clone());
    let prober = Prober::new(config)?;
    let mut journal = match Journal::open(&cli.journal) {
        Ok(journal) => Some(journal),
        Err(e) => {
            warn!("Journal disabled, cannot open {}: {}", cli.journal.display(), e);
            None
        }
    };

    let (results, exit) = match command {
        ProbeCommand::News {
            method,
            web_search,
            query,
            language,
        } => {
            let request = NewsRequest {
                method,
                query,
                language,
                web_search,
            };
            let report = run_fallback(&prober, &news_plan(&request), Some(&sink)).await;
            match report.text() {
                Some(text) => {
                    println!("{text}");
                    if let Some(Ok(extraction)) = report.winner().map(|w| &w.outcome) {
                        let sources = extraction.sources();
                        if !sources.is_empty() {
                            println!("\nSearch result sources:");
                            for (i, (title, url)) in sources.iter().enumerate() {
                                println!("  {}. {}\n     {}", i + 1, title, url);
                            }
                        }
                    }
                    for path in &report.saved {
                        info!("  Saved: {}", path.display());
                    }
                }
                None => {
                    warn!("No attempt produced text");
                    print_failures(&report.results);
                }
            }
            (report.results, ExitCode::SUCCESS)
        }
        ProbeCommand::Models => {
            let (result, listing) = fetch_models(&prober).await;
            match listing {
                Ok(listing) => {
                    println!("{} model(s):", listing.models.len());
                    for model in &listing.models {
                        match model.owned_by {
                            Some(ref owner) => println!("  {}  ({})", model.id, owner),
                            None => println!("  {}", model.id),
                        }
                    }
                    if let Err(e) = sink.save_json(MODELS_FILE, &listing.raw) {
                        warn!("Could not save model listing: {}", e);
                    }
                }
                Err(e) => warn!("{}", e),
            }
            (vec![result], ExitCode::SUCCESS)
        }
        ProbeCommand::Endpoints => {
            let reports = discovery::survey(&prober).await;
            println!("{:<24} {:<16} {:>6}  {}", "PATH", "REQUEST", "STATUS", "DETAIL");
            for report in &reports {
                let summary = match data_len(&report.get) {
                    Some(n) => format!("{n} data entries"),
                    None => detail(&report.get),
                };
                println!("{:<24} {:<16} {:>6}  {}", report.path, "GET", status(&report.get), summary);
                for (scheme, result) in &report.posts {
                    println!(
                        "{:<24} {:<16} {:>6}  {}",
                        "",
                        format!("POST {}", scheme.label()),
                        status(result),
                        detail(result)
                    );
                }
            }
            let results = reports
                .iter()
                .flat_map(|r| r.all_results().cloned())
                .collect();
            (results, ExitCode::SUCCESS)
        }
        ProbeCommand::Tools => {
            let survey = run_survey(&prober, &tools_plan(), Some(&sink)).await;
            for result in &survey.results {
                let verdict = if result.succeeded() {
                    "text"
                } else if result.answered_with_tools() {
                    "tool calls"
                } else {
                    "unsupported"
                };
                println!("== {} [{}] {}: {}", result.label, status(result), verdict, result.url);
                for note in result.notes() {
                    println!("   {}", describe_note(&note));
                }
                match result.outcome {
                    Ok(ref extraction) => println!("{}", preview(&extraction.text, TOOL_TEXT_PREVIEW)),
                    Err(ref failure) if !result.answered_with_tools() => println!("   {failure}"),
                    Err(_) => {}
                }
                println!();
            }
            for path in &survey.saved {
                info!("  Saved: {}", path.display());
            }
            (survey.results, ExitCode::SUCCESS)
        }
        ProbeCommand::Check => {
            let config = prober.config();
            println!("Base URL:          {}", config.base_url);
            println!("API key:           {}", config.masked_api_key());
            println!("Default model:     {}", config.default_model);
            println!("Chat model:        {}", config.chat_model);
            println!("Anthropic version: {}", config.anthropic_version);

            let (result, listing) = fetch_models(&prober).await;
            let exit = match listing {
                Ok(listing) => {
                    println!("OK: {} model(s) available", listing.models.len());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    println!("FAILED: {e}");
                    ExitCode::FAILURE
                }
            };
            (vec![result], exit)
        }
    };

    if let Some(ref mut journal) = journal {
        if let Err(e) = journal.record_results(&results) {
            warn!("Could not append to journal: {}", e);
        }
    }

    Ok(exit)
}

fn print_history(path: &Path, limit: usize) -> anyhow::Result<()> {
    let entries = Journal::read_recent(path, limit)?;
    if entries.is_empty() {
        println!("No journal entries in {}", path.display());
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<4} {:>4}  {:<10} {:>6}ms  {}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.method,
            entry.status.map_or_else(|| "-".to_string(), |s| s.to_string()),
            entry.outcome,
            entry.elapsed_ms,
            entry.label,
            entry.url
        );
    }
    Ok(())
}

fn print_failures(results: &[ProbeResult]) {
    for result in results {
        if let Some(failure) = result.failure() {
            println!("  {} {}: {}", result.label, result.url, failure);
        }
    }
}

fn status(result: &ProbeResult) -> String {
    result
        .status
        .map_or_else(|| "-".to_string(), |s| s.to_string())
}

fn detail(result: &ProbeResult) -> String {
    match result.outcome {
        Ok(_) => "ok".to_string(),
        Err(ref failure) => failure.to_string(),
    }
}

fn describe_note(note: &BlockNote) -> String {
    match note {
        BlockNote::ToolCall {
            name,
            query,
            server_side,
        } => {
            let side = if *server_side { "server tool" } else { "tool call" };
            match query {
                Some(q) => format!("{side}: {name} \"{q}\""),
                None => format!("{side}: {name}"),
            }
        }
        BlockNote::SearchResult { title, url } => format!("result: {title} <{url}>"),
        BlockNote::SearchError(e) => format!("search error: {e}"),
    }
}
