mod output;

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use cocite_core::{AppConfig, ExitCode, Identifier, LinkingMode};
use cocite_science::formats::extract_dois_from_ris;
use cocite_science::network::network_file_name;
use cocite_science::{
    CitationProvider, CocitationAnalyzer, MergedProvider, MetadataProvider, NetworkBuilder,
    OpenAlexSource, TokioDelay, build_providers,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "cocite",
    about = "Co-citation analysis and citation networks from OpenAlex and Semantic Scholar",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file (default: $COCITE_CONFIG or ~/.config/cocite/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch references/citations for a seed set and find co-cited papers.
    Run {
        /// RIS file with the seed papers.
        input: Option<PathBuf>,

        /// Seed DOI or numeric id (repeatable, combined with the RIS input).
        #[arg(long = "doi", action = clap::ArgAction::Append)]
        dois: Vec<String>,

        /// Minimum number of seeds that must reference a paper (0 skips backward).
        #[arg(short = 'n', long)]
        min_backward: Option<usize>,

        /// Minimum number of seeds a paper must cite (0 skips forward).
        #[arg(short = 'm', long)]
        min_forward: Option<usize>,

        /// Only collect the raw lists, no thresholding.
        #[arg(long)]
        base_only: bool,

        /// Providers to merge, e.g. `openalex,semantic_scholar`.
        #[arg(long, value_delimiter = ',')]
        providers: Vec<String>,

        /// Bypass the on-disk response cache.
        #[arg(long)]
        no_cache: bool,

        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Build a similarity network from detailed_references_citations.json.
    Network {
        /// Raw citations file written by `run`.
        citations: PathBuf,

        /// bibliographic_coupling, co_citation or amsler.
        #[arg(long)]
        mode: Option<LinkingMode>,

        #[arg(long)]
        min_strength: Option<f64>,

        #[arg(long)]
        max_nodes: Option<usize>,

        /// Also add citing papers as candidate nodes.
        #[arg(long)]
        include_cociting: bool,

        /// Weight of bibliographic coupling in amsler mode, 0..=1.
        #[arg(long)]
        amsler_lambda: Option<f64>,

        #[arg(long)]
        layout_seed: Option<u64>,

        /// Skip OpenAlex lookups; nodes get placeholder labels.
        #[arg(long)]
        no_metadata: bool,

        /// Output file (default: network_<mode>.json next to the input).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file path.
    Path,
    /// Write the default configuration if no file exists yet.
    Init,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code as i32);
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let (config_path, mut config) = match cli.config.clone() {
        Some(path) => {
            let mut config = AppConfig::load_from(&path)?;
            config.apply_env();
            (path, config)
        }
        None => (AppConfig::config_path(), AppConfig::load()?),
    };

    match cli.command {
        Commands::Run {
            input,
            dois,
            min_backward,
            min_forward,
            base_only,
            providers,
            no_cache,
            output_dir,
        } => {
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("cannot create {}", output_dir.display()))?;
            init_tracing(cli.verbose, cli.quiet, Some(&output_dir.join(output::LOG_FILE)));

            if let Some(n) = min_backward {
                config.analysis.min_backward_n = n;
            }
            if let Some(m) = min_forward {
                config.analysis.min_forward_m = m;
            }
            if !providers.is_empty() {
                config.providers.enabled = providers;
            }
            if no_cache {
                config.http.cache_enabled = false;
            }
            if let Err(e) = config.analysis.validate(base_only) {
                eprintln!("Error: {e}");
                return Ok(ExitCode::InvalidArgs);
            }

            let seeds = match collect_seeds(input.as_deref(), &dois) {
                Ok(seeds) if !seeds.is_empty() => seeds,
                Ok(_) => {
                    eprintln!("Error: no valid seed identifiers found");
                    return Ok(ExitCode::NoSeeds);
                }
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    return Ok(ExitCode::FileSystemError);
                }
            };
            run_command(&config, seeds, base_only, &output_dir).await
        }

        Commands::Network {
            citations,
            mode,
            min_strength,
            max_nodes,
            include_cociting,
            amsler_lambda,
            layout_seed,
            no_metadata,
            output,
        } => {
            init_tracing(cli.verbose, cli.quiet, None);

            let options = &mut config.network;
            if let Some(mode) = mode {
                options.mode = mode;
            }
            if let Some(min) = min_strength {
                options.min_strength = min;
            }
            if max_nodes.is_some() {
                options.max_nodes = max_nodes;
            }
            if let Some(lambda) = amsler_lambda {
                options.amsler_lambda = lambda;
            }
            if let Some(seed) = layout_seed {
                options.layout_seed = seed;
            }
            options.include_cociting |= include_cociting;
            if let Err(e) = options.validate() {
                eprintln!("Error: {e}");
                return Ok(ExitCode::InvalidArgs);
            }

            let output = output.unwrap_or_else(|| {
                citations
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(network_file_name(config.network.mode))
            });
            network_command(&config, &citations, no_metadata, &output).await
        }

        Commands::Config { action } => {
            match action {
                ConfigAction::Show => print!("{}", toml::to_string_pretty(&config)?),
                ConfigAction::Path => println!("{}", config_path.display()),
                ConfigAction::Init => {
                    if config_path.exists() {
                        println!("Config already exists at {}", config_path.display());
                    } else {
                        AppConfig::default().save_to(&config_path)?;
                        println!("Wrote default config to {}", config_path.display());
                    }
                }
            }
            Ok(ExitCode::Success)
        }
    }
}

// ─── Logging ─────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8, quiet: bool, log_file: Option<&Path>) {
    let level = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let file_layer = log_file
        .and_then(|path| File::create(path).ok())
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new("debug"))
        });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

// ─── Commands ────────────────────────────────────────────────────────────────

fn collect_seeds(input: Option<&Path>, dois: &[String]) -> Result<BTreeSet<Identifier>> {
    let mut seeds = BTreeSet::new();
    if let Some(path) = input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let (found, stats) = extract_dois_from_ris(&content);
        println!(
            "Read {} records from {} ({} without DOI)",
            stats.records,
            path.display(),
            stats.without_doi
        );
        seeds.extend(found);
    }
    for raw in dois {
        match Identifier::parse(raw) {
            Ok(id) => {
                seeds.insert(id);
            }
            Err(e) => warn!(input = %raw, error = %e, "skipping invalid identifier"),
        }
    }
    Ok(seeds)
}

async fn run_command(
    config: &AppConfig,
    seeds: BTreeSet<Identifier>,
    base_only: bool,
    output_dir: &Path,
) -> Result<ExitCode> {
    let start = Instant::now();
    let delay = Arc::new(TokioDelay);
    let sources = build_providers(config, delay.clone())?;
    let provider_names: Vec<String> = sources.iter().map(|p| p.name().to_string()).collect();
    let provider: Arc<dyn CitationProvider> = Arc::new(MergedProvider::new(sources));

    let analyzer = CocitationAnalyzer::new(
        provider,
        seeds,
        Duration::from_millis(config.analysis.pacing_ms),
        delay,
    );
    println!(
        "Processing {} seeds with {}",
        analyzer.seeds().len(),
        provider_names.join(" + ")
    );

    if base_only {
        let collected = analyzer.run_base_collection().await;
        output::write_summary(output_dir, &collected.summaries, &provider_names)?;
        output::write_raw(output_dir, &collected.raw)?;
        report_failures(collected.failed_seeds);
    } else {
        let (n, m) = (config.analysis.min_backward_n, config.analysis.min_forward_m);
        let result = analyzer.run_analysis(n, m).await;
        output::write_summary(output_dir, &result.summaries, &provider_names)?;
        if n > 0 {
            output::write_backward(output_dir, &result.backward)?;
            println!("Backward: {} relations (N={n})", result.backward.len());
        } else {
            println!("Backward analysis skipped (N=0).");
        }
        if m > 0 {
            output::write_forward(output_dir, &result.forward)?;
            println!("Forward: {} relations (M={m})", result.forward.len());
        } else {
            println!("Forward analysis skipped (M=0).");
        }
        output::write_raw(output_dir, &result.raw)?;
        report_failures(result.failed_seeds);
    }

    info!(elapsed_ms = start.elapsed().as_millis() as u64, "run finished");
    println!("Results written to {}", output_dir.display());
    Ok(ExitCode::Success)
}

fn report_failures(failed: usize) {
    if failed > 0 {
        println!("{failed} seed(s) could not be fetched; see {}", output::LOG_FILE);
    }
}

async fn network_command(
    config: &AppConfig,
    citations: &Path,
    no_metadata: bool,
    output_path: &Path,
) -> Result<ExitCode> {
    let raw = match output::read_raw(citations) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return Ok(ExitCode::FileSystemError);
        }
    };
    if raw.is_empty() {
        eprintln!("Error: {} contains no seeds", citations.display());
        return Ok(ExitCode::NoSeeds);
    }

    let metadata: Option<Arc<dyn MetadataProvider>> = if no_metadata {
        None
    } else {
        Some(Arc::new(OpenAlexSource::from_config(config, Arc::new(TokioDelay))?))
    };
    let graph = NetworkBuilder::new(metadata).build(&raw, &config.network).await?;

    if graph.is_empty() {
        println!(
            "No links at or above strength {} ({} mode)",
            config.network.min_strength, config.network.mode
        );
    }
    output::write_network(output_path, &graph)?;
    println!(
        "Network with {} nodes and {} links written to {}",
        graph.nodes.len(),
        graph.links.len(),
        output_path.display()
    );
    Ok(ExitCode::Success)
}
