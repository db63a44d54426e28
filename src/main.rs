use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use proxy_harvest::proxy::checker::{DEFAULT_CONCURRENCY, DEFAULT_TEST_URL, DEFAULT_TIMEOUT_SECS};
use proxy_harvest::{
    default_catalog, CheckerConfig, Config, Harvester, ReportHeader, ResultWriter,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Collects public proxy lists and ranks the proxies that actually work
#[derive(Parser)]
#[command(name = "proxy-harvest")]
#[command(about = "Collects public proxy lists and ranks the proxies that actually work")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect, check and write the ranked report (the default)
    Run(RunArgs),
    /// Fetch and merge all sources without checking them
    Collect {
        /// Output file for the merged registry
        #[arg(short, long, default_value = "proxies_all_types.json")]
        output: PathBuf,
    },
    /// Print the built-in source list
    Sources,
}

/// Options for a full collect-and-check run
#[derive(Args)]
struct RunArgs {
    /// Output file for the latency-ranked report
    #[arg(short, long, default_value = "proxies.txt")]
    output: PathBuf,
    /// Also write working proxies as JSON
    #[arg(long)]
    json: Option<PathBuf>,
    /// Number of concurrent probes
    #[arg(short = 'n', long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Per-probe timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
    /// URL to test proxies against
    #[arg(long, default_value = DEFAULT_TEST_URL)]
    test_url: String,
    /// MaxMind city database used to fill unknown locations
    #[arg(long)]
    mmdb: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Sources) => {
            for source in default_catalog() {
                println!(
                    "{:<6} {:>3}s  {}",
                    format!("{:?}", source.format_hint).to_lowercase(),
                    source.timeout.as_secs(),
                    source.url
                );
            }
        }
        Some(Commands::Collect { output }) => {
            let harvester = Harvester::from_config(&Config::default())?;
            let (registry, summary) = harvester.collect().await;
            if registry.is_empty() {
                warn!("No proxies found");
            }

            ResultWriter::save_registry_json(&output, &registry)?;
            println!(
                "Saved {} proxies from {}/{} sources to {:?}",
                registry.len(),
                summary.sources - summary.sources_failed,
                summary.sources,
                output
            );
        }
        Some(Commands::Run(args)) => run(args).await?,
        None => run(cli.run).await?,
    }

    Ok(())
}

impl RunArgs {
    fn checker_config(&self) -> CheckerConfig {
        let mut checker = CheckerConfig::new()
            .with_concurrency(self.concurrency)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_test_url(self.test_url.clone());
        if let Some(path) = &self.mmdb {
            checker = checker.with_mmdb_path(path.clone());
        }
        checker
    }
}

async fn run(args: RunArgs) -> Result<()> {
    reqwest::Url::parse(&args.test_url)
        .map_err(|e| anyhow!("Invalid test URL {}: {}", args.test_url, e))?;

    let checker = args.checker_config();
    let config = Config {
        checker,
        ..Config::default()
    };

    let harvester = Harvester::from_config(&config)?;
    let harvest = harvester.run().await;
    let summary = &harvest.summary;

    if harvest.report.verified.is_empty() {
        warn!("No working proxies found");
    }

    let header = ReportHeader::now(harvest.report.checked);
    ResultWriter::save_text(&args.output, &header, &harvest.report.verified)?;
    info!("Saved report to {:?}", args.output);

    if let Some(json_path) = args.json {
        ResultWriter::save_json(&json_path, &harvest.report.verified)?;
        info!("Saved JSON report to {:?}", json_path);
    }

    println!(
        "Results: {} working of {} unique proxies ({} failed, {} timed out)",
        summary.verified, summary.candidates, summary.failed, summary.timed_out
    );
    for proxy in harvest.report.verified.iter().take(10) {
        println!(
            "  {} {} ({}ms)",
            proxy.verified_protocol,
            proxy.address(),
            proxy.latency_ms
        );
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "proxy_harvest=debug"
    } else {
        "proxy_harvest=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
