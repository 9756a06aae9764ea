//! Fleet E2E CLI
//!
//! Runs catalog scenarios against the cluster in the current kubeconfig.

use std::path::PathBuf;

use clap::Parser;

use fleet_e2e::{default_catalog_dir, Catalog, ScenarioRunner, TestEnv};

#[derive(Debug, Parser)]
#[command(name = "fleet-e2e", about = "Run GitOps end-to-end scenarios")]
struct Args {
    /// TOML configuration file; the environment is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of scenario YAML files.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Only run the named scenario (repeatable).
    #[arg(long = "scenario")]
    scenarios: Vec<String>,

    /// List scenarios and exit.
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("fleet-e2e: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> fleet_e2e::Result<()> {
    let env = match &args.config {
        Some(path) => TestEnv::load(path)?,
        None => TestEnv::from_env()?,
    };
    let catalog_dir = args.catalog.clone().unwrap_or_else(default_catalog_dir);
    let catalog = Catalog::load_dir(&catalog_dir)?;
    let selected = catalog.select(&args.scenarios)?;

    if args.list {
        for scenario in selected {
            println!("{:<20} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }

    tracing::info!(
        catalog = ?catalog_dir,
        namespace = %env.namespace,
        scenarios = selected.len(),
        "running scenarios"
    );

    let runner = ScenarioRunner::with_kubectl_cli(env)?;
    let mut failed = 0;

    // Catalog assets share fixed namespaces, so scenarios run one at a time.
    let mut reports = Vec::with_capacity(selected.len());
    for scenario in selected {
        let report = scenario.run(&runner).await;
        if !report.passed() {
            failed += 1;
        }
        reports.push(report);
    }

    println!("\n{}", "=".repeat(60));
    for report in &reports {
        let status = if report.passed() { "PASS" } else { "FAIL" };
        println!("{} {:<20} {:?}", status, report.name, report.duration);
        if let Err(e) = &report.outcome {
            println!("     {}", e);
        }
        for err in &report.teardown_errors {
            println!("     teardown: {}", err);
        }
    }
    println!("{}", "=".repeat(60));
    println!("{} passed, {} failed", reports.len() - failed, failed);

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
