use anyhow::Result;
use clap::Parser;
use colored::*;
use std::time::Duration;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;
use sse_client::Connection;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Integration Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Bearer token to present, when the deployment requires one
    #[arg(long)]
    token: Option<String>,

    /// Seconds between the server's timestamp frames (used to bound waits)
    #[arg(long, default_value_t = 10)]
    message_interval_secs: u64,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test basic SSE connection without publishing any data
    ConnectionTest,
    /// Test the periodic timestamp liveness frame
    TimestampTest,
    /// Test a product update event end to end
    ProductUpdate,
    /// Test that a burst of events arrives in append order
    Ordering,
    /// Run all tests
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let client = reqwest::Client::new();
    let api_client = ApiClient::new(client, cli.base_url.clone());

    println!("{} Checking server health...", "→".blue());
    api_client.health_check().await?;
    println!("{} Server is up", "✓".green());

    println!("\n{} Establishing SSE connection...", "→".blue());
    let mut sse = Connection::establish(
        &cli.base_url,
        cli.token.as_deref(),
        "Catalog Client".to_string(),
    )
    .await?;
    println!("{} SSE connection established", "✓".green());

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let message_interval = Duration::from_secs(cli.message_interval_secs);
    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(scenarios::test_connection(&mut sse).await?);
        }
        ScenarioChoice::TimestampTest => {
            results.push(scenarios::test_connection(&mut sse).await?);
            results.push(scenarios::test_timestamp(&mut sse, message_interval).await?);
        }
        ScenarioChoice::ProductUpdate => {
            results.push(scenarios::test_connection(&mut sse).await?);
            results.push(scenarios::test_product_update(&api_client, &mut sse).await?);
        }
        ScenarioChoice::Ordering => {
            results.push(scenarios::test_connection(&mut sse).await?);
            results.push(scenarios::test_ordering(&api_client, &mut sse).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_connection(&mut sse).await?);
            results.push(scenarios::test_product_update(&api_client, &mut sse).await?);
            results.push(scenarios::test_ordering(&api_client, &mut sse).await?);
            results.push(scenarios::test_timestamp(&mut sse, message_interval).await?);
        }
    }

    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
