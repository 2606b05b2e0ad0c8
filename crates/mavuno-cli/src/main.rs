use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mavuno_core::{ListingDraft, ListingSource, ListingType, PostedBy};
use mavuno_forecast::{generate_demo_data, Forecaster};
use mavuno_match::MatchEngine;

#[derive(Debug, Parser)]
#[command(name = "mavuno")]
#[command(about = "Mavuno surplus exchange command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web API server.
    Serve,
    /// Forecast over the synthetic demo series and print the result.
    DemoForecast,
    /// Rank beneficiaries for an ad-hoc listing draft.
    MatchSample {
        #[arg(long, default_value = "Nairobi")]
        county: String,
        #[arg(long = "type", default_value = "Surplus")]
        kind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => mavuno_web::serve_from_env().await?,
        Commands::DemoForecast => {
            let mut rng = rand::thread_rng();
            let history = generate_demo_data(&mut rng);
            let result = Forecaster::default().forecast(&history, &mut rng);
            println!("confidence: {}%", result.confidence);
            println!("recommendation: {}", result.recommendation);
            for point in &result.forecast {
                println!("{}  {}", point.date.format("%Y-%m-%d"), point.value);
            }
        }
        Commands::MatchSample { county, kind } => {
            let kind = parse_listing_type(&kind)?;
            let draft = sample_draft(kind, &county);
            let matches = MatchEngine::with_builtin_registry().match_listing(&draft);
            if matches.is_empty() {
                println!("no beneficiary matches (waste listings are routed to recycling partners)");
            }
            for m in matches {
                println!("{:>3} pts  {}  — {}", m.score, m.name, m.rationale);
            }
        }
    }
    Ok(())
}

fn parse_listing_type(raw: &str) -> Result<ListingType> {
    Ok(match raw {
        "Surplus" => ListingType::Surplus,
        "Produce" => ListingType::Produce,
        "Biodegradable" => ListingType::Biodegradable,
        "Non-Biodegradable" => ListingType::NonBiodegradable,
        other => bail!("unknown listing type `{other}`"),
    })
}

fn sample_draft(kind: ListingType, county: &str) -> ListingDraft {
    ListingDraft {
        title: "Sample listing".to_string(),
        source: ListingSource::Restaurant,
        kind,
        category: "Cooked meals".to_string(),
        quantity: "10 trays".to_string(),
        value: 2500.0,
        description: "CLI sample".to_string(),
        county: county.to_string(),
        expiry_date: None,
        posted_by: PostedBy {
            id: "cli".to_string(),
            name: "CLI user".to_string(),
            organization: None,
        },
    }
}
