mod config;
mod error;
mod filter;
mod models;
mod oracle;
mod orchestrator;
mod output;
mod scrapers;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::{OracleSettings, Pacing, SearchSettings};
use models::UserCriteria;
use oracle::{NoOracle, OpenAiOracle, Oracle};
use orchestrator::Orchestrator;
use output::OutputWriter;
use scrapers::{ChromeBrowser, SiteAdapter};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Rental Scout - adaptive rental listing search")]
struct Args {
    /// Area, borough or postcode district to search
    #[clap(short, long)]
    location: String,

    /// Flat, house, studio...
    #[clap(long)]
    property_type: Option<String>,

    /// Minimum monthly rent
    #[clap(long)]
    price_min: Option<u32>,

    /// Maximum monthly rent
    #[clap(long)]
    price_max: Option<u32>,

    #[clap(long)]
    bedrooms_min: Option<u32>,

    /// Keyword a listing should mention (repeatable)
    #[clap(short = 'k', long = "keyword")]
    keywords: Vec<String>,

    /// Only keep listings from private landlords
    #[clap(long)]
    private_only: bool,

    /// Drop listings posted by agents
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    exclude_agents: bool,

    /// Site to search (repeatable): gumtree, openrent, spareroom
    #[clap(short, long = "site", default_value = "gumtree")]
    sites: Vec<String>,

    /// Maximum result pages per search
    #[clap(long, default_value = "15")]
    max_pages: u32,

    /// Refinement attempts per search
    #[clap(long, default_value = "3")]
    max_attempts: usize,

    /// Searches running at the same time
    #[clap(long, default_value = "1")]
    concurrency: usize,

    #[clap(long, default_value = "configs")]
    configs_dir: PathBuf,

    #[clap(short, long, default_value = "data")]
    output_dir: PathBuf,

    /// Don't consult the oracle even if OPENAI_API_KEY is set
    #[clap(long)]
    no_oracle: bool,

    /// Show the browser window
    #[clap(long)]
    headful: bool,

    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn criteria(&self) -> UserCriteria {
        UserCriteria {
            location: self.location.trim().to_string(),
            property_type: self.property_type.clone(),
            price_min: self.price_min,
            price_max: self.price_max,
            bedrooms_min: self.bedrooms_min,
            keywords: self.keywords.clone(),
            private_only: self.private_only,
            exclude_agents: self.exclude_agents,
        }
    }

    fn settings(&self) -> SearchSettings {
        SearchSettings {
            max_attempts: self.max_attempts,
            page_cap: self.max_pages,
            concurrency: self.concurrency,
            ..Default::default()
        }
    }
}

fn build_oracle(args: &Args, adapters: &[Box<dyn SiteAdapter>]) -> Box<dyn Oracle> {
    if args.no_oracle {
        info!("Oracle disabled, criteria are used as entered");
        return Box::new(NoOracle);
    }
    let Some(settings) = OracleSettings::from_env() else {
        info!("OPENAI_API_KEY not set, running without oracle");
        return Box::new(NoOracle);
    };

    match OpenAiOracle::new(settings) {
        Ok(oracle) => {
            let oracle = adapters.iter().fold(oracle, |oracle, adapter| {
                oracle.with_site_profile(adapter.source_name(), adapter.config().profile.clone())
            });
            info!("Oracle enabled");
            Box::new(oracle)
        }
        Err(e) => {
            warn!("Could not create oracle client, running without: {}", e);
            Box::new(NoOracle)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🏠 Rental Scout");
    info!("===============");

    let criteria = args.criteria();
    criteria.validate().context("Invalid search criteria")?;
    info!("Criteria: {:?}", criteria);

    let pacing = Pacing::default();
    let mut adapters: Vec<Box<dyn SiteAdapter>> = Vec::new();
    for site in &args.sites {
        match scrapers::adapter_for(site, &args.configs_dir, pacing.clone()) {
            Ok(adapter) => adapters.push(adapter),
            Err(e) => error!("Skipping {}: {:#}", site, e),
        }
    }
    if adapters.is_empty() {
        bail!("No usable site adapters (requested: {})", args.sites.join(", "));
    }

    let oracle = build_oracle(&args, &adapters);
    let browser = ChromeBrowser::launch(!args.headful)?;

    let orchestrator = Orchestrator::new(adapters, oracle, args.settings());
    let summary = orchestrator.run(&browser, &criteria).await;
    summary.log();

    for (i, flagged) in summary.listings.iter().enumerate() {
        let listing = &flagged.listing;
        println!(
            "{}. {} ({})",
            i + 1,
            listing.title.as_deref().unwrap_or("(untitled)"),
            listing.price_raw.as_deref().unwrap_or("no price")
        );
        if let Some(monthly) = listing.price_normalized_monthly {
            println!("   £{} per month", monthly);
        }
        if let Some(location) = &listing.location_text {
            println!("   Location: {}", location);
        }
        println!(
            "   Poster: {}{}",
            listing.poster_type_text.as_deref().unwrap_or("unknown"),
            if flagged.is_agent_flagged { " (agent)" } else { "" }
        );
        println!("   URL: {}", listing.url);
        println!();
    }

    OutputWriter::new(&args.output_dir)
        .write("rental_listings", &summary.listings)
        .await?;

    Ok(())
}
