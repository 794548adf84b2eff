use crate::filter::FlaggedListing;
use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

const CSV_HEADER: &[&str] = &[
    "url",
    "title",
    "price_raw",
    "price_normalized_monthly",
    "price_period",
    "location_text",
    "bedrooms",
    "poster_type_text",
    "source_site",
    "date_posted",
    "is_agent_flagged",
    "is_private_landlord_guess",
    "extra_fields",
    "scraped_at",
];

/// Files written for one run
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFiles {
    pub csv: PathBuf,
    pub json: PathBuf,
}

/// Writes timestamped CSV and JSON copies of the final listings
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `<dir>/<base>_<timestamp>.csv` and `.json`. Nothing is written
    /// for an empty set.
    pub async fn write(&self, base: &str, listings: &[FlaggedListing]) -> Result<Option<WrittenFiles>> {
        if listings.is_empty() {
            info!("No listings to write");
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", self.dir.display()))?;

        let stem = format!("{}_{}", base, Local::now().format("%Y%m%d_%H%M%S"));
        let files = WrittenFiles {
            csv: self.dir.join(format!("{}.csv", stem)),
            json: self.dir.join(format!("{}.json", stem)),
        };

        write_file(&files.csv, render_csv(listings)?).await?;
        write_file(&files.json, render_json(listings)?.into_bytes()).await?;

        info!(
            "💾 Saved {} listings to {} and {}",
            listings.len(),
            files.csv.display(),
            files.json.display()
        );
        Ok(Some(files))
    }
}

async fn write_file(path: &Path, contents: Vec<u8>) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn render_csv(listings: &[FlaggedListing]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for flagged in listings {
        let l = &flagged.listing;
        let extra = if l.extra_fields.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&l.extra_fields)?
        };
        let period = serde_json::to_value(l.price_period)?
            .as_str()
            .unwrap_or_default()
            .to_string();

        writer.write_record([
            l.url.clone(),
            l.title.clone().unwrap_or_default(),
            l.price_raw.clone().unwrap_or_default(),
            l.price_normalized_monthly.map(|p| p.to_string()).unwrap_or_default(),
            period,
            l.location_text.clone().unwrap_or_default(),
            l.bedrooms.map(|b| b.to_string()).unwrap_or_default(),
            l.poster_type_text.clone().unwrap_or_default(),
            l.source_site.clone(),
            l.date_posted.clone().unwrap_or_default(),
            flagged.is_agent_flagged.to_string(),
            flagged.is_private_landlord_guess.to_string(),
            extra,
            l.scraped_at.to_rfc3339(),
        ])?;
    }

    writer.into_inner().context("Failed to flush CSV writer")
}

pub fn render_json(listings: &[FlaggedListing]) -> Result<String> {
    serde_json::to_string_pretty(listings).context("Failed to serialize listings")
}
