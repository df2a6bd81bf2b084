//! Campaign persistence
//!
//! Records are written as pretty-printed JSON, one file per run.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tca_common::Result;
use tracing::info;

use crate::models::{CampaignRecord, PartialCampaign};

/// File-name friendly form of a title
fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn write_json<T: serde::Serialize>(value: &T, dir: &Path, file_name: String) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    fs::write(&path, serde_json::to_string_pretty(value)?)?;
    Ok(path)
}

/// Save a finished campaign as `campaign_<title>_<timestamp>_<run>.json`
pub fn save_campaign(record: &CampaignRecord, dir: &Path) -> Result<PathBuf> {
    let run = record.campaign.run_id.simple().to_string();
    let file_name = format!(
        "campaign_{}_{}_{}.json",
        slug(&record.campaign.movie.title),
        record.campaign.generated_at.format("%Y%m%d_%H%M%S"),
        &run[..8]
    );
    let path = write_json(record, dir, file_name)?;
    info!(
        run_id = %record.campaign.run_id,
        path = %path.display(),
        "Campaign saved"
    );
    Ok(path)
}

/// Save the remains of a failed run as `failed_run_<run>_<timestamp>.json`
pub fn save_partial(partial: &PartialCampaign, dir: &Path) -> Result<PathBuf> {
    let run = partial.run_id.simple().to_string();
    let file_name = format!(
        "failed_run_{}_{}.json",
        &run[..8],
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    let path = write_json(partial, dir, file_name)?;
    info!(run_id = %partial.run_id, path = %path.display(), "Partial campaign saved");
    Ok(path)
}

/// Load a campaign previously written by `save_campaign`
pub fn load_campaign(path: &Path) -> Result<CampaignRecord> {
    if !path.exists() {
        return Err(tca_common::Error::NotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
