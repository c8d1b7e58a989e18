pub mod join;
pub mod names;
pub mod odds;

pub use join::build_game_features;
pub use names::NameNormalizer;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::models::GameFeature;
use crate::db::Database;

/// `home_imp_avg > away_imp_avg`, strictly. Ties and missing sides are `false`.
pub fn home_favorite(home_imp_avg: Option<f64>, away_imp_avg: Option<f64>) -> bool {
    matches!((home_imp_avg, away_imp_avg), (Some(h), Some(a)) if h > a)
}

/// Feature stage: read the three input relations, rebuild `game_features`
/// in the store and mirror it to `<processed_dir>/game_features.csv`.
pub fn run(config: &Config, db: &mut Database) -> Result<Vec<GameFeature>> {
    let names = NameNormalizer::mlb_with_overrides(config.team_aliases.as_deref())?;

    let schedule = db.load_schedule()?;
    let quotes = db.load_odds()?;
    let stats = db.load_team_stats()?;
    info!(
        "Loaded {} games, {} odds quotes, {} team-season records",
        schedule.len(),
        quotes.len(),
        stats.len()
    );

    let (features, _summary) = build_game_features(&schedule, &quotes, &stats, &names);
    let unmapped = names.unmapped_names();
    if !unmapped.is_empty() {
        debug!("Team names outside the alias map: {}", unmapped.join(", "));
    }

    db.replace_game_features(&features)
        .context("failed to replace game_features table")?;
    info!("Wrote {} rows to game_features", features.len());

    let csv_path = Path::new(&config.processed_dir).join("game_features.csv");
    write_features_csv(&csv_path, &features)?;
    info!("Saved features CSV to {}", csv_path.display());

    Ok(features)
}

pub fn write_features_csv(path: &Path, rows: &[GameFeature]) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create directory {}", dir.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
