use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, warn};

use crate::error::PipelineError;

pub mod models;
use models::*;

pub const SCHEDULE: &str = "schedule";
pub const ODDS: &str = "odds";
pub const TEAM_STATS: &str = "team_stats";
pub const GAME_FEATURES: &str = "game_features";
pub const GAME_PREDICTIONS: &str = "game_predictions";

/// Single SQLite connection shared by every stage of one run.
///
/// Input relations are written by the external ingestion jobs and only ever
/// read here; output relations are dropped and recreated on each write.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open an existing database. A missing file is an error, not an empty store.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("cannot open database {path}"))?;
        Ok(Database { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Database {
            conn: Connection::open_in_memory()?,
        })
    }

    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    // ── Relation contract ────────────────────────────────────────────────────

    /// Column names of `relation`, failing if the relation does not exist.
    fn relation_columns(&self, relation: &str) -> Result<Vec<String>> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type IN ('table','view') AND name = ?1)",
            params![relation],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(PipelineError::MissingRelation {
                relation: relation.to_string(),
            }
            .into());
        }
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(relation)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    // ── Input relations ──────────────────────────────────────────────────────

    pub fn load_schedule(&self) -> Result<Vec<Game>> {
        let columns = self.relation_columns(SCHEDULE)?;
        let game_pk = resolve_column(SCHEDULE, &columns, &["gamePk"])?;
        let date = resolve_column(SCHEDULE, &columns, &["date"])?;
        let home = resolve_column(SCHEDULE, &columns, &["home_team", "home"])?;
        let away = resolve_column(SCHEDULE, &columns, &["away_team", "away"])?;
        // Scores and status are absent from schedules pulled before the games are played
        let home_score = find_column(&columns, &["home_score"]);
        let away_score = find_column(&columns, &["away_score"]);
        let status = find_column(&columns, &["status"]);
        let optional = |column: Option<String>| {
            column.as_deref().map(quote_ident).unwrap_or_else(|| "NULL".into())
        };

        let sql = format!(
            "SELECT {}, {}, {}, {}, {}, {}, {} FROM {} ORDER BY rowid",
            quote_ident(&game_pk),
            quote_ident(&date),
            quote_ident(&home),
            quote_ident(&away),
            optional(home_score),
            optional(away_score),
            optional(status),
            quote_ident(SCHEDULE),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut games = Vec::new();
        while let Some(row) = rows.next()? {
            let (Some(game_pk), Some(home_team), Some(away_team)) = (
                value_as_i64(row.get_ref(0)?),
                value_as_string(row.get_ref(2)?),
                value_as_string(row.get_ref(3)?),
            ) else {
                warn!("Skipping schedule row with missing gamePk or team names");
                continue;
            };
            let raw_date = value_as_string(row.get_ref(1)?).unwrap_or_default();
            let date = parse_timestamp(&raw_date).ok_or_else(|| PipelineError::InvalidTimestamp {
                relation: SCHEDULE.to_string(),
                value: raw_date.clone(),
            })?;
            games.push(Game {
                game_pk,
                date,
                home_team,
                away_team,
                home_score: value_as_i64(row.get_ref(4)?),
                away_score: value_as_i64(row.get_ref(5)?),
                status: value_as_string(row.get_ref(6)?),
            });
        }
        debug!("Loaded {} schedule rows", games.len());
        Ok(games)
    }

    pub fn load_odds(&self) -> Result<Vec<OddsQuote>> {
        let columns = self.relation_columns(ODDS)?;
        let names = [
            resolve_column(ODDS, &columns, &["match_time"])?,
            resolve_column(ODDS, &columns, &["home_team"])?,
            resolve_column(ODDS, &columns, &["away_team"])?,
            resolve_column(ODDS, &columns, &["site"])?,
            resolve_column(ODDS, &columns, &["market"])?,
            resolve_column(ODDS, &columns, &["outcome"])?,
            resolve_column(ODDS, &columns, &["odds", "price"])?,
        ];
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            names.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(ODDS),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut quotes = Vec::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next()? {
            let raw_time = value_as_string(row.get_ref(0)?).unwrap_or_default();
            let quote = (|| {
                Some(OddsQuote {
                    match_time: parse_timestamp(&raw_time)?,
                    home_team: value_as_string(row.get_ref(1).ok()?)?,
                    away_team: value_as_string(row.get_ref(2).ok()?)?,
                    site: value_as_string(row.get_ref(3).ok()?).unwrap_or_default(),
                    market: value_as_string(row.get_ref(4).ok()?)?,
                    outcome: value_as_string(row.get_ref(5).ok()?)?,
                    price: value_as_f64(row.get_ref(6).ok()?)?,
                })
            })();
            match quote {
                Some(q) => quotes.push(q),
                None => {
                    skipped += 1;
                    debug!("Skipping incomplete odds row (match_time='{}')", raw_time);
                }
            }
        }
        if skipped > 0 {
            warn!("Skipped {} odds rows with missing or unparseable fields", skipped);
        }
        debug!("Loaded {} odds quotes", quotes.len());
        Ok(quotes)
    }

    /// Team-season rows with both wins and losses present, in stored order.
    pub fn load_team_stats(&self) -> Result<Vec<TeamSeasonStat>> {
        let columns = self.relation_columns(TEAM_STATS)?;
        let team = resolve_column(TEAM_STATS, &columns, &["team"])?;
        let season = resolve_column(TEAM_STATS, &columns, &["season"])?;
        let wins = resolve_column(TEAM_STATS, &columns, &["wins", "W"])?;
        let losses = resolve_column(TEAM_STATS, &columns, &["losses", "L"])?;

        let sql = format!(
            "SELECT {}, {}, {}, {} FROM {} ORDER BY rowid",
            quote_ident(&team),
            quote_ident(&season),
            quote_ident(&wins),
            quote_ident(&losses),
            quote_ident(TEAM_STATS),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut stats = Vec::new();
        while let Some(row) = rows.next()? {
            let (Some(team), Some(season), Some(wins), Some(losses)) = (
                value_as_string(row.get_ref(0)?),
                value_as_i64(row.get_ref(1)?),
                value_as_f64(row.get_ref(2)?),
                value_as_f64(row.get_ref(3)?),
            ) else {
                continue;
            };
            stats.push(TeamSeasonStat {
                team,
                season: season as i32,
                wins,
                losses,
            });
        }
        debug!("Loaded {} team_stats rows with W/L", stats.len());
        Ok(stats)
    }

    // ── game_features ────────────────────────────────────────────────────────

    /// Replace the `game_features` table with `rows`, in the given order.
    pub fn replace_game_features(&mut self, rows: &[GameFeature]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {GAME_FEATURES};
             CREATE TABLE {GAME_FEATURES} (
                \"gamePk\"      INTEGER NOT NULL,
                \"Season\"      INTEGER NOT NULL,
                \"date\"        TEXT    NOT NULL,
                home_team     TEXT    NOT NULL,
                away_team     TEXT    NOT NULL,
                home_odds_avg REAL,
                away_odds_avg REAL,
                home_imp_avg  REAL,
                away_imp_avg  REAL,
                home_win_pct  REAL,
                away_win_pct  REAL,
                home_favorite INTEGER NOT NULL
             );"
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {GAME_FEATURES} VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)"
            ))?;
            for f in rows {
                stmt.execute(params![
                    f.game_pk,
                    f.season,
                    f.date,
                    f.home_team,
                    f.away_team,
                    f.home_odds_avg,
                    f.away_odds_avg,
                    f.home_imp_avg,
                    f.away_imp_avg,
                    f.home_win_pct,
                    f.away_win_pct,
                    f.home_favorite,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_game_features(&self) -> Result<Vec<GameFeature>> {
        let columns = self.relation_columns(GAME_FEATURES)?;
        for required in GAME_FEATURE_COLUMNS {
            resolve_column(GAME_FEATURES, &columns, &[required])?;
        }
        let sql = format!(
            "SELECT {} FROM {GAME_FEATURES} ORDER BY rowid",
            GAME_FEATURE_COLUMNS
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let features = stmt
            .query_map([], map_game_feature)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(features)
    }

    // ── game_predictions ─────────────────────────────────────────────────────

    pub fn replace_predictions(&mut self, rows: &[GamePrediction]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {GAME_PREDICTIONS};
             CREATE TABLE {GAME_PREDICTIONS} (
                \"gamePk\"      INTEGER NOT NULL,
                home_win_prob REAL    NOT NULL
             );"
        ))?;
        {
            let mut stmt =
                tx.prepare(&format!("INSERT INTO {GAME_PREDICTIONS} VALUES (?1, ?2)"))?;
            for p in rows {
                stmt.execute(params![p.game_pk, p.home_win_prob])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn load_predictions(&self) -> Result<Vec<GamePrediction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT \"gamePk\", home_win_prob FROM {GAME_PREDICTIONS} ORDER BY rowid"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(GamePrediction {
                    game_pk: row.get(0)?,
                    home_win_prob: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Output column order of `game_features`.
pub const GAME_FEATURE_COLUMNS: [&str; 12] = [
    "gamePk",
    "Season",
    "date",
    "home_team",
    "away_team",
    "home_odds_avg",
    "away_odds_avg",
    "home_imp_avg",
    "away_imp_avg",
    "home_win_pct",
    "away_win_pct",
    "home_favorite",
];

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn map_game_feature(row: &rusqlite::Row) -> rusqlite::Result<GameFeature> {
    Ok(GameFeature {
        game_pk: row.get(0)?,
        season: row.get(1)?,
        date: row.get(2)?,
        home_team: row.get(3)?,
        away_team: row.get(4)?,
        home_odds_avg: row.get(5)?,
        away_odds_avg: row.get(6)?,
        home_imp_avg: row.get(7)?,
        away_imp_avg: row.get(8)?,
        home_win_pct: row.get(9)?,
        away_win_pct: row.get(10)?,
        home_favorite: row.get::<_, Option<bool>>(11)?.unwrap_or(false),
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite column names are case-insensitive, so candidates match that way too.
fn find_column(columns: &[String], candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}

fn resolve_column(relation: &str, columns: &[String], candidates: &[&str]) -> Result<String> {
    find_column(columns, candidates).ok_or_else(|| {
        PipelineError::MissingColumn {
            relation: relation.to_string(),
            column: candidates.join("|"),
        }
        .into()
    })
}

// Ingestion goes through pandas, so integers arrive as REAL whenever the
// column held a NULL, and timestamps arrive as TEXT in several layouts.

fn value_as_f64(v: ValueRef<'_>) -> Option<f64> {
    match v {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) if f.is_finite() => Some(f),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|f| f.is_finite()),
        _ => None,
    }
}

fn value_as_i64(v: ValueRef<'_>) -> Option<i64> {
    match v {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        ValueRef::Text(t) => std::str::from_utf8(t)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok()),
        _ => None,
    }
}

fn value_as_string(v: ValueRef<'_>) -> Option<String> {
    match v {
        ValueRef::Text(t) => std::str::from_utf8(t).ok().map(str::to_string),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        _ => None,
    }
}

/// Parse the timestamp layouts the ingestion jobs produce, normalized to UTC.
/// Naive timestamps are taken to be UTC already.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
