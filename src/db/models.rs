use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled game from the `schedule` relation
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub game_pk: i64,
    pub date: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    /// Absent until the game is final
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub status: Option<String>,
}

impl Game {
    pub fn match_date(&self) -> NaiveDate {
        self.date.date_naive()
    }

    /// Season is the calendar year of the game date
    pub fn season(&self) -> i32 {
        use chrono::Datelike;
        self.date.year()
    }
}

/// One bookmaker quote from the `odds` relation
#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuote {
    pub match_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    /// Bookmaker title
    pub site: String,
    /// "h2h" | "spreads" | ...
    pub market: String,
    /// Team name the price is quoted for
    pub outcome: String,
    /// Signed American odds
    pub price: f64,
}

impl OddsQuote {
    pub fn match_date(&self) -> NaiveDate {
        self.match_time.date_naive()
    }
}

/// Team record for one season from the `team_stats` relation
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSeasonStat {
    pub team: String,
    pub season: i32,
    pub wins: f64,
    pub losses: f64,
}

impl TeamSeasonStat {
    pub fn win_pct(&self) -> f64 {
        self.wins / (self.wins + self.losses)
    }
}

/// One row of the `game_features` output relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameFeature {
    #[serde(rename = "gamePk")]
    pub game_pk: i64,
    #[serde(rename = "Season")]
    pub season: i32,
    /// UTC, `YYYY-MM-DD HH:MM:SS`
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_odds_avg: Option<f64>,
    pub away_odds_avg: Option<f64>,
    pub home_imp_avg: Option<f64>,
    pub away_imp_avg: Option<f64>,
    pub home_win_pct: Option<f64>,
    pub away_win_pct: Option<f64>,
    pub home_favorite: bool,
}

/// A `game_features` row joined with the final score from `schedule`
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledFeature {
    pub game_pk: i64,
    pub home_odds_avg: Option<f64>,
    pub away_odds_avg: Option<f64>,
    pub home_imp_avg: Option<f64>,
    pub away_imp_avg: Option<f64>,
    pub home_favorite: bool,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

impl LabelledFeature {
    pub fn new(feature: &GameFeature, home_score: Option<i64>, away_score: Option<i64>) -> Self {
        LabelledFeature {
            game_pk: feature.game_pk,
            home_odds_avg: feature.home_odds_avg,
            away_odds_avg: feature.away_odds_avg,
            home_imp_avg: feature.home_imp_avg,
            away_imp_avg: feature.away_imp_avg,
            home_favorite: feature.home_favorite,
            home_score,
            away_score,
        }
    }

    /// Home win indicator; `None` while either score is missing
    pub fn home_win(&self) -> Option<f64> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some(if h > a { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Model inputs in fixed order; `None` if any is missing
    pub fn feature_vector(&self) -> Option<Vec<f64>> {
        Some(vec![
            self.home_odds_avg?,
            self.away_odds_avg?,
            self.home_imp_avg?,
            self.away_imp_avg?,
            if self.home_favorite { 1.0 } else { 0.0 },
        ])
    }
}

/// One row of the `game_predictions` output relation
#[derive(Debug, Clone, PartialEq)]
pub struct GamePrediction {
    pub game_pk: i64,
    pub home_win_prob: f64,
}
