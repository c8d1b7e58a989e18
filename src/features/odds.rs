//! Moneyline odds conversion and per-game aggregation.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::names::NameNormalizer;
use crate::db::models::OddsQuote;
use crate::error::PipelineError;

/// Market code of the head-to-head (moneyline) market.
pub const MONEYLINE: &str = "h2h";

/// Implied win probability of a signed American odds quote, ignoring margin.
///
/// +150 → 100 / 250 = 0.4, −150 → 150 / 250 = 0.6. Zero is not a valid quote.
pub fn implied_probability(odds: f64) -> Result<f64, PipelineError> {
    if odds > 0.0 {
        Ok(100.0 / (odds + 100.0))
    } else if odds < 0.0 {
        Ok(-odds / (-odds + 100.0))
    } else {
        Err(PipelineError::InvalidOdds(odds))
    }
}

/// Identity of one game in the odds feed: canonical teams plus calendar date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameKey {
    pub home_team: String,
    pub away_team: String,
    pub match_date: NaiveDate,
}

/// Mean odds and mean implied probability per side. A side with no quotes is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsAggregate {
    pub home_odds_avg: Option<f64>,
    pub away_odds_avg: Option<f64>,
    pub home_imp_avg: Option<f64>,
    pub away_imp_avg: Option<f64>,
    pub home_quotes: usize,
    pub away_quotes: usize,
}

#[derive(Default)]
struct SideAccumulator {
    odds_sum: f64,
    prob_sum: f64,
    count: usize,
}

impl SideAccumulator {
    fn push(&mut self, odds: f64, prob: f64) {
        self.odds_sum += odds;
        self.prob_sum += prob;
        self.count += 1;
    }

    fn means(&self) -> (Option<f64>, Option<f64>) {
        if self.count == 0 {
            return (None, None);
        }
        let n = self.count as f64;
        (Some(self.odds_sum / n), Some(self.prob_sum / n))
    }
}

/// Group moneyline quotes by [`GameKey`] and average each side.
///
/// Quotes from other markets are ignored. A quote whose outcome names neither
/// team of its game is dropped and reported; so is a quote priced at zero.
/// Implied probability is averaged per quote, not derived from mean odds.
pub fn aggregate_moneyline(
    quotes: &[OddsQuote],
    names: &NameNormalizer,
) -> BTreeMap<GameKey, OddsAggregate> {
    let mut groups: BTreeMap<GameKey, (SideAccumulator, SideAccumulator)> = BTreeMap::new();
    let mut unmatched: BTreeMap<(String, GameKey), usize> = BTreeMap::new();
    let mut invalid = 0usize;

    for quote in quotes.iter().filter(|q| q.market == MONEYLINE) {
        let key = GameKey {
            home_team: names.canonical(&quote.home_team),
            away_team: names.canonical(&quote.away_team),
            match_date: quote.match_date(),
        };
        let prob = match implied_probability(quote.price) {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping quote from {}: {}", quote.site, e);
                invalid += 1;
                continue;
            }
        };
        let outcome = names.canonical(&quote.outcome);
        let (home, away) = groups.entry(key.clone()).or_default();
        if outcome == key.home_team {
            home.push(quote.price, prob);
        } else if outcome == key.away_team {
            away.push(quote.price, prob);
        } else {
            *unmatched.entry((outcome, key)).or_default() += 1;
        }
    }

    if invalid > 0 {
        warn!("Skipped {} moneyline quotes with zero odds", invalid);
    }
    for ((outcome, key), count) in &unmatched {
        warn!(
            "Coverage: {} quote(s) for outcome '{}' match neither side of {} @ {} on {}",
            count, outcome, key.away_team, key.home_team, key.match_date
        );
    }

    groups
        .into_iter()
        .map(|(key, (home, away))| {
            let (home_odds_avg, home_imp_avg) = home.means();
            let (away_odds_avg, away_imp_avg) = away.means();
            let agg = OddsAggregate {
                home_odds_avg,
                away_odds_avg,
                home_imp_avg,
                away_imp_avg,
                home_quotes: home.count,
                away_quotes: away.count,
            };
            (key, agg)
        })
        .collect()
}
