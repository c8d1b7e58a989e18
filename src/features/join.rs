//! Schedule × aggregated odds × prior-season record → one feature row per game.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::names::NameNormalizer;
use super::odds::{aggregate_moneyline, GameKey, OddsAggregate};
use super::home_favorite;
use crate::db::models::{Game, GameFeature, OddsQuote, TeamSeasonStat};

/// Win percentage keyed by (canonical team, season).
pub type WinPctTable = BTreeMap<(String, i32), f64>;

/// Build the win percentage table, keeping the first usable row per team-season.
pub fn season_win_pcts(stats: &[TeamSeasonStat], names: &NameNormalizer) -> WinPctTable {
    let mut table = WinPctTable::new();
    for stat in stats {
        if !(stat.wins + stat.losses > 0.0) {
            debug!("Ignoring {} {} with no games played", stat.team, stat.season);
            continue;
        }
        let key = (names.canonical(&stat.team), stat.season);
        let pct = stat.win_pct();
        match table.get(&key) {
            Some(existing) if (existing - pct).abs() > 1e-12 => warn!(
                "Conflicting team_stats rows for {} {}: keeping {:.3}, ignoring {:.3}",
                key.0, key.1, existing, pct
            ),
            Some(_) => {}
            None => {
                table.insert(key, pct);
            }
        }
    }
    table
}

/// Counts reported after a join so exclusions are auditable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinSummary {
    pub scheduled: usize,
    pub admitted: usize,
    pub without_odds: usize,
    pub one_sided_odds: usize,
    pub missing_prior_season: usize,
}

/// Join schedule, odds and team stats into `game_features` rows.
///
/// A game is admitted only when its (home, away, date) odds group has at least
/// one moneyline quote for each side. Win percentages come from the season
/// before the game's season; a missing prior record leaves the field empty but
/// keeps the game. Rows are ordered by (date, gamePk).
pub fn build_game_features(
    schedule: &[Game],
    quotes: &[OddsQuote],
    stats: &[TeamSeasonStat],
    names: &NameNormalizer,
) -> (Vec<GameFeature>, JoinSummary) {
    let odds = aggregate_moneyline(quotes, names);
    let win_pcts = season_win_pcts(stats, names);
    let mut summary = JoinSummary {
        scheduled: schedule.len(),
        ..JoinSummary::default()
    };
    let mut uncovered_teams = BTreeSet::new();

    let mut rows: Vec<(&Game, GameFeature)> = Vec::new();
    for game in schedule {
        let key = GameKey {
            home_team: names.canonical(&game.home_team),
            away_team: names.canonical(&game.away_team),
            match_date: game.match_date(),
        };
        let agg = match odds.get(&key) {
            Some(agg) if agg.home_quotes > 0 && agg.away_quotes > 0 => agg,
            Some(_) => {
                summary.one_sided_odds += 1;
                debug!("Game {} has moneyline quotes for one side only", game.game_pk);
                continue;
            }
            None => {
                summary.without_odds += 1;
                uncovered_teams.insert(game.home_team.clone());
                uncovered_teams.insert(game.away_team.clone());
                continue;
            }
        };

        let season = game.season();
        let home_win_pct = win_pcts.get(&(key.home_team.clone(), season - 1)).copied();
        let away_win_pct = win_pcts.get(&(key.away_team.clone(), season - 1)).copied();
        if home_win_pct.is_none() || away_win_pct.is_none() {
            summary.missing_prior_season += 1;
        }

        rows.push((game, feature_row(game, key, season, agg, home_win_pct, away_win_pct)));
    }

    flag_unmapped_uncovered(&uncovered_teams, &odds, names);

    rows.sort_by(|(a, _), (b, _)| a.date.cmp(&b.date).then(a.game_pk.cmp(&b.game_pk)));
    let features: Vec<GameFeature> = rows.into_iter().map(|(_, f)| f).collect();
    summary.admitted = features.len();
    info!(
        "Joined {} of {} scheduled games ({} without odds, {} one-sided, {} missing prior-season record)",
        summary.admitted,
        summary.scheduled,
        summary.without_odds,
        summary.one_sided_odds,
        summary.missing_prior_season
    );
    (features, summary)
}

/// `game_features.date` text for a schedule row, UTC.
pub fn format_game_date(game: &Game) -> String {
    game.date.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn feature_row(
    game: &Game,
    key: GameKey,
    season: i32,
    agg: &OddsAggregate,
    home_win_pct: Option<f64>,
    away_win_pct: Option<f64>,
) -> GameFeature {
    GameFeature {
        game_pk: game.game_pk,
        season,
        date: format_game_date(game),
        home_team: key.home_team,
        away_team: key.away_team,
        home_odds_avg: agg.home_odds_avg,
        away_odds_avg: agg.away_odds_avg,
        home_imp_avg: agg.home_imp_avg,
        away_imp_avg: agg.away_imp_avg,
        home_win_pct,
        away_win_pct,
        home_favorite: home_favorite(agg.home_imp_avg, agg.away_imp_avg),
    }
}

/// Schedule names from games without odds that are neither in the alias map
/// nor seen in any odds group. Each silently costs coverage.
pub fn unmapped_uncovered_teams(
    uncovered: &BTreeSet<String>,
    odds: &BTreeMap<GameKey, OddsAggregate>,
    names: &NameNormalizer,
) -> Vec<String> {
    let odds_teams: BTreeSet<&str> = odds
        .keys()
        .flat_map(|k| [k.home_team.as_str(), k.away_team.as_str()])
        .collect();
    uncovered
        .iter()
        .filter(|team| !names.is_mapped(team) && !odds_teams.contains(team.as_str()))
        .cloned()
        .collect()
}

fn flag_unmapped_uncovered(
    uncovered: &BTreeSet<String>,
    odds: &BTreeMap<GameKey, OddsAggregate>,
    names: &NameNormalizer,
) {
    for team in unmapped_uncovered_teams(uncovered, odds, names) {
        warn!(
            "Coverage: team name '{}' is not in the alias map and matches no odds quotes",
            team
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::parse_timestamp;
    use crate::features::odds::tests::quote;
    use approx::assert_relative_eq;

    fn game(pk: i64, date: &str, home: &str, away: &str) -> Game {
        Game {
            game_pk: pk,
            date: parse_timestamp(date).unwrap(),
            home_team: home.into(),
            away_team: away.into(),
            home_score: None,
            away_score: None,
            status: None,
        }
    }

    fn stat(team: &str, season: i32, wins: f64, losses: f64) -> TeamSeasonStat {
        TeamSeasonStat {
            team: team.into(),
            season,
            wins,
            losses,
        }
    }

    fn team_ab_quotes() -> Vec<OddsQuote> {
        vec![
            quote("2024-04-01T17:05:00Z", "TeamA", "TeamB", "X", "h2h", "TeamA", -150.0),
            quote("2024-04-01T17:05:00Z", "TeamA", "TeamB", "Y", "h2h", "TeamA", -140.0),
            quote("2024-04-01T17:05:00Z", "TeamA", "TeamB", "X", "h2h", "TeamB", 130.0),
            quote("2024-04-01T17:05:00Z", "TeamA", "TeamB", "Y", "h2h", "TeamB", 140.0),
        ]
    }

    #[test]
    fn end_to_end_single_game() {
        let schedule = vec![game(1, "2024-04-01", "TeamA", "TeamB")];
        let names = NameNormalizer::mlb();
        let (rows, summary) = build_game_features(&schedule, &team_ab_quotes(), &[], &names);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.game_pk, 1);
        assert_eq!(row.season, 2024);
        assert_eq!(row.date, "2024-04-01 00:00:00");
        // Unmapped but consistent names come through verbatim
        assert_eq!(row.home_team, "TeamA");
        assert_eq!(row.away_team, "TeamB");
        assert_relative_eq!(row.home_odds_avg.unwrap(), -145.0);
        assert_relative_eq!(row.away_odds_avg.unwrap(), 135.0);
        assert_relative_eq!(row.home_imp_avg.unwrap(), 0.5917, epsilon = 1e-4);
        assert_relative_eq!(row.away_imp_avg.unwrap(), 0.4257, epsilon = 1e-4);
        assert!(row.home_favorite);
        assert_eq!(row.home_win_pct, None);
        assert_eq!(summary.missing_prior_season, 1);
    }

    #[test]
    fn games_without_moneyline_quotes_are_excluded() {
        let schedule = vec![
            game(1, "2024-04-01", "TeamA", "TeamB"),
            game(2, "2024-04-01", "TeamC", "TeamD"),
            game(3, "2024-04-02", "TeamA", "TeamB"),
        ];
        let mut quotes = team_ab_quotes();
        quotes.push(quote("2024-04-01T17:05:00Z", "TeamC", "TeamD", "X", "spreads", "TeamC", -110.0));
        let (rows, summary) = build_game_features(&schedule, &quotes, &[], &NameNormalizer::mlb());
        assert_eq!(rows.iter().map(|r| r.game_pk).collect::<Vec<_>>(), vec![1]);
        assert_eq!(summary.without_odds, 2);
    }

    #[test]
    fn one_sided_odds_groups_are_excluded() {
        let schedule = vec![game(1, "2024-04-01", "TeamA", "TeamB")];
        let quotes = vec![quote("2024-04-01T17:05:00Z", "TeamA", "TeamB", "X", "h2h", "TeamA", -150.0)];
        let (rows, summary) = build_game_features(&schedule, &quotes, &[], &NameNormalizer::mlb());
        assert!(rows.is_empty());
        assert_eq!(summary.one_sided_odds, 1);
    }

    #[test]
    fn win_pct_comes_from_prior_season_only() {
        let schedule = vec![game(1, "2024-04-01", "TeamA", "TeamB")];
        let stats = vec![
            stat("TeamA", 2023, 90.0, 72.0),
            stat("TeamA", 2024, 10.0, 0.0),
            stat("TeamB", 2024, 0.0, 10.0),
        ];
        let (rows, _) = build_game_features(&schedule, &team_ab_quotes(), &stats, &NameNormalizer::mlb());
        assert_eq!(rows.len(), 1);
        assert_relative_eq!(rows[0].home_win_pct.unwrap(), 90.0 / 162.0);
        // Same-season record for TeamB must not be used
        assert_eq!(rows[0].away_win_pct, None);
    }

    #[test]
    fn names_are_canonicalized_across_sources() {
        let schedule = vec![game(7, "2024-04-01T20:10:00Z", "Athletics", "New York Yankees")];
        let quotes = vec![
            quote("2024-04-01T20:10:00Z", "Oakland Athletics", "New York Yankees", "X", "h2h", "Oakland Athletics", 150.0),
            quote("2024-04-01T20:10:00Z", "Oakland Athletics", "New York Yankees", "X", "h2h", "New York Yankees", -170.0),
        ];
        let stats = vec![stat("OAK", 2023, 50.0, 112.0), stat("NYY", 2023, 82.0, 80.0)];
        let (rows, _) = build_game_features(&schedule, &quotes, &stats, &NameNormalizer::mlb());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].home_team, "Athletics");
        assert_relative_eq!(rows[0].home_win_pct.unwrap(), 50.0 / 162.0);
        assert_relative_eq!(rows[0].away_win_pct.unwrap(), 82.0 / 162.0);
        assert!(!rows[0].home_favorite);
    }

    #[test]
    fn duplicate_team_seasons_keep_first_row() {
        let names = NameNormalizer::mlb();
        let stats = vec![
            stat("NYY", 2023, 82.0, 80.0),
            stat("New York Yankees", 2023, 99.0, 63.0),
            stat("BOS", 2023, 0.0, 0.0),
        ];
        let table = season_win_pcts(&stats, &names);
        assert_eq!(table.len(), 1);
        assert_relative_eq!(table[&("New York Yankees".to_string(), 2023)], 82.0 / 162.0);
    }

    #[test]
    fn rows_are_ordered_by_date_then_game() {
        let schedule = vec![
            game(9, "2024-04-02T17:00:00Z", "TeamA", "TeamB"),
            game(5, "2024-04-01T18:00:00Z", "TeamA", "TeamB"),
            game(3, "2024-04-01T18:00:00Z", "TeamA", "TeamB"),
        ];
        let mut quotes = team_ab_quotes();
        quotes.push(quote("2024-04-02T17:00:00Z", "TeamA", "TeamB", "X", "h2h", "TeamA", 100.0));
        quotes.push(quote("2024-04-02T17:00:00Z", "TeamA", "TeamB", "X", "h2h", "TeamB", -120.0));
        let (rows, _) = build_game_features(&schedule, &quotes, &[], &NameNormalizer::mlb());
        assert_eq!(rows.iter().map(|r| r.game_pk).collect::<Vec<_>>(), vec![3, 5, 9]);
    }

    #[test]
    fn unmapped_names_without_odds_are_reported() {
        let names = NameNormalizer::mlb();
        let quotes = vec![
            quote("2024-04-01T17:05:00Z", "TeamA", "TeamB", "X", "h2h", "TeamA", -120.0),
            quote("2024-04-01T17:05:00Z", "TeamA", "TeamB", "X", "h2h", "TeamB", 110.0),
        ];
        let odds = aggregate_moneyline(&quotes, &names);
        let uncovered: BTreeSet<String> = ["NY Yankees", "TeamA", "Boston Red Sox", "BOS"]
            .into_iter()
            .map(String::from)
            .collect();
        // TeamA is unmapped but matched odds; the MLB names are mapped
        assert_eq!(
            unmapped_uncovered_teams(&uncovered, &odds, &names),
            vec!["NY Yankees".to_string()]
        );
    }
}
