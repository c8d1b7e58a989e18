//! Team name canonicalization across the schedule, odds and stats sources.
//!
//! The StatsAPI schedule, The Odds API feed and the FanGraphs team tables
//! each spell franchises their own way (full names, city-qualified legacy
//! names, three-letter abbreviations). Every name passes through
//! [`NameNormalizer::canonical`] before it takes part in a join.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Canonical names are the current StatsAPI spellings.
const MLB_ALIASES: &[(&str, &[&str])] = &[
    ("Arizona Diamondbacks", &["ARI", "AZ", "Arizona D-backs", "Diamondbacks"]),
    ("Athletics", &["ATH", "OAK", "Oakland Athletics", "Oakland A's", "Sacramento Athletics"]),
    ("Atlanta Braves", &["ATL", "Braves"]),
    ("Baltimore Orioles", &["BAL", "Orioles"]),
    ("Boston Red Sox", &["BOS", "Red Sox"]),
    ("Chicago Cubs", &["CHC", "Cubs"]),
    ("Chicago White Sox", &["CHW", "CWS", "White Sox"]),
    ("Cincinnati Reds", &["CIN", "Reds"]),
    ("Cleveland Guardians", &["CLE", "Cleveland Indians", "Guardians"]),
    ("Colorado Rockies", &["COL", "Rockies"]),
    ("Detroit Tigers", &["DET", "Tigers"]),
    ("Houston Astros", &["HOU", "Astros"]),
    ("Kansas City Royals", &["KC", "KCR", "Royals"]),
    ("Los Angeles Angels", &["LAA", "ANA", "Los Angeles Angels of Anaheim", "Angels"]),
    ("Los Angeles Dodgers", &["LAD", "Dodgers"]),
    ("Miami Marlins", &["MIA", "FLA", "Florida Marlins", "Marlins"]),
    ("Milwaukee Brewers", &["MIL", "Brewers"]),
    ("Minnesota Twins", &["MIN", "Twins"]),
    ("New York Mets", &["NYM", "Mets"]),
    ("New York Yankees", &["NYY", "Yankees"]),
    ("Philadelphia Phillies", &["PHI", "Phillies"]),
    ("Pittsburgh Pirates", &["PIT", "Pirates"]),
    ("San Diego Padres", &["SD", "SDP", "Padres"]),
    ("San Francisco Giants", &["SF", "SFG", "Giants"]),
    ("Seattle Mariners", &["SEA", "Mariners"]),
    ("St. Louis Cardinals", &["STL", "St Louis Cardinals", "Saint Louis Cardinals", "Cardinals"]),
    ("Tampa Bay Rays", &["TB", "TBR", "Tampa Bay Devil Rays", "Rays"]),
    ("Texas Rangers", &["TEX", "Rangers"]),
    ("Toronto Blue Jays", &["TOR", "Blue Jays"]),
    ("Washington Nationals", &["WSH", "WSN", "Nationals"]),
];

/// Maps source-specific team name variants to one canonical string.
#[derive(Debug, Default)]
pub struct NameNormalizer {
    aliases: HashMap<String, String>,
    /// Names looked up that are neither a variant nor a canonical name.
    unmapped: RefCell<BTreeSet<String>>,
}

impl NameNormalizer {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        NameNormalizer {
            aliases,
            unmapped: RefCell::new(BTreeSet::new()),
        }
    }

    /// The built-in MLB map.
    pub fn mlb() -> Self {
        let mut aliases = HashMap::new();
        for (canonical, variants) in MLB_ALIASES {
            aliases.insert(canonical.to_string(), canonical.to_string());
            for v in variants.iter() {
                aliases.insert(v.to_string(), canonical.to_string());
            }
        }
        Self::new(aliases)
    }

    /// The built-in map with entries from a JSON object file layered on top.
    pub fn mlb_with_overrides(path: Option<&str>) -> Result<Self> {
        let mut normalizer = Self::mlb();
        if let Some(path) = path {
            let content = std::fs::read_to_string(Path::new(path))
                .with_context(|| format!("cannot read team alias file {path}"))?;
            let extra: HashMap<String, String> = serde_json::from_str(&content)
                .with_context(|| format!("team alias file {path} is not a JSON object of strings"))?;
            normalizer.aliases.extend(extra);
        }
        Ok(normalizer)
    }

    /// Canonical name for `name`, or `name` unchanged when it is not mapped.
    pub fn canonical(&self, name: &str) -> String {
        match self.aliases.get(name) {
            Some(c) => c.clone(),
            None => {
                self.unmapped.borrow_mut().insert(name.to_string());
                name.to_string()
            }
        }
    }

    pub fn is_mapped(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Every unmapped name seen so far, sorted.
    pub fn unmapped_names(&self) -> Vec<String> {
        self.unmapped.borrow().iter().cloned().collect()
    }
}
