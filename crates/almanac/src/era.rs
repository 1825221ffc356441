//! Era registry and page-layout classification.
//!
//! Yearly pages changed layout several times. Each [`EraConfig`] describes one
//! layout for a contiguous range of seasons in one league. Ranges deliberately
//! overlap by a season at layout transitions; overlaps are resolved by scoring
//! structural signals found in the fetched document.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

use crate::types::{FetchUnit, League, TableRole};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("No page layout registered for {league} {year}")]
    NoPatternMatch { league: League, year: i32 },
}

#[derive(Debug, PartialEq, Eq)]
pub struct EraConfig {
    pub id: &'static str,
    pub league: League,
    pub year_start: i32,
    pub year_end: i32,
    pub player_identifiers: &'static [&'static str],
    pub pitcher_identifiers: &'static [&'static str],
    pub standings_identifiers: &'static [&'static str],
    /// CSS classes on data/header cells that are characteristic of the layout.
    pub marker_classes: &'static [&'static str],
    /// CSS classes marking the cell that names a statistic category.
    pub category_classes: &'static [&'static str],
    pub has_payroll: bool,
    pub has_ties: bool,
}

impl EraConfig {
    pub fn covers(&self, league: League, year: i32) -> bool {
        self.league == league && (self.year_start..=self.year_end).contains(&year)
    }

    pub fn identifiers(&self, role: TableRole) -> &'static [&'static str] {
        match role {
            TableRole::PlayerStats => self.player_identifiers,
            TableRole::PitcherStats => self.pitcher_identifiers,
            TableRole::Standings => self.standings_identifiers,
        }
    }

    fn all_identifiers(&self) -> impl Iterator<Item = &'static str> {
        let mut seen = HashSet::new();
        TableRole::ALL
            .into_iter()
            .flat_map(|role| self.identifiers(role).iter().copied())
            .filter(move |id| seen.insert(*id))
    }
}

const PLAYER_IDS: &[&str] = &["Player Review", "Hitting Statistics"];
const PITCHER_IDS: &[&str] = &["Pitcher Review", "Pitching Statistics"];
const STANDINGS_IDS: &[&str] = &["Team Standings"];
const STANDINGS_IDS_FINAL: &[&str] = &["Team Standings", "Final Standings"];

const FULL_MARKERS: &[&str] = &["datacolBox", "datacolBoxR", "datacolBoxC", "middle"];
const BOX_MARKERS: &[&str] = &["datacolBox", "middle"];
const FLAT_MARKERS: &[&str] = &["datacolBox"];
const MODERN_MARKERS: &[&str] = &["datacolBoxR", "datacolBoxC", "middle"];

const LEGACY_CATEGORY: &[&str] = &["datacolBlue", "statHeader", "category"];
const CATEGORY: &[&str] = &["datacolBlue"];

/// Registry order matters: on equal scores the later entry wins.
pub static REGISTRY: &[EraConfig] = &[
    EraConfig {
        id: "nl-classic",
        league: League::National,
        year_start: 1876,
        year_end: 2005,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS,
        marker_classes: FULL_MARKERS,
        category_classes: LEGACY_CATEGORY,
        has_payroll: false,
        has_ties: false,
    },
    EraConfig {
        id: "nl-payroll",
        league: League::National,
        year_start: 2005,
        year_end: 2013,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS,
        marker_classes: BOX_MARKERS,
        category_classes: CATEGORY,
        has_payroll: true,
        has_ties: true,
    },
    EraConfig {
        id: "nl-modern",
        league: League::National,
        year_start: 2013,
        year_end: 2025,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS_FINAL,
        marker_classes: FULL_MARKERS,
        category_classes: CATEGORY,
        has_payroll: true,
        has_ties: true,
    },
    EraConfig {
        id: "al-classic",
        league: League::American,
        year_start: 1901,
        year_end: 2002,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS,
        marker_classes: FULL_MARKERS,
        category_classes: LEGACY_CATEGORY,
        has_payroll: false,
        has_ties: false,
    },
    EraConfig {
        id: "al-transitional",
        league: League::American,
        year_start: 2002,
        year_end: 2004,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS,
        marker_classes: FLAT_MARKERS,
        category_classes: CATEGORY,
        has_payroll: true,
        has_ties: false,
    },
    EraConfig {
        id: "al-2004",
        league: League::American,
        year_start: 2004,
        year_end: 2004,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS_FINAL,
        marker_classes: BOX_MARKERS,
        category_classes: CATEGORY,
        has_payroll: true,
        has_ties: true,
    },
    EraConfig {
        id: "al-payroll",
        league: League::American,
        year_start: 2005,
        year_end: 2013,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS_FINAL,
        marker_classes: BOX_MARKERS,
        category_classes: CATEGORY,
        has_payroll: true,
        has_ties: true,
    },
    EraConfig {
        id: "al-modern",
        league: League::American,
        year_start: 2013,
        year_end: 2025,
        player_identifiers: PLAYER_IDS,
        pitcher_identifiers: PITCHER_IDS,
        standings_identifiers: STANDINGS_IDS_FINAL,
        marker_classes: MODERN_MARKERS,
        category_classes: CATEGORY,
        has_payroll: true,
        has_ties: true,
    },
];

/// Structural facts about a document used to disambiguate overlapping eras.
struct DocumentSignals {
    classes: HashSet<String>,
    text: String,
}

impl DocumentSignals {
    fn collect(document: &Html) -> Self {
        let classes = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .flat_map(|element| element.value().classes().map(str::to_string))
            .collect();
        let text = document.root_element().text().collect::<String>();

        Self { classes, text }
    }

    fn score(&self, config: &EraConfig) -> u32 {
        let class_score = config
            .marker_classes
            .iter()
            .filter(|class| self.classes.contains(**class))
            .count() as u32;
        let identifier_score = 2 * config
            .all_identifiers()
            .filter(|id| self.text.contains(id))
            .count() as u32;
        let payroll_score = if config.has_payroll && self.text.contains("Payroll") {
            3
        } else {
            0
        };

        class_score + identifier_score + payroll_score
    }
}

pub fn candidates(league: League, year: i32) -> Vec<&'static EraConfig> {
    REGISTRY.iter().filter(|c| c.covers(league, year)).collect()
}

pub fn classify(unit: &FetchUnit, document: &Html) -> Result<&'static EraConfig, ClassifyError> {
    let candidates = candidates(unit.league, unit.year);

    match candidates.as_slice() {
        [] => {
            log::warn!("No era registered for {}", unit);
            Err(ClassifyError::NoPatternMatch {
                league: unit.league,
                year: unit.year,
            })
        }
        [only] => Ok(*only),
        _ => {
            let signals = DocumentSignals::collect(document);
            let mut best: Option<(&'static EraConfig, u32)> = None;

            for &config in &candidates {
                let score = signals.score(config);
                log::debug!("Era {} scored {} for {}", config.id, score, unit);
                // `>=` so later registry entries win ties
                if best.is_none_or(|(_, best_score)| score >= best_score) {
                    best = Some((config, score));
                }
            }

            best.map(|(config, _)| config)
                .ok_or(ClassifyError::NoPatternMatch {
                    league: unit.league,
                    year: unit.year,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.baseball-almanac.com";

    #[test]
    fn test_registry_covers_every_season() {
        for league in League::ALL {
            for year in league.start_year()..=league.end_year() {
                assert!(
                    !candidates(league, year).is_empty(),
                    "no era for {league} {year}"
                );
            }
        }
    }

    #[test]
    fn test_single_candidate() {
        let unit = FetchUnit::new(League::American, 1927, BASE);
        let document = Html::parse_document("<html><body></body></html>");

        let config = classify(&unit, &document).unwrap();
        assert_eq!(config.id, "al-classic");
    }

    #[test]
    fn test_no_pattern_match() {
        let unit = FetchUnit::new(League::American, 1895, BASE);
        let document = Html::parse_document("<html></html>");

        let err = classify(&unit, &document).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::NoPatternMatch {
                league: League::American,
                year: 1895
            }
        ));
    }

    #[test]
    fn test_overlap_prefers_payroll_layout_when_payroll_present() {
        let unit = FetchUnit::new(League::National, 2005, BASE);
        let document = Html::parse_document(
            r#"<html><body>
                <table class="boxed"><tr><td class="header"><h2>2005 Player Review</h2></td></tr></table>
                <table class="boxed"><tr><td class="banner">Team Standings</td></tr>
                <tr><td class="datacolBox">Payroll</td></tr></table>
            </body></html>"#,
        );

        let config = classify(&unit, &document).unwrap();
        assert_eq!(config.id, "nl-payroll");
    }

    #[test]
    fn test_overlap_prefers_classic_on_richer_markers() {
        let unit = FetchUnit::new(League::National, 2005, BASE);
        let document = Html::parse_document(
            r#"<html><body><table>
                <tr><td class="datacolBox">a</td><td class="datacolBoxR">b</td>
                <td class="datacolBoxC">c</td><td class="middle">d</td></tr>
            </table></body></html>"#,
        );

        // classic: 4 markers; payroll layout: 2 markers
        let config = classify(&unit, &document).unwrap();
        assert_eq!(config.id, "nl-classic");
    }

    #[test]
    fn test_overlap_tie_goes_to_later_era() {
        let unit = FetchUnit::new(League::American, 2004, BASE);
        let document = Html::parse_document("<html><body><p>nothing here</p></body></html>");

        let config = classify(&unit, &document).unwrap();
        assert_eq!(config.id, "al-2004");
    }

    #[test]
    fn test_classification_is_idempotent() {
        let unit = FetchUnit::new(League::American, 2013, BASE);
        let document = Html::parse_document(
            r#"<html><body><h2>Pitcher Review</h2><td class="datacolBoxR">1</td>
            <p>Final Standings</p><p>Payroll</p></body></html>"#,
        );

        let first = classify(&unit, &document).unwrap();
        let second = classify(&unit, &document).unwrap();
        assert_eq!(first, second);
        assert!(std::ptr::eq(first, second));
    }
}
