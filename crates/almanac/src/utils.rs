use chrono::{DateTime, Utc};
use scraper::ElementRef;
use serde::Serialize;

use crate::types::{League, Record, StatKind};

pub(crate) fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

/// Text of every node under `element`, separated so adjacent cells never fuse.
pub(crate) fn spaced_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Per-kind record tallies for one unit or a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub player_stats: usize,
    pub pitcher_stats: usize,
    pub standings: usize,
}

impl RecordCounts {
    pub fn from_records(records: &[Record]) -> Self {
        let mut counts = RecordCounts::default();
        for record in records {
            match record {
                Record::Stat(stat) if stat.kind == StatKind::Batting => counts.player_stats += 1,
                Record::Stat(_) => counts.pitcher_stats += 1,
                Record::Standing(_) => counts.standings += 1,
            }
        }
        counts
    }

    pub fn add(&mut self, other: RecordCounts) {
        self.player_stats += other.player_stats;
        self.pitcher_stats += other.pitcher_stats;
        self.standings += other.standings;
    }

    pub fn total(&self) -> usize {
        self.player_stats + self.pitcher_stats + self.standings
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUnit {
    pub league: League,
    pub year: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requests_made: u64,
    pub requests_failed: u64,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub records: RecordCounts,
    pub failed: Vec<FailedUnit>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn success_rate(&self) -> f64 {
        if self.requests_made == 0 {
            return 100.0;
        }
        (1.0 - self.requests_failed as f64 / self.requests_made as f64) * 100.0
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = self.finished_at - self.started_at;

        writeln!(f, "\nRun summary:")?;
        writeln!(f, "  Duration:            {}s", duration.num_seconds())?;
        if self.cancelled {
            writeln!(f, "  Status:              cancelled (resumable)")?;
        }
        writeln!(f, "  Requests made:       {}", self.requests_made)?;
        writeln!(f, "  Requests failed:     {}", self.requests_failed)?;
        writeln!(f, "  Success rate:        {:.1}%", self.success_rate())?;
        writeln!(f, "  Units succeeded:     {}", self.units_succeeded)?;
        writeln!(f, "  Units failed:        {}", self.units_failed)?;
        writeln!(f, "  Player statistics:   {}", self.records.player_stats)?;
        writeln!(f, "  Pitcher statistics:  {}", self.records.pitcher_stats)?;
        writeln!(f, "  Team standings:      {}", self.records.standings)?;
        writeln!(f, "  Total records:       {}", self.records.total())?;

        if self.failed.is_empty() {
            writeln!(f, "  Failed years:        none")
        } else {
            writeln!(f, "  Failed years:")?;
            for failure in &self.failed {
                writeln!(f, "    - {} {}: {}", failure.league, failure.year, failure.reason)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Babe \n\t Ruth "), "Babe Ruth");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_spaced_text_separates_cells() {
        let document =
            scraper::Html::parse_fragment("<table><tr><th>Team</th><th>W</th></tr></table>");
        let table = document
            .select(&scraper::Selector::parse("table").unwrap())
            .next()
            .unwrap();

        assert_eq!(elem_text(table), "TeamW");
        assert_eq!(normalize_whitespace(&spaced_text(table)), "Team W");
    }

    #[test]
    fn test_summary_lists_failed_years() {
        let now = Utc::now();
        let summary = RunSummary {
            started_at: now,
            finished_at: now,
            requests_made: 10,
            requests_failed: 2,
            units_succeeded: 3,
            units_failed: 1,
            records: RecordCounts {
                player_stats: 5,
                pitcher_stats: 4,
                standings: 8,
            },
            failed: vec![FailedUnit {
                league: League::National,
                year: 1884,
                reason: "fetch failed".to_string(),
            }],
            cancelled: false,
        };

        let text = summary.to_string();
        assert!(text.contains("Success rate:        80.0%"));
        assert!(text.contains("Total records:       17"));
        assert!(text.contains("National League 1884: fetch failed"));
    }
}
