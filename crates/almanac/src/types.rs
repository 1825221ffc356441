use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("Invalid league '{0}'. Accepted values: 'a', 'al', 'american', 'n', 'nl', 'national'")]
pub struct LeagueParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum League {
    American,
    National,
}

impl League {
    pub const ALL: [League; 2] = [League::American, League::National];

    /// Single-letter code used in yearly page URLs and checkpoint file names.
    pub fn code(&self) -> &'static str {
        match self {
            League::American => "a",
            League::National => "n",
        }
    }

    pub fn start_year(&self) -> i32 {
        match self {
            League::American => 1901,
            League::National => 1876,
        }
    }

    pub fn end_year(&self) -> i32 {
        2025
    }
}

impl FromStr for League {
    type Err = LeagueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" | "al" | "american" => Ok(League::American),
            "n" | "nl" | "national" => Ok(League::National),
            _ => Err(LeagueParseError(s.to_string())),
        }
    }
}

impl Display for League {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            League::American => write!(f, "American League"),
            League::National => write!(f, "National League"),
        }
    }
}

/// One (league, year) page of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchUnit {
    pub league: League,
    pub year: i32,
    pub url: String,
}

impl FetchUnit {
    pub fn new(league: League, year: i32, base_url: &str) -> Self {
        let url = format!(
            "{}/yearly/yr{}{}.shtml",
            base_url.trim_end_matches('/'),
            year,
            league.code()
        );
        Self { league, year, url }
    }
}

impl Display for FetchUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.year, self.league)
    }
}

/// The semantic role a located table plays on a yearly page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    PlayerStats,
    PitcherStats,
    Standings,
}

impl TableRole {
    pub const ALL: [TableRole; 3] = [
        TableRole::PlayerStats,
        TableRole::PitcherStats,
        TableRole::Standings,
    ];

    pub fn stat_kind(&self) -> Option<StatKind> {
        match self {
            TableRole::PlayerStats => Some(StatKind::Batting),
            TableRole::PitcherStats => Some(StatKind::Pitching),
            TableRole::Standings => None,
        }
    }
}

impl Display for TableRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableRole::PlayerStats => write!(f, "player statistics"),
            TableRole::PitcherStats => write!(f, "pitcher statistics"),
            TableRole::Standings => write!(f, "standings"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Batting,
    Pitching,
}

impl Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatKind::Batting => write!(f, "batting"),
            StatKind::Pitching => write!(f, "pitching"),
        }
    }
}

/// Statistic a block of review rows ranks players by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatCategory {
    HomeRuns,
    BattingAverage,
    Hits,
    RunsBattedIn,
    Runs,
    Doubles,
    Triples,
    StolenBases,
    BaseOnBalls,
    Strikeouts,
    OnBasePercentage,
    SluggingAverage,
    TotalBases,
    EarnedRunAverage,
    Wins,
    Saves,
    Shutouts,
    CompleteGames,
    Games,
    InningsPitched,
    WinningPercentage,
    Other(String),
}

impl StatCategory {
    pub fn from_label(label: &str) -> Self {
        let normalized = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match normalized.as_str() {
            "home runs" | "homeruns" | "hr" => StatCategory::HomeRuns,
            "batting average" | "avg" | "ba" => StatCategory::BattingAverage,
            "hits" | "h" => StatCategory::Hits,
            "rbi" | "runs batted in" => StatCategory::RunsBattedIn,
            "runs" | "r" => StatCategory::Runs,
            "doubles" | "2b" => StatCategory::Doubles,
            "triples" | "3b" => StatCategory::Triples,
            "stolen bases" | "sb" => StatCategory::StolenBases,
            "base on balls" | "bases on balls" | "walks" | "bb" => StatCategory::BaseOnBalls,
            "strikeouts" | "so" | "k" => StatCategory::Strikeouts,
            "on base percentage" | "obp" => StatCategory::OnBasePercentage,
            "slugging average" | "slugging percentage" | "slg" => StatCategory::SluggingAverage,
            "total bases" | "tb" => StatCategory::TotalBases,
            "era" | "earned run average" => StatCategory::EarnedRunAverage,
            "wins" | "w" => StatCategory::Wins,
            "saves" | "sv" => StatCategory::Saves,
            "shutouts" | "sho" => StatCategory::Shutouts,
            "complete games" | "cg" => StatCategory::CompleteGames,
            "games" | "g" => StatCategory::Games,
            "innings pitched" | "ip" => StatCategory::InningsPitched,
            "winning percentage" | "win pct" => StatCategory::WinningPercentage,
            _ => StatCategory::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            StatCategory::HomeRuns => "Home Runs",
            StatCategory::BattingAverage => "Batting Average",
            StatCategory::Hits => "Hits",
            StatCategory::RunsBattedIn => "RBI",
            StatCategory::Runs => "Runs",
            StatCategory::Doubles => "Doubles",
            StatCategory::Triples => "Triples",
            StatCategory::StolenBases => "Stolen Bases",
            StatCategory::BaseOnBalls => "Base on Balls",
            StatCategory::Strikeouts => "Strikeouts",
            StatCategory::OnBasePercentage => "On Base Percentage",
            StatCategory::SluggingAverage => "Slugging Average",
            StatCategory::TotalBases => "Total Bases",
            StatCategory::EarnedRunAverage => "ERA",
            StatCategory::Wins => "Wins",
            StatCategory::Saves => "Saves",
            StatCategory::Shutouts => "Shutouts",
            StatCategory::CompleteGames => "Complete Games",
            StatCategory::Games => "Games",
            StatCategory::InningsPitched => "Innings Pitched",
            StatCategory::WinningPercentage => "Winning Percentage",
            StatCategory::Other(label) => label,
        }
    }
}

impl From<String> for StatCategory {
    fn from(label: String) -> Self {
        StatCategory::from_label(&label)
    }
}

impl From<StatCategory> for String {
    fn from(category: StatCategory) -> Self {
        category.label().to_string()
    }
}

impl Display for StatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub subject_name: String,
    pub subject_url: String,
    pub team: String,
    pub team_url: String,
    pub year: i32,
    pub league: League,
    pub statistic: StatCategory,
    pub value: String,
    pub kind: StatKind,
    pub rank: u32,
}

impl Display for StatRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {}] {} #{} {} ({}) {}",
            self.year,
            self.kind,
            self.statistic,
            self.rank,
            self.subject_name,
            self.team,
            self.value
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRecord {
    pub year: i32,
    pub league: League,
    pub division: String,
    pub team: String,
    pub wins: u32,
    pub losses: u32,
    pub winning_pct: f64,
    pub games_back: String,
    pub ties: Option<u32>,
    pub payroll: Option<String>,
}

impl Display for StandingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {}] {:<24} {:>3}-{:<3} {:.3}  GB {}",
            self.year,
            self.division,
            self.team,
            self.wins,
            self.losses,
            self.winning_pct,
            self.games_back
        )?;
        if let Some(ties) = self.ties {
            write!(f, "  T {}", ties)?;
        }
        if let Some(payroll) = &self.payroll {
            write!(f, "  Payroll {}", payroll)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Stat(StatRecord),
    Standing(StandingRecord),
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Stat(stat) => write!(f, "{}", stat),
            Record::Standing(standing) => write!(f, "{}", standing),
        }
    }
}
