use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::era::{ClassifyError, EraConfig, classify};
use crate::locator::{LocateError, Located, locate};
use crate::rows::{LogicalRow, MIN_DATA_COLUMNS, reconstruct};
use crate::types::{
    FetchUnit, League, Record, StandingRecord, StatCategory, StatKind, StatRecord, TableRole,
};
use crate::utils::{RecordCounts, elem_text, normalize_whitespace};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Locate(#[from] LocateError),
}

static SEL_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("invalid selector: anchor"));
static RE_WINNING_PCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0?\.\d{1,4}|1\.0{1,4})$").expect("invalid regex: pct"));
static RE_GAMES_BACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(\.5|½)?|½)$").expect("invalid regex: games back"));

const DIVISIONS: &[&str] = &["East", "Central", "West"];
const DEFAULT_DIVISION: &str = "League";
const NONE_MARKERS: &[&str] = &["", "-", "--", "—", "–"];
const PLACEHOLDER_VALUES: &[&str] = &["-", "--", "N/A"];
const MAX_SEASON_DECISIONS: u32 = 200;

/// What the extractor needs to know about the page it is reading.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'c> {
    pub unit: &'c FetchUnit,
    pub config: &'c EraConfig,
}

impl ExtractContext<'_> {
    fn league(&self) -> League {
        self.unit.league
    }

    fn year(&self) -> i32 {
        self.unit.year
    }

    fn resolve(&self, href: &str) -> String {
        Url::parse(&self.unit.url)
            .and_then(|base| base.join(href))
            .map(String::from)
            .unwrap_or_else(|_| href.to_string())
    }
}

/// Everything extracted from one yearly page.
#[derive(Debug, Clone)]
pub struct PageRecords {
    pub era: &'static str,
    pub records: Vec<Record>,
}

impl PageRecords {
    pub fn counts(&self) -> RecordCounts {
        RecordCounts::from_records(&self.records)
    }
}

fn cell_text(cell: ElementRef) -> String {
    normalize_whitespace(&elem_text(cell))
}

fn first_link<'a>(cell: ElementRef<'a>) -> Option<(String, &'a str)> {
    cell.select(&SEL_ANCHOR)
        .next()
        .and_then(|a| a.value().attr("href").map(|href| (cell_text(a), href)))
}

fn has_class(cell: ElementRef, classes: &[&str]) -> bool {
    cell.value()
        .classes()
        .any(|class| classes.iter().any(|c| c.eq_ignore_ascii_case(class)))
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Classify, locate, reconstruct and extract every table on a yearly page.
pub fn parse_yearly_page(html: &str, unit: &FetchUnit) -> Result<PageRecords, ParseError> {
    let document = Html::parse_document(html);
    let config = classify(unit, &document)?;
    log::debug!("Classified {} as {}", unit, config.id);

    let ctx = ExtractContext { unit, config };
    let mut records = Vec::new();

    for role in TableRole::ALL {
        match locate(&document, role, config, unit)? {
            Located::Found(table) => {
                let rows = reconstruct(&table);
                let extracted = extract(&rows, role, &ctx);
                log::info!("Extracted {} {} for {}", extracted.len(), role, unit);
                records.extend(extracted);
            }
            Located::Absent => {}
        }
    }

    Ok(PageRecords {
        era: config.id,
        records,
    })
}

/// Walk logical rows of one table and emit its records. Malformed rows are skipped.
pub fn extract(rows: &[LogicalRow], role: TableRole, ctx: &ExtractContext) -> Vec<Record> {
    match role.stat_kind() {
        Some(kind) => extract_stats(rows, kind, ctx),
        None => extract_standings(rows, ctx),
    }
}

fn category_marker(row: &LogicalRow, config: &EraConfig) -> Option<String> {
    let first = row.first()?;
    if !has_class(first, config.category_classes) {
        return None;
    }
    let label = match first_link(first) {
        Some((label, _)) => Some(label),
        None if row.len() == 1 => Some(cell_text(first)),
        None => None,
    };
    label.filter(|label| !label.is_empty())
}

fn extract_stats(rows: &[LogicalRow], kind: StatKind, ctx: &ExtractContext) -> Vec<Record> {
    let mut records = Vec::new();
    let mut category: Option<StatCategory> = None;

    for row in rows {
        if let Some(label) = category_marker(row, ctx.config) {
            let next = StatCategory::from_label(&label);
            if category.as_ref() != Some(&next) {
                log::debug!("Category -> {} ({})", next, ctx.unit);
            }
            category = Some(next);
        }

        if row.len() < MIN_DATA_COLUMNS {
            continue;
        }
        let Some(current) = &category else {
            log::debug!("Skipping row before any category: {:?}", row.texts());
            continue;
        };

        match stat_from_row(row, current, kind, ctx) {
            Some(stat) => records.push(Record::Stat(stat)),
            None => log::debug!("Skipping malformed stat row: {:?}", row.texts()),
        }
    }

    records
}

fn name_column(row: &LogicalRow) -> usize {
    row.cells()
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, cell)| {
            first_link(**cell).is_some_and(|(_, href)| href.to_ascii_lowercase().contains("player"))
        })
        .map(|(i, _)| i)
        .unwrap_or(1)
}

fn parse_rank(text: &str) -> u32 {
    text.trim_matches(|c: char| c == '.' || c == 'T' || c.is_whitespace())
        .parse()
        .unwrap_or(1)
}

fn stat_from_row(
    row: &LogicalRow,
    category: &StatCategory,
    kind: StatKind,
    ctx: &ExtractContext,
) -> Option<StatRecord> {
    let name_idx = name_column(row);
    let name_cell = row.get(name_idx)?;
    let team_cell = row.get(name_idx + 1)?;
    let value = row.text(name_idx + 2)?;

    if value.is_empty() || PLACEHOLDER_VALUES.contains(&value.as_str()) {
        return None;
    }

    let (subject_name, subject_url) = match first_link(name_cell) {
        Some((name, href)) => (name, ctx.resolve(href)),
        None => (cell_text(name_cell), String::new()),
    };
    if subject_name.is_empty() {
        return None;
    }

    let (team, team_url) = match first_link(team_cell) {
        Some((team, href)) => (team, ctx.resolve(href)),
        None => (cell_text(team_cell), String::new()),
    };

    Some(StatRecord {
        subject_name,
        subject_url,
        team,
        team_url,
        year: ctx.year(),
        league: ctx.league(),
        statistic: category.clone(),
        value,
        kind,
        rank: row.text(0).map(|t| parse_rank(&t)).unwrap_or(1),
    })
}

fn extract_standings(rows: &[LogicalRow], ctx: &ExtractContext) -> Vec<Record> {
    let mut records = Vec::new();
    let mut division: Option<String> = None;

    for row in rows {
        let texts = row.texts();

        if let [only] = texts.as_slice() {
            if DIVISIONS.contains(&only.as_str()) {
                division = Some(only.clone());
            }
            continue;
        }

        match standing_from_row(row, &texts, division.as_deref(), ctx) {
            Some(standing) => records.push(Record::Standing(standing)),
            None => log::debug!("Skipping standings row: {:?}", texts),
        }
    }

    records
}

/// Team name when the row is a team row: a linked team/roster page, else plain text.
fn team_name(row: &LogicalRow, texts: &[String]) -> Option<String> {
    let first = row.first()?;
    match first_link(first) {
        Some((name, href)) if href.contains("teamstats") || href.contains("roster") => Some(name),
        Some(_) => None,
        None => {
            let name = texts.first()?;
            (!name.is_empty() && !is_numeric(name) && !RE_WINNING_PCT.is_match(name))
                .then(|| name.clone())
        }
    }
}

fn standing_from_row(
    row: &LogicalRow,
    texts: &[String],
    division: Option<&str>,
    ctx: &ExtractContext,
) -> Option<StandingRecord> {
    if texts.len() < MIN_DATA_COLUMNS {
        return None;
    }
    let team = team_name(row, texts)?;

    let pct_idx = texts
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, t)| RE_WINNING_PCT.is_match(t))
        .map(|(i, _)| i);
    let numeric: Vec<(usize, u32)> = texts
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, t)| is_numeric(t))
        .filter_map(|(i, t)| t.parse().ok().map(|n| (i, n)))
        .collect();

    let (&(_, wins), &(losses_idx, losses)) = (numeric.first()?, numeric.get(1)?);
    let decisions = wins.checked_add(losses)?;
    if decisions == 0 || decisions > MAX_SEASON_DECISIONS {
        return None;
    }

    let ties = if ctx.config.has_ties {
        numeric
            .get(2)
            .filter(|(i, _)| pct_idx.is_none_or(|p| *i < p))
            .map(|(_, t)| *t)
    } else {
        None
    };

    let computed = wins as f64 / decisions as f64;
    let winning_pct = pct_idx
        .and_then(|i| texts[i].parse::<f64>().ok())
        .filter(|pct| (0.0..=1.0).contains(pct))
        .unwrap_or(computed);

    let payroll = if ctx.config.has_payroll {
        texts.iter().find(|t| t.starts_with('$')).cloned()
    } else {
        None
    };

    let gb_from = pct_idx.unwrap_or(losses_idx) + 1;
    let games_back = texts
        .get(gb_from..)
        .unwrap_or_default()
        .iter()
        .rev()
        .filter(|t| !t.starts_with('$'))
        .find_map(|t| {
            if NONE_MARKERS.contains(&t.as_str()) {
                Some("0".to_string())
            } else if RE_GAMES_BACK.is_match(t) {
                Some(t.clone())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "0".to_string());

    Some(StandingRecord {
        year: ctx.year(),
        league: ctx.league(),
        division: division.unwrap_or(DEFAULT_DIVISION).to_string(),
        team,
        wins,
        losses,
        winning_pct,
        games_back,
        ties,
        payroll,
    })
}
