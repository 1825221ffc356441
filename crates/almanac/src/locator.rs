//! Finding the table that plays a given role on a yearly page.
//!
//! Layouts differ by era, so location is an ordered list of strategies, each
//! a plain function tried in turn until one yields a table.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::era::EraConfig;
use crate::rows::{physical_rows, row_cells};
use crate::types::{FetchUnit, TableRole};
use crate::utils::{elem_text, normalize_whitespace, spaced_text};

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("No {role} table found for {unit}")]
    NotFound { role: TableRole, unit: String },
}

/// Handle to one `<table>` element of a parsed page.
#[derive(Debug, Clone, Copy)]
pub struct RawTable<'a> {
    element: ElementRef<'a>,
}

impl<'a> RawTable<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        Self { element }
    }

    pub fn element(&self) -> ElementRef<'a> {
        self.element
    }
}

#[derive(Debug)]
pub enum Located<'a> {
    Found(RawTable<'a>),
    /// The page predates the feature; no table is expected.
    Absent,
}

pub type Strategy = for<'a> fn(&'a Html, TableRole, &EraConfig) -> Option<RawTable<'a>>;

pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("heading", by_heading),
    ("attribute", by_attribute),
    ("leading text", by_leading_text),
    ("structural", by_structure),
];

/// How far into a table's text an identifier may appear and still count.
const LEADING_TEXT_CHARS: usize = 500;
const HEADER_ROWS_SCANNED: usize = 3;
const MIN_STRUCTURAL_SCORE: usize = 2;

static SEL_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("invalid selector: table"));
static SEL_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4").expect("invalid selector: heading"));
static SEL_CAPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("caption").expect("invalid selector: caption"));

/// First season in which a table of this role is expected on every page.
pub fn feature_introduced(role: TableRole) -> i32 {
    match role {
        TableRole::PlayerStats | TableRole::PitcherStats => 1920,
        TableRole::Standings => 1969,
    }
}

fn keywords(role: TableRole) -> &'static [&'static str] {
    match role {
        TableRole::PlayerStats => &["avg", "hits", "home runs", "rbi", "batting", "doubles"],
        TableRole::PitcherStats => &["era", "wins", "strikeouts", "saves", "pitching", "innings"],
        TableRole::Standings => &["w", "l", "pct", "gb", "wins", "losses", "standings"],
    }
}

fn table_text(table: ElementRef) -> String {
    normalize_whitespace(&spaced_text(table))
}

fn mentions_identifier(text: &str, role: TableRole, config: &EraConfig) -> bool {
    config.identifiers(role).iter().any(|id| text.contains(id))
}

/// The table enclosing `element`, else the nearest table after it in document order.
fn enclosing_or_following_table(element: ElementRef) -> Option<ElementRef> {
    if let Some(table) = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
    {
        return Some(table);
    }

    let mut current = Some(*element);
    while let Some(node) = current {
        let found = node.next_siblings().find_map(|sibling| {
            sibling
                .descendants()
                .filter_map(ElementRef::wrap)
                .find(|e| e.value().name() == "table")
        });
        if found.is_some() {
            return found;
        }
        current = node.parent();
    }
    None
}

pub fn by_heading<'a>(
    document: &'a Html,
    role: TableRole,
    config: &EraConfig,
) -> Option<RawTable<'a>> {
    document
        .select(&SEL_HEADING)
        .filter(|heading| mentions_identifier(&table_text(*heading), role, config))
        .find_map(enclosing_or_following_table)
        .map(RawTable::new)
}

pub fn by_attribute<'a>(
    document: &'a Html,
    role: TableRole,
    config: &EraConfig,
) -> Option<RawTable<'a>> {
    document
        .select(&SEL_TABLE)
        .find(|table| {
            let attrs = ["summary", "title", "aria-label"]
                .iter()
                .filter_map(|name| table.value().attr(name));
            let caption = table.select(&SEL_CAPTION).next().map(table_text);

            attrs
                .map(str::to_string)
                .chain(caption)
                .any(|text| mentions_identifier(&text, role, config))
        })
        .map(RawTable::new)
}

pub fn by_leading_text<'a>(
    document: &'a Html,
    role: TableRole,
    config: &EraConfig,
) -> Option<RawTable<'a>> {
    document
        .select(&SEL_TABLE)
        .filter_map(|table| {
            let text = table_text(table);
            let leading: String = text.chars().take(LEADING_TEXT_CHARS).collect();
            mentions_identifier(&leading, role, config).then_some((table, text.len()))
        })
        // Layout tables wrap data tables; the innermost match is the data table
        .min_by_key(|(_, len)| *len)
        .map(|(table, _)| RawTable::new(table))
}

fn structural_score(table: ElementRef, role: TableRole) -> usize {
    let header_text = physical_rows(table)
        .into_iter()
        .take(HEADER_ROWS_SCANNED)
        .flat_map(row_cells)
        .map(|cell| elem_text(cell).to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let tokens = header_text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let padded = format!(" {} ", tokens);

    keywords(role)
        .iter()
        .filter(|kw| padded.contains(&format!(" {} ", kw)))
        .count()
}

pub fn by_structure<'a>(
    document: &'a Html,
    role: TableRole,
    _config: &EraConfig,
) -> Option<RawTable<'a>> {
    document
        .select(&SEL_TABLE)
        .map(|table| (table, structural_score(table, role), table_text(table).len()))
        .filter(|(_, score, _)| *score >= MIN_STRUCTURAL_SCORE)
        // Highest score, then the smallest table
        .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
        .map(|(table, _, _)| RawTable::new(table))
}

pub fn locate<'a>(
    document: &'a Html,
    role: TableRole,
    config: &EraConfig,
    unit: &FetchUnit,
) -> Result<Located<'a>, LocateError> {
    for (name, strategy) in STRATEGIES {
        if let Some(table) = strategy(document, role, config) {
            log::debug!("Located {} table for {} via {}", role, unit, name);
            return Ok(Located::Found(table));
        }
    }

    if unit.year < feature_introduced(role) {
        log::info!("No {} table for {} (not tracked yet)", role, unit);
        return Ok(Located::Absent);
    }

    log::warn!("No {} table found for {}", role, unit);
    Err(LocateError::NotFound {
        role,
        unit: unit.to_string(),
    })
}
