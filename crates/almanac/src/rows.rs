//! Logical row reconstruction.
//!
//! Review tables group tied players under one shared value cell declared with
//! `rowspan`. The physical `<tr>` for the second and later players therefore
//! has fewer cells than the first. [`reconstruct`] rebuilds the grid a reader
//! sees, repeating each spanning cell in every row it covers.

use std::collections::BTreeMap;

use scraper::ElementRef;

use crate::locator::RawTable;
use crate::utils::{elem_text, normalize_whitespace};

/// Fewer logical columns than this can never hold a record.
pub const MIN_DATA_COLUMNS: usize = 4;

const BANNER_CLASS: &str = "banner";
const MAX_EMPHASIZED_DATA_CELLS: usize = 2;

/// One logical row. Spanned cells are shared references to the same element.
#[derive(Debug, Clone)]
pub struct LogicalRow<'a> {
    cells: Vec<ElementRef<'a>>,
}

impl<'a> LogicalRow<'a> {
    pub fn cells(&self) -> &[ElementRef<'a>] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ElementRef<'a>> {
        self.cells.get(index).copied()
    }

    pub fn first(&self) -> Option<ElementRef<'a>> {
        self.get(0)
    }

    pub fn text(&self, index: usize) -> Option<String> {
        self.get(index).map(|cell| normalize_whitespace(&elem_text(cell)))
    }

    pub fn texts(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|cell| normalize_whitespace(&elem_text(*cell)))
            .collect()
    }
}

struct TrackedSpan<'a> {
    cell: ElementRef<'a>,
    remaining: usize,
}

/// Direct children of `element` with one of the given tag names.
fn child_elements<'a>(
    element: ElementRef<'a>,
    names: &'a [&'a str],
) -> impl Iterator<Item = ElementRef<'a>> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| names.contains(&child.value().name()))
}

/// The table's own rows, excluding rows of nested tables.
pub(crate) fn physical_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(child_elements(child, &["tr"])),
            _ => {}
        }
    }
    rows
}

pub(crate) fn row_cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    child_elements(row, &["td", "th"]).collect()
}

fn is_emphasized(cell: ElementRef) -> bool {
    cell.descendants()
        .filter_map(ElementRef::wrap)
        .any(|e| matches!(e.value().name(), "b" | "strong"))
}

fn is_header_row(cells: &[ElementRef]) -> bool {
    let Some(first) = cells.first() else {
        return true;
    };

    // Single cells are section labels (categories, divisions), never column headers
    if cells.len() == 1 {
        return false;
    }

    if first
        .value()
        .classes()
        .any(|class| class.eq_ignore_ascii_case(BANNER_CLASS))
    {
        return true;
    }

    cells.iter().filter(|cell| is_emphasized(**cell)).count() > MAX_EMPHASIZED_DATA_CELLS
}

fn declared_rowspan(cell: ElementRef, max: usize) -> usize {
    cell.value()
        .attr("rowspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|span| *span > 0)
        .unwrap_or(1)
        .min(max.max(1))
}

pub fn reconstruct<'a>(table: &RawTable<'a>) -> Vec<LogicalRow<'a>> {
    let rows = physical_rows(table.element());
    let max_span = rows.len();
    let mut tracker: BTreeMap<usize, TrackedSpan<'a>> = BTreeMap::new();
    let mut logical = Vec::with_capacity(rows.len());

    for row in rows {
        let cells = row_cells(row);
        if is_header_row(&cells) {
            continue;
        }

        let mut out = Vec::with_capacity(cells.len() + tracker.len());
        let mut physical = cells.into_iter();
        let mut column = 0;

        loop {
            if let Some(span) = tracker.get_mut(&column) {
                out.push(span.cell);
                span.remaining -= 1;
                if span.remaining == 0 {
                    tracker.remove(&column);
                }
            } else if let Some(cell) = physical.next() {
                let span = declared_rowspan(cell, max_span);
                if span > 1 {
                    tracker.insert(
                        column,
                        TrackedSpan {
                            cell,
                            remaining: span - 1,
                        },
                    );
                }
                out.push(cell);
            } else if tracker.range(column..).next().is_none() {
                break;
            }
            column += 1;
        }

        logical.push(LogicalRow { cells: out });
    }

    if !tracker.is_empty() {
        log::debug!(
            "Table ended with {} unfinished row spans; discarding",
            tracker.len()
        );
    }

    logical
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn table_html(body: &str) -> Html {
        Html::parse_document(&format!("<html><body><table>{}</table></body></html>", body))
    }

    fn rebuild(document: &Html) -> Vec<Vec<String>> {
        let selector = Selector::parse("table").unwrap();
        let table = RawTable::new(document.select(&selector).next().unwrap());
        reconstruct(&table).iter().map(|row| row.texts()).collect()
    }

    #[test]
    fn test_identity_without_spans() {
        let document = table_html(
            "<tr><td>1</td><td>Ruth</td><td>NYY</td><td>60</td></tr>\
             <tr><td>2</td><td>Gehrig</td><td>NYY</td><td>47</td></tr>",
        );

        assert_eq!(
            rebuild(&document),
            vec![
                vec!["1", "Ruth", "NYY", "60"],
                vec!["2", "Gehrig", "NYY", "47"],
            ]
        );
    }

    #[test]
    fn test_rowspan_value_repeated_in_covered_rows() {
        let document = table_html(
            r#"<tr><td>1</td><td>Ruth</td><td>NYY</td><td rowspan="3">40</td></tr>
               <tr><td>1</td><td>Gehrig</td><td>NYY</td></tr>
               <tr><td>1</td><td>Foxx</td><td>PHA</td></tr>
               <tr><td>4</td><td>Simmons</td><td>PHA</td><td>35</td></tr>"#,
        );

        let rows = rebuild(&document);
        assert_eq!(rows.len(), 4);
        let value_column: Vec<&str> = rows.iter().map(|r| r[3].as_str()).collect();
        assert_eq!(value_column, vec!["40", "40", "40", "35"]);
        assert_eq!(rows.iter().filter(|r| r[3] == "40").count(), 3);
    }

    #[test]
    fn test_leading_rowspan_shifts_physical_cells_right() {
        let document = table_html(
            r#"<tr><td rowspan="2">Home Runs</td><td>Ruth</td><td>NYY</td><td>60</td></tr>
               <tr><td>Gehrig</td><td>NYY</td><td>47</td></tr>"#,
        );

        assert_eq!(
            rebuild(&document),
            vec![
                vec!["Home Runs", "Ruth", "NYY", "60"],
                vec!["Home Runs", "Gehrig", "NYY", "47"],
            ]
        );
    }

    #[test]
    fn test_shared_cell_is_same_element() {
        let document = table_html(
            r#"<tr><td rowspan="2">x</td><td>a</td></tr><tr><td>b</td></tr>"#,
        );
        let selector = Selector::parse("table").unwrap();
        let table = RawTable::new(document.select(&selector).next().unwrap());

        let rows = reconstruct(&table);
        assert_eq!(rows[0].first().unwrap().id(), rows[1].first().unwrap().id());
    }

    #[test]
    fn test_header_rows_skipped_without_consuming_spans() {
        let document = table_html(
            r#"<tr><td class="banner">Rank</td><td class="banner">Name</td></tr>
               <tr><td><b>#</b></td><td><b>Name</b></td><td><b>Team</b></td><td><b>HR</b></td></tr>
               <tr><td>1</td><td>Ruth</td><td>NYY</td><td rowspan="2">46</td></tr>
               <tr><td><b>Rk</b></td><td><b>Player</b></td><td><b>Tm</b></td></tr>
               <tr><td>1</td><td>Gehrig</td><td>NYY</td></tr>"#,
        );

        assert_eq!(
            rebuild(&document),
            vec![
                vec!["1", "Ruth", "NYY", "46"],
                vec!["1", "Gehrig", "NYY", "46"],
            ]
        );
    }

    #[test]
    fn test_single_cell_rows_pass_through() {
        let document = table_html(
            r#"<tr><td class="banner" colspan="5">East</td></tr>
               <tr><td>Yankees</td><td>98</td><td>56</td><td>.636</td><td>-</td></tr>"#,
        );

        let rows = rebuild(&document);
        assert_eq!(rows[0], vec!["East"]);
        assert_eq!(rows[1].len(), 5);
    }

    #[test]
    fn test_outstanding_spans_at_table_end_are_dropped() {
        let document = table_html(
            r#"<tr><td>1</td><td>Ruth</td><td>NYY</td><td rowspan="5">60</td></tr>
               <tr><td>2</td><td>Gehrig</td><td>NYY</td></tr>"#,
        );

        let rows = rebuild(&document);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["2", "Gehrig", "NYY", "60"]);
    }

    #[test]
    fn test_invalid_rowspan_treated_as_one() {
        let document = table_html(
            r#"<tr><td rowspan="abc">a</td><td rowspan="0">b</td></tr>
               <tr><td>c</td><td>d</td></tr>"#,
        );

        assert_eq!(rebuild(&document), vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_nested_table_rows_excluded() {
        let document = table_html(
            r#"<tr><td>outer</td><td><table><tr><td>inner</td></tr></table></td></tr>"#,
        );
        let selector = Selector::parse("body > table").unwrap();
        let table = RawTable::new(document.select(&selector).next().unwrap());

        assert_eq!(reconstruct(&table).len(), 1);
    }
}
