//! Pulls one DevExpress-style grid out of a server-rendered page.
//!
//! Nothing here knows the column names. Headers are read from the live page
//! and every data row is zipped onto them by position, so a column added or
//! reordered on the portal flows through untouched.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::error::ExtractError;

/// One extracted row: `(header, cell text)` pairs in header order.
pub type Row = Vec<(String, String)>;

static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Id/class conventions of the grid widget being scraped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridMarkers {
    /// Substring of the header row's `id`.
    pub header_row: String,
    /// Substring of every data row's `id`.
    pub data_row: String,
    /// Class carried by header cells.
    pub header_cell_class: String,
}

impl Default for GridMarkers {
    fn default() -> Self {
        Self {
            header_row: "DXHeadersRow0".into(),
            data_row: "DXDataRow".into(),
            header_cell_class: "dxgvHeader_Moderno".into(),
        }
    }
}

pub fn extract_table(html: &str, table_id: &str) -> Result<Vec<Row>, ExtractError> {
    extract_table_with(html, table_id, &GridMarkers::default())
}

pub fn extract_table_with(
    html: &str,
    table_id: &str,
    markers: &GridMarkers,
) -> Result<Vec<Row>, ExtractError> {
    let document = Html::parse_document(html);

    let table = document
        .select(&TABLE)
        .find(|table| table.value().id() == Some(table_id))
        .ok_or_else(|| ExtractError::TableNotFound(table_id.to_string()))?;

    let header_row = table
        .select(&ROW)
        .find(|row| id_contains(row, &markers.header_row))
        .ok_or_else(|| ExtractError::HeaderNotFound(table_id.to_string()))?;

    let headers = read_headers(header_row, &markers.header_cell_class);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for data_row in table
        .select(&ROW)
        .filter(|row| id_contains(row, &markers.data_row))
    {
        let cells: Vec<String> = data_row.select(&CELL).map(cell_text).collect();
        if cells.len() != headers.len() {
            skipped += 1;
            continue;
        }
        rows.push(headers.iter().cloned().zip(cells).collect());
    }

    if skipped > 0 {
        log::debug!(
            "table '{table_id}': skipped {skipped} row(s) whose cell count differs from {} headers",
            headers.len()
        );
    }

    Ok(rows)
}

fn id_contains(element: &ElementRef<'_>, marker: &str) -> bool {
    element
        .value()
        .id()
        .is_some_and(|id| id.contains(marker))
}

/// Header cells are direct children of the header row. Each one usually wraps
/// a small layout table whose first cell holds the caption.
fn read_headers(header_row: ElementRef<'_>, cell_class: &str) -> Vec<String> {
    header_row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| {
            cell.value().name() == "td" && cell.value().classes().any(|class| class == cell_class)
        })
        .map(|cell| match cell.select(&TABLE).next() {
            Some(nested) => nested
                .select(&ROW)
                .next()
                .and_then(|row| row.select(&CELL).next())
                .map(cell_text)
                .unwrap_or_default(),
            None => cell_text(cell),
        })
        .collect()
}

/// Text nodes trimmed individually and concatenated, blank ones dropped.
fn cell_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect()
}
