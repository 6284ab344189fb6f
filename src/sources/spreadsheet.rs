use std::collections::HashMap;
use std::path::Path;

use roxmltree::{Document, Node};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::records::RawTable;

const SPREADSHEET_NS: &str = "urn:schemas-microsoft-com:office:spreadsheet";

pub const FILMING_LOCATIONS_SHEET: &str = "Full Map List";
const FILMING_LOCATIONS_HEADER_ROW: usize = 1;

#[derive(Debug, Clone)]
pub struct Worksheet {
    pub name: String,
    pub table: RawTable,
}

pub fn read_filming_locations(path: &Path) -> AppResult<RawTable> {
    let bytes = std::fs::read(path)?;
    let header_rows = HashMap::from([(FILMING_LOCATIONS_SHEET, FILMING_LOCATIONS_HEADER_ROW)]);
    parse_selected_sheets(&bytes, &header_rows)?
        .into_iter()
        .find(|sheet| sheet.name == FILMING_LOCATIONS_SHEET)
        .map(|sheet| sheet.table)
        .ok_or_else(|| {
            AppError::Config(format!(
                "worksheet '{FILMING_LOCATIONS_SHEET}' not found in {}",
                path.display()
            ))
        })
}

/// Parses the requested worksheets of a spreadsheet XML workbook.
///
/// `header_rows` maps a sheet name to the index of its header row. Rows after
/// the header are read positionally up to the header width. Empty sheets and
/// sheets whose header index is out of range are skipped.
pub fn parse_selected_sheets(
    bytes: &[u8],
    header_rows: &HashMap<&str, usize>,
) -> AppResult<Vec<Worksheet>> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|err| AppError::Parse(format!("invalid UTF-8 in spreadsheet XML: {err}")))?;
    let document = Document::parse(xml)
        .map_err(|err| AppError::Parse(format!("invalid spreadsheet XML: {err}")))?;

    let mut sheets = Vec::new();
    for worksheet in document
        .descendants()
        .filter(|node| is_spreadsheet_element(node, "Worksheet"))
    {
        let Some(name) = worksheet.attribute((SPREADSHEET_NS, "Name")) else {
            continue;
        };
        let Some(&header_index) = header_rows.get(name) else {
            continue;
        };
        if let Some(table) = parse_worksheet(worksheet, name, header_index) {
            info!(sheet = name, rows = table.len(), "processed worksheet");
            sheets.push(Worksheet {
                name: name.to_string(),
                table,
            });
        }
    }

    for name in header_rows.keys() {
        if !sheets.iter().any(|sheet| sheet.name == *name) {
            warn!(sheet = *name, "requested worksheet not found");
        }
    }

    Ok(sheets)
}

fn parse_worksheet(worksheet: Node<'_, '_>, name: &str, header_index: usize) -> Option<RawTable> {
    let rows = worksheet
        .descendants()
        .filter(|node| is_spreadsheet_element(node, "Row"))
        .collect::<Vec<_>>();

    if rows.is_empty() {
        warn!(sheet = name, "worksheet is empty; skipping");
        return None;
    }
    if header_index >= rows.len() {
        warn!(
            sheet = name,
            header_index,
            rows = rows.len(),
            "invalid header row index; skipping"
        );
        return None;
    }

    let headers = cells(rows[header_index])
        .into_iter()
        .map(cell_value)
        .collect::<Vec<_>>();
    let expected_columns = headers.len();

    let data = rows[header_index + 1..]
        .iter()
        .map(|row| {
            let cells = cells(*row);
            (0..expected_columns)
                .map(|i| cells.get(i).copied().and_then(cell_value))
                .collect::<Vec<_>>()
        })
        .collect();

    Some(RawTable::new(headers, data))
}

fn cells<'a, 'input>(row: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    row.descendants()
        .filter(|node| is_spreadsheet_element(node, "Cell"))
        .collect()
}

fn cell_value(cell: Node<'_, '_>) -> Option<String> {
    let data = cell
        .descendants()
        .find(|node| is_spreadsheet_element(node, "Data"))?;
    let text = data
        .descendants()
        .filter(|node| node.is_text())
        .filter_map(|node| node.text())
        .collect::<String>();
    Some(text.trim().to_string())
}

fn is_spreadsheet_element(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(SPREADSHEET_NS)
}
