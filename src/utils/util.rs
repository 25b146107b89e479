use comfy_table::Cell;

use crate::index::Row;

/// File name for a record id: bytes outside `[A-Za-z0-9._ -]` and a leading
/// `.` are percent-escaped so any key maps to a single plain file.
pub fn record_file_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len() + 4);
    if id.is_empty() {
        name.push('%');
    }
    for (i, byte) in id.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b' ')
            || (byte == b'.' && i > 0);
        if plain {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    name.push_str(".txt");
    name
}

pub fn pretty_format_rows(columns: &[String], rows: &[Row]) -> comfy_table::Table {
    let mut table = comfy_table::Table::new();
    table.load_preset("||--+-++|    ++++++");

    if rows.is_empty() {
        return table;
    }

    table.set_header(columns.iter().map(Cell::new).collect::<Vec<_>>());
    for row in rows {
        table.add_row(row.iter().map(Cell::new).collect::<Vec<_>>());
    }

    table
}
