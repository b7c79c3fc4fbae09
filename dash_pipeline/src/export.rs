//! Delimited text export of result tables

use crate::error::{PipelineError, Result};
use crate::schema::Value;
use crate::table::Table;
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Write the header row and then every row, in column order
pub fn write_csv<W: Write>(table: &Table, writer: W, delimiter: u8) -> Result<()> {
    let mut out = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
    out.write_record(table.columns())?;
    for row in table.rows() {
        out.write_record(row.iter().map(Value::to_string))?;
    }
    out.flush()?;
    Ok(())
}

/// Render a table as CSV text
pub fn to_csv_string(table: &Table, delimiter: u8) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf, delimiter)?;
    String::from_utf8(buf).map_err(|e| PipelineError::CsvError(e.to_string()))
}

/// Write a table to a file, replacing it if present
pub fn write_csv_file<P: AsRef<Path>>(table: &Table, path: P, delimiter: u8) -> Result<()> {
    let file = File::create(path)?;
    write_csv(table, file, delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_header_order_and_cell_formats() {
        let table = Table::from_rows(
            vec!["Date".into(), "Region".into(), "Revenue".into()],
            vec![
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
                    Value::from("North, East"),
                    Value::Number(12.5),
                ],
                vec![Value::Null, Value::from("South"), Value::Number(3.0)],
            ],
        )
        .unwrap();

        let text = to_csv_string(&table, b',').unwrap();
        assert_eq!(
            text,
            "Date,Region,Revenue\n2024-03-01,\"North, East\",12.5\n,South,3\n"
        );
    }

    #[test]
    fn test_custom_delimiter() {
        let table = Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Number(1.0), Value::Number(2.0)]],
        )
        .unwrap();
        assert_eq!(to_csv_string(&table, b';').unwrap(), "a;b\n1;2\n");
    }

    #[test]
    fn test_empty_table_writes_header_only() {
        let table = Table::new(["Product", "Revenue"]);
        assert_eq!(to_csv_string(&table, b',').unwrap(), "Product,Revenue\n");
    }
}
