use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, StdoutLock, Write};

use rowscan::{scan_blocking, ScanOutcome, Scanner, Table};

use crate::config::{Cli, DumpConfig, Format};
use crate::csv::{parse_delimiter, CsvCursor};
use crate::error::DumpError;

pub async fn run(cli: Cli) -> Result<(), DumpError> {
    let config = DumpConfig::resolve(&cli)?;
    let delimiter = parse_delimiter(&config.input.delimiter)?;
    let path = cli.input.display().to_string();

    let file = File::open(&cli.input)
        .map_err(|source| DumpError::Input { path: path.clone(), source })?;
    let cursor = CsvCursor::new(BufReader::new(file), delimiter, config.input.header)
        .map_err(|source| DumpError::Input { path: path.clone(), source })?;
    let scanner = Scanner::new(config.scan)?;
    tracing::info!(input = %path, format = ?cli.format, "dump starting");

    let outcome = match cli.format {
        Format::Json => {
            let (_, rows, outcome) =
                scan_blocking(scanner, cursor, Vec::<BTreeMap<String, String>>::new()).await?;
            write_stdout(|out| write_json(out, &rows))?;
            outcome
        }
        Format::Table => {
            let (_, table, outcome) = scan_blocking(scanner, cursor, Table::default()).await?;
            write_stdout(|out| write_table(out, &table))?;
            outcome
        }
        Format::Raw => {
            let (_, rows, outcome) =
                scan_blocking(scanner, cursor, Vec::<Vec<Vec<u8>>>::new()).await?;
            write_stdout(|out| write_raw(out, &rows))?;
            outcome
        }
    };

    report(&outcome);
    Ok(())
}

fn write_stdout<F>(write: F) -> Result<(), DumpError>
where
    F: FnOnce(&mut BufWriter<StdoutLock<'static>>) -> Result<(), DumpError>,
{
    let mut out = BufWriter::new(std::io::stdout().lock());
    write(&mut out)?;
    out.flush()?;
    Ok(())
}

fn report(outcome: &ScanOutcome) {
    if let Some(first) = outcome.skipped.first() {
        tracing::info!(row = first.row, error = %first.error, "first skipped row");
    }
    tracing::info!(rows = outcome.rows, skipped = outcome.skipped.len(), "dump finished");
}

fn write_json<W: Write>(out: &mut W, rows: &[BTreeMap<String, String>]) -> Result<(), DumpError> {
    for row in rows {
        serde_json::to_writer(&mut *out, row)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn write_table<W: Write>(out: &mut W, table: &Table) -> Result<(), DumpError> {
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &table.rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut write_line = |cells: &[String]| -> Result<(), DumpError> {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        writeln!(out, "{}", line.join("  ").trim_end())?;
        Ok(())
    };

    write_line(&table.columns)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_line(&rule)?;
    for row in &table.rows {
        write_line(row)?;
    }
    Ok(())
}

fn write_raw<W: Write>(out: &mut W, rows: &[Vec<Vec<u8>>]) -> Result<(), DumpError> {
    for row in rows {
        let cells: Vec<_> = row.iter().map(|cell| String::from_utf8_lossy(cell)).collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec!["1".into(), "ann".into()], vec!["22".into(), "b".into()]],
        }
    }

    #[test]
    fn table_output_is_aligned() {
        let mut out = Vec::new();
        write_table(&mut out, &table()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "id  name\n--  ----\n1   ann\n22  b\n");
    }

    #[test]
    fn json_output_is_one_object_per_line() {
        let mut row = BTreeMap::new();
        row.insert("id".to_string(), "1".to_string());
        row.insert("name".to_string(), String::new());
        let mut out = Vec::new();
        write_json(&mut out, &[row]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"id\":\"1\",\"name\":\"\"}\n");
    }

    #[test]
    fn raw_output_is_tab_separated() {
        let mut out = Vec::new();
        write_raw(&mut out, &[vec![b"1".to_vec(), Vec::new(), vec![0xff]]]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\t\t\u{fffd}\n");
    }
}
