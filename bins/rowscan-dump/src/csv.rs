use std::io::BufRead;

use rowscan::Cursor;
use rowscan::error::BoxError;

use crate::error::DumpError;

// ═══════════════════════════════════════════════════════════════
//  Cursor over delimited text
// ═══════════════════════════════════════════════════════════════

/// Курсор по текстовому потоку с разделителями, одна запись на строку.
///
/// Имена колонок берутся из заголовка, иначе `col0, col1, ...` по первой
/// записи. Пустые строки пропускаются. Запись с другим числом полей даёт
/// ошибку материализации.
pub struct CsvCursor<R> {
    lines: std::io::Lines<R>,
    delimiter: char,
    columns: Vec<String>,
    /// Первая запись, прочитанная заранее для имён колонок по умолчанию.
    pending: Option<Vec<String>>,
    current: Option<Vec<String>>,
    line: usize,
    error: Option<std::io::Error>,
}

impl<R: BufRead> CsvCursor<R> {
    pub fn new(reader: R, delimiter: char, header: bool) -> Result<Self, std::io::Error> {
        let mut cursor = Self {
            lines: reader.lines(),
            delimiter,
            columns: Vec::new(),
            pending: None,
            current: None,
            line: 0,
            error: None,
        };
        match cursor.read_record()? {
            Some(fields) if header => {
                cursor.columns = fields.iter().map(|f| f.trim().to_string()).collect();
            }
            Some(fields) => {
                cursor.columns = (0..fields.len()).map(|i| format!("col{i}")).collect();
                cursor.pending = Some(fields);
            }
            None => {}
        }
        tracing::debug!(columns = cursor.columns.len(), header, "csv input opened");
        Ok(cursor)
    }

    fn read_record(&mut self) -> Result<Option<Vec<String>>, std::io::Error> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line += 1;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            return Ok(Some(parse_fields(line, self.delimiter)));
        }
        Ok(None)
    }
}

impl<R: BufRead + Send> Cursor for CsvCursor<R> {
    fn next_row(&mut self) -> bool {
        if let Some(fields) = self.pending.take() {
            self.current = Some(fields);
            return true;
        }
        match self.read_record() {
            Ok(record) => {
                self.current = record;
                self.current.is_some()
            }
            Err(e) => {
                self.current = None;
                self.error = Some(e);
                false
            }
        }
    }

    fn columns(&self) -> Result<Vec<String>, BoxError> {
        Ok(self.columns.clone())
    }

    fn scan_into(&mut self, dest: &mut [Vec<u8>]) -> Result<(), BoxError> {
        let Some(fields) = &self.current else {
            return Err("no current record".into());
        };
        if fields.len() != dest.len() {
            return Err(format!(
                "line {}: expected {} fields, got {}",
                self.line,
                dest.len(),
                fields.len()
            )
            .into());
        }
        for (buf, field) in dest.iter_mut().zip(fields) {
            buf.clear();
            buf.extend_from_slice(field.as_bytes());
        }
        Ok(())
    }

    fn last_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.error.as_ref().map(|e| e as _)
    }
}

// ═══════════════════════════════════════════════════════════════
//  RFC 4180 field parser
// ═══════════════════════════════════════════════════════════════

/// Разбирает одну запись на поля с учётом `"` quoting и `""` escape.
pub(crate) fn parse_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    let mut field = String::new();

    loop {
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                if c != '"' {
                    field.push(c);
                } else if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    break;
                }
            }
            // Всё между закрывающей кавычкой и разделителем отбрасывается.
            for c in chars.by_ref() {
                if c == delimiter {
                    break;
                }
            }
        } else {
            for c in chars.by_ref() {
                if c == delimiter {
                    break;
                }
                field.push(c);
            }
        }

        fields.push(std::mem::take(&mut field));

        if chars.peek().is_none() {
            if line.ends_with(delimiter) {
                fields.push(String::new());
            }
            break;
        }
    }

    fields
}

pub(crate) fn parse_delimiter(s: &str) -> Result<char, DumpError> {
    let mut chars = s.chars();
    match (s, chars.next(), chars.next()) {
        ("\\t", _, _) => Ok('\t'),
        (_, Some(c), None) => Ok(c),
        _ => Err(DumpError::Config {
            context: "delimiter",
            detail: format!("must be a single character, got {s:?}"),
        }),
    }
}
