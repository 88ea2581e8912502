use std::fmt;

/// Boxed error reported by a cursor implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Ошибка конвертера значения для одного буфера колонки.
///
/// Конвертер сообщает только что сломалось; колонку и строку добавляет
/// диспетчер.
#[derive(Debug)]
pub struct ConversionError {
    message: String,
    source: Option<BoxError>,
}

impl ConversionError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into(), source: None }
    }

    /// Обернуть ошибку разбора нижнего уровня.
    pub fn with_source(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self { message: msg.into(), source: Some(source.into()) }
    }

    /// Добавить контекст к ошибке.
    ///
    /// Формирует: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            message: format!("{ctx}: {}", self.message),
            source: self.source,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Ошибка декодирования одной строки.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("column '{column}': {source}")]
    Conversion {
        column: String,
        #[source]
        source: ConversionError,
    },

    #[error("{plan} plan cannot decode {target}")]
    Plan { plan: &'static str, target: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("destination is not addressable: pass it by mutable reference")]
    NotAPointer,

    #[error("invalid destination type: {0}")]
    InvalidType(String),

    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: RowError,
    },

    #[error("cursor columns: {0}")]
    Columns(#[source] BoxError),

    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("spawn {what}: {source}")]
    Spawn {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    Panicked(&'static str),

    #[error("blocking scan task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ScanError {
    /// Индекс упавшей строки (для ошибок строки).
    pub fn row(&self) -> Option<usize> {
        match self {
            ScanError::Row { row, .. } => Some(*row),
            _ => None,
        }
    }

    /// Имя колонки, на которой упала конвертация.
    pub fn column(&self) -> Option<&str> {
        match self {
            ScanError::Row { source: RowError::Conversion { column, .. }, .. } => Some(column),
            _ => None,
        }
    }
}

/// A row that failed to decode and was left out of the destination.
#[derive(Debug)]
pub struct RowFailure {
    /// Arrival index of the row in the stream.
    pub row: usize,
    pub error: ScanError,
}

impl RowFailure {
    pub(crate) fn new(row: usize, source: RowError) -> Self {
        Self { row, error: ScanError::Row { row, source } }
    }
}
