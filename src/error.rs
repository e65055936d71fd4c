use thiserror::Error;

/// Failures that stop a transformation. Everything recoverable is reported
/// as a [`crate::diagnostics::Diagnostic`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("row {row}: category '{category}' of '{entity}' is not in the supplied category order")]
    UnknownCategory {
        row: usize,
        entity: String,
        category: String,
    },

    #[error("{side} identifiers are numeric codes but no translation table was supplied")]
    TranslationTableRequired { side: &'static str },

    #[error("period range starts at {start} after it ends at {end}")]
    InvalidPeriodRange { start: i32, end: i32 },

    #[error("period range {start}..={end} spans more than {max} periods")]
    PeriodRangeTooWide { start: i32, end: i32, max: u32 },
}

pub type TransformResult<T> = std::result::Result<T, TransformError>;
