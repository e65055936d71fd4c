use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Diagnostic – a recoverable data problem, returned to the caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A numeric code has no entry in the translation table.
    TranslationMissing { code: u32 },
    /// A later row repeats an (entity, period, category) already seen.
    DuplicateEntry {
        period: Option<i32>,
        category: Option<String>,
    },
    /// Two geometry features share one key; only the first is joined.
    DuplicateGeometry,
    /// Value cell holds a recognized placeholder; counted as zero.
    Placeholder { raw: String },
    /// Value cell is empty; counted as zero.
    MissingValue,
    /// Value cell is neither a number nor a placeholder; counted as zero.
    MalformedValue { raw: String },
    /// Row has no period but a period axis was requested.
    MissingPeriod,
    /// Row falls outside the requested fixed period range.
    PeriodOutOfRange { period: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Index of the offending measurement row, when it comes from one.
    pub row: Option<usize>,
    pub entity: Option<String>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn for_row(row: usize, entity: &str, kind: DiagnosticKind) -> Self {
        Diagnostic {
            row: Some(row),
            entity: Some(entity.to_string()),
            kind,
        }
    }

    pub fn for_entity(entity: &str, kind: DiagnosticKind) -> Self {
        Diagnostic {
            row: None,
            entity: Some(entity.to_string()),
            kind,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::TranslationMissing { code } => {
                write!(f, "no translation for code {code}")
            }
            DiagnosticKind::DuplicateEntry { period, category } => {
                write!(f, "duplicate entry")?;
                if let Some(p) = period {
                    write!(f, " for {p}")?;
                }
                if let Some(c) = category {
                    write!(f, " in '{c}'")?;
                }
                Ok(())
            }
            DiagnosticKind::DuplicateGeometry => write!(f, "duplicate geometry feature"),
            DiagnosticKind::Placeholder { raw } => write!(f, "placeholder '{raw}' read as 0"),
            DiagnosticKind::MissingValue => write!(f, "empty value read as 0"),
            DiagnosticKind::MalformedValue { raw } => write!(f, "malformed value '{raw}' read as 0"),
            DiagnosticKind::MissingPeriod => write!(f, "row has no period"),
            DiagnosticKind::PeriodOutOfRange { period } => {
                write!(f, "period {period} outside requested range")
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(row) = self.row {
            write!(f, "row {row}: ")?;
        }
        if let Some(entity) = &self.entity {
            write!(f, "{entity}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}

/// Emit each diagnostic as a `warn!` line. The transformations never log
/// these themselves; callers decide whether to.
pub fn log_all(context: &str, diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        log::warn!("{context}: {d}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_row_and_entity() {
        let d = Diagnostic::for_row(
            3,
            "CA",
            DiagnosticKind::DuplicateEntry {
                period: Some(2014),
                category: Some("Farm".into()),
            },
        );
        assert_eq!(d.to_string(), "row 3: CA: duplicate entry for 2014 in 'Farm'");

        let d = Diagnostic::for_entity("6", DiagnosticKind::TranslationMissing { code: 6 });
        assert_eq!(d.to_string(), "6: no translation for code 6");
    }

    #[test]
    fn serializes_flat_with_kind_tag() {
        let d = Diagnostic::for_row(
            0,
            "TX",
            DiagnosticKind::Placeholder {
                raw: "(NA)".into(),
            },
        );
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["kind"], "placeholder");
        assert_eq!(v["raw"], "(NA)");
        assert_eq!(v["row"], 0);
    }
}
