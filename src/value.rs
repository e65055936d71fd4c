use crate::config::ValuePolicy;
use crate::data::model::ValueCell;
use crate::diagnostics::DiagnosticKind;

/// Read a value cell as a number, never failing.
///
/// Anything that is not a finite number becomes `0.0` together with the
/// diagnostic explaining why.
pub fn parse_cell(cell: &ValueCell, policy: &ValuePolicy) -> (f64, Option<DiagnosticKind>) {
    match cell {
        ValueCell::Number(v) if v.is_finite() => (*v, None),
        ValueCell::Number(v) => (
            0.0,
            Some(DiagnosticKind::MalformedValue { raw: v.to_string() }),
        ),
        ValueCell::Missing => (0.0, Some(DiagnosticKind::MissingValue)),
        ValueCell::Text(raw) => parse_text(raw, policy),
    }
}

fn parse_text(raw: &str, policy: &ValuePolicy) -> (f64, Option<DiagnosticKind>) {
    let t = raw.trim();
    if t.is_empty() {
        return (0.0, Some(DiagnosticKind::MissingValue));
    }
    if policy.is_placeholder(t) {
        return (
            0.0,
            Some(DiagnosticKind::Placeholder { raw: t.to_string() }),
        );
    }
    match strip_thousands(t).and_then(|n| n.parse::<f64>().ok()) {
        Some(v) if v.is_finite() => (v, None),
        _ => (
            0.0,
            Some(DiagnosticKind::MalformedValue { raw: t.to_string() }),
        ),
    }
}

/// Remove thousands separators ("1,234.5"), but only when every group
/// after the first has exactly three digits.
fn strip_thousands(t: &str) -> Option<String> {
    if !t.contains(',') {
        return Some(t.to_string());
    }
    let (int_part, frac) = match t.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (t, None),
    };
    let digits = int_part.trim_start_matches(|c: char| c == '+' || c == '-');
    let sign = &int_part[..int_part.len() - digits.len()];
    if sign.len() > 1 {
        return None;
    }
    let mut groups = digits.split(',');
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 || !first.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut out = format!("{sign}{first}");
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        out.push_str(group);
    }
    if let Some(frac) = frac {
        if frac.contains(',') {
            return None;
        }
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}
