use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or_default()
}

/// Range checks on already-normalized instants, in rejection order.
pub(crate) fn validate_span(owner_id: Ulid, start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidRange { start, end });
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_INTERVAL_MS {
        return Err(EngineError::DurationExceeded {
            owner_id,
            duration_ms: span.duration_ms(),
        });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(span)
}

pub(crate) fn validate_note(note: Option<&str>) -> Result<(), EngineError> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_LEN => Err(EngineError::LimitExceeded("note too long")),
        _ => Ok(()),
    }
}

/// Query window for listings and overviews.
pub(crate) fn validate_window(from: Ms, to: Ms) -> Result<Span, EngineError> {
    if from >= to {
        return Err(EngineError::InvalidRange { start: from, end: to });
    }
    if to.checked_sub(from).is_none_or(|width| width > MAX_QUERY_WINDOW_MS) {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(Span::new(from, to))
}

pub(crate) fn check_no_overlap(
    ms: &MemberState,
    span: &Span,
    exclude_id: Option<Ulid>,
) -> Result<(), EngineError> {
    match ms.overlapping_excluding(span, exclude_id).next() {
        Some(existing) => Err(EngineError::OverlapConflict {
            owner_id: ms.id,
            conflicting: existing.id,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Ms = 1_750_000_000_000;

    #[test]
    fn span_checks_in_order() {
        let owner = Ulid::new();
        assert!(matches!(
            validate_span(owner, T0, T0),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(matches!(
            validate_span(owner, T0 + 10, T0),
            Err(EngineError::InvalidRange { .. })
        ));
        // Inverted and too long: range wins.
        assert!(matches!(
            validate_span(owner, T0 + 2 * DAY_MS, T0),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(validate_span(owner, T0, T0 + DAY_MS).is_ok());
        assert!(matches!(
            validate_span(owner, T0, T0 + DAY_MS + 1),
            Err(EngineError::DurationExceeded { duration_ms, .. }) if duration_ms == DAY_MS + 1
        ));
        assert!(matches!(
            validate_span(owner, 0, HOUR_MS),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn note_length_counts_characters() {
        assert!(validate_note(None).is_ok());
        assert!(validate_note(Some(&"ä".repeat(MAX_NOTE_LEN))).is_ok());
        assert!(validate_note(Some(&"x".repeat(MAX_NOTE_LEN + 1))).is_err());
    }

    #[test]
    fn window_checks() {
        assert!(validate_window(T0, T0 + DAY_MS).is_ok());
        assert!(matches!(
            validate_window(T0, T0),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(matches!(
            validate_window(T0, T0 + MAX_QUERY_WINDOW_MS + 1),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn window_at_integer_extremes_is_too_wide() {
        for (from, to) in [(-Ms::MAX, Ms::MAX), (Ms::MIN, 0), (Ms::MIN, Ms::MAX)] {
            assert!(matches!(
                validate_window(from, to),
                Err(EngineError::LimitExceeded(_))
            ));
        }
    }
}
