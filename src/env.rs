use ::std::sync::OnceLock;

static PAGINATION_MAX_COUNT_VAR: &str = "PAGINATION_MAX_COUNT";

/// Upper bound applied to `first` / `last`, read once from `PAGINATION_MAX_COUNT`.
pub fn pagination_max_count() -> Option<u32> {
    static PAGINATION_MAX_COUNT: OnceLock<Option<u32>> = OnceLock::new();
    *PAGINATION_MAX_COUNT.get_or_init(|| parse_max_count(std::env::var(PAGINATION_MAX_COUNT_VAR).ok()))
}

fn parse_max_count(raw: Option<String>) -> Option<u32> {
    let raw = raw?;
    match raw.trim().parse::<u32>() {
        Ok(count) => Some(count),
        Err(err) => {
            tracing::warn!(
                value = %raw,
                "ignoring {PAGINATION_MAX_COUNT_VAR}, expected a non-negative integer: {err}"
            );
            None
        }
    }
}

/// Checks a requested page size against the configured maximum.
pub(crate) fn check_count(name: &'static str, count: u32, max: Option<u32>) -> crate::Result<()> {
    match max {
        Some(max) if count > max => Err(crate::Error::CountTooLarge { name, count, max }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_max_count() {
        assert_eq!(parse_max_count(Some("25".into())), Some(25));
        assert_eq!(parse_max_count(Some(" 7 ".into())), Some(7));
    }

    #[test]
    fn ignores_missing_or_invalid_max_count() {
        assert_eq!(parse_max_count(None), None);
        assert_eq!(parse_max_count(Some("-1".into())), None);
        assert_eq!(parse_max_count(Some("many".into())), None);
    }

    #[test]
    fn count_above_max_is_rejected() {
        assert!(check_count("first", 10, Some(10)).is_ok());
        assert!(check_count("first", 10, None).is_ok());
        let err = check_count("last", 11, Some(10)).unwrap_err();
        assert!(matches!(err, crate::Error::CountTooLarge { name: "last", count: 11, max: 10 }));
    }
}
