//! Ordered fallback chains for text fields.

/// Returns the first candidate that is present and not blank, or an empty
/// string.
///
/// Candidates are pulled in order and iteration stops at the first hit, so a
/// lazy iterator (for example one built with [`std::iter::once_with`]) only
/// computes the sources it needs.
pub fn first_non_blank<I, S>(candidates: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.as_ref().trim().is_empty())
        .map(|s| s.as_ref().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn picks_first_non_blank() {
        let value = first_non_blank([None, Some(""), Some("  "), Some("Shirt"), Some("Other")]);
        assert_eq!(value, "Shirt");
    }

    #[test]
    fn empty_when_all_blank() {
        assert_eq!(first_non_blank::<_, &str>([None, Some(" ")]), "");
        assert_eq!(first_non_blank(Vec::<Option<String>>::new()), "");
    }

    #[test]
    fn later_sources_are_not_evaluated_after_a_hit() {
        let calls = Cell::new(0);
        let value = first_non_blank(
            std::iter::once_with(|| {
                calls.set(calls.get() + 1);
                Some("first".to_string())
            })
            .chain(std::iter::once_with(|| {
                calls.set(calls.get() + 1);
                Some("second".to_string())
            })),
        );
        assert_eq!(value, "first");
        assert_eq!(calls.get(), 1);
    }
}
