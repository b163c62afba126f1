//! Column values to token sets.
//!
//! Tokens are surface forms: lower-cased, split on whitespace runs. No
//! stemming, no punctuation stripping.

use std::collections::HashSet;

/// Deduplicated tokens of one column.
pub type TokenSet = HashSet<String>;

/// Tokenize a column's values, skipping nulls.
///
/// ```rust
/// use colsketch::hash::tokenize;
///
/// let tokens = tokenize([Some("New York"), None, Some("new  jersey")]);
/// assert_eq!(tokens.len(), 3);
/// assert!(tokens.contains("new"));
/// ```
pub fn tokenize<I, S>(values: I) -> TokenSet
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut tokens = TokenSet::new();
    for value in values.into_iter().flatten() {
        let lowered = value.as_ref().to_lowercase();
        tokens.extend(lowered.split_whitespace().map(str::to_owned));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let values: Vec<Option<String>> = Vec::new();
        assert!(tokenize(values).is_empty());
        assert!(tokenize([None::<&str>, None]).is_empty());
    }

    #[test]
    fn test_case_folding_and_dedup() {
        let tokens = tokenize([Some("Apple banana"), Some("APPLE"), Some("  cherry\tBanana ")]);
        let mut sorted: Vec<_> = tokens.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn test_punctuation_is_kept() {
        let tokens = tokenize([Some("foo, foo.")]);
        assert!(tokens.contains("foo,"));
        assert!(tokens.contains("foo."));
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_whitespace_only_value() {
        assert!(tokenize([Some("   \n ")]).is_empty());
    }
}
