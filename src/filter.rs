// SPDX-License-Identifier: MIT

//! Category selection as a pure validation step, so the interactive
//! re-prompt loop stays outside the core and the logic tests without a
//! terminal.

use thiserror::Error;

use crate::portal::Category;

/// Rejection carrying every name that matched no fetched category. The whole
/// submission is rejected; partially accepting the valid names would hide
/// typos from the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown categories: {}", .0.join(", "))]
pub struct RejectedNames(pub Vec<String>);

/// Validates a comma-separated category selection against the fetched set.
///
/// Blank input selects every category. Names are trimmed and matched
/// case-sensitively against category titles; the result preserves fetch
/// order and ignores duplicate names.
pub fn validate(input: &str, categories: &[Category]) -> Result<Vec<Category>, RejectedNames> {
    let wanted: Vec<&str> = input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();

    if wanted.is_empty() {
        return Ok(categories.to_vec());
    }

    let rejected: Vec<String> = wanted
        .iter()
        .filter(|name| !categories.iter().any(|c| c.title == **name))
        .map(|name| name.to_string())
        .collect();

    if !rejected.is_empty() {
        return Err(RejectedNames(rejected));
    }

    Ok(categories
        .iter()
        .filter(|c| wanted.contains(&c.title.as_str()))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched() -> Vec<Category> {
        ["Sports", "News", "Movies"]
            .iter()
            .enumerate()
            .map(|(i, title)| Category {
                id: (i + 1).to_string(),
                title: title.to_string(),
            })
            .collect()
    }

    #[test]
    fn blank_input_selects_everything() {
        let categories = fetched();
        assert_eq!(validate("", &categories).unwrap(), categories);
        assert_eq!(validate("   \t ", &categories).unwrap(), categories);
        // Separators with no names count as blank too.
        assert_eq!(validate(" , ,", &categories).unwrap(), categories);
    }

    #[test]
    fn subset_is_returned_in_fetch_order() {
        let categories = fetched();
        let selected = validate("Movies , Sports", &categories).unwrap();
        let titles: Vec<&str> = selected.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Sports", "Movies"]);
    }

    #[test]
    fn duplicate_names_do_not_duplicate_categories() {
        let categories = fetched();
        let selected = validate("News,News", &categories).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn any_unknown_name_rejects_the_whole_submission() {
        let categories = fetched();
        let err = validate("Sports, Nonexistent", &categories).unwrap_err();
        assert_eq!(err, RejectedNames(vec!["Nonexistent".to_string()]));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let categories = fetched();
        assert!(validate("sports", &categories).is_err());
    }
}
