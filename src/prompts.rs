// SPDX-License-Identifier: MIT

//! Interactive collection of portal URL, MAC address and category selection.
//! All validation logic lives elsewhere; these are thin inquire wrappers so
//! the core stays testable without a terminal.

use anyhow::Result;
use inquire::Text;
use inquire::validator::Validation;

use crate::filter;
use crate::portal::Category;

pub fn prompt_portal_url() -> Result<String> {
    let url = Text::new("Portal URL:")
        .with_help_message("e.g., http://portal.example.com:8080")
        .with_validator(|input: &str| {
            if input.is_empty() {
                Ok(Validation::Invalid("Portal URL is required".into()))
            } else if !input.starts_with("http://") && !input.starts_with("https://") {
                Ok(Validation::Invalid(
                    "URL must start with http:// or https://".into(),
                ))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()?;
    Ok(url)
}

pub fn prompt_mac() -> Result<String> {
    let mac = Text::new("MAC address:")
        .with_help_message("Colon-separated hex pairs, e.g. 00:1A:79:12:34:56")
        .with_validator(|input: &str| {
            if is_valid_mac(input) {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid(
                    "Expected six colon-separated hex pairs".into(),
                ))
            }
        })
        .prompt()?;
    Ok(mac.to_uppercase())
}

/// Asks for a category selection until the input validates. Blank input
/// keeps every category.
pub fn prompt_categories(categories: &[Category]) -> Result<Vec<Category>> {
    println!("\nAvailable categories:");
    for category in categories {
        println!("  {category}");
    }

    loop {
        let input = Text::new("Categories (comma-separated, empty for all):").prompt()?;
        match filter::validate(&input, categories) {
            Ok(selected) => return Ok(selected),
            Err(rejected) => eprintln!("{rejected}; please try again"),
        }
    }
}

pub fn is_valid_mac(input: &str) -> bool {
    let parts: Vec<&str> = input.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_hexdigit()))
}
