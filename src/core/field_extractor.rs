use std::path::Path;

use once_cell::sync::Lazy;
use phonenumber::country::Id;
use regex::Regex;

use super::models::CandidateFields;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

/// International-leaning pattern first, then the US `(xxx) xxx-xxxx` shape.
static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\+?\d{1,3}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}").unwrap(),
        Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap(),
    ]
});

static FILENAME_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_-]").unwrap());

const PHONE_REGIONS: [Id; 3] = [Id::US, Id::IN, Id::GB];

const NAME_HEADER_WORDS: [&str; 6] = ["resume", "cv", "curriculum", "vitae", "contact", "email"];

const NAME_SCAN_LINES: usize = 5;
const LOCATION_SCAN_LINES: usize = 20;

/// Checked in order against each line; the first entry found wins.
const LOCATION_GAZETTEER: [&str; 28] = [
    "New York",
    "Los Angeles",
    "Chicago",
    "Houston",
    "Phoenix",
    "San Francisco",
    "Seattle",
    "Boston",
    "Austin",
    "Denver",
    "California",
    "Texas",
    "Florida",
    "New York",
    "Illinois",
    "India",
    "USA",
    "UK",
    "Canada",
    "Australia",
    "Mumbai",
    "Delhi",
    "Bangalore",
    "Hyderabad",
    "Chennai",
    "Pune",
    "Remote",
    "Willing to relocate",
];

pub fn extract_email(text: &str) -> Option<String> {
    EMAIL_RE.find(text).map(|m| m.as_str().to_lowercase())
}

/// First match of the first pattern that fires. Formatted internationally when
/// one of the guessed regions accepts it, otherwise returned as matched.
pub fn extract_phone(text: &str) -> Option<String> {
    let matched = PHONE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(text))?
        .as_str();

    Some(format_if_valid_phone(matched).unwrap_or_else(|| matched.trim().to_string()))
}

pub fn extract_name(text: &str, file_name: &str) -> String {
    for line in text.trim().split('\n').take(NAME_SCAN_LINES) {
        let line = line.trim();
        let word_count = line.split_whitespace().count();
        if !(2..=4).contains(&word_count) || line.chars().count() >= 50 {
            continue;
        }

        let lower = line.to_lowercase();
        if NAME_HEADER_WORDS.iter().any(|word| lower.contains(word)) {
            continue;
        }

        return line.to_string();
    }

    name_from_file_name(file_name)
}

pub fn extract_location(text: &str) -> Option<String> {
    for line in text.split('\n').take(LOCATION_SCAN_LINES) {
        let lower = line.to_lowercase();
        if let Some(location) = LOCATION_GAZETTEER
            .iter()
            .find(|location| lower.contains(&location.to_lowercase()))
        {
            return Some(location.to_string());
        }
    }

    None
}

pub fn extract_fields(text: &str, file_name: &str) -> CandidateFields {
    CandidateFields {
        name: extract_name(text, file_name),
        email: extract_email(text),
        phone: extract_phone(text),
        location: extract_location(text),
    }
}

fn name_from_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|v| v.to_str())
        .unwrap_or_default();
    let spaced = FILENAME_SEPARATOR_RE.replace_all(stem, " ");
    let name = title_case(&spaced);

    if name.trim().is_empty() {
        "Unknown Candidate".to_string()
    } else {
        name
    }
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
fn title_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut previous_is_letter = false;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                result.extend(ch.to_lowercase());
            } else {
                result.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            result.push(ch);
            previous_is_letter = false;
        }
    }

    result
}

fn format_if_valid_phone(input: &str) -> Option<String> {
    PHONE_REGIONS.iter().find_map(|region| {
        let parsed = phonenumber::parse(Some(*region), input).ok()?;
        if !phonenumber::is_valid(&parsed) {
            return None;
        }

        Some(
            parsed
                .format()
                .mode(phonenumber::Mode::International)
                .to_string(),
        )
    })
}
