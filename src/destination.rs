//! Spoken-destination resolution against a fixed directory of known places.
//!
//! Free speech often produces plausible room numbers that are not in the
//! directory; those resolve to [`Resolution::NoMatch`] rather than an error.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{NavError, Result};
use crate::geo::Coordinate;

const CANCEL_PHRASES: &[&str] = &["cancel", "nevermind", "never mind"];

static DESTINATION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9]+|\bbathroom\b").expect("destination token pattern is valid")
});

/// A known place a user can ask to be routed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub coordinate: Coordinate,
    pub floor: Option<String>,
}

/// Read-only key → destination mapping, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct DestinationDirectory {
    entries: HashMap<String, Destination>,
    overlay_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    overlay_id: Option<String>,
    #[serde(default)]
    destinations: BTreeMap<String, DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    lat: f64,
    lon: f64,
    floor: Option<String>,
}

impl DestinationDirectory {
    pub fn new(entries: impl IntoIterator<Item = (String, Destination)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            overlay_id: None,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: DirectoryFile = toml::from_str(raw)?;
        let mut entries = HashMap::with_capacity(file.destinations.len());
        for (key, entry) in file.destinations {
            if !entry.lat.is_finite() || !entry.lon.is_finite() {
                return Err(NavError::DirectoryParse(format!(
                    "destination {key:?} has a non-finite coordinate"
                )));
            }
            entries.insert(
                key,
                Destination {
                    coordinate: Coordinate::new(entry.lat, entry.lon),
                    floor: entry.floor,
                },
            );
        }
        Ok(Self {
            entries,
            overlay_id: file.overlay_id.filter(|id| !id.trim().is_empty()),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn get(&self, key: &str) -> Option<&Destination> {
        self.entries.get(key)
    }

    /// Overlay id declared by the directory file, if any.
    pub fn overlay_id(&self) -> Option<&str> {
        self.overlay_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Destination { key: String, coordinate: Coordinate },
    Cancelled,
    NoMatch,
}

pub fn is_cancel_phrase(utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    CANCEL_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// First digit run or "bathroom" in the utterance, normalized for lookup.
pub fn extract_destination_token(utterance: &str) -> Option<String> {
    DESTINATION_TOKEN
        .find(utterance)
        .map(|found| found.as_str().to_lowercase())
}

/// Resolve a transcribed utterance. Cancellation phrases win over any token.
pub fn resolve(utterance: &str, directory: &DestinationDirectory) -> Resolution {
    if is_cancel_phrase(utterance) {
        return Resolution::Cancelled;
    }
    let Some(token) = extract_destination_token(utterance) else {
        return Resolution::NoMatch;
    };
    match directory.get(&token) {
        Some(destination) => Resolution::Destination {
            key: token,
            coordinate: destination.coordinate,
        },
        None => Resolution::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn directory() -> DestinationDirectory {
        DestinationDirectory::new([
            (
                "114".to_string(),
                Destination {
                    coordinate: Coordinate::new(35.61533, -82.56592),
                    floor: Some("1".to_string()),
                },
            ),
            (
                "bathroom".to_string(),
                Destination {
                    coordinate: Coordinate::new(35.6154, -82.566),
                    floor: None,
                },
            ),
            (
                "7".to_string(),
                Destination {
                    coordinate: Coordinate::new(35.6151, -82.5658),
                    floor: None,
                },
            ),
        ])
    }

    #[rstest]
    #[case("take me to room 114", Some("114"))]
    #[case("Where is the Bathroom", Some("bathroom"))]
    #[case("room 7 or room 114", Some("7"))]
    #[case("bathrooms please", None)]
    #[case("nothing here", None)]
    #[case("room ١١٤", None)]
    #[case("floor ٣ room 114", Some("114"))]
    fn token_extraction(#[case] utterance: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            extract_destination_token(utterance).as_deref(),
            expected,
            "utterance: {utterance}"
        );
    }

    #[rstest]
    #[case("cancel")]
    #[case("CANCEL room 114")]
    #[case("oh nevermind")]
    #[case("never mind, bathroom")]
    fn cancellation_phrases(#[case] utterance: &str) {
        assert_eq!(resolve(utterance, &directory()), Resolution::Cancelled);
    }

    #[test]
    fn known_room_resolves_to_its_coordinate() {
        assert_eq!(
            resolve("take me to room 114", &directory()),
            Resolution::Destination {
                key: "114".to_string(),
                coordinate: Coordinate::new(35.61533, -82.56592),
            }
        );
    }

    #[test]
    fn unknown_room_number_is_not_an_error() {
        assert_eq!(resolve("room 999", &directory()), Resolution::NoMatch);
        assert_eq!(resolve("nothing here", &directory()), Resolution::NoMatch);
    }

    #[test]
    fn only_ascii_digits_name_a_room() {
        assert_eq!(resolve("room ١١٤", &directory()), Resolution::NoMatch);
        assert!(matches!(
            resolve("٣ then room 7", &directory()),
            Resolution::Destination { key, .. } if key == "7"
        ));
    }

    #[test]
    fn directory_parses_toml_and_keeps_keys_verbatim() {
        let parsed = DestinationDirectory::from_toml_str(
            r#"
            overlay_id = "DM_15755"
            [destinations]
            "114" = { lat = 35.61533, lon = -82.56592 }
            bathroom = { lat = 35.6154, lon = -82.566, floor = "1" }
            "#,
        )
        .expect("parse directory");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.overlay_id(), Some("DM_15755"));
        assert_eq!(parsed.get("bathroom").and_then(|d| d.floor.as_deref()), Some("1"));
        assert!(parsed.get("0114").is_none());
    }

    #[test]
    fn directory_rejects_missing_coordinates() {
        let err = DestinationDirectory::from_toml_str(
            r#"
            [destinations]
            "114" = { lat = 35.0 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, NavError::DirectoryParse(_)));
    }

    proptest! {
        #[test]
        fn cancel_phrase_always_wins(
            prefix in "[a-z ]{0,12}",
            digits in "[0-9]{1,4}",
            phrase in prop::sample::select(vec!["cancel", "Nevermind", "NEVER MIND"]),
        ) {
            let utterance = format!("{prefix} room {digits} {phrase}");
            prop_assert_eq!(resolve(&utterance, &directory()), Resolution::Cancelled);
        }

        #[test]
        fn utterances_without_tokens_never_match(text in "[a-zA-Z ,.]{0,40}") {
            prop_assume!(!is_cancel_phrase(&text));
            prop_assume!(!text.to_lowercase().contains("bathroom"));
            prop_assert_eq!(resolve(&text, &directory()), Resolution::NoMatch);
        }

        #[test]
        fn absent_numbers_never_match(number in 1000u32..100_000) {
            let utterance = format!("go to room {number}");
            prop_assert_eq!(resolve(&utterance, &directory()), Resolution::NoMatch);
        }
    }
}
