//! Extraction record schema: the fixed field set, its canonical JSON keys,
//! alias tolerance, and the sentinel values used to keep records total.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

// =============================================================================
// Sentinels
// =============================================================================

/// Fill for a field the response did not supply.
pub const NOT_STATED: &str = "not explicitly stated";

/// Fill used when every attempt was exhausted and no usable response exists.
pub const NEEDS_REVIEW: &str = "needs manual review";

/// Fill for `translated_title` when a response otherwise decoded but the
/// title translation is missing.
pub const TRANSLATION_FAILED: &str = "translation failed";

/// Fill for `original_title` when the caller supplied none.
pub const UNTITLED: &str = "untitled";

// =============================================================================
// Field set
// =============================================================================

/// The closed set of fields an extraction record carries.
///
/// The variant order defines the key order of serialized records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtractField {
    /// Title exactly as supplied by the caller. Never taken from a response.
    OriginalTitle,
    TranslatedTitle,
    StudyPopulation,
    SampleSize,
    Dosage,
    Mechanism,
    Summary,
    Conclusion,
    Country,
    DataCollectionYear,
}

impl ExtractField {
    /// Every field, in serialization order.
    pub const ALL: [Self; 10] = [
        Self::OriginalTitle,
        Self::TranslatedTitle,
        Self::StudyPopulation,
        Self::SampleSize,
        Self::Dosage,
        Self::Mechanism,
        Self::Summary,
        Self::Conclusion,
        Self::Country,
        Self::DataCollectionYear,
    ];

    /// Canonical JSON key for the field.
    #[must_use]
    pub const fn canonical_key(self) -> &'static str {
        match self {
            Self::OriginalTitle => "original_title",
            Self::TranslatedTitle => "translated_title",
            Self::StudyPopulation => "study_population",
            Self::SampleSize => "sample_size",
            Self::Dosage => "dosage",
            Self::Mechanism => "mechanism",
            Self::Summary => "summary",
            Self::Conclusion => "conclusion",
            Self::Country => "country",
            Self::DataCollectionYear => "data_collection_year",
        }
    }

    /// Accepted response keys for the field, in probe order. The canonical
    /// key always comes first; comparisons are case-insensitive, so spelling
    /// variants like `Sample_Size` need no entry of their own.
    #[must_use]
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::OriginalTitle => &["original_title"],
            Self::TranslatedTitle => &["translated_title", "title_translation", "title"],
            Self::StudyPopulation => &[
                "study_population",
                "population",
                "subjects",
                "participants",
            ],
            Self::SampleSize => &["sample_size", "sample size", "n", "num_participants"],
            Self::Dosage => &["dosage", "dose", "dosing"],
            Self::Mechanism => &["mechanism", "mechanism_of_action", "moa"],
            Self::Summary => &["summary", "abstract_summary", "overview"],
            Self::Conclusion => &["conclusion", "conclusions", "findings"],
            Self::Country => &["country", "countries", "region"],
            Self::DataCollectionYear => &[
                "data_collection_year",
                "collection_year",
                "study_year",
                "year",
            ],
        }
    }

    /// Default sentinel for the field when a decoded response omits it.
    #[must_use]
    pub const fn missing_sentinel(self) -> &'static str {
        match self {
            Self::OriginalTitle => UNTITLED,
            Self::TranslatedTitle => TRANSLATION_FAILED,
            _ => NOT_STATED,
        }
    }
}

impl std::fmt::Display for ExtractField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_key())
    }
}

// =============================================================================
// Records
// =============================================================================

/// A total extraction record: every field of [`ExtractField::ALL`] has a
/// value, sentinel-filled where data is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    fields: BTreeMap<ExtractField, String>,
}

impl ExtractedRecord {
    /// Build a record from per-field values, filling gaps with each field's
    /// missing sentinel and applying `overrides` last.
    ///
    /// Overrides win unconditionally; the dispatcher uses them to pin
    /// caller-supplied values such as the original title.
    #[must_use]
    pub fn from_parts(
        decoded: BTreeMap<ExtractField, String>,
        overrides: &BTreeMap<ExtractField, String>,
    ) -> Self {
        let mut fields = BTreeMap::new();
        for field in ExtractField::ALL {
            let value = overrides
                .get(&field)
                .or_else(|| decoded.get(&field))
                .cloned()
                .unwrap_or_else(|| field.missing_sentinel().to_string());
            fields.insert(field, value);
        }
        Self { fields }
    }

    /// A record with every field set to [`NEEDS_REVIEW`], except overrides.
    ///
    /// Returned when the retry/fallback budget is exhausted so callers always
    /// receive a total record rather than an error.
    #[must_use]
    pub fn fallback(overrides: &BTreeMap<ExtractField, String>) -> Self {
        let mut fields = BTreeMap::new();
        for field in ExtractField::ALL {
            let value = overrides
                .get(&field)
                .cloned()
                .unwrap_or_else(|| NEEDS_REVIEW.to_string());
            fields.insert(field, value);
        }
        Self { fields }
    }

    /// Value of a field. Total by construction, so this never misses.
    #[must_use]
    pub fn get(&self, field: ExtractField) -> &str {
        self.fields
            .get(&field)
            .map_or(field.missing_sentinel(), String::as_str)
    }

    /// True when every field carries the exhaustion sentinel (ignoring
    /// overridden fields is the caller's concern).
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        ExtractField::ALL
            .iter()
            .filter(|f| **f != ExtractField::OriginalTitle)
            .all(|f| self.get(*f) == NEEDS_REVIEW)
    }

    /// Serialize to a JSON object keyed by canonical field names.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for field in ExtractField::ALL {
            map.insert(
                field.canonical_key().to_string(),
                Value::String(self.get(field).to_string()),
            );
        }
        Value::Object(map)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys_are_unique() {
        let mut keys: Vec<&str> = ExtractField::ALL
            .iter()
            .map(|f| f.canonical_key())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), ExtractField::ALL.len());
    }

    #[test]
    fn canonical_key_is_first_alias() {
        for field in ExtractField::ALL {
            assert_eq!(field.aliases()[0], field.canonical_key());
        }
    }

    #[test]
    fn from_parts_fills_missing_fields_with_sentinels() {
        let mut decoded = BTreeMap::new();
        decoded.insert(ExtractField::Summary, "a short summary".to_string());
        let record = ExtractedRecord::from_parts(decoded, &BTreeMap::new());

        assert_eq!(record.get(ExtractField::Summary), "a short summary");
        assert_eq!(record.get(ExtractField::Country), NOT_STATED);
        assert_eq!(record.get(ExtractField::TranslatedTitle), TRANSLATION_FAILED);
        assert_eq!(record.get(ExtractField::OriginalTitle), UNTITLED);
    }

    #[test]
    fn overrides_win_over_decoded_values() {
        let mut decoded = BTreeMap::new();
        decoded.insert(
            ExtractField::OriginalTitle,
            "model-invented title".to_string(),
        );
        let mut overrides = BTreeMap::new();
        overrides.insert(ExtractField::OriginalTitle, "the real title".to_string());

        let record = ExtractedRecord::from_parts(decoded, &overrides);
        assert_eq!(record.get(ExtractField::OriginalTitle), "the real title");
    }

    #[test]
    fn fallback_record_is_total_and_flagged() {
        let mut overrides = BTreeMap::new();
        overrides.insert(ExtractField::OriginalTitle, "kept title".to_string());

        let record = ExtractedRecord::fallback(&overrides);
        assert!(record.is_fallback());
        assert_eq!(record.get(ExtractField::OriginalTitle), "kept title");
        assert_eq!(record.get(ExtractField::Dosage), NEEDS_REVIEW);
        assert_eq!(record.get(ExtractField::Conclusion), NEEDS_REVIEW);
    }

    #[test]
    fn json_serialization_is_total_and_keyed_canonically() {
        let record = ExtractedRecord::from_parts(BTreeMap::new(), &BTreeMap::new());
        let json = record.to_json();
        let obj = json.as_object().expect("object");

        assert_eq!(obj.len(), ExtractField::ALL.len());
        assert_eq!(obj["country"], NOT_STATED);
        assert_eq!(obj["original_title"], UNTITLED);
        assert!(obj.contains_key("data_collection_year"));
    }
}
