//! Projection of decoded city records into the three fields the service serves
//!
//! Only `country.iso_code`, `city.names[lang]` and
//! `subdivisions[0].names[lang]` are read. Anything missing or of the wrong
//! type leaves the corresponding field empty; projection never fails.

use crate::data_section::DataValue;

/// Language used for localized names unless configured otherwise
pub const DEFAULT_LANGUAGE: &str = "en";

/// The fields of a city record this service cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoRecord {
    /// ISO 3166-1 alpha-2 country code (e.g. "US")
    pub country_iso_code: Option<String>,
    /// City name in the requested language
    pub city_name: Option<String>,
    /// First subdivision name in the requested language
    pub subdivision_name: Option<String>,
    /// Whether the record lists at least one subdivision
    pub has_subdivisions: bool,
}

impl GeoRecord {
    /// Project a decoded record, reading localized names in `language`
    pub fn project(record: &DataValue, language: &str) -> Self {
        let subdivisions = record
            .get("subdivisions")
            .and_then(DataValue::as_array)
            .unwrap_or_default();

        GeoRecord {
            country_iso_code: non_empty(record.get("country").and_then(|c| c.get("iso_code"))),
            city_name: localized_name(record.get("city"), language),
            subdivision_name: localized_name(subdivisions.first(), language),
            has_subdivisions: !subdivisions.is_empty(),
        }
    }
}

/// `entity.names[language]`
fn localized_name(entity: Option<&DataValue>, language: &str) -> Option<String> {
    non_empty(entity?.get("names")?.get(language))
}

/// A present-but-empty string counts as absent
fn non_empty(value: Option<&DataValue>) -> Option<String> {
    value
        .and_then(DataValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
