//! Status/material-type normalizer (spec §4.2): maps arbitrary upstream
//! strings onto the closed vocabularies in [`libfed_domain::model`]. Never
//! throws; unrecognized input maps to `Unknown` and the raw text survives
//! unchanged in `BookHolding.raw_status` for debugging.

use libfed_domain::{MaterialType, Status};
use once_cell::sync::Lazy;

/// Exact-match phrase table for status strings, longest/most-specific
/// phrases first where prefixes could otherwise collide.
static STATUS_TABLE: Lazy<Vec<(&'static str, Status)>> = Lazy::new(|| {
    vec![
        ("available", Status::Available),
        ("on shelf", Status::Available),
        ("in library", Status::Available),
        ("checked out", Status::CheckedOut),
        ("due", Status::CheckedOut),
        ("loaned", Status::CheckedOut),
        ("in transit", Status::InTransit),
        ("transit", Status::InTransit),
        ("in-transit", Status::InTransit),
        ("on hold", Status::OnHold),
        ("on hold shelf", Status::OnHold),
        ("holds pending", Status::OnHold),
        ("on order", Status::OnOrder),
        ("ordered", Status::OnOrder),
        ("on-order", Status::OnOrder),
        ("in processing", Status::InProcessing),
        ("being processed", Status::InProcessing),
        ("cataloging", Status::InProcessing),
        ("missing", Status::Missing),
        ("lost", Status::Missing),
        ("withdrawn", Status::Missing),
    ]
});

/// Normalize an arbitrary upstream status string to the closed vocabulary.
/// Matching is case-insensitive on the trimmed, lowered string: exact
/// match against the phrase table, or a "due " prefix match (e.g. "Due
/// 03-14-2026" -> `CheckedOut`).
pub fn normalize_status(raw: &str) -> Status {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Status::Unknown;
    }

    for (phrase, status) in STATUS_TABLE.iter() {
        if normalized == *phrase || normalized.starts_with(phrase) {
            return *status;
        }
    }

    Status::Unknown
}

static MATERIAL_TABLE: Lazy<Vec<(&'static str, MaterialType)>> = Lazy::new(|| {
    vec![
        ("large print", MaterialType::LargePrint),
        ("lp", MaterialType::LargePrint),
        ("audiobook", MaterialType::AudiobookCd),
        ("audio cd", MaterialType::AudiobookCd),
        ("book on cd", MaterialType::AudiobookCd),
        ("ebook", MaterialType::Ebook),
        ("e-book", MaterialType::Ebook),
        ("overdrive", MaterialType::Ebook),
        ("dvd", MaterialType::Dvd),
        ("blu-ray", MaterialType::Dvd),
        ("book", MaterialType::Book),
        ("hardcover", MaterialType::Book),
        ("paperback", MaterialType::Book),
    ]
});

/// Normalize an arbitrary upstream material-type/format code to the
/// closed vocabulary, matched case-insensitively as a substring (many
/// catalogs embed the material type in a longer format description, e.g.
/// "Book, Large Print").
pub fn normalize_material(raw: &str) -> MaterialType {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return MaterialType::Unknown;
    }

    for (phrase, material) in MATERIAL_TABLE.iter() {
        if normalized.contains(phrase) {
            return *material;
        }
    }

    MaterialType::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_prefix_status_matches() {
        assert_eq!(normalize_status("Available"), Status::Available);
        assert_eq!(normalize_status("  CHECKED OUT "), Status::CheckedOut);
        assert_eq!(normalize_status("Due 03-14-2026"), Status::CheckedOut);
        assert_eq!(normalize_status("In Transit"), Status::InTransit);
    }

    #[test]
    fn unrecognized_status_is_unknown() {
        assert_eq!(normalize_status("Frobnicated"), Status::Unknown);
        assert_eq!(normalize_status(""), Status::Unknown);
    }

    #[test]
    fn material_type_matches_substring() {
        assert_eq!(normalize_material("Book, Large Print"), MaterialType::LargePrint);
        assert_eq!(normalize_material("OverDrive eBook"), MaterialType::Ebook);
        assert_eq!(normalize_material("Hardcover"), MaterialType::Book);
        assert_eq!(normalize_material("Cassette"), MaterialType::Unknown);
    }
}
