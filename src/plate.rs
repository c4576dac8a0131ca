//! Nepali licence plate normalisation and validation.
//!
//! Two grammars are recognised, both written with Devanagari digits:
//!
//! * provincial: `प्रदेश ३-०१-१२ च १२३४`
//! * legacy zone-based: `बा १२ प १२३४`
//!
//! Anything else is invalid. Matching is always against the whole string.

use regex::Regex;
use std::sync::OnceLock;

const PROVINCIAL_PATTERN: &str =
    r"^प्रदेश\s([०-९]{1,2})[-–][०-९]{2}[-–][०-९]{2}\s[क-ह]\s[०-९]{4}$";

const NATIVE_DIGITS: [char; 10] = ['०', '१', '२', '३', '४', '५', '६', '७', '८', '९'];

pub const LEGACY_ZONES: [&str; 11] = [
    "बा", "मे", "को", "सा", "ज", "भ", "रा", "लु", "का", "मा", "ना",
];

pub const CLASS_LETTERS: [char; 29] = [
    'क', 'ख', 'ग', 'घ', 'च', 'छ', 'ज', 'ट', 'ठ', 'ड', 'ढ', 'त', 'थ', 'द', 'ध', 'न', 'प', 'फ',
    'ब', 'भ', 'म', 'य', 'र', 'ल', 'व', 'श', 'ष', 'स', 'ह',
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlateGrammar {
    Provincial,
    Legacy,
}

/// Trims the plate and replaces em/en dashes with an ASCII hyphen.
pub fn normalize(plate: &str) -> String {
    plate.trim().replace(|c: char| c == '—' || c == '–', "-")
}

pub fn is_valid(plate: &str) -> bool {
    classify(plate).is_some()
}

pub fn classify(plate: &str) -> Option<PlateGrammar> {
    let plate = normalize(plate);
    if match_provincial(&plate).is_some() {
        Some(PlateGrammar::Provincial)
    } else if match_legacy(&plate) {
        Some(PlateGrammar::Legacy)
    } else {
        None
    }
}

/// Returns the province number (in Devanagari digits) of a provincial plate.
/// Legacy and invalid plates have no province.
pub fn extract_province(plate: &str) -> Option<String> {
    let plate = normalize(plate);
    match_provincial(&plate).map(str::to_string)
}

/// Converts ASCII digits to Devanagari, leaving every other character alone.
pub fn to_native_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => NATIVE_DIGITS[d as usize],
            None => c,
        })
        .collect()
}

/// Formats `n` in Devanagari digits, zero-padded to `width` when given.
pub fn to_native_number(n: u32, width: Option<usize>) -> String {
    let ascii = match width {
        Some(width) => format!("{:0width$}", n, width = width),
        None => n.to_string(),
    };
    to_native_digits(&ascii)
}

/// Best-effort conversion of a typed plate, e.g. `बा 12 प 1234`, to native form.
pub fn convert_plate_to_native(plate: &str) -> String {
    to_native_digits(&normalize(plate))
}

fn provincial() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PROVINCIAL_PATTERN).expect("provincial plate pattern"))
}

fn legacy() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(
            r"^({})\s[०-९]{{2}}\s[क-ह]\s[०-९]{{4}}$",
            LEGACY_ZONES.join("|")
        );
        Regex::new(&pattern).expect("legacy plate pattern")
    })
}

/// Matches `प्रदेश X-YY-ZZ L NNNN` and returns the province token `X`.
fn match_provincial(plate: &str) -> Option<&str> {
    provincial()
        .captures(plate)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn match_legacy(plate: &str) -> bool {
    legacy().is_match(plate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVINCIAL: &str = "प्रदेश ३-०१-१२ च १२३४";
    const LEGACY: &str = "बा १२ प १२३४";

    #[test]
    fn normalize_trims_and_replaces_dashes() {
        assert_eq!(normalize("  प्रदेश ३—०१–१२ च १२३४\t"), PROVINCIAL);
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in &[" a—b ", "–", "  — ", PROVINCIAL, "x – y", "\u{2014}\u{2013} "] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input {:?}", s);
        }
    }

    #[test]
    fn accepts_both_grammars() {
        assert_eq!(classify(PROVINCIAL), Some(PlateGrammar::Provincial));
        assert_eq!(classify(LEGACY), Some(PlateGrammar::Legacy));
        assert!(is_valid("प्रदेश १२-९९-०१ ह ०००१"));
        assert!(is_valid("ज ०१ क ९९९९"));
        assert!(is_valid("  प्रदेश ३–०१—१२ च १२३४  "));
    }

    #[test]
    fn rejects_near_misses() {
        assert!(!is_valid(""));
        assert!(!is_valid("   "));
        // suffix one digit short
        assert!(!is_valid("प्रदेश ३-०१-१२ च १२३"));
        assert!(!is_valid("बा १२ प १२३"));
        // trailing garbage
        assert!(!is_valid("प्रदेश ३-०१-१२ च १२३४५"));
        assert!(!is_valid("बा १२ प १२३४ x"));
        // ASCII digits
        assert!(!is_valid("प्रदेश 3-01-12 च 1234"));
        // unknown zone
        assert!(!is_valid("झा १२ प १२३४"));
        // three-digit province
        assert!(!is_valid("प्रदेश १२३-०१-१२ च १२३४"));
        // vowel sign instead of class letter
        assert!(!is_valid("बा १२ ा १२३४"));
        assert!(!is_valid("BA 12 PA 3456"));
    }

    #[test]
    fn province_only_for_provincial_plates() {
        assert_eq!(extract_province(PROVINCIAL).as_deref(), Some("३"));
        assert_eq!(
            extract_province("प्रदेश १२-९९-०१ ह ०००१").as_deref(),
            Some("१२")
        );
        assert_eq!(extract_province(LEGACY), None);
        assert_eq!(extract_province("प्रदेश ३-०१-१२ च १२३"), None);
        assert_eq!(extract_province(""), None);
    }

    #[test]
    fn native_digit_helpers() {
        assert_eq!(to_native_number(7, None), "७");
        assert_eq!(to_native_number(3, Some(2)), "०३");
        assert_eq!(to_native_digits("BA-12"), "BA-१२");
        assert_eq!(convert_plate_to_native(" बा 12 प 1234 "), LEGACY);
        assert!(is_valid(&convert_plate_to_native("प्रदेश 3—01-12 च 1234")));
    }

    #[test]
    fn grammars_compile_and_capture_province() {
        assert!(provincial().is_match(PROVINCIAL));
        assert!(legacy().is_match(LEGACY));
        assert!(!legacy().is_match(PROVINCIAL));
        assert_eq!(match_provincial("प्रदेश ७–०१-१२ च १२३४"), Some("७"));
        assert!(is_valid("बा\t१२ प १२३४"));
    }

    #[test]
    fn every_class_letter_is_accepted() {
        for letter in CLASS_LETTERS.iter() {
            let plate = format!("को ०५ {} ४४४४", letter);
            assert!(is_valid(&plate), "{}", plate);
        }
    }
}
