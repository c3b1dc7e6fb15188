use isolang::Language;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{EngineError, EngineResult};

/// Language code utilities
///
/// Subtitle languages are keyed by a lowercase code whose base subtag is an
/// ISO 639-1 (2-letter) or ISO 639-3 (3-letter) code, optionally followed by
/// region or script subtags such as `pt-br` or `zh-hans`.

// @const: language key layout, base subtag plus optional subtags
static LANGUAGE_KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z]{2,3})((?:-[a-z0-9]{2,8})*)$").expect("language key regex is valid")
});

/// Map ISO 639-2/B codes to their ISO 639-2/T form
fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    match code {
        "fre" => Some("fra"),
        "ger" => Some("deu"),
        "dut" => Some("nld"),
        "gre" => Some("ell"),
        "chi" => Some("zho"),
        "cze" => Some("ces"),
        "ice" => Some("isl"),
        "alb" => Some("sqi"),
        "arm" => Some("hye"),
        "baq" => Some("eus"),
        "bur" => Some("mya"),
        "per" => Some("fas"),
        "geo" => Some("kat"),
        "may" => Some("msa"),
        "mac" => Some("mkd"),
        "rum" => Some("ron"),
        "slo" => Some("slk"),
        "wel" => Some("cym"),
        _ => None,
    }
}

/// Look up the ISO language for a base subtag
fn base_language(base: &str) -> Option<Language> {
    match base.len() {
        2 => Language::from_639_1(base),
        3 => {
            let part2t = part2b_to_part2t(base).unwrap_or(base);
            Language::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Normalize a language key, rejecting unknown base codes
///
/// Whitespace is trimmed, case folded and `_` separators turned into `-`.
/// ISO 639-2/B base codes are rewritten to their 639-2/T form.
pub fn normalize_language_code(code: &str) -> EngineResult<String> {
    let folded = code.trim().to_lowercase().replace('_', "-");

    let captures = LANGUAGE_KEY_REGEX
        .captures(&folded)
        .ok_or_else(|| EngineError::InvalidLanguageCode(code.to_string()))?;

    let base = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let subtags = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

    if base_language(base).is_none() {
        return Err(EngineError::InvalidLanguageCode(code.to_string()));
    }

    let base = part2b_to_part2t(base).unwrap_or(base);
    Ok(format!("{}{}", base, subtags))
}

/// Check if two language keys name the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_language_code(code1), normalize_language_code(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name for a key, ignoring subtags
pub fn get_language_name(code: &str) -> EngineResult<String> {
    let normalized = normalize_language_code(code)?;
    let base = normalized.split('-').next().unwrap_or(&normalized);
    let lang = base_language(base).ok_or_else(|| EngineError::InvalidLanguageCode(code.to_string()))?;

    Ok(lang.to_name().to_string())
}
