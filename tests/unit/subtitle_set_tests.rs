/*!
 * Tests for cue sets
 */

use subledger::errors::EngineError;
use subledger::subtitle_set::{hash_content, Cue, SubtitleSet};

/// Test that well-formed cues validate
#[test]
fn test_validate_withOrderedCues_shouldPass() {
    let set = SubtitleSet::from_cues(vec![
        Cue::new(0, 1000, "One"),
        Cue::new(1000, 1000, "Zero length"),
        Cue::new(1000, 3000, "Same start"),
    ]);
    assert!(set.validate().is_ok());
    assert!(SubtitleSet::new().validate().is_ok());
}

/// Test that every malformed timing is rejected
#[test]
fn test_validate_withMalformedCues_shouldReject() {
    let negative = SubtitleSet::from_cues(vec![Cue::new(-5, 100, "Negative")]);
    let inverted = SubtitleSet::from_cues(vec![Cue::new(2000, 1000, "Inverted")]);
    let unordered = SubtitleSet::from_cues(vec![Cue::new(5000, 6000, "Late"), Cue::new(1000, 2000, "Early")]);

    for set in [negative, inverted, unordered] {
        assert!(matches!(set.validate(), Err(EngineError::InvalidSubtitleData(_))));
    }
}

/// Test that the content hash follows the serialized content
#[test]
fn test_contentHash_shouldDependOnContentOnly() {
    let a = SubtitleSet::from_cues(vec![Cue::new(0, 1000, "Hello")]);
    let b = SubtitleSet::from_cues(vec![Cue::new(0, 1000, "Hello")]);
    let c = SubtitleSet::from_cues(vec![Cue::new(0, 1000, "Hello!")]);

    assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
    assert_eq!(a.content_hash().unwrap(), hash_content(&a.to_json().unwrap()));
    assert_eq!(a.content_hash().unwrap().len(), 64);
}

/// Test that cue files in the CLI format parse, metadata included
#[test]
fn test_fromJson_withCueArray_shouldParse() {
    let json = r#"[
        {"start_ms": 0, "end_ms": 1200, "text": "Hi"},
        {"start_ms": 1500, "end_ms": 2000, "text": "There", "metadata": {"speaker": "Ann"}}
    ]"#;

    let set = SubtitleSet::from_json(json).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.cues()[1].metadata.get("speaker").map(String::as_str), Some("Ann"));
    assert!(SubtitleSet::from_json("{\"not\": \"a list\"}").is_err());
}

/// Test SRT-like display of a set
#[test]
fn test_display_shouldRenderNumberedBlocks() {
    let set = SubtitleSet::from_cues(vec![Cue::new(3_723_004, 3_724_000, "Late line")]);
    let rendered = set.to_string();

    assert!(rendered.starts_with("1\n01:02:03,004 --> 01:02:04,000\nLate line\n"));
}
