use sieve_core::tokenizer::{analyze, checksum, normalize};

#[test]
fn it_normalizes_and_stems() {
    let words = analyze("Running Runners RUN! Connected connections.");
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"connect".to_string()));
    assert!(words.iter().all(|w| w.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())));
}

#[test]
fn it_strips_non_ascii_letters() {
    assert_eq!(normalize("ＲＵＳＴ 2024").trim(), "2024");
    assert!(analyze("ｃａｔ x²y").is_empty());
    // the ligature is blanked, leaving its ASCII tail
    assert_eq!(analyze("ｃａｔ ﬁsh x²y"), vec!["sh"]);
}

#[test]
fn it_drops_short_tokens_and_punctuation() {
    let words = analyze("a b c-d ok <html> x1");
    assert_eq!(words, vec!["ok", "html", "x1"]);
}

#[test]
fn identical_streams_share_a_checksum() {
    let a = analyze("the cat sat on the mat");
    let b = analyze("The cat, sat on the MAT!");
    assert_eq!(checksum(&a), checksum(&b));
}
