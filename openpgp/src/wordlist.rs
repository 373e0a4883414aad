//! Tokenizing uid strings for the full-text word index (spec.md
//! §4.7), grounded in `wordlist.c`'s `makewordlist`.

use std::collections::BTreeSet;

use crate::key::PublicKey;

/// Splits `text` into its set of indexable words: maximal runs of
/// ASCII alphanumeric bytes, lowercased, with runs of length `<= 1`
/// discarded.
///
/// Returns a set (no duplicates), matching `makewordlist`'s
/// `llfind`-before-`lladd` de-dup.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch.to_ascii_lowercase());
        } else if !current.is_empty() {
            push_word(&mut words, &current);
            current.clear();
        }
    }
    if !current.is_empty() {
        push_word(&mut words, &current);
    }

    words
}

fn push_word(words: &mut BTreeSet<String>, word: &str) {
    if word.chars().count() > 1 {
        words.insert(word.to_string());
    }
}

/// Tokenizes every uid on `key` into one combined word set, for
/// indexing a whole key at once (`makewordlistfromkey`).
pub fn tokenize_key(key: &PublicKey) -> BTreeSet<String> {
    let mut words = BTreeSet::new();
    for uid in &key.uids {
        let text = String::from_utf8_lossy(uid.packet.data());
        words.extend(tokenize(&text));
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_non_alphanumerics_and_lowercases() {
        let words = tokenize("Alice Example <alice@example.org>");
        assert!(words.contains("alice"));
        assert!(words.contains("example"));
        assert!(words.contains("org"));
        assert!(!words.contains("Alice"));
    }

    #[test]
    fn discards_single_character_runs() {
        let words = tokenize("a b cd");
        assert!(!words.contains("a"));
        assert!(!words.contains("b"));
        assert!(words.contains("cd"));
    }

    #[test]
    fn duplicate_words_collapse_to_one() {
        let words = tokenize("test test test");
        assert_eq!(words.len(), 1);
    }

    #[test]
    fn empty_string_has_no_words() {
        assert!(tokenize("").is_empty());
    }
}
