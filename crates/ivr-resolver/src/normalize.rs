//! Utterance and phrase normalization.

use ivr_types::text;

const STOP_WORDS: &[&str] = &[
    // English
    "a", "an", "the", "i", "im", "me", "my", "we", "our", "you", "your", "it", "is", "are", "am",
    "be", "do", "does", "can", "could", "would", "will", "please", "want", "like", "to", "for",
    "of", "in", "on", "at", "and", "or", "with", "about", "this", "that", "have", "has", "how",
    "what", "which", "hi", "hello",
    // Spanish
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al", "en", "y", "o",
    "mi", "mis", "su", "sus", "que", "por", "para", "con", "quiero", "necesito", "es", "se",
    "lo", "le", "tengo", "como", "puedo", "favor", "hola",
];

/// Normalizes text into matching tokens.
///
/// Folds case, accents and punctuation, drops English and Spanish stop
/// words, and strips a naive plural `s` from tokens longer than three
/// characters (`cards` becomes `card`, `business` is kept).
pub fn normalize(input: &str) -> Vec<String> {
    let folded = text::fold(input);
    text::tokens(&folded)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(singular)
        .collect()
}

fn singular(token: &str) -> String {
    if token.chars().count() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}
