//! Text folding shared by every component that matches caller speech.

/// Lowercases, strips Spanish/English diacritics, turns punctuation into
/// whitespace and collapses runs of whitespace.
///
/// `"¿Dónde está mi TARJETA?"` folds to `"donde esta mi tarjeta"`.
pub fn fold(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        let ch = match ch {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        };
        if ch.is_alphanumeric() {
            if pending_space && !folded.is_empty() {
                folded.push(' ');
            }
            pending_space = false;
            folded.push(ch);
        } else {
            pending_space = true;
        }
    }
    folded
}

/// Splits folded text into tokens.
pub fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_and_punctuation() {
        assert_eq!(fold("¿Dónde está mi TARJETA?"), "donde esta mi tarjeta");
        assert_eq!(fold("  Señor,   año  "), "senor ano");
        assert_eq!(fold("16-digit"), "16 digit");
        assert_eq!(fold("!!!"), "");
    }
}
