//! Tokenização e contagem de palavras-chave.

use std::collections::{HashMap, HashSet};

/// Extrai tokens significativos de um texto livre.
///
/// Tokens são sequências máximas de caracteres alfabéticos (acentos incluídos),
/// em minúsculas. Descarta tokens curtos e stop words.
pub struct Tokenizer {
    min_chars: usize,
    stop_words: HashSet<String>,
}

impl Tokenizer {
    pub fn new(min_chars: usize, stop_words: &[String]) -> Self {
        Self {
            min_chars,
            stop_words: stop_words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !c.is_alphabetic())
            .filter(|t| t.chars().count() >= self.min_chars)
            .filter(|t| !self.stop_words.contains(*t))
            .map(str::to_string)
            .collect()
    }
}

/// Contador que preserva a ordem da primeira ocorrência para desempate.
#[derive(Debug, Default)]
pub struct KeywordCounter {
    counts: HashMap<String, (usize, usize)>,
    next_index: usize,
}

impl KeywordCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: impl Into<String>) {
        let index = self.next_index;
        let entry = self.counts.entry(token.into()).or_insert_with(|| (0, index));
        if entry.0 == 0 {
            self.next_index += 1;
        }
        entry.0 += 1;
    }

    pub fn extend<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            self.add(token);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Os `n` mais frequentes com pelo menos `min_support` ocorrências.
    ///
    /// Empates: contagem desc, depois primeira ocorrência.
    pub fn top(&self, n: usize, min_support: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(&String, &(usize, usize))> = self.counts.iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

        ranked
            .into_iter()
            .take(n)
            .filter(|(_, (count, _))| *count >= min_support)
            .map(|(token, (count, _))| (token.clone(), *count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> Tokenizer {
        let stop: Vec<String> = ["trop", "dosage", "patient"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Tokenizer::new(4, &stop)
    }

    #[test]
    fn test_tokens_keep_diacritics() {
        assert_eq!(tokenizer().tokens("Dosage TROP élevé!"), vec!["élevé"]);
        assert_eq!(
            tokenizer().tokens("réaction allergique, pénicilline"),
            vec!["réaction", "allergique", "pénicilline"]
        );
    }

    #[test]
    fn test_tokens_drop_short_and_digits() {
        assert!(tokenizer().tokens("le 500 mg à un ami").is_empty());
        assert_eq!(tokenizer().tokens("abc1defg"), vec!["defg"]);
    }

    #[test]
    fn test_top_tie_break_by_first_occurrence() {
        let mut counter = KeywordCounter::new();
        counter.extend(["beta", "alpha", "alpha", "beta", "gamma", "gamma", "delta"]);

        let top = counter.top(3, 2);
        assert_eq!(
            top,
            vec![
                ("beta".to_string(), 2),
                ("alpha".to_string(), 2),
                ("gamma".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_top_applies_min_support_after_top_n() {
        let mut counter = KeywordCounter::new();
        counter.extend(["rare", "commun", "commun"]);
        assert_eq!(counter.top(5, 2), vec![("commun".to_string(), 2)]);
        assert!(counter.top(5, 3).is_empty());
    }
}
