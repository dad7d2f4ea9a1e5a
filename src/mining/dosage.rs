//! Extração de menções de dose (`<número> <unidade>`).

use regex::Regex;

use crate::{FeedloopError, FeedloopResult};

/// Extrator de doses construído a partir das unidades configuradas.
pub struct DosageExtractor {
    pattern: Regex,
}

impl DosageExtractor {
    /// Unidades mais longas primeiro, para que `ml` não seja lido como `m`.
    pub fn new(units: &[String]) -> FeedloopResult<Self> {
        let mut units: Vec<String> = units
            .iter()
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty())
            .collect();
        if units.is_empty() {
            return Err(FeedloopError::config("miner.dosage_units está vazio"));
        }
        units.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        units.dedup();

        let alternation = units
            .iter()
            .map(|u| regex::escape(u))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(\d+)\s*({})s?\b", alternation))
            .map_err(|e| FeedloopError::config(format!("padrão de dose inválido: {}", e)))?;

        Ok(Self { pattern })
    }

    /// Todas as doses no texto, normalizadas como `"<número><unidade>"`.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.pattern
            .captures_iter(&lowered)
            .map(|caps| format!("{}{}", &caps[1], &caps[2]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::MinerConfig;

    fn extractor() -> DosageExtractor {
        DosageExtractor::new(&MinerConfig::default().dosage_units).unwrap()
    }

    #[test]
    fn test_extracts_number_and_unit() {
        assert_eq!(
            extractor().extract("Réduit à 500 mg, puis 2 comprimés et 5ml de sirop"),
            vec!["500mg", "2comprimé", "5ml"]
        );
    }

    #[test]
    fn test_plural_english_units() {
        assert_eq!(extractor().extract("2 Tablets twice daily"), vec!["2tablet"]);
    }

    #[test]
    fn test_unit_must_end_word() {
        assert!(extractor().extract("10 gouttes, 3 grammes").is_empty());
        assert_eq!(extractor().extract("1 g par jour"), vec!["1g"]);
    }

    #[test]
    fn test_empty_units_rejected() {
        assert!(DosageExtractor::new(&[]).is_err());
    }
}
