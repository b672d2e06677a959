use ergot_shared::Language;
use std::collections::HashMap;

const EN_MESSAGES: &str = include_str!("../../locales/en.yaml");
const HI_MESSAGES: &str = include_str!("../../locales/hi.yaml");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to parse {lang} messages: {source}")]
    Parse {
        lang: Language,
        source: serde_yaml::Error,
    },
}

/// UI strings per language, keyed by dotted message id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    messages: HashMap<Language, HashMap<String, String>>,
}

impl Catalog {
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_sources([(Language::En, EN_MESSAGES), (Language::Hi, HI_MESSAGES)])
    }

    pub fn from_sources<'a, I>(sources: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (Language, &'a str)>,
    {
        let mut messages = HashMap::new();
        for (lang, source) in sources {
            let table: HashMap<String, String> = serde_yaml::from_str(source)
                .map_err(|source| CatalogError::Parse { lang, source })?;
            messages.insert(lang, table);
        }
        Ok(Self { messages })
    }

    /// Falls back to English, then to the key itself.
    pub fn text<'a>(&'a self, lang: Language, key: &'a str) -> &'a str {
        self.lookup(lang, key)
            .or_else(|| self.lookup(Language::En, key))
            .unwrap_or_else(|| {
                log::warn!("Missing message {} for {}", key, lang);
                key
            })
    }

    fn lookup(&self, lang: Language, key: &str) -> Option<&str> {
        self.messages
            .get(&lang)
            .and_then(|table| table.get(key))
            .map(String::as_str)
    }

    #[cfg(test)]
    fn keys(&self, lang: Language) -> impl Iterator<Item = &str> {
        self.messages
            .get(&lang)
            .into_iter()
            .flat_map(|table| table.keys().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn embedded_catalog_parses() {
        let catalog = Catalog::embedded().unwrap();
        assert_eq!(catalog.text(Language::En, "label.diseased"), "Diseased: Ergot");
        assert_eq!(catalog.text(Language::Hi, "label.healthy"), "स्वस्थ");
    }

    #[test]
    fn every_language_covers_every_english_key() {
        let catalog = Catalog::embedded().unwrap();
        for lang in Language::iter() {
            for key in catalog.keys(Language::En) {
                assert!(
                    catalog.lookup(lang, key).is_some(),
                    "{} is missing {}",
                    lang,
                    key
                );
            }
        }
    }

    #[test]
    fn english_labels_match_result_labels() {
        let catalog = Catalog::embedded().unwrap();
        assert_eq!(
            catalog.text(Language::En, "label.healthy"),
            ergot_shared::Label::Healthy.to_string()
        );
        assert_eq!(
            catalog.text(Language::En, "label.diseased"),
            ergot_shared::Label::Diseased.to_string()
        );
    }

    #[test]
    fn falls_back_to_english_then_key() {
        let catalog = Catalog::from_sources([
            (Language::En, "greeting: Hello\n"),
            (Language::Hi, "other: x\n"),
        ])
        .unwrap();
        assert_eq!(catalog.text(Language::Hi, "greeting"), "Hello");
        assert_eq!(catalog.text(Language::Hi, "unknown.key"), "unknown.key");
    }

    #[test]
    fn malformed_source_reports_language() {
        let err = Catalog::from_sources([(Language::Hi, "- not\n- a map\n")]).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { lang: Language::Hi, .. }));
    }
}
