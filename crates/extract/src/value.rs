use derive_more::{Display, From};
use std::collections::BTreeMap;

/// The language bucket for values that are not tied to a language.
pub const NO_LANGUAGE: &str = "";

/// A single extracted metadata value.
///
/// Values are persisted as text; the typed form only exists between the
/// extractor and the archive.
#[derive(Debug, Clone, PartialEq, Display, From)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Metadata for one language: `{key: value}`.
pub type Section = BTreeMap<String, Value>;

/// What an extractor returns for a single file.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// Values without a language.
    Flat(Section),
    /// Values keyed by language, [`NO_LANGUAGE`] for untagged keys.
    Multilang(BTreeMap<String, Section>),
}

impl Extracted {
    /// Flatten into `{language: {key: value}}`, putting flat output under
    /// [`NO_LANGUAGE`].
    pub fn into_languages(self) -> BTreeMap<String, Section> {
        match self {
            Self::Flat(section) => BTreeMap::from([(NO_LANGUAGE.to_string(), section)]),
            Self::Multilang(languages) => languages,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub metadata: Extracted,
    /// Library paths of local files referenced by the extracted file.
    pub assets: Vec<String>,
}

impl Extraction {
    pub fn flat(section: Section) -> Self {
        Self { metadata: Extracted::Flat(section), assets: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::from("Fluffy").to_string(), "Fluffy");
        assert_eq!(Value::from(640_i64).to_string(), "640");
        assert_eq!(Value::from(12.5).to_string(), "12.5");
        assert_eq!(Value::from(true).to_string(), "true");
    }

    #[test]
    fn test_flat_goes_under_no_language() {
        let section = Section::from([("title".to_string(), Value::from("x"))]);
        let languages = Extracted::Flat(section.clone()).into_languages();
        assert_eq!(languages.len(), 1);
        assert_eq!(languages[NO_LANGUAGE], section);
    }
}
