//! Mock translation service.
//!
//! There is no real translation backend. `PhrasebookTranslator` knows a
//! handful of common chat phrases per language and otherwise tags the text
//! with the target language code.

use std::collections::HashMap;

/// Translates message text into a target language.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, language: &str) -> String;
}

/// Phrase-table translator with a tagged fallback.
#[derive(Debug, Clone)]
pub struct PhrasebookTranslator {
    /// language code -> (lowercased phrase -> translation)
    phrases: HashMap<String, HashMap<String, String>>,
}

impl PhrasebookTranslator {
    pub fn new() -> Self {
        let mut phrases: HashMap<String, HashMap<String, String>> = HashMap::new();
        let table: &[(&str, &[(&str, &str)])] = &[
            (
                "es",
                &[
                    ("hi", "hola"),
                    ("hello", "hola"),
                    ("how are you?", "¿cómo estás?"),
                    ("thank you", "gracias"),
                    ("good night", "buenas noches"),
                ],
            ),
            (
                "fr",
                &[
                    ("hi", "salut"),
                    ("hello", "bonjour"),
                    ("how are you?", "comment ça va ?"),
                    ("thank you", "merci"),
                    ("good night", "bonne nuit"),
                ],
            ),
            (
                "de",
                &[
                    ("hi", "hallo"),
                    ("hello", "hallo"),
                    ("how are you?", "wie geht's?"),
                    ("thank you", "danke"),
                    ("good night", "gute Nacht"),
                ],
            ),
        ];
        for (lang, entries) in table {
            let map = phrases.entry(lang.to_string()).or_default();
            for (src, dst) in entries.iter() {
                map.insert(src.to_string(), dst.to_string());
            }
        }
        Self { phrases }
    }
}

impl Default for PhrasebookTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator for PhrasebookTranslator {
    fn translate(&self, text: &str, language: &str) -> String {
        let language = language.to_lowercase();
        self.phrases
            .get(&language)
            .and_then(|map| map.get(&text.trim().to_lowercase()))
            .cloned()
            .unwrap_or_else(|| format!("[{language}] {text}"))
    }
}
