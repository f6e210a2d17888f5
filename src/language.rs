//! Languages, partition keys and word normalization.
//!
//! Dictionaries are split into one word list per `(language, initial letter)`
//! pair. A [`PartitionKey`] names such a list and renders as `<code>_<letter>`,
//! e.g. `ru_а` or `en_q`, which is also the stem of the backing file.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::LanguageError;

const RUSSIAN_ALPHABET: &str = "абвгдеёжзийклмнопрстуфхцчшщъыьэюя";
const ENGLISH_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

/// Letters that never start a Russian word.
const RUSSIAN_NON_INITIAL: [char; 3] = ['ь', 'ъ', 'ы'];

const RUSSIAN_ESSENTIAL: [&str; 9] = [
    "программа",
    "привет",
    "компьютер",
    "интернет",
    "система",
    "данные",
    "абажур",
    "абзац",
    "автобус",
];

const ENGLISH_ESSENTIAL: [&str; 9] = [
    "program", "hello", "computer", "internet", "system", "data", "the", "and", "word",
];

// Most frequent initial letters, most frequent first.
const RUSSIAN_COMMON_INITIALS: [char; 6] = ['п', 'с', 'н', 'в', 'о', 'к'];
const ENGLISH_COMMON_INITIALS: [char; 6] = ['s', 'c', 'p', 't', 'a', 'm'];

/// A language with a partitioned dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    /// Russian (`ru`).
    #[serde(rename = "ru")]
    Russian,
    /// English (`en`).
    #[serde(rename = "en")]
    English,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Language; 2] = [Language::Russian, Language::English];

    /// Short code used in partition names.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Russian => "ru",
            Language::English => "en",
        }
    }

    /// Lowercase alphabet of the language.
    pub fn alphabet(&self) -> &'static str {
        match self {
            Language::Russian => RUSSIAN_ALPHABET,
            Language::English => ENGLISH_ALPHABET,
        }
    }

    /// Returns `true` if `letter` (already lowercase) belongs to the alphabet.
    pub fn contains_letter(&self, letter: char) -> bool {
        self.alphabet().contains(letter)
    }

    /// Returns `true` for letters that never begin a word.
    pub fn is_non_initial(&self, letter: char) -> bool {
        match self {
            Language::Russian => RUSSIAN_NON_INITIAL.contains(&letter),
            Language::English => false,
        }
    }

    /// Small built-in word set used when no partition can answer.
    pub fn essential_words(&self) -> &'static [&'static str] {
        match self {
            Language::Russian => &RUSSIAN_ESSENTIAL,
            Language::English => &ENGLISH_ESSENTIAL,
        }
    }

    /// Initial letters that are worth warming for short texts.
    pub fn common_initials(&self) -> &'static [char] {
        match self {
            Language::Russian => &RUSSIAN_COMMON_INITIALS,
            Language::English => &ENGLISH_COMMON_INITIALS,
        }
    }

    /// Splits `text` into lowercase words made of this language's letters.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut words = Vec::new();
        let mut current = String::new();
        for ch in text.chars().flat_map(char::to_lowercase) {
            if self.contains_letter(ch) {
                current.push(ch);
            } else if !current.is_empty() {
                words.push(core::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
        words
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = LanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ru" | "rus" | "russian" => Ok(Language::Russian),
            "en" | "eng" | "english" => Ok(Language::English),
            _ => Err(LanguageError::Unsupported(s.to_string())),
        }
    }
}

/// Trims surrounding whitespace and lowercases a word.
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Identifies one dictionary partition: a language plus an initial letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    /// Language of the partition.
    pub language: Language,
    /// Lowercase initial letter shared by every word in the partition.
    pub letter: char,
}

impl PartitionKey {
    /// Creates a key, lowercasing `letter`.
    pub fn new(language: Language, letter: char) -> Self {
        let letter = letter.to_lowercase().next().unwrap_or(letter);
        Self { language, letter }
    }

    /// Key of the partition that would contain `word`.
    ///
    /// Returns `None` for empty words and words that do not start with a
    /// letter of `language`.
    pub fn for_word(word: &str, language: Language) -> Option<Self> {
        let first = word.trim().chars().next()?;
        let key = Self::new(language, first);
        language.contains_letter(key.letter).then_some(key)
    }

    /// Returns `true` when the letter never starts a word, so the partition
    /// is always empty.
    pub fn is_excluded(&self) -> bool {
        self.language.is_non_initial(self.letter)
    }

    /// File stem of the partition's word list.
    pub fn file_stem(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.language.code(), self.letter)
    }
}

impl Serialize for PartitionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
