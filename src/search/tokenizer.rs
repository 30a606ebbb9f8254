//! Japanese-aware tokenizer - uses lindera (IPADIC) for segmentation / 日语分词器
//!
//! Supports / 支持：
//! - Word splitting on whitespace and common separators (`, . 、 。`, full-width space)
//! - Morphological segmentation of each word (lindera + IPADIC)
//! - Reading normalization: the katakana reading when the dictionary has one,
//!   otherwise the katakana form of the surface text (wana_kana)
//!
//! Kanji, hiragana, katakana and romaji spellings of the same word therefore
//! end up as the same token.

use lindera_core::mode::Mode;
use lindera_dictionary::{DictionaryConfig, DictionaryKind};
use lindera_tokenizer::tokenizer::{Tokenizer as LinderaTokenizer, TokenizerConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use wana_kana::ConvertJapanese;

use crate::error::TokenizerError;

/// Word separators / 分隔符
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,.、。　]+").unwrap());

/// Index of the reading in IPADIC details / IPADIC 读音字段位置
const READING_DETAIL: usize = 7;

/// Anything that turns text into index terms / 分词接口
///
/// The search index is generic over this so it can be exercised without
/// loading a dictionary.
pub trait Tokenize: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Dictionary-backed tokenizer / 基于词典的分词器
pub struct WorkTokenizer {
    inner: LinderaTokenizer,
}

impl WorkTokenizer {
    /// Load the embedded IPADIC dictionary / 加载 IPADIC 词典
    ///
    /// Takes a while, callers load it off the request path.
    pub fn new() -> Result<Self, TokenizerError> {
        let config = TokenizerConfig {
            dictionary: DictionaryConfig {
                kind: Some(DictionaryKind::IPADIC),
                path: None,
            },
            user_dictionary: None,
            mode: Mode::Normal,
        };
        let inner = LinderaTokenizer::from_config(config).map_err(|e| TokenizerError::Dictionary(e.to_string()))?;
        Ok(Self { inner })
    }

    fn tokenize_word(&self, word: &str, tokens: &mut Vec<String>) {
        let mut morphemes = match self.inner.tokenize(word) {
            Ok(morphemes) => morphemes,
            Err(e) => {
                tracing::debug!("Segmentation of {:?} failed, keeping the whole word: {}", word, e);
                tokens.push(normalize(word));
                return;
            }
        };

        for morpheme in morphemes.iter_mut() {
            let reading = morpheme
                .get_details()
                .and_then(|details| details.get(READING_DETAIL).copied())
                .filter(|reading| !reading.is_empty() && *reading != "*")
                .map(str::to_string);
            let token = match reading {
                Some(reading) => reading,
                None => normalize(&morpheme.text),
            };
            if !token.trim().is_empty() {
                tokens.push(token);
            }
        }
    }
}

impl Tokenize for WorkTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for word in split_words(text) {
            self.tokenize_word(word, &mut tokens);
        }
        tokens
    }
}

/// Split text into words / 按分隔符切分
pub fn split_words(text: &str) -> impl Iterator<Item = &str> {
    SEPARATORS.split(text).filter(|word| !word.is_empty())
}

/// Katakana form of a surface string / 转换为片假名
pub fn normalize(surface: &str) -> String {
    surface.to_lowercase().to_katakana()
}
