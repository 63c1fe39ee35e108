//! Rule-based low-quality detection
//!
//! A cheap, synchronous predicate run on every extracted text before it is
//! allowed anywhere near the reasoning service or the store.

use std::collections::HashSet;
use std::fmt;

use crate::config::FilterConfig;

/// Why a text was classified as low quality
#[derive(Debug, Clone, PartialEq)]
pub enum LowQualityReason {
    Empty,
    TooShort { chars: usize },
    Garbled { ratio: f64 },
    Repetitive { distinct_ratio: f64 },
    Spam { keyword: String },
    Captcha { phrase: String },
}

impl fmt::Display for LowQualityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty text"),
            Self::TooShort { chars } => write!(f, "text too short ({} chars)", chars),
            Self::Garbled { ratio } => write!(f, "garbled text ({:.0}% invalid chars)", ratio * 100.0),
            Self::Repetitive { distinct_ratio } => {
                write!(f, "repetitive text (distinct ratio {:.2})", distinct_ratio)
            }
            Self::Spam { keyword } => write!(f, "spam keyword '{}'", keyword),
            Self::Captcha { phrase } => write!(f, "anti-bot challenge '{}'", phrase),
        }
    }
}

/// Characters that count as meaningful for the garbling check
fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || ('\u{4E00}'..='\u{9FA5}').contains(&c)
        || matches!(c, '，' | '。' | '！' | '？' | '、' | ',' | '.' | '!' | '?')
}

/// Classify `text`, returning the first rule it violates
pub fn assess(text: &str, filter: &FilterConfig) -> Option<LowQualityReason> {
    if text.is_empty() {
        return Some(LowQualityReason::Empty);
    }

    let total = text.chars().count();
    if total < filter.min_length {
        return Some(LowQualityReason::TooShort { chars: total });
    }

    let invalid = text.chars().filter(|c| !is_valid_char(*c)).count();
    let ratio = invalid as f64 / total as f64;
    if ratio > filter.max_garbled_ratio {
        return Some(LowQualityReason::Garbled { ratio });
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() > filter.repetition_min_tokens {
        let distinct: HashSet<&str> = tokens.iter().copied().collect();
        let distinct_ratio = distinct.len() as f64 / tokens.len() as f64;
        if distinct_ratio < filter.min_distinct_ratio {
            return Some(LowQualityReason::Repetitive { distinct_ratio });
        }
    }

    let lower = text.to_lowercase();
    if let Some(keyword) = filter
        .spam_keywords
        .iter()
        .find(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
    {
        return Some(LowQualityReason::Spam { keyword: keyword.clone() });
    }

    if let Some(phrase) = filter
        .captcha_phrases
        .iter()
        .find(|p| !p.is_empty() && (text.contains(p.as_str()) || lower.contains(&p.to_lowercase())))
    {
        return Some(LowQualityReason::Captcha { phrase: phrase.clone() });
    }

    None
}

/// True when any low-quality rule fires
pub fn is_low_quality(text: &str, filter: &FilterConfig) -> bool {
    assess(text, filter).is_some()
}
