//! Question categorization
//!
//! Ordered keyword rules, first match wins. Because keyword sets overlap
//! ("BTC launch" contains both a price and a news trigger), the priority
//! order is fixed and load-bearing:
//!
//! Price -> News -> Social -> OnChain -> Weather -> General
//!
//! General is the fallback; categorization is total and never "unknown".

use crate::models::Category;

/// Price threshold applied when a price question carries no parseable
/// number. Explicit fallback, callers log when it fires.
pub const DEFAULT_PRICE_THRESHOLD: f64 = 60_000.0;

/// Keywords are matched as lowercase token prefixes, so "deploy" catches
/// "deployed" and "launch" catches "launched". Multi-word entries are
/// matched as substrings.
const PRICE_KEYWORDS: &[&str] = &[
    "btc", "bitcoin", "eth", "ethereum", "solana", "price", "stock", "trading", "usd", "eur",
];
const PRICE_PHRASES: &[&str] = &["market cap"];

const NEWS_KEYWORDS: &[&str] = &[
    "announce", "launch", "release", "win", "lose", "elect", "appoint", "resign", "happen",
    "occur",
];

const SOCIAL_KEYWORDS: &[&str] = &[
    "tweet", "twitter", "post", "instagram", "tiktok", "facebook", "reddit", "social",
];

const ONCHAIN_KEYWORDS: &[&str] = &[
    "deploy", "contract", "blockchain", "transaction", "wallet", "gas", "gwei", "block",
    "polygon", "arbitrum",
];

const WEATHER_KEYWORDS: &[&str] = &[
    "rain", "snow", "temperature", "weather", "storm", "hurricane", "celsius", "fahrenheit",
];

/// Classify a market question. Pure and deterministic: the same question
/// always yields the same category.
pub fn categorize(question: &str) -> Category {
    let lower = question.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let matches = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|kw| tokens.iter().any(|t| t.starts_with(kw)))
    };

    if matches(PRICE_KEYWORDS)
        || lower.contains('$')
        || PRICE_PHRASES.iter().any(|p| lower.contains(p))
    {
        return Category::Price;
    }
    if matches(NEWS_KEYWORDS) {
        return Category::News;
    }
    if matches(SOCIAL_KEYWORDS) {
        return Category::Social;
    }
    if matches(ONCHAIN_KEYWORDS) {
        return Category::OnChain;
    }
    if matches(WEATHER_KEYWORDS) {
        return Category::Weather;
    }

    Category::General
}

/// Extract the first numeric token from a question, e.g. the 60000 in
/// "Will BTC close above $60,000 on March 1?". Commas are thousands
/// separators; decimals are allowed. Returns None when no number parses,
/// in which case numeric consensus falls back to
/// [`DEFAULT_PRICE_THRESHOLD`].
pub fn parse_threshold(question: &str) -> Option<f64> {
    let chars: Vec<char> = question.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == ',' || chars[i] == '.') {
                i += 1;
            }
            let raw: String = chars[start..i]
                .iter()
                .filter(|c| **c != ',')
                .collect();
            // A trailing period is sentence punctuation, not a decimal.
            let trimmed = raw.trim_end_matches('.');
            if let Ok(value) = trimmed.parse::<f64>() {
                return Some(value);
            }
        } else {
            i += 1;
        }
    }

    None
}
