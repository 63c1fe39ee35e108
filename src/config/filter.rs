//! URL deny lists and low-quality text heuristics
//!
//! Everything here is plain data so operators can tune it from the
//! `[filter]` table without a rebuild.

use serde::{Deserialize, Serialize};

const STATIC_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".css", ".js", ".zip", ".tar", ".gz", ".exe", ".svg",
    ".ico", ".mp3", ".mp4", ".avi", ".mov", ".flv", ".wmv", ".woff", ".woff2", ".ttf", ".eot",
    ".otf",
];

const DENY_SUBSTRINGS: &[&str] = &[
    // ads, tracking, analytics
    "/ads/", "/ad/", "doubleclick", "analytics", "tracker", "click.php", "pixel.php",
    "counter.php", "utm_", "adserv", "banner", "sponsor",
    // user actions and accounts
    "redirect", "share", "login", "signup", "register", "comment", "subscribe", "newsletter",
    "account", "profile", "password", "/dictionary/", "/translate/", "/grammar/", "/thesaurus/",
    // site information
    "privacy", "terms", "about-us", "contact-us", "faq", "help", "cookie", "disclaimer",
    "copyright", "license", "sitemap", "contact", "about",
    // search engine pages
    "www.bing.com/images/search", "google.com/imgres", "search?", "search/", "/search",
    "query=", "www.google.com/maps/search", "www.bing.com/translate",
    "www.instagram.com/cambridgewords", "dictionary.cambridge.org/plus",
    "dictionary.cambridge.org/howto.html", "www.google.com/shopping",
    "support.google.com/googleshopping", "www.bing.com/maps", "www.bing.com/shop",
    "go.microsoft.com/fwlink", "bingapp.microsoft.com/bing",
    "www.google.com/httpservice/retry/enablejs", "www.google.com/travel/flights",
    "maps.google.com/maps",
    // social share
    "facebook.com/sharer", "twitter.com/intent", "linkedin.com/share", "plus.google.com",
    "pinterest.com/pin", "t.me/share",
    // print, feeds, downloads
    "print=", "print/", "print.html", "rss", "feed", "atom", "download=", "/download",
    "embed=",
    // calendars, archives, taxonomies
    "calendar", "/tag/", "/tags/", "/category/", "/categories/", "/archive/", "/archives/",
    "/author/", "/date/",
    // carts and transactions
    "cart", "checkout", "basket", "payment", "order", "transaction",
    // human verification
    "www.ggzy.gov.cn/information/serve/wechat.jsp",
];

const DENY_PATTERNS: &[&str] = &[
    r"^https?://(www\.)?bing\.com/?(\?.*)?$",
    r"^https?://(www\.)?google\.com/?(\?.*)?$",
];

const NOISE_PHRASES: &[&str] = &["百度APP内打开", "大家还在搜"];

const SPAM_KEYWORDS: &[&str] = &[
    "click here", "buy now", "limited offer", "free download", "make money", "earn cash",
    "点击这里", "立即购买", "限时优惠", "免费领取", "点击下载", "立即注册", "v信", "加微",
    "低价出售", "【广告】", "completed our registration form",
];

const CAPTCHA_PHRASES: &[&str] = &[
    "detected unusual traffic",
    "systems have detected unusual",
    "IP address:",
    "This page checks",
    "see if it's really you",
    "not a robot",
    "Why did this happen",
    "Loading...The system can't perform the operation now.",
    "Try again later.",
    "Our systems have detected unusual traffic from your computer network.",
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Path suffixes of static assets
    pub static_extensions: Vec<String>,
    /// Substrings that reject a URL (matched against the lowercased URL)
    pub deny_substrings: Vec<String>,
    /// Case-insensitive regexes that reject a URL
    pub deny_patterns: Vec<String>,
    /// Phrases removed verbatim from extracted text
    pub noise_phrases: Vec<String>,
    /// Marketing/spam markers (matched against lowercased text)
    pub spam_keywords: Vec<String>,
    /// Anti-bot challenge markers (case-insensitive)
    pub captcha_phrases: Vec<String>,
    /// Texts shorter than this many characters are low quality
    pub min_length: usize,
    /// Maximum share of characters outside the accepted set
    pub max_garbled_ratio: f64,
    /// Token count above which the repetition check applies
    pub repetition_min_tokens: usize,
    /// Minimum distinct/total token ratio
    pub min_distinct_ratio: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            static_extensions: owned(STATIC_EXTENSIONS),
            deny_substrings: owned(DENY_SUBSTRINGS),
            deny_patterns: owned(DENY_PATTERNS),
            noise_phrases: owned(NOISE_PHRASES),
            spam_keywords: owned(SPAM_KEYWORDS),
            captcha_phrases: owned(CAPTCHA_PHRASES),
            min_length: 150,
            max_garbled_ratio: 0.3,
            repetition_min_tokens: 20,
            min_distinct_ratio: 0.1,
        }
    }
}
