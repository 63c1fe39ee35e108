//! Article quality prompt rendering

use chrono::NaiveDate;
use std::borrow::Cow;

use crate::util::truncate_chars;

/// Scenario labels offered to the model, with a short description each
pub const SCENARIO_CATALOGUE: &[(&str, &str)] = &[
    ("tech", "AI, machine learning, large models, software engineering and other technology"),
    ("med", "healthcare, biotechnology, drug development"),
    ("fin", "digital currency, blockchain, investing, banking"),
    ("edu", "online education, academic research, vocational training, edtech"),
    ("bid", "public tenders, bidding announcements, procurement notices"),
    ("ent", "film, music, games, social media, popular culture"),
    ("ecom", "cross-border e-commerce, live commerce, digital marketing, supply chains"),
    ("leg", "legal advice, compliance, intellectual property, contract disputes"),
    ("auto", "autonomous driving, electric vehicles, smart cockpits"),
    ("tour", "smart tourism, virtual tours, cultural heritage digitisation"),
    ("psych", "mental health assessment, affective computing, cognitive therapy"),
];

/// Appended when a prompt had to be cut
pub const TRUNCATION_NOTICE: &str = "\n\n[Content truncated to fit the model context]";

fn scenario_lines() -> String {
    SCENARIO_CATALOGUE
        .iter()
        .map(|(label, desc)| format!("    - {}: {}", label, desc))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the article quality prompt
pub fn render_quality_prompt(article: &str, query: &str, word_limit: usize, today: NaiveDate) -> String {
    format!(
        "You are a content processing expert. Evaluate the quality of a crawled article, \
compress it if needed and label its topic. Answer with a single JSON object following these rules:\n\
1. Decide whether the article is high quality: relevant to the user query and substantive. \
Put the result in the boolean field \"high_quality\". If it is not, stop here and give a short \"reason\".\n\
2. If it is high quality, decide whether it exceeds {word_limit} characters and needs compression. \
Put the result in the boolean field \"compress\".\n\
3. If it needs compression, put the compressed article in \"compressed_article\". Keep the original \
wording without adding your own summary and use as much of the {word_limit} characters as possible.\n\
4. If it is high quality, put its topic in \"title\", at most 20 characters.\n\
5. If it is high quality, put the domain it belongs to in \"scenario\", one of:\n{scenarios}\n\
6. Output nothing except the JSON object.\n\n\
Current date: {today}\n\
User query: {query}\n\
Article:\n{article}",
        word_limit = word_limit,
        scenarios = scenario_lines(),
        today = today.format("%Y-%m-%d"),
        query = query,
        article = article,
    )
}

/// Cut `prompt` to at most `max_chars` characters, marking the cut
pub fn guard_prompt_length(prompt: &str, max_chars: usize) -> Cow<'_, str> {
    if prompt.chars().count() <= max_chars {
        return Cow::Borrowed(prompt);
    }
    let keep = max_chars.saturating_sub(TRUNCATION_NOTICE.chars().count());
    Cow::Owned(format!("{}{}", truncate_chars(prompt, keep), TRUNCATION_NOTICE))
}
