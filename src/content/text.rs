//! Noise-phrase stripping for extracted text

/// Remove every noise phrase, collapse runs of 3+ newlines to a blank line
/// and trim the result.
pub fn strip_noise(text: &str, noise_phrases: &[String]) -> String {
    let mut cleaned = text.to_string();
    for phrase in noise_phrases.iter().filter(|p| !p.is_empty()) {
        if cleaned.contains(phrase.as_str()) {
            cleaned = cleaned.replace(phrase.as_str(), "");
        }
    }
    collapse_newlines(&cleaned).trim().to_string()
}

/// Collapse any run of three or more `\n` into exactly two
pub fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            run += 1;
            if run <= 2 {
                out.push('\n');
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}
