//! HTML to markdown-flavoured text conversion
//!
//! Non-content elements (scripts, navigation, forms, media embeds and any
//! container tagged as a header/footer/copyright block) are dropped. The rest
//! is rendered with light markdown: `#` headings, `- ` list items, bold and
//! italic markers, `[text](href)` links, `![alt](src)` images, backtick code,
//! fenced `pre` blocks and `> ` quotes.

use scraper::{ElementRef, Html, Selector};

use super::text::{collapse_newlines, strip_noise};
use crate::config::FilterConfig;

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "form", "button", "input",
    "svg", "meta", "link", "noscript", "video", "audio", "object", "embed",
];

/// Class tokens or ids that mark boilerplate containers
const SKIPPED_MARKERS: &[&str] = &["header", "footer", "copyright", "version-info"];

/// Nesting depth below which elements are flattened to plain text
const MAX_RENDER_DEPTH: usize = 128;

/// Convert HTML to cleaned text: markdown rendering followed by noise stripping
pub fn to_clean_text(html: &str, filter: &FilterConfig) -> String {
    strip_noise(&to_markdown(html), &filter.noise_phrases)
}

/// Render the document body as markdown-flavoured text
pub fn to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    match body(&document) {
        Some(body) => render_children(body, &mut out, 0),
        None => render_children(document.root_element(), &mut out, 0),
    }
    tidy(&out)
}

fn body(document: &Html) -> Option<ElementRef<'_>> {
    let selector = Selector::parse("body").ok()?;
    document.select(&selector).next()
}

fn is_skipped(element: ElementRef<'_>) -> bool {
    let el = element.value();
    SKIPPED_TAGS.contains(&el.name())
        || el.classes().any(|c| SKIPPED_MARKERS.contains(&c))
        || el.id().is_some_and(|id| SKIPPED_MARKERS.contains(&id))
}

fn render_children(element: ElementRef<'_>, out: &mut String, depth: usize) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            render_element(child_element, out, depth + 1);
        } else if let Some(text) = child.value().as_text() {
            push_text(out, text);
        }
    }
}

fn render_element(element: ElementRef<'_>, out: &mut String, depth: usize) {
    if is_skipped(element) {
        return;
    }
    if depth > MAX_RENDER_DEPTH {
        let text: String = element.text().collect();
        push_text(out, &text);
        return;
    }

    let name = element.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let inner = inline_text(element, depth);
            if inner.is_empty() {
                return;
            }
            let level = name[1..].parse::<usize>().unwrap_or(1);
            block_break(out);
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(&inner);
            block_break(out);
        }
        "p" | "div" | "section" | "article" | "main" | "table" | "tr" => {
            block_break(out);
            render_children(element, out, depth);
            block_break(out);
        }
        "br" => out.push('\n'),
        "ul" | "ol" => {
            line_break(out);
            render_children(element, out, depth);
            line_break(out);
        }
        "li" => {
            let inner = render_to_string(element, depth);
            let mut lines = inner.lines().filter(|l| !l.trim().is_empty());
            let Some(first) = lines.next() else {
                return;
            };
            line_break(out);
            out.push_str("- ");
            out.push_str(first.trim_start());
            for line in lines {
                out.push_str("\n  ");
                out.push_str(line);
            }
            out.push('\n');
        }
        "strong" | "b" => wrap_inline(element, out, "**", depth),
        "em" | "i" => wrap_inline(element, out, "*", depth),
        "code" => wrap_inline(element, out, "`", depth),
        "a" => {
            let text = inline_text(element, depth);
            match element.value().attr("href") {
                Some(href) if !text.is_empty() => push_inline(out, &format!("[{}]({})", text, href)),
                _ => push_inline(out, &text),
            }
        }
        "img" => {
            if let Some(src) = element.value().attr("src") {
                let alt = element.value().attr("alt").unwrap_or_default();
                push_inline(out, &format!("![{}]({})", alt.trim(), src));
            }
        }
        "pre" => {
            let code: String = element.text().collect();
            let code = code.trim_matches('\n').trim_end();
            if code.trim().is_empty() {
                return;
            }
            block_break(out);
            out.push_str("```\n");
            out.push_str(code);
            out.push_str("\n```");
            block_break(out);
        }
        "blockquote" => {
            let inner = render_to_string(element, depth);
            if inner.is_empty() {
                return;
            }
            block_break(out);
            for (i, line) in inner.lines().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                if line.is_empty() {
                    out.push('>');
                } else {
                    out.push_str("> ");
                    out.push_str(line);
                }
            }
            block_break(out);
        }
        _ => render_children(element, out, depth),
    }
}

fn wrap_inline(element: ElementRef<'_>, out: &mut String, marker: &str, depth: usize) {
    let inner = inline_text(element, depth);
    if !inner.is_empty() {
        push_inline(out, &format!("{marker}{inner}{marker}"));
    }
}

fn render_to_string(element: ElementRef<'_>, depth: usize) -> String {
    let mut buf = String::new();
    render_children(element, &mut buf, depth);
    tidy(&buf)
}

/// Element content flattened to a single line
fn inline_text(element: ElementRef<'_>, depth: usize) -> String {
    render_to_string(element, depth)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append a text node, collapsing whitespace runs to one space
fn push_text(out: &mut String, text: &str) {
    let mut collapsed = String::with_capacity(text.len());
    let mut prev_ws = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_ws {
                collapsed.push(' ');
            }
            prev_ws = true;
        } else {
            collapsed.push(ch);
            prev_ws = false;
        }
    }

    if collapsed.trim().is_empty() {
        if !collapsed.is_empty() && !out.is_empty() && !out.ends_with(char::is_whitespace) {
            out.push(' ');
        }
        return;
    }
    push_inline(out, &collapsed);
}

/// Append inline content; no leading blanks at the start of a line
fn push_inline(out: &mut String, text: &str) {
    if out.is_empty() || out.ends_with('\n') {
        out.push_str(text.trim_start());
    } else {
        out.push_str(text);
    }
}

fn trim_trailing_spaces(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
}

/// Ensure the output ends with a blank line (no-op at the very start)
fn block_break(out: &mut String) {
    if out.is_empty() {
        return;
    }
    trim_trailing_spaces(out);
    let trailing = out.chars().rev().take_while(|c| *c == '\n').count();
    for _ in trailing..2 {
        out.push('\n');
    }
}

/// Ensure the output ends at the start of a line
fn line_break(out: &mut String) {
    if out.is_empty() {
        return;
    }
    trim_trailing_spaces(out);
    if !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Strip trailing blanks outside code fences, collapse blank runs, trim
fn tidy(text: &str) -> String {
    let mut in_fence = false;
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.trim();
            }
            if in_fence {
                line
            } else {
                line.trim_end()
            }
        })
        .collect();
    collapse_newlines(&lines.join("\n")).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_markdown_and_drops_boilerplate() {
        let html = r#"<html><head><title>T</title><script>var x = 1;</script></head><body>
<nav>Menu</nav><div class="site-header header">Top</div>
<h1>Rust Async</h1>
<p>Hello <strong>world</strong> and <a href="https://x.com/a">a link</a>.</p>
<ul><li>one</li><li>two</li></ul>
<pre><code>fn main() {
    println!("hi");
}</code></pre>
<blockquote><p>quoted text</p></blockquote>
<img src="/pic.png" alt="Pic">
<div id="copyright">(c) 2024</div>
<footer>Foot</footer>
</body></html>"#;

        let expected = "# Rust Async\n\n\
            Hello **world** and [a link](https://x.com/a).\n\n\
            - one\n- two\n\n\
            ```\nfn main() {\n    println!(\"hi\");\n}\n```\n\n\
            > quoted text\n\n\
            ![Pic](/pic.png)";
        assert_eq!(to_markdown(html), expected);
    }

    #[test]
    fn test_heading_levels_and_emphasis() {
        let html = "<body><h2>Sub <em>title</em></h2><h6>Tiny</h6><p>a <code>x</code> b</p></body>";
        assert_eq!(to_markdown(html), "## Sub *title*\n\n###### Tiny\n\na `x` b");
    }

    #[test]
    fn test_skipped_tags_never_leak() {
        let html = "<body><p>Body text</p><form><input value='x'>Sign up</form>\
            <aside>Related</aside><div class='version-info'>v1.2</div><iframe>frame</iframe></body>";
        let text = to_markdown(html);
        assert_eq!(text, "Body text");
    }

    #[test]
    fn test_clean_text_strips_noise_phrases() {
        let html = "<body><p>文章内容</p><p>百度APP内打开</p><p>结尾</p></body>";
        let text = to_clean_text(html, &FilterConfig::default());
        assert_eq!(text, "文章内容\n\n结尾");
    }

    #[test]
    fn test_deep_nesting_is_flattened() {
        let html = format!("<body>{}deep text</body>", "<div><span>".repeat(5_000));
        let text = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || to_clean_text(&html, &FilterConfig::default()))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(text, "deep text");
    }

    #[test]
    fn test_markup_below_depth_limit_keeps_text() {
        let nested = format!("{}<p>inner <b>bold</b></p>{}", "<div>".repeat(200), "</div>".repeat(200));
        let html = format!("<body><h1>Top</h1>{}</body>", nested);
        let text = to_markdown(&html);
        assert!(text.starts_with("# Top"));
        assert!(text.contains("inner bold"));
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(to_markdown(""), "");
        assert_eq!(to_markdown("<html><body>   </body></html>"), "");
    }
}
