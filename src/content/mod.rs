//! Content normalization
//!
//! Turns fetched bytes into cleaned text and decides whether that text is
//! worth keeping:
//! - `html`: HTML to markdown-flavoured text
//! - `pdf`: per-page PDF text extraction
//! - `text`: noise-phrase stripping
//! - `quality`: rule-based low-quality detection

pub mod html;
pub mod pdf;
pub mod quality;
pub mod text;

pub use html::{to_clean_text, to_markdown};
pub use pdf::PdfExtractor;
pub use quality::{assess, is_low_quality, LowQualityReason};
pub use text::strip_noise;
