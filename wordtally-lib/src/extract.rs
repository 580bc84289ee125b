//! Title and body extraction from raw markup.
//!
//! The pipeline only depends on the [`Extractor`] trait. The default
//! [`HeuristicExtractor`] is a best-effort regex cascade tuned for news
//! article pages; it always returns strings, possibly empty.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

/// Title and body text pulled out of one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extracted {
    pub title: String,
    pub body: String,
}

/// Strategy for turning raw document bytes into title and body text.
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &[u8]) -> Extracted;
}

/// Title used when a page has neither `<title>` nor `<h1>`.
pub const UNTITLED: &str = "Untitled";

/// Paragraphs at or under this many characters are skipped by the
/// paragraph fallback.
const MIN_PARAGRAPH_CHARS: usize = 20;

const CONTENT_CLASSES: [&str; 4] = ["article-body", "post-body", "entry-content", "content-body"];

const ENTITIES: [(&str, &str); 8] = [
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
    ("&mdash;", "\u{2014}"),
    ("&ndash;", "\u{2013}"),
];

const NOISE: [&str; 2] = ["Advertisement", "ADVERTISEMENT"];

lazy_static! {
    static ref TITLE: Regex = Regex::new(r"<title[^>]*>([^<]*)</title>").unwrap();
    static ref H1: Regex = Regex::new(r"<h1[^>]*>([^<]*)</h1>").unwrap();

    /// Content containers in priority order: each class bounded by a
    /// trailing footer or end of body first, then each class on its own,
    /// then an article with its leading heading skipped.
    static ref BODY_PATTERNS: Vec<Regex> = {
        let bounded = CONTENT_CLASSES.iter().map(|class| {
            format!(
                r#"(?is)<div[^>]*class="[^"]*{}[^"]*"[^>]*>(.*)</div>\s*(?:<footer|</body)"#,
                class
            )
        });
        let greedy = CONTENT_CLASSES
            .iter()
            .map(|class| format!(r#"(?is)<div[^>]*class="[^"]*{}[^"]*"[^>]*>(.*)</div>"#, class));
        let article =
            std::iter::once(r"(?is)<article[^>]*>.*?<h[1-6][^>]*>.*?</h[1-6]>(.*?)</article>".to_string());

        bounded
            .chain(greedy)
            .chain(article)
            .map(|pattern| Regex::new(&pattern).unwrap())
            .collect()
    };

    static ref PARAGRAPH: Regex = Regex::new(r"(?is)<p[^>]*>(.*?)</p>").unwrap();
    static ref SCRIPT: Regex = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    static ref STYLE: Regex = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    static ref COMMENT: Regex = Regex::new(r"<!--.*?-->").unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Regex-cascade extractor for article pages.
#[derive(Debug, Clone)]
pub struct HeuristicExtractor {
    /// Site-name suffixes trimmed off page titles
    title_suffixes: Vec<String>,
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self {
            title_suffixes: vec![" | Engadget".to_string(), " - Engadget".to_string()],
        }
    }
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list of title suffixes to strip.
    pub fn with_title_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.title_suffixes = suffixes;
        self
    }

    /// Prefer `<title>`, then the first `<h1>`, then [`UNTITLED`].
    pub fn extract_title(&self, html: &str) -> String {
        if let Some(caps) = TITLE.captures(html) {
            let mut title = caps[1].trim();
            for suffix in &self.title_suffixes {
                if let Some(stripped) = title.strip_suffix(suffix.as_str()) {
                    title = stripped;
                }
            }
            return title.to_string();
        }

        if let Some(caps) = H1.captures(html) {
            return caps[1].trim().to_string();
        }

        UNTITLED.to_string()
    }

    /// Main article text, falling back to paragraph scraping.
    pub fn extract_body(&self, html: &str) -> String {
        for pattern in BODY_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(html) {
                return clean_text(&caps[1]);
            }
        }

        trace!("no content container matched, falling back to paragraph extraction");
        extract_paragraphs(html)
    }
}

impl Extractor for HeuristicExtractor {
    fn extract(&self, raw: &[u8]) -> Extracted {
        let html = String::from_utf8_lossy(raw);
        Extracted {
            title: self.extract_title(&html),
            body: self.extract_body(&html),
        }
    }
}

fn extract_paragraphs(html: &str) -> String {
    PARAGRAPH
        .captures_iter(html)
        .map(|caps| clean_text(&caps[1]))
        .filter(|text| text.trim().chars().count() > MIN_PARAGRAPH_CHARS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip markup down to plain, single-spaced text.
pub fn clean_text(content: &str) -> String {
    let content = SCRIPT.replace_all(content, " ");
    let content = STYLE.replace_all(&content, " ");
    let content = COMMENT.replace_all(&content, " ");
    let content = TAG.replace_all(&content, " ");

    let mut content = content.into_owned();
    for (entity, replacement) in ENTITIES {
        if content.contains(entity) {
            content = content.replace(entity, replacement);
        }
    }

    let mut content = WHITESPACE.replace_all(&content, " ").into_owned();
    for noise in NOISE {
        if content.contains(noise) {
            content = content.replace(noise, "");
        }
    }

    content.trim().to_string()
}
