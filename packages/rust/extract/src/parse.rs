//! HTML to structured page text.
//!
//! Pulls the title, descriptions and JSON-LD from the whole document, then
//! headings, paragraphs, list items and tables from the content area with
//! site chrome (navigation, footers, cookie banners, ads) skipped. The
//! pieces are assembled into one `full_text` block for the classifier.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Maximum paragraphs included in `full_text`.
const MAX_PARAGRAPHS: usize = 50;
/// Maximum list items included in `full_text`.
const MAX_LIST_ITEMS: usize = 100;
/// Maximum tables included in `full_text`.
const MAX_TABLES: usize = 5;
/// Maximum rows per table included in `full_text`.
const MAX_TABLE_ROWS: usize = 20;

const MIN_PARAGRAPH_CHARS: usize = 20;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static CHROME: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        "nav, header, footer, aside, .nav, .navbar, .navigation, .menu, .header, .footer, \
         .sidebar, .cookie, .cookie-banner, .cookie-consent, .ad, .ads, .advertisement, \
         .social, .share, .sharing, script, style, noscript, iframe",
    )
});
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[name="description"]"#));
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="og:description"]"#));
static JSON_LD: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"script[type="application/ld+json"]"#));
static HEADINGS: LazyLock<[(&'static str, Selector); 4]> = LazyLock::new(|| {
    [
        ("H1", selector("h1")),
        ("H2", selector("h2")),
        ("H3", selector("h3")),
        ("H4", selector("h4")),
    ]
});
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static LIST_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("li"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("th, td"));

/// Structured text content of one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_ld: Option<serde_json::Value>,
    pub headings: Vec<String>,
    pub paragraphs: Vec<String>,
    pub list_items: Vec<String>,
    pub tables: Vec<Vec<Vec<String>>>,
    /// Everything above assembled for the classifier.
    pub full_text: String,
}

impl ParsedPage {
    /// Whether the page yielded any readable content at all.
    pub fn has_content(&self) -> bool {
        self.title.is_some()
            || self.meta_description.is_some()
            || !self.headings.is_empty()
            || !self.paragraphs.is_empty()
            || !self.list_items.is_empty()
            || !self.tables.is_empty()
    }
}

/// Collapse whitespace runs and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an HTML document into [`ParsedPage`].
pub fn parse_html(html: &str) -> ParsedPage {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|t| clean_text(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let meta_description = [&*META_DESCRIPTION, &*OG_DESCRIPTION]
        .into_iter()
        .filter_map(|sel| doc.select(sel).next())
        .filter_map(|m| m.value().attr("content"))
        .map(clean_text)
        .find(|d| !d.is_empty());

    let json_ld: Option<serde_json::Value> = doc
        .select(&JSON_LD)
        .filter_map(|s| serde_json::from_str(&s.text().collect::<String>()).ok())
        .next();

    let chrome: HashSet<_> = doc.select(&CHROME).map(|el| el.id()).collect();
    let in_chrome = |el: &ElementRef| {
        chrome.contains(&el.id()) || el.ancestors().any(|a| chrome.contains(&a.id()))
    };
    // Text of an element minus any chrome nested inside it.
    let visible_text = |el: ElementRef| {
        let raw: String = el
            .descendants()
            .filter_map(|node| {
                let text = node.value().as_text()?;
                let hidden = node.ancestors().any(|a| chrome.contains(&a.id()));
                (!hidden).then_some(&**text)
            })
            .collect();
        clean_text(&raw)
    };

    let mut headings = Vec::new();
    for (label, sel) in HEADINGS.iter() {
        for h in doc.select(sel).filter(|h| !in_chrome(h)) {
            let text = visible_text(h);
            if text.chars().count() > 2 {
                headings.push(format!("[{label}] {text}"));
            }
        }
    }

    let paragraphs: Vec<String> = doc
        .select(&PARAGRAPH)
        .filter(|p| !in_chrome(p))
        .map(visible_text)
        .filter(|t| t.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect();

    let list_items: Vec<String> = doc
        .select(&LIST_ITEM)
        .filter(|li| !in_chrome(li))
        .map(visible_text)
        .filter(|t| t.chars().count() > 5)
        .map(|t| format!("• {t}"))
        .collect();

    let tables: Vec<Vec<Vec<String>>> = doc
        .select(&TABLE)
        .filter(|t| !in_chrome(t))
        .map(|table| {
            table
                .select(&ROW)
                .map(|tr| tr.select(&CELL).map(visible_text).collect::<Vec<_>>())
                .filter(|cells| !cells.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|rows| !rows.is_empty())
        .collect();

    let mut page = ParsedPage {
        title,
        meta_description,
        json_ld,
        headings,
        paragraphs,
        list_items,
        tables,
        full_text: String::new(),
    };
    page.full_text = assemble_full_text(&page);
    page
}

fn assemble_full_text(page: &ParsedPage) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = &page.title {
        parts.push(format!("Title: {title}"));
    }
    if let Some(desc) = &page.meta_description {
        parts.push(format!("Description: {desc}"));
    }

    parts.push("\n--- HEADINGS ---".into());
    parts.extend(page.headings.iter().cloned());

    parts.push("\n--- CONTENT ---".into());
    parts.extend(page.paragraphs.iter().take(MAX_PARAGRAPHS).cloned());

    parts.push("\n--- LIST ITEMS ---".into());
    parts.extend(page.list_items.iter().take(MAX_LIST_ITEMS).cloned());

    if !page.tables.is_empty() {
        parts.push("\n--- TABLES ---".into());
        for (i, table) in page.tables.iter().take(MAX_TABLES).enumerate() {
            parts.push(format!("Table {}:", i + 1));
            for row in table.iter().take(MAX_TABLE_ROWS) {
                parts.push(row.join(" | "));
            }
        }
    }

    parts.join("\n")
}
