//! Page extraction: fetched HTML in, [`PageFragment`] out.
//!
//! Parsing is local ([`parse`]); field extraction is delegated to a
//! [`Classifier`]. A page that cannot be extracted is dropped by the caller,
//! never the run.

pub mod classify;
pub mod page_type;
pub mod parse;

use std::sync::Arc;

use tracing::{debug, instrument};

use loyaltyscout_shared::{LoyaltyScoutError, PageFragment, PageType, Result};

pub use classify::{
    Classification, Classifier, OfflineClassifier, OpenRouterClassifier, parse_classification,
};
pub use page_type::infer_page_type;
pub use parse::{ParsedPage, clean_text, parse_html};

/// Input for one page.
#[derive(Debug, Clone)]
pub struct ExtractRequest<'a> {
    pub url: &'a str,
    pub html: &'a str,
    pub brand: &'a str,
    /// Page type supplied by the input list, if any.
    pub page_type_hint: Option<PageType>,
    /// Discovery rank, 0 = most relevant.
    pub rank: usize,
}

/// A fragment plus the parsed page it came from.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub fragment: PageFragment,
    pub parsed: ParsedPage,
}

/// Runs parse → classify for single pages.
#[derive(Clone)]
pub struct PageExtractor {
    classifier: Arc<dyn Classifier>,
}

impl PageExtractor {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn classifier_name(&self) -> String {
        self.classifier.name()
    }

    /// Extract one page.
    ///
    /// Page type resolution: an explicit hint wins, then a recognized label
    /// from the classifier, then inference from the URL.
    #[instrument(skip_all, fields(url = %req.url, rank = req.rank))]
    pub async fn extract(&self, req: ExtractRequest<'_>) -> Result<Extraction> {
        let parsed = parse_html(req.html);
        if !parsed.has_content() {
            return Err(LoyaltyScoutError::extraction(req.url, "no extractable text"));
        }

        let classification = self
            .classifier
            .classify(req.brand, req.url, &parsed.full_text)
            .await
            .map_err(|e| LoyaltyScoutError::extraction(req.url, e.to_string()))?;

        let page_type = req
            .page_type_hint
            .or(classification.page_type.filter(|t| *t != PageType::Other))
            .unwrap_or_else(|| infer_page_type(req.url));

        debug!(%page_type, empty = classification.fields.is_empty(), "page extracted");

        Ok(Extraction {
            fragment: PageFragment {
                source_url: req.url.to_string(),
                page_type,
                rank: req.rank,
                fields: classification.fields,
            },
            parsed,
        })
    }
}
