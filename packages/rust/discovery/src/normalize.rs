//! URL canonicalization scoped to one brand domain.

use serde::{Deserialize, Serialize};
use url::Url;

use loyaltyscout_shared::{LoyaltyScoutError, Result};

/// Query parameters that only carry campaign tracking.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid",
];

/// A URL in canonical form. Two URLs are duplicates iff their canonical
/// strings are byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves and canonicalizes URLs for one brand domain, rejecting anything
/// outside it.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    base: Url,
    registrable: String,
}

impl UrlNormalizer {
    /// Build a normalizer for a brand domain.
    ///
    /// A bare domain gets `https://www.` prepended unless it already starts
    /// with `www.`; a domain given with a scheme is used as-is.
    pub fn for_domain(domain: &str) -> Result<Self> {
        let domain = domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            return Err(LoyaltyScoutError::invalid_url(domain, "empty domain"));
        }

        let base_str = if domain.contains("://") {
            format!("{domain}/")
        } else if domain.to_ascii_lowercase().starts_with("www.") {
            format!("https://{domain}/")
        } else {
            format!("https://www.{domain}/")
        };

        let base = Url::parse(&base_str)
            .map_err(|e| LoyaltyScoutError::invalid_url(domain, e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(LoyaltyScoutError::invalid_url(domain, "unsupported scheme"));
        }
        let host = base
            .host_str()
            .ok_or_else(|| LoyaltyScoutError::invalid_url(domain, "missing host"))?;
        let registrable = host.strip_prefix("www.").unwrap_or(host).to_string();

        Ok(Self { base, registrable })
    }

    /// The URL relative references are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Host suffix every accepted URL must share (leading `www.` removed).
    pub fn registrable_domain(&self) -> &str {
        &self.registrable
    }

    /// Canonical form of the homepage.
    pub fn homepage(&self) -> CanonicalUrl {
        CanonicalUrl(self.base.to_string())
    }

    fn in_domain(&self, host: &str) -> bool {
        host == self.registrable
            || host
                .strip_suffix(self.registrable.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Resolve `raw` against the base URL and canonicalize it.
    pub fn normalize(&self, raw: &str) -> Result<CanonicalUrl> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LoyaltyScoutError::invalid_url(raw, "empty URL"));
        }

        let mut url = self
            .base
            .join(raw)
            .map_err(|e| LoyaltyScoutError::invalid_url(raw, e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(LoyaltyScoutError::invalid_url(raw, "unsupported scheme"));
        }
        let host = url
            .host_str()
            .ok_or_else(|| LoyaltyScoutError::invalid_url(raw, "missing host"))?;
        if !self.in_domain(host) {
            return Err(LoyaltyScoutError::invalid_url(
                raw,
                format!("outside {}", self.registrable),
            ));
        }

        // Scheme and host are already lower-cased and default ports dropped
        // by the parser.
        url.set_fragment(None);

        let kept_query = url.query().map(|query| {
            query
                .split('&')
                .filter(|pair| !pair.is_empty() && !is_tracking_param(pair))
                .collect::<Vec<_>>()
                .join("&")
        });
        match kept_query {
            Some(q) if !q.is_empty() => url.set_query(Some(&q)),
            _ => url.set_query(None),
        }

        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/');
            let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
            url.set_path(&trimmed);
        }

        Ok(CanonicalUrl(url.to_string()))
    }
}

fn is_tracking_param(pair: &str) -> bool {
    let key = pair.split('=').next().unwrap_or(pair).to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> UrlNormalizer {
        UrlNormalizer::for_domain("example.com").expect("normalizer")
    }

    #[test]
    fn bare_domain_gets_www_base() {
        let n = normalizer();
        assert_eq!(n.base_url().as_str(), "https://www.example.com/");
        assert_eq!(n.registrable_domain(), "example.com");

        let n = UrlNormalizer::for_domain("www.shop.co.uk").expect("normalizer");
        assert_eq!(n.base_url().as_str(), "https://www.shop.co.uk/");
        assert_eq!(n.registrable_domain(), "shop.co.uk");

        let n = UrlNormalizer::for_domain("http://127.0.0.1:8080").expect("normalizer");
        assert_eq!(n.base_url().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn equivalent_forms_collapse() {
        let n = normalizer();
        let forms = [
            "https://www.example.com/rewards",
            "HTTPS://WWW.EXAMPLE.COM/rewards/",
            "https://www.example.com:443/rewards#tiers",
            "https://www.example.com/rewards?utm_source=mail&utm_medium=x",
            "/rewards?gclid=abc",
            "rewards",
        ];
        let canonical: Vec<_> = forms.iter().map(|f| n.normalize(f).expect(f)).collect();
        for c in &canonical {
            assert_eq!(c.as_str(), "https://www.example.com/rewards");
        }
    }

    #[test]
    fn meaningful_query_is_kept() {
        let n = normalizer();
        let url = n
            .normalize("/faq?section=points&fbclid=zzz&page=2")
            .expect("normalize");
        assert_eq!(url.as_str(), "https://www.example.com/faq?section=points&page=2");
    }

    #[test]
    fn root_keeps_its_slash() {
        let n = normalizer();
        assert_eq!(n.normalize("/").expect("root").as_str(), "https://www.example.com/");
        assert_eq!(n.homepage().as_str(), "https://www.example.com/");
    }

    #[test]
    fn subdomains_accepted_foreign_hosts_rejected() {
        let n = normalizer();
        assert!(n.normalize("https://rewards.example.com/join").is_ok());
        assert!(n.normalize("https://example.com/join").is_ok());
        assert!(n.normalize("https://notexample.com/join").is_err());
        assert!(n.normalize("https://example.com.evil.io/").is_err());
    }

    #[test]
    fn non_http_schemes_rejected() {
        let n = normalizer();
        for raw in ["mailto:help@example.com", "javascript:void(0)", "tel:+15551234", "ftp://example.com/x"] {
            let err = n.normalize(raw).unwrap_err();
            assert!(matches!(err, LoyaltyScoutError::InvalidUrl { .. }), "{raw}");
        }
    }
}
