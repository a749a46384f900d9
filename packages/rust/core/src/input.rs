//! Input lists: `brand,domain` for discovery runs, `brand,url,page_type`
//! for manual runs.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use loyaltyscout_shared::{BrandTarget, LoyaltyScoutError, ManualSeed, Result};

/// Load discovery targets from a CSV file with a `brand,domain` header.
pub fn load_brand_targets(path: &Path) -> Result<Vec<BrandTarget>> {
    let file = std::fs::File::open(path).map_err(|e| LoyaltyScoutError::io(path, e))?;
    parse_brand_targets(file)
}

/// Load manual seeds from a CSV file with a `brand,url[,page_type]` header.
pub fn load_manual_seeds(path: &Path) -> Result<Vec<ManualSeed>> {
    let file = std::fs::File::open(path).map_err(|e| LoyaltyScoutError::io(path, e))?;
    parse_manual_seeds(file)
}

pub fn parse_brand_targets<R: Read>(reader: R) -> Result<Vec<BrandTarget>> {
    let rows: Vec<BrandTarget> = read_rows(reader)?;
    Ok(rows
        .into_iter()
        .filter(|t| {
            let keep = !t.brand.is_empty() && !t.domain.is_empty();
            if !keep {
                warn!(brand = %t.brand, domain = %t.domain, "skipping incomplete input row");
            }
            keep
        })
        .collect())
}

pub fn parse_manual_seeds<R: Read>(reader: R) -> Result<Vec<ManualSeed>> {
    let rows: Vec<ManualSeed> = read_rows(reader)?;
    Ok(rows
        .into_iter()
        .filter(|s| {
            let keep = !s.brand.is_empty() && !s.url.is_empty();
            if !keep {
                warn!(brand = %s.brand, url = %s.url, "skipping incomplete input row");
            }
            keep
        })
        .map(|mut s| {
            s.page_type = s.page_type.filter(|t| !t.trim().is_empty());
            s
        })
        .collect())
}

fn read_rows<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut csv = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut rows = Vec::new();
    for (i, row) in csv.deserialize().enumerate() {
        // Header is line 1.
        let row: T = row
            .map_err(|e| LoyaltyScoutError::parse(format!("input line {}: {e}", i + 2)))?;
        rows.push(row);
    }
    debug!(rows = rows.len(), "input list loaded");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_brand_targets() {
        let csv = "brand,domain\nStarbucks, starbucks.com\n# paused\n,empty.com\nSephora,sephora.com\n";
        let targets = parse_brand_targets(csv.as_bytes()).expect("parse");
        assert_eq!(
            targets,
            vec![
                BrandTarget {
                    brand: "Starbucks".into(),
                    domain: "starbucks.com".into()
                },
                BrandTarget {
                    brand: "Sephora".into(),
                    domain: "sephora.com".into()
                },
            ]
        );
    }

    #[test]
    fn page_type_column_is_optional() {
        let csv = "brand,url,page_type\n\
                   Acme,https://acme.com/rewards,overview\n\
                   Acme,https://acme.com/rewards/terms,\n\
                   Acme,https://acme.com/faq\n";
        let seeds = parse_manual_seeds(csv.as_bytes()).expect("parse");
        assert_eq!(seeds.len(), 3);
        assert_eq!(seeds[0].page_type.as_deref(), Some("overview"));
        assert_eq!(seeds[1].page_type, None);
        assert_eq!(seeds[2].page_type, None);
    }

    #[test]
    fn missing_column_is_a_parse_error() {
        let err = parse_brand_targets("brand\nAcme\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LoyaltyScoutError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_brand_targets(Path::new("/nonexistent/brands.csv")).unwrap_err();
        assert!(matches!(err, LoyaltyScoutError::Io { .. }));
    }
}
