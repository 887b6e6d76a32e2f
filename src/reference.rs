use crate::search::sample_unique;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Investors drawn from the investors table at most.
const MAX_INVESTORS: usize = 500;

/// Lookup values the condition generator draws from. Loaded once at startup
/// and shared read-only by every task.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// Verticals and industries merged into one pool.
    pub verticals: Vec<String>,
    pub investors: Vec<String>,
}

impl ReferenceData {
    pub fn load(investors: &Path, verticals: &Path, industries: &Path) -> Result<Self> {
        let investors = read_identifiers(investors)?;
        let verticals = read_identifiers(verticals)?;
        let industries = read_identifiers(industries)?;

        Ok(Self::sample(&investors, &verticals, &industries))
    }

    /// Keeps a random non-empty subset of each table, capping investors.
    pub fn sample(investors: &[String], verticals: &[String], industries: &[String]) -> Self {
        let mut rng = rand::rng();

        let mut pool = sample_unique(&mut rng, verticals, 0);
        pool.extend(sample_unique(&mut rng, industries, 0));
        let investors = sample_unique(&mut rng, investors, MAX_INVESTORS);

        info!(
            "Reference data: {} verticals/industries, {} investors",
            pool.len(),
            investors.len()
        );

        Self {
            verticals: pool,
            investors,
        }
    }
}

pub fn read_identifiers(path: &Path) -> Result<Vec<String>> {
    let content =
        std::fs::read(path).context(format!("Failed to read reference table: {:?}", path))?;

    let identifiers = parse_identifiers(&content);
    info!("Loaded {} identifiers from {:?}", identifiers.len(), path);
    Ok(identifiers)
}

/// The text before the first `,` of every line, trimmed. Lines without a
/// separator are skipped. Only the identifier is decoded; the rest of the
/// line may hold any bytes.
pub fn parse_identifiers(content: &[u8]) -> Vec<String> {
    content
        .split(|byte| *byte == b'\n')
        .filter_map(|line| {
            let separator = line.iter().position(|byte| *byte == b',')?;
            Some(String::from_utf8_lossy(&line[..separator]).trim().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table(content: impl AsRef<[u8]>) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_ref()).unwrap();
        file
    }

    #[test]
    fn identifiers_come_before_the_first_separator() {
        let parsed = parse_identifiers(b"  42 , Sequoia, extra\nno separator here\r\n7,Hillhouse\r\n\n");
        assert_eq!(parsed, vec!["42".to_string(), "7".to_string()]);
    }

    #[test]
    fn empty_identifier_before_separator_is_kept() {
        assert_eq!(parse_identifiers(b",orphan"), vec![String::new()]);
    }

    #[test]
    fn non_utf8_columns_after_the_separator_are_tolerated() {
        let file = table(b"12,\xd6\xd0\xb9\xfa\n13,ok\n\xff\xfe no separator\n");
        let identifiers = read_identifiers(file.path()).unwrap();
        assert_eq!(identifiers, vec!["12".to_string(), "13".to_string()]);
    }

    #[test]
    fn load_merges_verticals_and_industries() {
        let investors = table("1,a\n2,b\n3,c\n");
        let verticals = table("10,fintech\n");
        let industries = table("20,health\n");

        let data =
            ReferenceData::load(investors.path(), verticals.path(), industries.path()).unwrap();

        assert_eq!(data.verticals, vec!["10".to_string(), "20".to_string()]);
        assert!((1..=3).contains(&data.investors.len()));
        assert!(data
            .investors
            .iter()
            .all(|id| ["1", "2", "3"].contains(&id.as_str())));
    }

    #[test]
    fn investor_sample_is_capped() {
        let investors: Vec<String> = (0..2000).map(|i| i.to_string()).collect();
        for _ in 0..20 {
            let data = ReferenceData::sample(&investors, &[], &[]);
            assert!(!data.investors.is_empty());
            assert!(data.investors.len() <= MAX_INVESTORS);
            assert!(data.verticals.is_empty());
        }
    }

    #[test]
    fn missing_table_is_an_error() {
        let present = table("1,a\n");
        let result = ReferenceData::load(
            present.path(),
            Path::new("/definitely/not/here.csv"),
            present.path(),
        );
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Failed to read reference table"));
    }
}
