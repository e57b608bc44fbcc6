//! Input catalog: the ordered list of candidate files and their strata.
//!
//! Stratification is discovered, not declared: the stratum of a file is the
//! second-to-last segment of its path (the "folder"), and the set of strata
//! is whatever the catalog happens to contain.

use std::collections::BTreeSet;

use tracing::warn;

/// One entry of the input catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Full path of the input file.
    pub path: String,
    /// File length in bytes.
    pub bytes: u64,
    /// Derived stratum key (penultimate path segment; `""` if malformed).
    pub stratum: String,
}

/// Derive the stratum key from a path: its second-to-last segment.
///
/// A path without a parent directory has no stratum; such records land in the
/// `""` stratum and processing continues.
pub fn stratum_of(path: &str) -> String {
    let mut segments = path.split('/').filter(|s| !s.is_empty()).rev();
    segments.next(); // file name
    segments.next().unwrap_or("").to_string()
}

/// Ordered collection of input files with discovered strata.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<FileRecord>,
}

impl Catalog {
    /// Build a catalog from `(path, bytes)` pairs, deriving each stratum.
    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, u64)>,
        P: Into<String>,
    {
        let records = entries
            .into_iter()
            .map(|(path, bytes)| {
                let path = path.into();
                let stratum = stratum_of(&path);
                if stratum.is_empty() {
                    warn!(path = %path, "file without a stratum folder, using empty key");
                }
                FileRecord {
                    path,
                    bytes,
                    stratum,
                }
            })
            .collect();
        Self { records }
    }

    /// Number of files in the catalog.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the catalog holds no files.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All file records, in catalog order.
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Record at `idx`.
    pub fn get(&self, idx: usize) -> &FileRecord {
        &self.records[idx]
    }

    /// Distinct stratum keys observed in the catalog, sorted.
    pub fn strata(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.stratum.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of distinct strata.
    pub fn stratum_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.stratum.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stratum_is_second_to_last_segment() {
        assert_eq!(stratum_of("/data/cam/16m_1/0001.dat"), "16m_1");
        assert_eq!(stratum_of("16m_2/0002.dat"), "16m_2");
    }

    #[test]
    fn malformed_paths_get_empty_stratum() {
        assert_eq!(stratum_of("orphan.dat"), "");
        assert_eq!(stratum_of(""), "");
        assert_eq!(stratum_of("/"), "");
    }

    #[test]
    fn catalog_discovers_strata() {
        let catalog = Catalog::from_entries([
            ("/in/a/1.dat", 10u64),
            ("/in/b/1.dat", 20),
            ("/in/a/2.dat", 30),
        ]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.strata(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(catalog.stratum_count(), 2);
        assert_eq!(catalog.get(1).stratum, "b");
    }

    #[test]
    fn empty_catalog() {
        let catalog = Catalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.stratum_count(), 0);
    }
}
