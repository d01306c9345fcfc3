//! OID-sequence analysis and the printed stability report.

use std::fmt;

use hashbrown::{HashMap, HashSet};

use crate::arcgis::{Oid, PageWalk};

pub fn yes_no(answer: bool) -> &'static str {
    if answer {
        "Yes"
    } else {
        "No"
    }
}

/// OIDs returned more than once across the joined pages, with their counts (Q1).
pub fn duplicate_oids(flattened: &[Oid]) -> Vec<(Oid, usize)> {
    let mut counts: HashMap<Oid, usize> = HashMap::new();
    for oid in flattened {
        *counts.entry(*oid).or_insert(0) += 1;
    }

    let mut duplicates: Vec<(Oid, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .collect();
    duplicates.sort_unstable();
    duplicates
}

/// Expected OIDs the paginated walk never returned (Q2).
pub fn missing_oids(expected: &[Oid], seen: &HashSet<Oid>) -> Vec<Oid> {
    expected
        .iter()
        .filter(|oid| !seen.contains(*oid))
        .copied()
        .collect()
}

/// A position where the joined pages disagree with the single big query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    pub position: usize,
    pub expected: Oid,
    pub actual: Oid,
}

/// Positions where the joined pages disagree with the single big query,
/// compared over the common prefix (Q3).
pub fn order_divergences(expected: &[Oid], flattened: &[Oid]) -> Vec<Divergence> {
    expected
        .iter()
        .zip(flattened.iter())
        .enumerate()
        .filter(|(_, (e, a))| e != a)
        .map(|(position, (e, a))| Divergence {
            position,
            expected: *e,
            actual: *a,
        })
        .collect()
}

/// Outcome of one stability trial against one server.
pub struct StabilityReport {
    pub host: String,
    pub server_version: Option<f64>,
    /// OID ordering from the single big query.
    pub expected: Vec<Oid>,
    pub walk: PageWalk,
}

impl StabilityReport {
    pub fn has_duplicates(&self) -> bool {
        !duplicate_oids(&self.walk.flattened()).is_empty()
    }

    pub fn has_omissions(&self) -> bool {
        !missing_oids(&self.expected, &self.walk.unique_oids()).is_empty()
    }

    pub fn has_reordering(&self) -> bool {
        !order_divergences(&self.expected, &self.walk.flattened()).is_empty()
    }

    fn version_label(&self) -> String {
        match self.server_version {
            Some(version) => version.to_string(),
            None => "unknown".to_string(),
        }
    }
}

impl fmt::Display for StabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} pages of oids returned ===", self.walk.pages.len())?;
        for (request, page) in self.walk.requests.iter().zip(&self.walk.pages) {
            writeln!(
                f,
                "  Requested begin at offset {:<3}, return the next {:<2} items, received {:<2}: {:?}",
                request.offset,
                request.count,
                page.len(),
                page
            )?;
        }

        let unique = self.walk.unique_oids();
        let mut unique_sorted: Vec<Oid> = unique.iter().copied().collect();
        unique_sorted.sort_unstable();
        writeln!(f, "unique oids ({}) = {:?}", unique_sorted.len(), unique_sorted)?;
        writeln!(f)?;

        let version = self.version_label();
        let flattened = self.walk.flattened();

        writeln!(f, "Q1: Are there duplicate OIDs?")?;
        let duplicates = duplicate_oids(&flattened);
        for (oid, count) in &duplicates {
            writeln!(f, "  Observation: {} was returned {} times!", oid, count)?;
        }
        writeln!(
            f,
            "Q1 is {} for {} running version {}",
            yes_no(!duplicates.is_empty()),
            self.host,
            version
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "Q2: Are there expected OIDs which were not returned by the paginated query?"
        )?;
        let missing = missing_oids(&self.expected, &unique);
        for oid in &missing {
            writeln!(f, "  Observation: {} was not returned in the pages!", oid)?;
        }
        writeln!(
            f,
            "Q2 is {} for {} running version {}",
            yes_no(!missing.is_empty()),
            self.host,
            version
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "Q3: Is the ordering different from the one big query to the combination of smaller queries?"
        )?;
        let divergences = order_divergences(&self.expected, &flattened);
        for d in &divergences {
            writeln!(
                f,
                "  Expected OID {} at position {} but the joined pages have {}",
                d.expected, d.position, d.actual
            )?;
        }
        write!(
            f,
            "Q3 is {} for {} running version {}",
            yes_no(!divergences.is_empty()),
            self.host,
            version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arcgis::PageRequest;

    #[test]
    fn test_duplicate_oids() {
        let flattened = vec![9, 8, 7, 8, 6, 9, 9];
        let duplicates = duplicate_oids(&flattened);
        assert_eq!(duplicates, vec![(8, 2), (9, 3)]);
    }

    #[test]
    fn test_no_duplicates() {
        assert!(duplicate_oids(&[3, 2, 1]).is_empty());
    }

    #[test]
    fn test_missing_oids() {
        let expected = vec![5, 4, 3, 2, 1];
        let seen: HashSet<Oid> = [5, 3, 1].into_iter().collect();
        assert_eq!(missing_oids(&expected, &seen), vec![4, 2]);
    }

    #[test]
    fn test_order_divergences_over_common_prefix() {
        let expected = vec![5, 4, 3, 2];
        let flattened = vec![5, 3, 4];

        let divergences = order_divergences(&expected, &flattened);
        assert_eq!(
            divergences,
            vec![
                Divergence { position: 1, expected: 4, actual: 3 },
                Divergence { position: 2, expected: 3, actual: 4 },
            ]
        );
    }

    #[test]
    fn test_identical_sequences_are_clean() {
        let expected = vec![3, 2, 1];
        assert!(order_divergences(&expected, &expected).is_empty());
    }

    #[test]
    fn test_report_answers() {
        let mut walk = PageWalk::default();
        walk.push(PageRequest { offset: 0, count: 4 }, vec![5, 4, 3]);
        walk.push(PageRequest { offset: 3, count: 4 }, vec![3, 1]);

        let report = StabilityReport {
            host: "example.com".to_string(),
            server_version: Some(10.91),
            expected: vec![5, 4, 3, 2, 1],
            walk,
        };

        // 3 repeats, 2 never shows up, and the tail order shifts
        assert!(report.has_duplicates());
        assert!(report.has_omissions());
        assert!(report.has_reordering());

        let rendered = report.to_string();
        assert!(rendered.contains("Q1 is Yes for example.com running version 10.91"));
        assert!(rendered.contains("Observation: 2 was not returned in the pages!"));
    }
}
