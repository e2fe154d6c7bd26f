//! Unification engine
//!
//! Recognizes "the same movie" across independent servers and folds the
//! per-server records into one logical catalog entry. Pure functions over a
//! batch of records: no I/O, no clock, no randomness, so the same inputs
//! always produce the same groups, in any order, in any process.
//!
//! Identity precedence: IMDB id, then TMDB id, then normalized title + year.
//! The title+year fallback can merge unrelated items that share a generic
//! name and year; such merges are kept for compatibility with the catalog's
//! history but flagged `low_confidence` so callers can render them as
//! uncertain instead of trusting them silently.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::models::{MediaKind, MediaRecord};

/// One logical catalog entry with all of its per-server sources
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedItem {
    /// Derived identity key shared by all sources
    pub key: String,
    pub kind: MediaKind,
    /// The source whose metadata (title, art, summary) is displayed
    pub primary: MediaRecord,
    /// Every record folded into this entry, primary included, in input order
    pub sources: Vec<MediaRecord>,
    /// True when a multi-source group was matched by title+year only
    pub low_confidence: bool,
}

impl std::fmt::Display for UnifiedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let year = self
            .primary
            .year
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        write!(f, "{}{} [{}]", self.primary.title, year, self.kind)?;
        if self.sources.len() > 1 {
            let servers: Vec<&str> = self.sources.iter().map(|s| s.server_id.as_str()).collect();
            write!(f, " x{} ({})", self.sources.len(), servers.join(", "))?;
        }
        if self.low_confidence {
            write!(f, " ~title/year match")?;
        }
        Ok(())
    }
}

/// Compute the cross-server identity key for one record
///
/// `imdb://<id>` if present, else `tmdb://<id>` if present, else
/// `<normalized-title>_<year>` with 0 standing in for an unknown year.
pub fn unification_key(record: &MediaRecord) -> String {
    if let Some(imdb) = &record.ids.imdb {
        return format!("imdb://{}", imdb);
    }
    if let Some(tmdb) = &record.ids.tmdb {
        return format!("tmdb://{}", tmdb);
    }
    format!(
        "{}_{}",
        normalize_title(&record.title),
        record.year.unwrap_or(0)
    )
}

/// Lowercase, strip everything non-alphanumeric, collapse runs of
/// whitespace to single spaces
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Group records sharing a `(key, kind)` identity into unified items
///
/// `owned_servers` holds the machine ids of servers the account owns; the
/// primary source of a merged group is picked with the documented
/// precedence: owned server first, then most complete metadata (year plus
/// an external id), then first encountered in input order. Grouping itself
/// is order-independent; only the primary tie-break reads input order, by
/// design.
pub fn unify(records: &[MediaRecord], owned_servers: &HashSet<String>) -> Vec<UnifiedItem> {
    // BTreeMap keyed by (kind, key) so output order is stable regardless of
    // input order. A movie and a show sharing a title+year stay separate.
    let mut groups: BTreeMap<(MediaKind, String), Vec<&MediaRecord>> = BTreeMap::new();

    for record in records {
        let key = unification_key(record);
        groups.entry((record.kind, key)).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|((kind, key), members)| {
            let primary = pick_primary(&members, owned_servers).clone();
            let low_confidence = members.len() > 1 && is_title_year_key(&key);
            UnifiedItem {
                key,
                kind,
                primary,
                sources: members.into_iter().cloned().collect(),
                low_confidence,
            }
        })
        .collect()
}

fn is_title_year_key(key: &str) -> bool {
    !key.starts_with("imdb://") && !key.starts_with("tmdb://")
}

/// Tie-break precedence: owned > metadata completeness > input order
fn pick_primary<'a>(
    members: &[&'a MediaRecord],
    owned_servers: &HashSet<String>,
) -> &'a MediaRecord {
    let mut best = members[0];
    let mut best_rank = rank(best, owned_servers);

    for candidate in &members[1..] {
        let candidate_rank = rank(candidate, owned_servers);
        // Strictly greater: earlier input order wins ties
        if candidate_rank > best_rank {
            best = candidate;
            best_rank = candidate_rank;
        }
    }

    best
}

fn rank(record: &MediaRecord, owned_servers: &HashSet<String>) -> (bool, u8) {
    let owned = owned_servers.contains(&record.server_id);
    let completeness =
        record.year.is_some() as u8 + (!record.ids.is_empty()) as u8;
    (owned, completeness)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExternalIds;

    fn record(
        server: &str,
        key: &str,
        title: &str,
        kind: MediaKind,
        imdb: Option<&str>,
        tmdb: Option<&str>,
        year: Option<u16>,
    ) -> MediaRecord {
        MediaRecord {
            server_id: server.to_string(),
            rating_key: key.to_string(),
            title: title.to_string(),
            kind,
            ids: ExternalIds {
                imdb: imdb.map(String::from),
                tmdb: tmdb.map(String::from),
            },
            year,
            section_key: "1".to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Key Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_key_precedence_imdb_first() {
        let r = record("s1", "1", "Dune", MediaKind::Movie, Some("tt1160419"), Some("438631"), Some(2021));
        assert_eq!(unification_key(&r), "imdb://tt1160419");

        let r = record("s1", "1", "Dune", MediaKind::Movie, None, Some("438631"), Some(2021));
        assert_eq!(unification_key(&r), "tmdb://438631");

        let r = record("s1", "1", "Dune", MediaKind::Movie, None, None, Some(2021));
        assert_eq!(unification_key(&r), "dune_2021");
    }

    #[test]
    fn test_key_missing_year_uses_zero() {
        let r = record("s1", "1", "Dune", MediaKind::Movie, None, None, None);
        assert_eq!(unification_key(&r), "dune_0");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The Matrix"), "the matrix");
        assert_eq!(normalize_title("  Blade   Runner: 2049! "), "blade runner 2049");
        assert_eq!(normalize_title("WALL·E"), "wall e");
        assert_eq!(normalize_title(""), "");
    }

    // -------------------------------------------------------------------------
    // Grouping Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_unify_merges_on_shared_external_id() {
        // Two records sharing imdb:tt1 merge; the tmdb:42 record stands alone
        let records = vec![
            record("s1", "1", "A", MediaKind::Movie, Some("tt1"), None, Some(2000)),
            record("s2", "9", "A", MediaKind::Movie, Some("tt1"), None, Some(2000)),
            record("s1", "2", "B", MediaKind::Movie, None, Some("42"), Some(2001)),
        ];

        let items = unify(&records, &HashSet::new());
        assert_eq!(items.len(), 2);

        let merged = items.iter().find(|i| i.key == "imdb://tt1").unwrap();
        assert_eq!(merged.sources.len(), 2);
        assert!(!merged.low_confidence);

        let single = items.iter().find(|i| i.key == "tmdb://42").unwrap();
        assert_eq!(single.sources.len(), 1);
    }

    #[test]
    fn test_unify_order_independent() {
        let a = record("s1", "1", "A", MediaKind::Movie, Some("tt1"), None, Some(2000));
        let b = record("s2", "9", "A", MediaKind::Movie, Some("tt1"), None, Some(2000));
        let c = record("s1", "2", "B", MediaKind::Movie, None, Some("42"), Some(2001));

        let forward = unify(&[a.clone(), b.clone(), c.clone()], &HashSet::new());
        let reversed = unify(&[c, b, a], &HashSet::new());

        assert_eq!(forward.len(), reversed.len());
        for (f, r) in forward.iter().zip(reversed.iter()) {
            assert_eq!(f.key, r.key);
            assert_eq!(f.kind, r.kind);
            let f_sources: HashSet<_> = f.sources.iter().map(|s| &s.server_id).collect();
            let r_sources: HashSet<_> = r.sources.iter().map(|s| &s.server_id).collect();
            assert_eq!(f_sources, r_sources);
        }
    }

    #[test]
    fn test_kind_mismatch_never_merges() {
        // A movie and a show sharing title and year stay apart
        let records = vec![
            record("s1", "1", "Fargo", MediaKind::Movie, None, None, Some(2014)),
            record("s2", "2", "Fargo", MediaKind::Show, None, None, Some(2014)),
        ];
        let items = unify(&records, &HashSet::new());
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_title_year_merge_flagged_low_confidence() {
        let records = vec![
            record("s1", "1", "Mother", MediaKind::Movie, None, None, Some(2009)),
            record("s2", "2", "Mother!", MediaKind::Movie, None, None, Some(2009)),
        ];
        let items = unify(&records, &HashSet::new());
        assert_eq!(items.len(), 1);
        assert!(items[0].low_confidence);

        // A single-source title+year item is not suspicious
        let single = unify(&records[..1], &HashSet::new());
        assert!(!single[0].low_confidence);
    }

    // -------------------------------------------------------------------------
    // Primary Tie-break Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_primary_prefers_owned_server() {
        let records = vec![
            record("shared", "1", "Dune", MediaKind::Movie, Some("tt1160419"), None, Some(2021)),
            record("mine", "2", "Dune", MediaKind::Movie, Some("tt1160419"), None, None),
        ];
        let owned: HashSet<String> = ["mine".to_string()].into();

        let items = unify(&records, &owned);
        assert_eq!(items.len(), 1);
        // Owned wins even though the shared record has more complete metadata
        assert_eq!(items[0].primary.server_id, "mine");
        assert_eq!(items[0].sources.len(), 2);
    }

    #[test]
    fn test_primary_prefers_complete_metadata() {
        let records = vec![
            record("s1", "1", "Dune", MediaKind::Movie, Some("tt1160419"), None, None),
            record("s2", "2", "Dune", MediaKind::Movie, Some("tt1160419"), None, Some(2021)),
        ];
        let items = unify(&records, &HashSet::new());
        assert_eq!(items[0].primary.server_id, "s2");
    }

    #[test]
    fn test_primary_falls_back_to_input_order() {
        let records = vec![
            record("s1", "1", "Dune", MediaKind::Movie, Some("tt1160419"), None, Some(2021)),
            record("s2", "2", "Dune", MediaKind::Movie, Some("tt1160419"), None, Some(2021)),
        ];
        let items = unify(&records, &HashSet::new());
        assert_eq!(items[0].primary.server_id, "s1");
    }
}
