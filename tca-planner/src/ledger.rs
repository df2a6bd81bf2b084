//! Evidence ledger
//!
//! Append-only store of every piece of source data a run consumed, plus the
//! citation table linking derived facts back to it. Collectors running in
//! parallel record into one shared ledger; ids are assigned under the lock
//! so they are unique and increase in insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Ledger-unique evidence identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(pub u64);

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ev-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Metadata,
    Comment,
    Trend,
    Pageview,
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvidenceKind::Metadata => "metadata",
            EvidenceKind::Comment => "comment",
            EvidenceKind::Trend => "trend",
            EvidenceKind::Pageview => "pageview",
        };
        f.write_str(s)
    }
}

/// One immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub kind: EvidenceKind,
    /// Where the datum came from (URL, provider key, comment id)
    pub source_ref: String,
    pub excerpt: String,
    /// Confidence (0.0-1.0)
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

impl Evidence {
    /// Human-readable citation line
    pub fn citation(&self) -> String {
        format!(
            "[{}] {} ({}, confidence {:.0}%): {}",
            self.id,
            self.kind,
            self.source_ref,
            self.weight * 100.0,
            self.excerpt
        )
    }
}

/// How a derived fact is backed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "support", rename_all = "snake_case")]
pub enum FactSupport {
    Cited { evidence: Vec<EvidenceId> },
    /// No evidence exists, typically because the supporting stage was skipped
    Unsupported { reason: String },
}

/// Fact key for a ranking field, e.g. `ranking/US/total_score`
pub fn ranking_fact(region: impl fmt::Display, field: &str) -> String {
    format!("ranking/{}/{}", region, field)
}

/// Fact key for a phase field, e.g. `phase/1/budget_pct`
pub fn phase_fact(index: usize, field: &str) -> String {
    format!("phase/{}/{}", index, field)
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<Evidence>,
    facts: BTreeMap<String, FactSupport>,
}

/// Shared, append-only evidence ledger for one run
#[derive(Debug)]
pub struct EvidenceLedger {
    run_id: Uuid,
    state: Mutex<LedgerState>,
}

impl EvidenceLedger {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    // A panic while holding the lock cannot leave a half-written entry, so a
    // poisoned lock is still consistent.
    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry and return its id
    ///
    /// Weight is clamped to 0.0-1.0; NaN records as 0.0.
    pub fn record(
        &self,
        kind: EvidenceKind,
        source_ref: impl Into<String>,
        excerpt: impl Into<String>,
        weight: f64,
        timestamp: DateTime<Utc>,
    ) -> EvidenceId {
        let weight = if weight.is_nan() {
            0.0
        } else {
            weight.clamp(0.0, 1.0)
        };
        let mut state = self.state();
        let id = EvidenceId(state.entries.len() as u64 + 1);
        state.entries.push(Evidence {
            id,
            kind,
            source_ref: source_ref.into(),
            excerpt: excerpt.into(),
            weight,
            timestamp,
        });
        id
    }

    /// Link a fact to evidence
    ///
    /// Citations accumulate across calls and replace an earlier
    /// `Unsupported` marker. Ids this ledger never issued are ignored; an
    /// empty id list leaves the fact unchanged.
    pub fn cite(&self, fact_id: impl Into<String>, evidence: &[EvidenceId]) {
        let mut state = self.state();
        let issued = state.entries.len() as u64;
        let mut ids: Vec<EvidenceId> = evidence
            .iter()
            .copied()
            .filter(|id| id.0 >= 1 && id.0 <= issued)
            .collect();
        if ids.is_empty() {
            return;
        }

        let fact_id = fact_id.into();
        if let Some(FactSupport::Cited { evidence: existing }) = state.facts.get(&fact_id) {
            ids.extend(existing.iter().copied());
        }
        ids.sort();
        ids.dedup();
        state
            .facts
            .insert(fact_id, FactSupport::Cited { evidence: ids });
    }

    /// Record that a fact has no backing evidence
    ///
    /// A fact that already has citations keeps them.
    pub fn mark_unsupported(&self, fact_id: impl Into<String>, reason: impl Into<String>) {
        let mut state = self.state();
        state
            .facts
            .entry(fact_id.into())
            .or_insert_with(|| FactSupport::Unsupported {
                reason: reason.into(),
            });
    }

    /// Cite `evidence`, or mark the fact unsupported when there is none
    pub fn support(&self, fact_id: impl Into<String>, evidence: &[EvidenceId], reason: &str) {
        let fact_id = fact_id.into();
        if evidence.is_empty() {
            self.mark_unsupported(fact_id, reason);
        } else {
            self.cite(fact_id, evidence);
        }
    }

    /// Evidence ids cited for a fact (empty when unknown or unsupported)
    pub fn citations_for(&self, fact_id: &str) -> Vec<EvidenceId> {
        match self.state().facts.get(fact_id) {
            Some(FactSupport::Cited { evidence }) => evidence.clone(),
            _ => Vec::new(),
        }
    }

    pub fn support_for(&self, fact_id: &str) -> Option<FactSupport> {
        self.state().facts.get(fact_id).cloned()
    }

    pub fn get(&self, id: EvidenceId) -> Option<Evidence> {
        let state = self.state();
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        state.entries.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn by_kind(&self, kind: EvidenceKind) -> Vec<Evidence> {
        self.state()
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Entries with weight at or above `threshold`
    pub fn high_confidence(&self, threshold: f64) -> Vec<Evidence> {
        self.state()
            .entries
            .iter()
            .filter(|e| e.weight >= threshold)
            .cloned()
            .collect()
    }

    /// Consistent copy of entries and citations
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state();
        LedgerSnapshot {
            run_id: self.run_id,
            entries: state.entries.clone(),
            facts: state.facts.clone(),
        }
    }
}

/// Serializable ledger contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub run_id: Uuid,
    pub entries: Vec<Evidence>,
    pub facts: BTreeMap<String, FactSupport>,
}

impl LedgerSnapshot {
    pub fn get(&self, id: EvidenceId) -> Option<&Evidence> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.entries.get(index).filter(|e| e.id == id)
    }

    /// Resolved evidence cited for a fact
    pub fn citations_for(&self, fact_id: &str) -> Vec<&Evidence> {
        match self.facts.get(fact_id) {
            Some(FactSupport::Cited { evidence }) => {
                evidence.iter().filter_map(|id| self.get(*id)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Facts with no evidence and the reason given
    pub fn unsupported_facts(&self) -> Vec<(&str, &str)> {
        self.facts
            .iter()
            .filter_map(|(fact, support)| match support {
                FactSupport::Unsupported { reason } => Some((fact.as_str(), reason.as_str())),
                FactSupport::Cited { .. } => None,
            })
            .collect()
    }

    /// Citation lines for every entry, in insertion order
    pub fn citation_list(&self) -> Vec<String> {
        self.entries.iter().map(Evidence::citation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_increase_in_insertion_order() {
        let ledger = EvidenceLedger::new(Uuid::new_v4());
        let a = ledger.record(EvidenceKind::Metadata, "tmdb:1", "title", 1.0, Utc::now());
        let b = ledger.record(EvidenceKind::Trend, "trends:US", "interest 80", 0.8, Utc::now());
        assert!(a < b);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(b).unwrap().excerpt, "interest 80");
        assert!(ledger.get(EvidenceId(0)).is_none());
        assert!(ledger.get(EvidenceId(3)).is_none());
    }

    #[test]
    fn test_weight_is_clamped() {
        let ledger = EvidenceLedger::new(Uuid::new_v4());
        let high = ledger.record(EvidenceKind::Comment, "c1", "x", 3.5, Utc::now());
        let low = ledger.record(EvidenceKind::Comment, "c2", "y", -1.0, Utc::now());
        let nan = ledger.record(EvidenceKind::Comment, "c3", "z", f64::NAN, Utc::now());
        assert_eq!(ledger.get(high).unwrap().weight, 1.0);
        assert_eq!(ledger.get(low).unwrap().weight, 0.0);
        assert_eq!(ledger.get(nan).unwrap().weight, 0.0);
    }

    #[test]
    fn test_concurrent_records_get_unique_ids() {
        let ledger = Arc::new(EvidenceLedger::new(Uuid::new_v4()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            ledger.record(
                                EvidenceKind::Comment,
                                format!("t{}-{}", t, i),
                                "text",
                                0.5,
                                Utc::now(),
                            )
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<EvidenceId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 400);
        assert_eq!(ids.first(), Some(&EvidenceId(1)));
        assert_eq!(ids.last(), Some(&EvidenceId(400)));
    }

    #[test]
    fn test_citations_accumulate_and_override_unsupported() {
        let ledger = EvidenceLedger::new(Uuid::new_v4());
        let a = ledger.record(EvidenceKind::Trend, "trends:US", "a", 0.9, Utc::now());
        let b = ledger.record(EvidenceKind::Pageview, "wiki:US", "b", 1.0, Utc::now());

        ledger.mark_unsupported("ranking/US/total_score", "trend stage skipped");
        assert!(matches!(
            ledger.support_for("ranking/US/total_score"),
            Some(FactSupport::Unsupported { .. })
        ));

        ledger.cite("ranking/US/total_score", &[b]);
        ledger.cite("ranking/US/total_score", &[a, b]);
        assert_eq!(ledger.citations_for("ranking/US/total_score"), vec![a, b]);

        // Marking unsupported after citing keeps the citations
        ledger.mark_unsupported("ranking/US/total_score", "late");
        assert_eq!(ledger.citations_for("ranking/US/total_score"), vec![a, b]);
    }

    #[test]
    fn test_unknown_ids_are_not_cited() {
        let ledger = EvidenceLedger::new(Uuid::new_v4());
        ledger.cite("phase/1/budget_pct", &[EvidenceId(7)]);
        assert!(ledger.support_for("phase/1/budget_pct").is_none());
    }

    #[test]
    fn test_support_helper() {
        let ledger = EvidenceLedger::new(Uuid::new_v4());
        let id = ledger.record(EvidenceKind::Metadata, "m", "x", 1.0, Utc::now());
        ledger.support(ranking_fact("US", "budget_pct"), &[id], "unused");
        ledger.support(ranking_fact("GB", "budget_pct"), &[], "no signals for region");

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.citations_for("ranking/US/budget_pct").len(), 1);
        assert_eq!(
            snapshot.unsupported_facts(),
            vec![("ranking/GB/budget_pct", "no signals for region")]
        );
    }

    #[test]
    fn test_queries_by_kind_and_confidence() {
        let ledger = EvidenceLedger::new(Uuid::new_v4());
        ledger.record(EvidenceKind::Comment, "c1", "great", 0.9, Utc::now());
        ledger.record(EvidenceKind::Comment, "c2", "meh", 0.3, Utc::now());
        ledger.record(EvidenceKind::Trend, "trends:US", "80", 0.8, Utc::now());

        assert_eq!(ledger.by_kind(EvidenceKind::Comment).len(), 2);
        assert_eq!(ledger.high_confidence(0.8).len(), 2);

        let citations = ledger.snapshot().citation_list();
        assert_eq!(citations.len(), 3);
        assert!(citations[0].starts_with("[ev-1] comment (c1, confidence 90%)"));
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let ledger = EvidenceLedger::new(Uuid::new_v4());
        let id = ledger.record(EvidenceKind::Pageview, "wiki:GB", "1200 views", 1.0, Utc::now());
        ledger.cite(phase_fact(1, "budget_pct"), &[id]);

        let snapshot = ledger.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.citations_for("phase/1/budget_pct")[0].id, id);
    }
}
