// ── Source record cache ──
//
// Holds the current `SourceSet` behind one atomic handle. Every publish
// builds a new set from the current one and swaps it in; readers load the
// handle and never observe a set mid-update.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tracing::debug;

use crate::model::{NaturalKey, SourceKind, SourceRecord, SourceSet, SourceSnapshot};

pub struct SourceCache {
    current: ArcSwap<SourceSet>,
}

impl SourceCache {
    /// Cache with a pending snapshot for each configured source.
    pub fn new(kinds: impl IntoIterator<Item = SourceKind>) -> Self {
        Self {
            current: ArcSwap::from_pointee(SourceSet::new(kinds)),
        }
    }

    /// The current set (cheap `Arc` clone).
    pub fn load(&self) -> Arc<SourceSet> {
        self.current.load_full()
    }

    /// Replace `kind`'s snapshot with freshly fetched records.
    pub fn publish_success(&self, kind: SourceKind, records: Vec<SourceRecord>) -> Arc<SourceSet> {
        let records = Arc::new(SourceSnapshot::group(records));
        let now = Utc::now();
        self.update(kind, |prev| SourceSnapshot {
            kind,
            records: Arc::clone(&records),
            fetched_at: Some(now),
            last_attempt: Some(now),
            connected: true,
            last_error: None,
            generation: prev.generation + 1,
        })
    }

    /// Mark `kind` disconnected, carrying its previous records forward.
    pub fn publish_failure(&self, kind: SourceKind, error: &str) -> Arc<SourceSet> {
        let now = Utc::now();
        self.update(kind, |prev| SourceSnapshot {
            kind,
            records: Arc::clone(&prev.records),
            fetched_at: prev.fetched_at,
            last_attempt: Some(now),
            connected: false,
            last_error: Some(error.to_owned()),
            generation: prev.generation + 1,
        })
    }

    /// Drop every record of `kind` keyed by `key`. Returns the new set, or
    /// `None` when nothing matched.
    pub fn evict(&self, kind: SourceKind, key: &NaturalKey) -> Option<Arc<SourceSet>> {
        let present = self
            .load()
            .get(kind)
            .is_some_and(|snap| snap.records.values().flatten().any(|r| &r.key == key));
        if !present {
            return None;
        }

        let set = self.update(kind, |prev| {
            let mut records = (*prev.records).clone();
            for list in records.values_mut() {
                list.retain(|r| &r.key != key);
            }
            records.retain(|_, list| !list.is_empty());

            SourceSnapshot {
                records: Arc::new(records),
                generation: prev.generation + 1,
                ..prev.clone()
            }
        });
        debug!(source = %kind, key = %key, "evicted cached record");
        Some(set)
    }

    fn update(
        &self,
        kind: SourceKind,
        mut next: impl FnMut(&SourceSnapshot) -> SourceSnapshot,
    ) -> Arc<SourceSet> {
        let mut installed = None;
        self.current.rcu(|current| {
            let pending = SourceSnapshot::pending(kind);
            let prev = current.get(kind).unwrap_or(&pending);
            let set = Arc::new(current.with_snapshot(next(prev)));
            installed = Some(Arc::clone(&set));
            set
        });
        installed.unwrap_or_else(|| self.load())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Collection;
    use serde_json::Map;

    fn record(guid: &str) -> SourceRecord {
        SourceRecord::new(Collection::Apps, NaturalKey::Guid(guid.into()), Map::new())
    }

    #[test]
    fn failure_keeps_previous_records() {
        let cache = SourceCache::new([SourceKind::ControlPlane]);
        cache.publish_success(SourceKind::ControlPlane, vec![record("a1"), record("a2")]);
        let set = cache.publish_failure(SourceKind::ControlPlane, "connection refused");

        let snap = set.get(SourceKind::ControlPlane).unwrap();
        assert!(!snap.connected);
        assert_eq!(snap.records(Collection::Apps).len(), 2);
        assert_eq!(snap.last_error.as_deref(), Some("connection refused"));
        assert!(snap.fetched_at.is_some());
        assert_eq!(snap.generation, 2);
        assert_eq!(set.epoch, 2);
    }

    #[test]
    fn success_reconnects() {
        let cache = SourceCache::new([SourceKind::ControlPlane]);
        cache.publish_failure(SourceKind::ControlPlane, "down");
        let set = cache.publish_success(SourceKind::ControlPlane, vec![record("a1")]);

        let snap = set.get(SourceKind::ControlPlane).unwrap();
        assert!(snap.connected);
        assert!(snap.last_error.is_none());
    }

    #[test]
    fn evict_removes_only_matching_records() {
        let cache = SourceCache::new([SourceKind::ControlPlane]);
        cache.publish_success(SourceKind::ControlPlane, vec![record("a1"), record("a2")]);

        let set = cache
            .evict(SourceKind::ControlPlane, &NaturalKey::Guid("a1".into()))
            .unwrap();
        let apps = set.records(Collection::Apps);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].key, NaturalKey::Guid("a2".into()));

        assert!(
            cache
                .evict(SourceKind::ControlPlane, &NaturalKey::Guid("zzz".into()))
                .is_none()
        );
    }
}
