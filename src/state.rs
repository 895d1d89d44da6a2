use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Collector payload: the validated root object, passed through untouched.
pub type MetricsData = Map<String, Value>;

/// One point-in-time poll result. `data` and `error` are mutually exclusive;
/// both are `None` only before the first poll completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: Option<String>,
    pub data: Option<MetricsData>,
    pub error: Option<String>,
}

impl Snapshot {
    pub fn success(data: MetricsData) -> Self {
        Self {
            timestamp: Some(now_iso8601()),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            timestamp: Some(now_iso8601()),
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Holds the latest snapshot. The poll loop is the only writer; HTTP handlers
/// read. The lock is held only for the swap or the clone, never across I/O.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    inner: Arc<RwLock<Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn write(&self, snapshot: Snapshot) {
        let mut guard = self.inner.write().await;
        *guard = snapshot;
    }

    /// Returns an owned copy; mutating it never touches the cache.
    pub async fn read(&self) -> Snapshot {
        self.inner.read().await.clone()
    }
}

pub fn now_iso8601() -> String {
    humantime::format_rfc3339_micros(SystemTime::now()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn sample_data() -> MetricsData {
        match json!({"cpu": {"usage": 12.5}, "memory": {"percent": 40.0}}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn starts_unpolled() {
        let cache = SnapshotCache::new();
        let snap = cache.read().await;
        assert_eq!(snap, Snapshot::default());
        assert!(!snap.has_data());
        assert!(!snap.has_error());
    }

    #[tokio::test]
    async fn write_replaces_wholesale() {
        let cache = SnapshotCache::new();
        cache.write(Snapshot::success(sample_data())).await;
        cache.write(Snapshot::failure("boom")).await;

        let snap = cache.read().await;
        assert!(snap.data.is_none());
        assert_eq!(snap.error.as_deref(), Some("boom"));
        assert!(snap.timestamp.is_some());
    }

    #[tokio::test]
    async fn read_returns_independent_copy() {
        let cache = SnapshotCache::new();
        cache.write(Snapshot::success(sample_data())).await;

        let mut copy = cache.read().await;
        copy.error = Some("mutated".to_string());
        if let Some(data) = copy.data.as_mut() {
            data.clear();
        }

        let fresh = cache.read().await;
        assert!(fresh.error.is_none());
        assert_eq!(fresh.data.map(|d| d.len()), Some(2));
    }

    #[tokio::test]
    async fn data_and_error_are_exclusive() {
        let ok = Snapshot::success(sample_data());
        assert!(ok.has_data() && !ok.has_error());
        let failed = Snapshot::failure("nope");
        assert!(!failed.has_data() && failed.has_error());
    }

    #[tokio::test]
    async fn concurrent_reads_finish_quickly() {
        let cache = SnapshotCache::new();
        cache.write(Snapshot::success(sample_data())).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::timeout(Duration::from_millis(500), cache.read()).await
            }));
        }
        for handle in handles {
            let snap = handle.await.expect("join").expect("read timed out");
            assert!(snap.has_data());
        }
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        assert!(humantime::parse_rfc3339(&ts).is_ok());
    }
}
