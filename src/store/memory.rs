use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{Bson, Document};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::{
    CollectionPath, DocPath, DocumentStore, Query, Snapshot, StoreError, StoredDocument,
    Subscription, WriteBatch, WriteOp,
};

struct Subscriber {
    query: Query,
    tx: mpsc::UnboundedSender<Result<Snapshot, StoreError>>,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<CollectionPath, BTreeMap<String, Document>>,
    subscribers: Vec<Subscriber>,
}

impl Inner {
    fn read(&self, path: &DocPath) -> Option<&Document> {
        self.collections
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
    }

    fn snapshot(&self, query: &Query) -> Snapshot {
        self.collections
            .get(query.collection())
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| query.matches(data))
                    .map(|(id, data)| StoredDocument {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// Subscribers are notified under the commit lock, in commit order.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable` until
    /// availability is restored.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live subscriptions that have not been released yet.
    pub async fn subscriber_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner
            .subscribers
            .iter()
            .filter(|subscriber| !subscriber.tx.is_closed())
            .count()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }
}

fn increment(current: Option<&Bson>, field: &str, by: i64) -> Result<Bson, StoreError> {
    match current {
        None | Some(Bson::Null) => Ok(Bson::Int64(by)),
        Some(Bson::Int32(value)) => Ok(Bson::Int64(i64::from(*value) + by)),
        Some(Bson::Int64(value)) => Ok(Bson::Int64(value + by)),
        Some(Bson::Double(value)) => Ok(Bson::Double(value + by as f64)),
        Some(other) => Err(StoreError::Backend(format!(
            "cannot increment non-numeric field `{field}` ({:?})",
            other.element_type()
        ))),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.read(path).cloned())
    }

    async fn query(&self, query: &Query) -> Result<Snapshot, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.snapshot(query))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;

        // Stage every op against the staged view first; nothing touches the
        // live data until the whole batch has applied cleanly.
        let mut staged: HashMap<DocPath, Document> = HashMap::new();
        for op in batch.ops() {
            let path = op.path().clone();
            let current = staged
                .get(&path)
                .cloned()
                .or_else(|| inner.read(&path).cloned());
            let next = match op {
                WriteOp::Set { data, .. } => data.clone(),
                WriteOp::Merge { data, .. } => {
                    let mut merged = current.unwrap_or_default();
                    for (key, value) in data {
                        merged.insert(key.clone(), value.clone());
                    }
                    merged
                }
                WriteOp::Increment { field, by, .. } => {
                    let mut updated = current.unwrap_or_default();
                    let value = increment(updated.get(field), field, *by)?;
                    updated.insert(field.clone(), value);
                    updated
                }
            };
            staged.insert(path, next);
        }

        let mut changes = Vec::with_capacity(staged.len());
        for (path, data) in staged {
            let before = inner
                .collections
                .entry(path.collection().clone())
                .or_default()
                .insert(path.id().to_string(), data.clone());
            changes.push((path, before, data));
        }

        inner.subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        let inner = &*inner;
        for subscriber in &inner.subscribers {
            let touched = changes.iter().any(|(path, before, after)| {
                path.collection() == subscriber.query.collection()
                    && (subscriber.query.matches(after)
                        || before
                            .as_ref()
                            .is_some_and(|data| subscriber.query.matches(data)))
            });
            if touched {
                let _ = subscriber.tx.send(Ok(inner.snapshot(&subscriber.query)));
            }
        }

        tracing::debug!(ops = changes.len(), "memory store batch committed");
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Ok(inner.snapshot(&query)))
            .map_err(|_| StoreError::Closed)?;

        tracing::debug!(collection = %query.collection(), "memory store subscription opened");
        inner.subscribers.push(Subscriber { query, tx });
        Ok(Subscription::new(rx, CancellationToken::new()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn picks() -> CollectionPath {
        CollectionPath::root("pools").doc("p1").child("picks")
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        let path = picks().doc("m1_a");

        store
            .commit(WriteBatch::new().set(path.clone(), doc! { "matchId": "m1" }))
            .await
            .expect("commit succeeds");

        let stored = store.get(&path).await.expect("get succeeds");
        assert_eq!(stored, Some(doc! { "matchId": "m1" }));
        assert_eq!(
            store.get(&picks().doc("missing")).await.expect("get succeeds"),
            None
        );
    }

    #[tokio::test]
    async fn merge_keeps_other_fields_and_increment_counts() {
        let store = MemoryStore::new();
        let pool = CollectionPath::root("pools").doc("p1");

        store
            .commit(WriteBatch::new().set(pool.clone(), doc! { "name": "Friends", "membersCount": 1_i64 }))
            .await
            .expect("set");
        store
            .commit(
                WriteBatch::new()
                    .merge(pool.clone(), doc! { "joinCode": "ABC234" })
                    .increment(pool.clone(), "membersCount", 1),
            )
            .await
            .expect("merge + increment");

        let stored = store.get(&pool).await.expect("get").expect("present");
        assert_eq!(stored.get_str("name").expect("name"), "Friends");
        assert_eq!(stored.get_str("joinCode").expect("code"), "ABC234");
        assert_eq!(stored.get_i64("membersCount").expect("count"), 2);
    }

    #[tokio::test]
    async fn failing_op_leaves_batch_unapplied() {
        let store = MemoryStore::new();
        let first = picks().doc("m1_a");
        let second = picks().doc("m1_b");

        store
            .commit(WriteBatch::new().set(second.clone(), doc! { "count": "not a number" }))
            .await
            .expect("seed");

        let err = store
            .commit(
                WriteBatch::new()
                    .set(first.clone(), doc! { "matchId": "m1" })
                    .increment(second, "count", 1),
            )
            .await
            .expect_err("increment of a string fails");

        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.get(&first).await.expect("get"), None);
    }

    #[tokio::test]
    async fn offline_store_rejects_everything() {
        let store = MemoryStore::new();
        store.set_available(false);

        let err = store
            .commit(WriteBatch::new().set(picks().doc("x"), doc! {}))
            .await
            .expect_err("offline");
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn query_filters_and_orders_by_id() {
        let store = MemoryStore::new();
        store
            .commit(
                WriteBatch::new()
                    .set(picks().doc("m1_b"), doc! { "matchId": "m1", "userId": "b" })
                    .set(picks().doc("m2_a"), doc! { "matchId": "m2", "userId": "a" })
                    .set(picks().doc("m1_a"), doc! { "matchId": "m1", "userId": "a" }),
            )
            .await
            .expect("commit");

        let snapshot = store
            .query(&Query::all(picks()).where_eq("matchId", "m1"))
            .await
            .expect("query");
        let ids: Vec<_> = snapshot.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["m1_a", "m1_b"]);
    }

    #[tokio::test]
    async fn subscription_sees_initial_snapshot_then_each_relevant_batch() {
        let store = MemoryStore::new();
        let query = Query::all(picks()).where_eq("matchId", "m1");
        let mut subscription = store.subscribe(query).await.expect("subscribe");

        let initial = subscription.next().await.expect("initial").expect("ok");
        assert!(initial.is_empty());

        store
            .commit(WriteBatch::new().set(picks().doc("m2_a"), doc! { "matchId": "m2" }))
            .await
            .expect("unrelated write");
        store
            .commit(WriteBatch::new().set(picks().doc("m1_a"), doc! { "matchId": "m1" }))
            .await
            .expect("related write");

        let update = subscription.next().await.expect("update").expect("ok");
        assert_eq!(update.len(), 1);
        assert_eq!(update[0].id, "m1_a");
        assert!(subscription.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscription_is_released() {
        let store = MemoryStore::new();
        let subscription = store
            .subscribe(Query::all(picks()))
            .await
            .expect("subscribe");
        assert_eq!(store.subscriber_count().await, 1);

        drop(subscription);
        assert_eq!(store.subscriber_count().await, 0);
    }
}
