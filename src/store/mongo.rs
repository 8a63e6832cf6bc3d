use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::{StreamExt, TryStreamExt};
use mongodb::{
    error::ErrorKind,
    options::FullDocumentType,
    Client, ClientSession, Collection, Database,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    CollectionPath, DocPath, DocumentStore, Query, Snapshot, StoreError, StoredDocument,
    Subscription, WriteBatch, WriteOp,
};

const ID_FIELD: &str = "_id";
const COLLECTION_FIELD: &str = "_collection";

fn map_mongo_error(err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

fn encode(path: &DocPath, mut data: Document) -> Document {
    data.insert(ID_FIELD, path.to_string());
    data.insert(COLLECTION_FIELD, path.collection().as_str());
    data
}

fn decode(collection: &CollectionPath, mut data: Document) -> Option<StoredDocument> {
    let stored_id = data.get_str(ID_FIELD).ok()?.to_string();
    let prefix = format!("{}/", collection);
    let id = stored_id.strip_prefix(&prefix)?.to_string();
    data.remove(ID_FIELD);
    data.remove(COLLECTION_FIELD);
    Some(StoredDocument { id, data })
}

fn query_filter(query: &Query) -> Document {
    let mut filter = doc! { COLLECTION_FIELD: query.collection().as_str() };
    for (field, value) in query.filters() {
        filter.insert(field.clone(), value.clone());
    }
    filter
}

fn change_stream_match(query: &Query) -> Document {
    let mut filter = Document::new();
    filter.insert(
        format!("fullDocument.{COLLECTION_FIELD}"),
        query.collection().as_str(),
    );
    for (field, value) in query.filters() {
        filter.insert(format!("fullDocument.{field}"), value.clone());
    }
    doc! { "$match": filter }
}

// `_id` holds the full document path and `_collection` the collection path,
// so nested collections share one physical collection per kind. Batches and
// subscriptions need a replica set.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db: Database) -> Self {
        MongoStore { client, db }
    }

    fn collection(&self, path: &CollectionPath) -> Collection<Document> {
        self.db.collection(path.kind())
    }

    async fn apply(
        &self,
        op: WriteOp,
        session: &mut ClientSession,
    ) -> mongodb::error::Result<()> {
        let collection = self.collection(op.path().collection());
        match op {
            WriteOp::Set { path, data } => {
                collection
                    .replace_one(doc! { ID_FIELD: path.to_string() }, encode(&path, data))
                    .upsert(true)
                    .session(&mut *session)
                    .await?;
            }
            WriteOp::Merge { path, mut data } => {
                data.insert(COLLECTION_FIELD, path.collection().as_str());
                collection
                    .update_one(doc! { ID_FIELD: path.to_string() }, doc! { "$set": data })
                    .upsert(true)
                    .session(&mut *session)
                    .await?;
            }
            WriteOp::Increment { path, field, by } => {
                collection
                    .update_one(
                        doc! { ID_FIELD: path.to_string() },
                        doc! {
                            "$inc": { field: by },
                            "$setOnInsert": { COLLECTION_FIELD: path.collection().as_str() },
                        },
                    )
                    .upsert(true)
                    .session(&mut *session)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        let found = self
            .collection(path.collection())
            .find_one(doc! { ID_FIELD: path.to_string() })
            .await
            .map_err(map_mongo_error)?;

        Ok(found
            .and_then(|data| decode(path.collection(), data))
            .map(|stored| stored.data))
    }

    async fn query(&self, query: &Query) -> Result<Snapshot, StoreError> {
        let cursor = self
            .collection(query.collection())
            .find(query_filter(query))
            .sort(doc! { ID_FIELD: 1 })
            .await
            .map_err(map_mongo_error)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(map_mongo_error)?;

        Ok(documents
            .into_iter()
            .filter_map(|data| decode(query.collection(), data))
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let ops = batch.len();
        let mut session = self.client.start_session().await.map_err(map_mongo_error)?;
        session.start_transaction().await.map_err(map_mongo_error)?;

        for op in batch.into_ops() {
            if let Err(err) = self.apply(op, &mut session).await {
                tracing::warn!("Aborting transaction after failed write: {}", err);
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::error!("Failed to abort transaction: {}", abort_err);
                }
                return Err(map_mongo_error(err));
            }
        }

        session.commit_transaction().await.map_err(map_mongo_error)?;
        tracing::debug!(ops, "mongo batch committed");
        Ok(())
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        // Open the change stream before reading the initial snapshot so no
        // write can fall between the two.
        let mut changes = self
            .collection(query.collection())
            .watch()
            .pipeline([change_stream_match(&query)])
            .full_document(FullDocumentType::UpdateLookup)
            .await
            .map_err(map_mongo_error)?;

        let initial = self.query(&query).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Ok(initial)).map_err(|_| StoreError::Closed)?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = changes.next() => match event {
                        Some(Ok(_)) => {
                            let snapshot = store.query(&query).await;
                            if tx.send(snapshot).is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            tracing::error!("Change stream failed for {}: {}", query.collection(), err);
                            let _ = tx.send(Err(map_mongo_error(err)));
                            break;
                        }
                        None => break,
                    }
                }
            }
            tracing::debug!(collection = %query.collection(), "mongo subscription closed");
        });

        Ok(Subscription::new(rx, cancel))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(map_mongo_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> CollectionPath {
        CollectionPath::root("pools").doc("p1").child("members")
    }

    #[test]
    fn encoded_documents_carry_their_path() {
        let path = members().doc("u1");
        let encoded = encode(&path, doc! { "displayName": "Ana" });

        assert_eq!(encoded.get_str("_id").expect("id"), "pools/p1/members/u1");
        assert_eq!(encoded.get_str("_collection").expect("collection"), "pools/p1/members");
        assert_eq!(encoded.get_str("displayName").expect("name"), "Ana");
    }

    #[test]
    fn decode_strips_bookkeeping_fields() {
        let path = members().doc("u1");
        let stored = decode(path.collection(), encode(&path, doc! { "displayName": "Ana" }))
            .expect("decodes");

        assert_eq!(stored.id, "u1");
        assert_eq!(stored.data, doc! { "displayName": "Ana" });
    }

    #[test]
    fn decode_rejects_documents_from_other_collections() {
        let other = CollectionPath::root("pools").doc("p2").child("members").doc("u1");
        assert!(decode(&members(), encode(&other, doc! {})).is_none());
    }

    #[test]
    fn filters_are_scoped_to_the_collection_path() {
        let query = Query::all(members()).where_eq("displayName", "Ana");

        assert_eq!(
            query_filter(&query),
            doc! { "_collection": "pools/p1/members", "displayName": "Ana" }
        );
        assert_eq!(
            change_stream_match(&query),
            doc! { "$match": {
                "fullDocument._collection": "pools/p1/members",
                "fullDocument.displayName": "Ana",
            } }
        );
    }
}
