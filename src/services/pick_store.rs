//! Pick persistence and realtime completion status.
//!
//! Each (pool, match, user) owns one pick record written in a single atomic
//! commit. Other members only ever see the [`PickStatus`] projection of that
//! record; the prediction stays in the owner's [`PickDetail`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::database::collections;
use crate::errors::{AppError, Result};
use crate::models::fixture::TeamId;
use crate::models::pick::{
    margin_in_range, PickDetail, PickRecord, StatusMap, MAX_MARGIN, MIN_MARGIN,
};
use crate::store::{
    from_document, to_document, DocumentStore, Query, Snapshot, StoreError, WriteBatch,
};

/// What a status subscriber receives: the full status map of the match, or
/// the store error that ended the feed.
pub type StatusUpdate = std::result::Result<StatusMap, StoreError>;

type StatusCallback = Box<dyn Fn(StatusUpdate) + Send + Sync>;
type CallbackSlot = Arc<Mutex<Option<StatusCallback>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn validate_margin(margin: i32) -> Result<()> {
    if margin_in_range(margin) {
        Ok(())
    } else {
        Err(AppError::invalid_data(format!(
            "Margin must be between {MIN_MARGIN} and {MAX_MARGIN}"
        )))
    }
}

fn statuses_query(pool_id: &str, match_id: &str) -> Query {
    Query::all(collections::picks(pool_id)).where_eq("matchId", match_id)
}

fn to_status_map(snapshot: Snapshot) -> std::result::Result<StatusMap, StoreError> {
    let mut statuses = StatusMap::new();
    for found in snapshot {
        let record: PickRecord = found.decode()?;
        statuses.insert(record.user_id.clone(), record.status());
    }
    Ok(statuses)
}

/// Live status feed for one match. Releasing it (by [`unsubscribe`] or by
/// dropping it) stops the feed; once that returns, the callback never runs
/// again.
///
/// [`unsubscribe`]: StatusSubscription::unsubscribe
pub struct StatusSubscription {
    cancel: CancellationToken,
    callback: CallbackSlot,
}

impl StatusSubscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        // Waits for an in-flight delivery to finish before the callback goes.
        lock(&self.callback).take();
    }
}

/// Status feeds for several matches, released together.
pub struct MatchesSubscription {
    parts: Vec<StatusSubscription>,
}

impl MatchesSubscription {
    pub fn unsubscribe(self) {
        for part in self.parts {
            part.unsubscribe();
        }
    }
}

#[derive(Clone)]
pub struct PickStore {
    store: Arc<dyn DocumentStore>,
}

impl PickStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        PickStore { store }
    }

    pub async fn save_pick(
        &self,
        pool_id: &str,
        match_id: &str,
        user_id: &str,
        winner: TeamId,
        margin: i32,
    ) -> Result<()> {
        validate_margin(margin)?;
        let record = PickRecord::picked(match_id, user_id, winner, margin, Utc::now());
        self.write(pool_id, &record).await?;

        tracing::debug!(pool_id, match_id, user_id, "Pick saved");
        Ok(())
    }

    /// Reset a pick to the explicit empty state. The record is kept.
    pub async fn clear_pick(&self, pool_id: &str, match_id: &str, user_id: &str) -> Result<()> {
        let record = PickRecord::cleared(match_id, user_id, Utc::now());
        self.write(pool_id, &record).await?;

        tracing::debug!(pool_id, match_id, user_id, "Pick cleared");
        Ok(())
    }

    async fn write(&self, pool_id: &str, record: &PickRecord) -> Result<()> {
        let path = collections::pick(pool_id, &record.match_id, &record.user_id);
        let batch = WriteBatch::new().set(path, to_document(record)?);

        self.store.commit(batch).await.map_err(|err| {
            tracing::error!(
                pool_id,
                match_id = %record.match_id,
                user_id = %record.user_id,
                "Pick write failed: {}",
                err
            );
            AppError::from(err)
        })
    }

    pub async fn get_user_pick(
        &self,
        pool_id: &str,
        match_id: &str,
        user_id: &str,
    ) -> Result<Option<PickDetail>> {
        match self.store.get(&collections::pick(pool_id, match_id, user_id)).await? {
            Some(data) => {
                let record: PickRecord = from_document(data)?;
                Ok(Some(record.into_detail()))
            }
            None => Ok(None),
        }
    }

    /// The user's own picks for a set of matches; matches never picked are
    /// left out.
    pub async fn get_user_picks_for_round(
        &self,
        pool_id: &str,
        match_ids: &[String],
        user_id: &str,
    ) -> Result<BTreeMap<String, PickDetail>> {
        let mut picks = BTreeMap::new();
        for match_id in match_ids {
            if let Some(pick) = self.get_user_pick(pool_id, match_id, user_id).await? {
                picks.insert(match_id.clone(), pick);
            }
        }
        Ok(picks)
    }

    pub async fn get_match_statuses(&self, pool_id: &str, match_id: &str) -> Result<StatusMap> {
        let snapshot = self.store.query(&statuses_query(pool_id, match_id)).await?;
        Ok(to_status_map(snapshot)?)
    }

    pub async fn get_matches_statuses(
        &self,
        pool_id: &str,
        match_ids: &[String],
    ) -> Result<BTreeMap<String, StatusMap>> {
        let mut all = BTreeMap::new();
        for match_id in match_ids {
            let statuses = self.get_match_statuses(pool_id, match_id).await?;
            all.insert(match_id.clone(), statuses);
        }
        Ok(all)
    }

    /// Push the full status map of a match to `callback`: once straight away,
    /// then after every write touching that match. A store error is passed
    /// on and ends the feed.
    pub async fn subscribe_to_match_statuses<F>(
        &self,
        pool_id: &str,
        match_id: &str,
        callback: F,
    ) -> Result<StatusSubscription>
    where
        F: Fn(StatusUpdate) + Send + Sync + 'static,
    {
        let mut feed = self.store.subscribe(statuses_query(pool_id, match_id)).await?;

        let cancel = CancellationToken::new();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(Box::new(callback))));

        let token = cancel.clone();
        let delivery = Arc::clone(&slot);
        let (pool_id, match_id) = (pool_id.to_string(), match_id.to_string());
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = feed.next() => next,
                };

                match next {
                    Some(Ok(snapshot)) => deliver(&delivery, to_status_map(snapshot)),
                    Some(Err(err)) => {
                        tracing::error!(
                            pool_id = %pool_id,
                            match_id = %match_id,
                            "Status subscription failed: {}",
                            err
                        );
                        deliver(&delivery, Err(err));
                        break;
                    }
                    None => break,
                }
            }
            tracing::debug!(pool_id = %pool_id, match_id = %match_id, "Status subscription ended");
        });

        Ok(StatusSubscription {
            cancel,
            callback: slot,
        })
    }

    /// One status feed per match, reported as `(match_id, update)`, behind a
    /// single handle.
    pub async fn subscribe_to_matches_statuses<F>(
        &self,
        pool_id: &str,
        match_ids: &[String],
        callback: F,
    ) -> Result<MatchesSubscription>
    where
        F: Fn(&str, StatusUpdate) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let mut parts = Vec::with_capacity(match_ids.len());

        for match_id in match_ids {
            let callback = Arc::clone(&callback);
            let id = match_id.clone();
            // An error here drops `parts`, releasing the feeds opened so far.
            let part = self
                .subscribe_to_match_statuses(pool_id, match_id, move |update| {
                    (*callback)(&id, update)
                })
                .await?;
            parts.push(part);
        }

        Ok(MatchesSubscription { parts })
    }
}

fn deliver(slot: &CallbackSlot, update: StatusUpdate) {
    if let Some(callback) = lock(slot).as_ref() {
        callback(update);
    }
}
