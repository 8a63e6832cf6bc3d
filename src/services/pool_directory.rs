use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::database::collections;
use crate::errors::{AppError, Result};
use crate::models::pool::{
    MemberEntry, Pool, PoolEntry, PoolMember, ScoringVersion, UserPool, DEFAULT_MAX_MARGIN,
};
use crate::store::{from_document, to_document, DocumentStore, Query, WriteBatch};

/// 32 symbols; 0/O and 1/I are left out so codes survive being read aloud.
pub const JOIN_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const JOIN_CODE_LEN: usize = 6;
pub const MAX_JOIN_CODE_ATTEMPTS: usize = 10;

pub trait JoinCodeSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniform random codes drawn from [`JOIN_CODE_ALPHABET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJoinCodes;

impl JoinCodeSource for RandomJoinCodes {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..JOIN_CODE_LEN)
            .map(|_| char::from(JOIN_CODE_ALPHABET[rng.gen_range(0..JOIN_CODE_ALPHABET.len())]))
            .collect()
    }
}

// Join-code uniqueness and membership checks are check-then-write.
#[derive(Clone)]
pub struct PoolDirectory {
    store: Arc<dyn DocumentStore>,
    codes: Arc<dyn JoinCodeSource>,
}

impl PoolDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_join_codes(store, Arc::new(RandomJoinCodes))
    }

    pub fn with_join_codes(store: Arc<dyn DocumentStore>, codes: Arc<dyn JoinCodeSource>) -> Self {
        PoolDirectory { store, codes }
    }

    pub async fn create_pool(
        &self,
        user_id: &str,
        display_name: &str,
        pool_name: &str,
        season_id: &str,
        photo_url: Option<&str>,
    ) -> Result<(String, String)> {
        let join_code = self.generate_unique_join_code().await?;
        let pool_id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();

        let pool = Pool {
            season_id: season_id.to_string(),
            name: pool_name.to_string(),
            join_code: join_code.clone(),
            created_by: user_id.to_string(),
            created_at: now,
            members_count: 1,
            scoring_version: ScoringVersion::V1,
            max_margin: DEFAULT_MAX_MARGIN,
        };
        self.store
            .commit(WriteBatch::new().set(collections::pool(&pool_id), to_document(&pool)?))
            .await?;

        let founder = PoolMember {
            display_name: display_name.to_string(),
            photo_url: photo_url.map(str::to_string),
            joined_at: now,
        };
        self.store
            .commit(
                WriteBatch::new().set(collections::member(&pool_id, user_id), to_document(&founder)?),
            )
            .await?;

        tracing::info!(pool_id = %pool_id, join_code = %join_code, created_by = %user_id, "Pool created");
        Ok((pool_id, join_code))
    }

    async fn generate_unique_join_code(&self) -> Result<String> {
        for attempt in 1..=MAX_JOIN_CODE_ATTEMPTS {
            let join_code = self.codes.generate();
            if self.is_join_code_unique(&join_code).await? {
                return Ok(join_code);
            }
            tracing::debug!(attempt, join_code = %join_code, "Join code already taken");
        }

        tracing::warn!("Gave up generating a join code after {} attempts", MAX_JOIN_CODE_ATTEMPTS);
        Err(AppError::JoinCodeExhausted(MAX_JOIN_CODE_ATTEMPTS))
    }

    async fn is_join_code_unique(&self, join_code: &str) -> Result<bool> {
        let query = Query::all(collections::pools()).where_eq("joinCode", join_code);
        Ok(self.store.query(&query).await?.is_empty())
    }

    pub async fn find_pool_by_join_code(&self, join_code: &str) -> Result<Option<PoolEntry>> {
        let normalized = join_code.trim().to_uppercase();
        let query = Query::all(collections::pools()).where_eq("joinCode", normalized);

        match self.store.query(&query).await?.into_iter().next() {
            Some(found) => Ok(Some(PoolEntry {
                pool: found.decode()?,
                id: found.id,
            })),
            None => Ok(None),
        }
    }

    pub async fn get_pool(&self, pool_id: &str) -> Result<Option<Pool>> {
        match self.store.get(&collections::pool(pool_id)).await? {
            Some(data) => Ok(Some(from_document(data)?)),
            None => Ok(None),
        }
    }

    pub async fn get_member(&self, pool_id: &str, user_id: &str) -> Result<Option<PoolMember>> {
        match self.store.get(&collections::member(pool_id, user_id)).await? {
            Some(data) => Ok(Some(from_document(data)?)),
            None => Ok(None),
        }
    }

    pub async fn is_member(&self, pool_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.get_member(pool_id, user_id).await?.is_some())
    }

    pub async fn join_pool(
        &self,
        pool_id: &str,
        user_id: &str,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<()> {
        if self.get_pool(pool_id).await?.is_none() {
            return Err(AppError::not_found(format!("pool {pool_id}")));
        }

        if self.is_member(pool_id, user_id).await? {
            tracing::warn!(pool_id = %pool_id, user_id = %user_id, "Duplicate join rejected");
            return Err(AppError::AlreadyMember);
        }

        let member = PoolMember {
            display_name: display_name.to_string(),
            photo_url: photo_url.map(str::to_string),
            joined_at: Utc::now(),
        };
        self.store
            .commit(WriteBatch::new().set(collections::member(pool_id, user_id), to_document(&member)?))
            .await?;

        self.store
            .commit(WriteBatch::new().increment(collections::pool(pool_id), "membersCount", 1))
            .await?;

        tracing::info!(pool_id = %pool_id, user_id = %user_id, "Member joined pool");
        Ok(())
    }

    pub async fn get_pool_members(&self, pool_id: &str) -> Result<Vec<MemberEntry>> {
        let snapshot = self.store.query(&Query::all(collections::members(pool_id))).await?;

        snapshot
            .into_iter()
            .map(|found| -> Result<MemberEntry> {
                Ok(MemberEntry {
                    member: found.decode()?,
                    user_id: found.id,
                })
            })
            .collect()
    }

    /// Every pool the user belongs to. Probes the roster of each pool in turn,
    /// so the cost grows with the total number of pools.
    pub async fn get_user_pools(&self, user_id: &str) -> Result<Vec<UserPool>> {
        let pools = self.store.query(&Query::all(collections::pools())).await?;

        let mut user_pools = Vec::new();
        for found in pools {
            if let Some(member) = self.get_member(&found.id, user_id).await? {
                user_pools.push(UserPool {
                    pool: found.decode()?,
                    id: found.id,
                    member,
                });
            }
        }

        Ok(user_pools)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use bson::doc;

    use crate::store::{MemoryStore, MockDocumentStore, StoreError, StoredDocument};

    use super::*;

    /// Hands out a fixed sequence of codes and counts how many were drawn.
    struct ScriptedCodes {
        codes: Mutex<Vec<String>>,
        drawn: AtomicUsize,
    }

    impl ScriptedCodes {
        fn new(codes: &[&str]) -> Arc<Self> {
            Arc::new(ScriptedCodes {
                codes: Mutex::new(codes.iter().rev().map(|code| code.to_string()).collect()),
                drawn: AtomicUsize::new(0),
            })
        }

        fn drawn(&self) -> usize {
            self.drawn.load(Ordering::SeqCst)
        }
    }

    impl JoinCodeSource for ScriptedCodes {
        fn generate(&self) -> String {
            self.drawn.fetch_add(1, Ordering::SeqCst);
            self.codes
                .lock()
                .expect("codes lock")
                .pop()
                .unwrap_or_else(|| "ZZZZZZ".to_string())
        }
    }

    fn taken(code: &str) -> Vec<StoredDocument> {
        vec![StoredDocument {
            id: "existing".to_string(),
            data: doc! { "joinCode": code },
        }]
    }

    fn directory() -> (Arc<MemoryStore>, PoolDirectory) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), PoolDirectory::new(store))
    }

    #[test]
    fn random_codes_use_the_unambiguous_alphabet() {
        let alphabet: HashSet<char> = JOIN_CODE_ALPHABET.iter().map(|b| char::from(*b)).collect();
        assert_eq!(alphabet.len(), 32);
        for ambiguous in ['0', 'O', '1', 'I'] {
            assert!(!alphabet.contains(&ambiguous));
        }

        for _ in 0..200 {
            let code = RandomJoinCodes.generate();
            assert_eq!(code.len(), JOIN_CODE_LEN);
            assert!(code.chars().all(|c| alphabet.contains(&c)));
        }
    }

    #[tokio::test]
    async fn create_pool_retries_past_two_collisions() {
        let mut store = MockDocumentStore::new();
        let mut lookups = 0;
        store.expect_query().times(3).returning(move |query| {
            lookups += 1;
            assert_eq!(query.filters()[0].0, "joinCode");
            Ok(if lookups < 3 { taken("TAKEN2") } else { Vec::new() })
        });
        store.expect_commit().times(2).returning(|_| Ok(()));

        let codes = ScriptedCodes::new(&["AAAAAA", "BBBBBB", "CCCCCC"]);
        let directory = PoolDirectory::with_join_codes(Arc::new(store), codes.clone());

        directory
            .create_pool("u1", "Ana", "Friends Pool", "six-nations-2025", None)
            .await
            .expect("third code is free");

        assert_eq!(codes.drawn(), 3);
    }

    #[tokio::test]
    async fn create_pool_gives_up_after_ten_collisions() {
        let mut store = MockDocumentStore::new();
        store
            .expect_query()
            .times(MAX_JOIN_CODE_ATTEMPTS)
            .returning(|_| Ok(taken("TAKEN2")));
        store.expect_commit().times(0);

        let codes = ScriptedCodes::new(&[]);
        let directory = PoolDirectory::with_join_codes(Arc::new(store), codes.clone());

        let err = directory
            .create_pool("u1", "Ana", "Friends Pool", "six-nations-2025", None)
            .await
            .expect_err("every code collides");

        assert!(matches!(err, AppError::JoinCodeExhausted(MAX_JOIN_CODE_ATTEMPTS)));
        assert_eq!(codes.drawn(), MAX_JOIN_CODE_ATTEMPTS);
    }

    #[tokio::test]
    async fn create_pool_propagates_store_failures() {
        let mut store = MockDocumentStore::new();
        store
            .expect_query()
            .returning(|_| Err(StoreError::Unavailable("offline".to_string())));
        store.expect_commit().times(0);

        let directory = PoolDirectory::new(Arc::new(store));
        let err = directory
            .create_pool("u1", "Ana", "Friends Pool", "six-nations-2025", None)
            .await
            .expect_err("store offline");

        assert!(matches!(err, AppError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn created_pool_has_founder_as_only_member() {
        let (_, directory) = directory();

        let (pool_id, join_code) = directory
            .create_pool("u1", "Ana", "Friends Pool", "six-nations-2025", Some("https://img/ana.png"))
            .await
            .expect("created");

        let pool = directory.get_pool(&pool_id).await.expect("read").expect("exists");
        assert_eq!(pool.name, "Friends Pool");
        assert_eq!(pool.season_id, "six-nations-2025");
        assert_eq!(pool.created_by, "u1");
        assert_eq!(pool.members_count, 1);
        assert_eq!(pool.max_margin, 99);
        assert_eq!(pool.join_code, join_code);
        assert_eq!(join_code.len(), JOIN_CODE_LEN);

        let members = directory.get_pool_members(&pool_id).await.expect("roster");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, "u1");
        assert_eq!(members[0].member.photo_url.as_deref(), Some("https://img/ana.png"));
    }

    #[tokio::test]
    async fn two_pools_get_distinct_codes() {
        let (_, directory) = directory();

        let (_, first) = directory
            .create_pool("u1", "Ana", "One", "six-nations-2025", None)
            .await
            .expect("first");
        let (_, second) = directory
            .create_pool("u1", "Ana", "Two", "six-nations-2025", None)
            .await
            .expect("second");

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn colliding_code_is_skipped_against_real_pools() {
        let store = Arc::new(MemoryStore::new());
        let codes = ScriptedCodes::new(&["ABC234", "ABC234", "XYZ789"]);
        let directory = PoolDirectory::with_join_codes(store, codes.clone());

        let (_, first_code) = directory
            .create_pool("u1", "Ana", "One", "six-nations-2025", None)
            .await
            .expect("first");
        let (second, second_code) = directory
            .create_pool("u2", "Ben", "Two", "six-nations-2025", None)
            .await
            .expect("second");

        assert_eq!(first_code, "ABC234");
        assert_eq!(second_code, "XYZ789");
        let second = directory.get_pool(&second).await.expect("read").expect("exists");
        assert_eq!(second.join_code, "XYZ789");
        assert_eq!(codes.drawn(), 3);
    }

    #[tokio::test]
    async fn join_code_lookup_ignores_case_and_whitespace() {
        let store = Arc::new(MemoryStore::new());
        let directory =
            PoolDirectory::with_join_codes(store, ScriptedCodes::new(&["ABC234"]));
        let (pool_id, _) = directory
            .create_pool("u1", "Ana", "Friends Pool", "six-nations-2025", None)
            .await
            .expect("created");

        let found = directory
            .find_pool_by_join_code(" abc234 ")
            .await
            .expect("lookup")
            .expect("found");
        assert_eq!(found.id, pool_id);
        assert_eq!(found.pool.name, "Friends Pool");

        assert!(directory
            .find_pool_by_join_code("QQQQQQ")
            .await
            .expect("lookup")
            .is_none());
    }

    #[tokio::test]
    async fn second_join_conflicts_and_counts_once() {
        let (_, directory) = directory();
        let (pool_id, _) = directory
            .create_pool("u1", "Ana", "Friends Pool", "six-nations-2025", None)
            .await
            .expect("created");

        directory
            .join_pool(&pool_id, "u2", "Ben", None)
            .await
            .expect("first join");
        let err = directory
            .join_pool(&pool_id, "u2", "Ben", None)
            .await
            .expect_err("second join");

        assert!(matches!(err, AppError::AlreadyMember));
        let pool = directory.get_pool(&pool_id).await.expect("read").expect("exists");
        assert_eq!(pool.members_count, 2);
        assert_eq!(directory.get_pool_members(&pool_id).await.expect("roster").len(), 2);
    }

    #[tokio::test]
    async fn founder_cannot_join_again() {
        let (_, directory) = directory();
        let (pool_id, _) = directory
            .create_pool("u1", "Ana", "Friends Pool", "six-nations-2025", None)
            .await
            .expect("created");

        let err = directory
            .join_pool(&pool_id, "u1", "Ana", None)
            .await
            .expect_err("founder is a member");
        assert!(matches!(err, AppError::AlreadyMember));
    }

    #[tokio::test]
    async fn joining_unknown_pool_is_not_found() {
        let (store, directory) = directory();

        let err = directory
            .join_pool("missing", "u2", "Ben", None)
            .await
            .expect_err("no such pool");

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store
            .get(&collections::member("missing", "u2"))
            .await
            .expect("read")
            .is_none());
    }

    #[tokio::test]
    async fn user_pools_only_lists_memberships() {
        let (_, directory) = directory();
        let (mine, _) = directory
            .create_pool("u1", "Ana", "Mine", "six-nations-2025", None)
            .await
            .expect("created");
        let (joined, _) = directory
            .create_pool("u2", "Ben", "Joined", "six-nations-2025", None)
            .await
            .expect("created");
        directory
            .create_pool("u3", "Cai", "Elsewhere", "six-nations-2025", None)
            .await
            .expect("created");
        directory
            .join_pool(&joined, "u1", "Ana", None)
            .await
            .expect("joined");

        let mut pools = directory.get_user_pools("u1").await.expect("listed");
        pools.sort_by(|a, b| a.pool.name.cmp(&b.pool.name));

        let ids: Vec<_> = pools.iter().map(|entry| entry.id.clone()).collect();
        assert_eq!(ids, vec![joined, mine]);
        assert!(pools.iter().all(|entry| entry.member.display_name == "Ana"));
        assert!(directory.get_user_pools("nobody").await.expect("listed").is_empty());
    }
}
