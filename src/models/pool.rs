use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_MARGIN: i32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoringVersion {
    #[default]
    #[serde(rename = "v1")]
    V1,
}

// Pool document, keyed by pool id under `pools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub season_id: String,
    pub name: String,
    pub join_code: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub members_count: i64,
    #[serde(default)]
    pub scoring_version: ScoringVersion,
    pub max_margin: i32,
}

// Roster entry, keyed by user id under `pools/{pool_id}/members`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMember {
    pub display_name: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolEntry {
    pub id: String,
    #[serde(flatten)]
    pub pool: Pool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEntry {
    pub user_id: String,
    #[serde(flatten)]
    pub member: PoolMember,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPool {
    pub id: String,
    pub pool: Pool,
    pub member: PoolMember,
}
