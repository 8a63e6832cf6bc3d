use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::fixture::TeamId;

pub const MIN_MARGIN: i32 = 1;
pub const MAX_MARGIN: i32 = 99;

/// Statuses of one match keyed by user id.
pub type StatusMap = BTreeMap<String, PickStatus>;

/// Document key shared by every pick of a user on a match: `{match_id}_{user_id}`.
pub fn pick_key(match_id: &str, user_id: &str) -> String {
    format!("{match_id}_{user_id}")
}

pub fn margin_in_range(margin: i32) -> bool {
    (MIN_MARGIN..=MAX_MARGIN).contains(&margin)
}

// One per (pool, match, user). Status and detail are both derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickRecord {
    pub match_id: String,
    pub user_id: String,
    pub picked_winner_team_id: Option<TeamId>,
    pub picked_margin: Option<i32>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub score: PickScore,
}

// Written by the scorer once a match is final.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_bonus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closest_bonus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_points: Option<i32>,
}

impl PickRecord {
    pub fn picked(
        match_id: &str,
        user_id: &str,
        winner: TeamId,
        margin: i32,
        now: DateTime<Utc>,
    ) -> Self {
        PickRecord {
            match_id: match_id.to_string(),
            user_id: user_id.to_string(),
            picked_winner_team_id: Some(winner),
            picked_margin: Some(margin),
            locked_at: None,
            finalized_at: None,
            updated_at: now,
            score: PickScore::default(),
        }
    }

    pub fn cleared(match_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        PickRecord {
            match_id: match_id.to_string(),
            user_id: user_id.to_string(),
            picked_winner_team_id: None,
            picked_margin: None,
            locked_at: None,
            finalized_at: None,
            updated_at: now,
            score: PickScore::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.picked_winner_team_id.is_some() && self.picked_margin.is_some_and(margin_in_range)
    }

    pub fn status(&self) -> PickStatus {
        PickStatus {
            match_id: self.match_id.clone(),
            user_id: self.user_id.clone(),
            is_complete: self.is_complete(),
            locked_at: self.locked_at,
            finalized_at: self.finalized_at,
            updated_at: self.updated_at,
        }
    }

    pub fn into_detail(self) -> PickDetail {
        PickDetail {
            match_id: self.match_id,
            user_id: self.user_id,
            picked_winner_team_id: self.picked_winner_team_id,
            picked_margin: self.picked_margin,
            updated_at: self.updated_at,
            score: self.score,
        }
    }
}

/// Whether a user has picked, never what. Safe to show to every pool member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickStatus {
    pub match_id: String,
    pub user_id: String,
    pub is_complete: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// The prediction itself. Only ever returned to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickDetail {
    pub match_id: String,
    pub user_id: String,
    pub picked_winner_team_id: Option<TeamId>,
    pub picked_margin: Option<i32>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub score: PickScore,
}
