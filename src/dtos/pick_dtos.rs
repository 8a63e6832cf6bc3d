use serde::{Deserialize, Serialize};

use crate::models::fixture::TeamId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePickRequest {
    pub winner_team_id: TeamId,
    pub margin: i32,
}

// Partial picks are allowed while the user is still editing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickDraftRequest {
    #[serde(default)]
    pub winner_team_id: Option<TeamId>,
    #[serde(default)]
    pub margin: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchIdsQuery {
    #[serde(default)]
    pub match_ids: Option<String>,
}

impl MatchIdsQuery {
    /// `matchIds=a,b,c` split into ids, blanks and repeats dropped.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.match_ids.as_deref().unwrap_or_default().split(',') {
            let id = id.trim();
            if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftAccepted {
    pub match_id: String,
    pub scheduled_in_ms: u64,
}
