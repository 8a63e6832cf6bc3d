use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FIRST_ROUND: u8 = 1;
pub const LAST_ROUND: u8 = 5;

// Six Nations teams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamId {
    #[serde(rename = "ENG")]
    Eng,
    #[serde(rename = "FRA")]
    Fra,
    #[serde(rename = "IRE")]
    Ire,
    #[serde(rename = "ITA")]
    Ita,
    #[serde(rename = "SCO")]
    Sco,
    #[serde(rename = "WAL")]
    Wal,
}

impl TeamId {
    pub fn code(self) -> &'static str {
        match self {
            TeamId::Eng => "ENG",
            TeamId::Fra => "FRA",
            TeamId::Ire => "IRE",
            TeamId::Ita => "ITA",
            TeamId::Sco => "SCO",
            TeamId::Wal => "WAL",
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Final,
}

// Stored fixture, keyed by `match_id(..)` under `seasons/{season_id}/matches`.
// Written by the fixture loader only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub round: u8,
    pub kickoff_at: DateTime<Utc>,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub status: MatchStatus,
    #[serde(default)]
    pub home_score: Option<i32>,
    #[serde(default)]
    pub away_score: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEntry {
    pub id: String,
    pub season_id: String,
    #[serde(flatten)]
    pub fixture: Match,
}

/// Derived fixture key: `{season_id}-r{round}-{home}-{away}`.
pub fn match_id(season_id: &str, round: u8, home: TeamId, away: TeamId) -> String {
    format!("{season_id}-r{round}-{home}-{away}")
}
