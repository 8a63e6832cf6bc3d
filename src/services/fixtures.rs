use std::sync::Arc;

use crate::database::collections;
use crate::errors::{AppError, Result};
use crate::models::fixture::{Match, MatchEntry, FIRST_ROUND, LAST_ROUND};
use crate::store::{from_document, DocumentStore, Query};

// Read-only access to season fixtures. Fixtures are loaded out of band.
#[derive(Clone)]
pub struct FixtureService {
    store: Arc<dyn DocumentStore>,
}

impl FixtureService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        FixtureService { store }
    }

    /// Matches of one round ordered by kickoff.
    pub async fn matches_for_round(&self, season_id: &str, round: u8) -> Result<Vec<MatchEntry>> {
        if !(FIRST_ROUND..=LAST_ROUND).contains(&round) {
            return Err(AppError::invalid_data(format!(
                "Round must be between {FIRST_ROUND} and {LAST_ROUND}"
            )));
        }

        let query = Query::all(collections::matches(season_id)).where_eq("round", i32::from(round));
        let mut matches = self
            .store
            .query(&query)
            .await?
            .into_iter()
            .map(|found| -> Result<MatchEntry> {
                Ok(MatchEntry {
                    fixture: found.decode()?,
                    id: found.id,
                    season_id: season_id.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        matches.sort_by(|a, b| {
            a.fixture
                .kickoff_at
                .cmp(&b.fixture.kickoff_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matches)
    }

    pub async fn get_match(&self, season_id: &str, match_id: &str) -> Result<Option<Match>> {
        match self
            .store
            .get(&collections::season_match(season_id, match_id))
            .await?
        {
            Some(data) => Ok(Some(from_document(data)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use super::*;
    use crate::models::fixture::{match_id, MatchStatus, TeamId};
    use crate::store::{to_document, MemoryStore, WriteBatch};

    const SEASON: &str = "six-nations-2025";

    fn fixture(round: u8, day: u32, home: TeamId, away: TeamId) -> (String, Match) {
        let kickoff_at = Utc
            .with_ymd_and_hms(2025, 2, day, 15, 0, 0)
            .single()
            .expect("valid date");
        (
            match_id(SEASON, round, home, away),
            Match {
                round,
                kickoff_at,
                home_team_id: home,
                away_team_id: away,
                status: MatchStatus::Scheduled,
                home_score: None,
                away_score: None,
                updated_at: kickoff_at,
            },
        )
    }

    async fn seeded() -> FixtureService {
        let store = Arc::new(MemoryStore::new());
        let mut batch = WriteBatch::new();
        for (id, fixture) in [
            fixture(1, 3, TeamId::Ita, TeamId::Sco),
            fixture(1, 2, TeamId::Ire, TeamId::Eng),
            fixture(1, 1, TeamId::Wal, TeamId::Fra),
            fixture(2, 8, TeamId::Eng, TeamId::Fra),
        ] {
            batch = batch.set(
                collections::season_match(SEASON, &id),
                to_document(&fixture).expect("encodes"),
            );
        }
        store.commit(batch).await.expect("seeded");
        FixtureService::new(store)
    }

    #[tokio::test]
    async fn round_matches_are_ordered_by_kickoff() {
        let fixtures = seeded().await;

        let matches = fixtures.matches_for_round(SEASON, 1).await.expect("round 1");

        let ids: Vec<_> = matches.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "six-nations-2025-r1-WAL-FRA",
                "six-nations-2025-r1-IRE-ENG",
                "six-nations-2025-r1-ITA-SCO",
            ]
        );
        assert!(matches.iter().all(|entry| entry.season_id == SEASON));
    }

    #[tokio::test]
    async fn unplayed_round_is_empty() {
        let fixtures = seeded().await;
        assert!(fixtures.matches_for_round(SEASON, 5).await.expect("round 5").is_empty());
    }

    #[rstest]
    #[case(0)]
    #[case(6)]
    #[tokio::test]
    async fn rounds_outside_the_season_are_rejected(#[case] round: u8) {
        let fixtures = seeded().await;

        let err = fixtures
            .matches_for_round(SEASON, round)
            .await
            .expect_err("out of range");
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn single_match_lookup() {
        let fixtures = seeded().await;

        let found = fixtures
            .get_match(SEASON, "six-nations-2025-r2-ENG-FRA")
            .await
            .expect("read")
            .expect("present");
        assert_eq!(found.round, 2);
        assert_eq!(found.home_team_id, TeamId::Eng);
        assert!(fixtures.get_match(SEASON, "missing").await.expect("read").is_none());
    }
}
