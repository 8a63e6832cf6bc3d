use crate::models::pick::pick_key;
use crate::store::{CollectionPath, DocPath};

pub const POOLS: &str = "pools";
pub const MEMBERS: &str = "members";
pub const PICKS: &str = "picks";
pub const SEASONS: &str = "seasons";
pub const MATCHES: &str = "matches";

pub fn pools() -> CollectionPath {
    CollectionPath::root(POOLS)
}

pub fn pool(pool_id: &str) -> DocPath {
    pools().doc(pool_id)
}

pub fn members(pool_id: &str) -> CollectionPath {
    pool(pool_id).child(MEMBERS)
}

pub fn member(pool_id: &str, user_id: &str) -> DocPath {
    members(pool_id).doc(user_id)
}

pub fn picks(pool_id: &str) -> CollectionPath {
    pool(pool_id).child(PICKS)
}

pub fn pick(pool_id: &str, match_id: &str, user_id: &str) -> DocPath {
    picks(pool_id).doc(pick_key(match_id, user_id))
}

pub fn matches(season_id: &str) -> CollectionPath {
    CollectionPath::root(SEASONS).doc(season_id).child(MATCHES)
}

pub fn season_match(season_id: &str, match_id: &str) -> DocPath {
    matches(season_id).doc(match_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_follow_the_persisted_layout() {
        assert_eq!(pool("p1").to_string(), "pools/p1");
        assert_eq!(member("p1", "u1").to_string(), "pools/p1/members/u1");
        assert_eq!(pick("p1", "m1", "u1").to_string(), "pools/p1/picks/m1_u1");
        assert_eq!(
            season_match("six-nations-2025", "six-nations-2025-r1-FRA-WAL").to_string(),
            "seasons/six-nations-2025/matches/six-nations-2025-r1-FRA-WAL"
        );
    }
}
