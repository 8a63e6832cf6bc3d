use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    #[validate(length(min = 1, max = 60, message = "Pool name must be 1 to 60 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "Season is required"))]
    pub season_id: String,
}

impl CreatePoolRequest {
    // Length rules apply to what gets stored.
    pub fn trimmed(self) -> Self {
        CreatePoolRequest {
            name: self.name.trim().to_string(),
            season_id: self.season_id.trim().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolResponse {
    pub pool_id: String,
    pub join_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPoolResponse {
    pub pool_id: String,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[test]
    fn blank_pool_name_fails_validation() {
        let request: CreatePoolRequest =
            serde_json::from_str(r#"{"name": "", "seasonId": "six-nations-2025"}"#).expect("json");
        assert!(request.validate().is_err());
    }

    #[test]
    fn whitespace_only_name_fails_once_trimmed() {
        let request: CreatePoolRequest =
            serde_json::from_str(r#"{"name": "   ", "seasonId": "six-nations-2025"}"#).expect("json");
        assert!(request.trimmed().validate().is_err());
    }

    #[test]
    fn padded_name_is_stored_trimmed() {
        let request: CreatePoolRequest =
            serde_json::from_str(r#"{"name": "  Friends Pool ", "seasonId": "six-nations-2025"}"#)
                .expect("json");
        let request = request.trimmed();

        assert!(request.validate().is_ok());
        assert_eq!(request.name, "Friends Pool");
    }

    #[test]
    fn named_pool_passes_validation() {
        let request: CreatePoolRequest =
            serde_json::from_str(r#"{"name": "Friends Pool", "seasonId": "six-nations-2025"}"#)
                .expect("json");
        assert!(request.validate().is_ok());
    }
}
