use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, FromRow)]
pub struct Rating {
    pub id: i64,
    pub service_id: i64,
    pub score: i64,
    pub comment: String,
    pub reviewer_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingOut {
    pub id: i64,
    pub score: i64,
    pub comment: String,
    pub reviewer_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Rating> for RatingOut {
    fn from(rating: Rating) -> Self {
        Self {
            id: rating.id,
            score: rating.score,
            comment: rating.comment,
            reviewer_name: rating.reviewer_name,
            created_at: rating.created_at,
        }
    }
}

fn default_reviewer() -> String {
    "Anonymous".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RatingCreate {
    #[validate(range(min = 1, max = 5))]
    pub score: i64,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub comment: String,
    #[serde(default = "default_reviewer")]
    #[validate(length(max = 200))]
    pub reviewer_name: String,
}
