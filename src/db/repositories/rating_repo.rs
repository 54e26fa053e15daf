use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::{Rating, RatingCreate};

pub struct RatingRepository;

impl RatingRepository {
    pub async fn list_for_service(pool: &SqlitePool, service_id: i64) -> AppResult<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            "SELECT * FROM ratings WHERE service_id = ? ORDER BY created_at DESC",
        )
        .bind(service_id)
        .fetch_all(pool)
        .await?;
        Ok(ratings)
    }

    pub async fn recent_for_service(
        pool: &SqlitePool,
        service_id: i64,
        limit: i64,
    ) -> AppResult<Vec<Rating>> {
        let ratings = sqlx::query_as::<_, Rating>(
            "SELECT * FROM ratings WHERE service_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(service_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(ratings)
    }

    /// Score histogram as (score, count) pairs.
    pub async fn distribution(pool: &SqlitePool, service_id: i64) -> AppResult<Vec<(i64, i64)>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT score, COUNT(*) FROM ratings WHERE service_id = ? GROUP BY score",
        )
        .bind(service_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_all(pool: &SqlitePool) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM ratings")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Insert the rating and refresh the listing's denormalized average and
    /// count in one transaction, so readers never see the pair out of sync
    /// with the rating set.
    pub async fn create_with_aggregate(
        pool: &SqlitePool,
        service_id: i64,
        body: &RatingCreate,
    ) -> AppResult<Rating> {
        let mut tx = pool.begin().await?;

        let rating = sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO ratings (service_id, score, comment, reviewer_name, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(service_id)
        .bind(body.score)
        .bind(&body.comment)
        .bind(&body.reviewer_name)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let (avg, count): (f64, i64) = sqlx::query_as(
            "SELECT AVG(score), COUNT(*) FROM ratings WHERE service_id = ?",
        )
        .bind(service_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE services SET avg_rating = ?, rating_count = ?, updated_at = ? WHERE id = ?")
            .bind((avg * 10.0).round() / 10.0)
            .bind(count)
            .bind(Utc::now())
            .bind(service_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(rating)
    }
}
