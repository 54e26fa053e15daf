use sqlx::SqlitePool;

use crate::error::AppResult;

const SEED_CATEGORIES: &[(&str, &str, &str)] = &[
    ("ai/ml", "ai-ml", "Machine learning and AI inference APIs"),
    ("data", "data", "Data feeds, aggregation, and analytics"),
    ("finance", "finance", "Financial data, trading, and payment APIs"),
    ("identity", "identity", "KYC, authentication, and verification"),
    ("media", "media", "Image, video, and audio processing"),
    ("search", "search", "Web search, indexing, and discovery"),
    ("social", "social", "Social networks, communications, and notification APIs"),
    ("storage", "storage", "File storage and content delivery"),
    ("tools", "tools", "Developer tools, utilities, and infrastructure"),
];

/// Populate the category table on first boot. A non-empty table is left alone.
pub async fn seed_categories(pool: &SqlitePool) -> AppResult<()> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    for (name, slug, description) in SEED_CATEGORIES {
        sqlx::query("INSERT INTO categories (name, slug, description) VALUES (?, ?, ?)")
            .bind(name)
            .bind(slug)
            .bind(description)
            .execute(pool)
            .await?;
    }

    tracing::info!(count = SEED_CATEGORIES.len(), "Seeded category table");
    Ok(())
}
