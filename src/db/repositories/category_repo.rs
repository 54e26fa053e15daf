use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::AppResult;
use crate::models::Category;

pub struct CategoryRepository;

impl CategoryRepository {
    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
            .fetch_all(pool)
            .await?;
        Ok(categories)
    }

    pub async fn for_service(pool: &SqlitePool, service_id: i64) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT c.* FROM categories c
            JOIN service_categories sc ON sc.category_id = c.id
            WHERE sc.service_id = ?
            ORDER BY c.name
            "#,
        )
        .bind(service_id)
        .fetch_all(pool)
        .await?;
        Ok(categories)
    }

    /// Batch lookup for listing pages, keyed by service id.
    pub async fn for_services(
        pool: &SqlitePool,
        service_ids: &[i64],
    ) -> AppResult<HashMap<i64, Vec<Category>>> {
        let mut by_service: HashMap<i64, Vec<Category>> = HashMap::new();
        if service_ids.is_empty() {
            return Ok(by_service);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT sc.service_id, c.id, c.name, c.slug, c.description \
             FROM service_categories sc \
             JOIN categories c ON c.id = sc.category_id \
             WHERE sc.service_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in service_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY c.name");

        let rows: Vec<(i64, i64, String, String, String)> =
            builder.build_query_as().fetch_all(pool).await?;

        for (service_id, id, name, slug, description) in rows {
            by_service.entry(service_id).or_default().push(Category {
                id,
                name,
                slug,
                description,
            });
        }
        Ok(by_service)
    }
}
