use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::error::AppResult;
use crate::models::{Service, ServiceCreate};
use crate::services::netcheck;

pub struct ServiceRepository;

#[derive(Debug, Default, Clone)]
pub struct ListFilter {
    pub q: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub verified: bool,
    pub sort: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

impl ServiceRepository {
    pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> AppResult<Option<Service>> {
        let service = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE slug = ? AND status != 'purged'",
        )
        .bind(slug)
        .fetch_optional(pool)
        .await?;
        Ok(service)
    }

    /// Tombstoned row for the exact URL, if any. Resubmissions of a purged
    /// URL overwrite the row so rating foreign keys stay intact.
    pub async fn find_purged_by_url(pool: &SqlitePool, url: &str) -> AppResult<Option<Service>> {
        let service = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE url = ? AND status = 'purged'",
        )
        .bind(url)
        .fetch_optional(pool)
        .await?;
        Ok(service)
    }

    /// Every non-purged listing, ordered by id. Used by the bulk export.
    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE status != 'purged' ORDER BY id",
        )
        .fetch_all(pool)
        .await?;
        Ok(services)
    }

    /// Non-purged listings whose effective domain matches `url`'s. Hostname
    /// comparison happens here rather than in SQL; directory scale makes the
    /// full scan cheap.
    pub async fn same_domain(pool: &SqlitePool, url: &str) -> AppResult<Vec<Service>> {
        let Some(domain) = netcheck::effective_domain(url) else {
            return Ok(Vec::new());
        };
        let all = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE status != 'purged'")
            .fetch_all(pool)
            .await?;
        Ok(all
            .into_iter()
            .filter(|s| netcheck::effective_domain(&s.url).as_deref() == Some(domain.as_str()))
            .collect())
    }

    pub async fn list(pool: &SqlitePool, filter: &ListFilter) -> AppResult<(Vec<Service>, i64)> {
        let join = if filter.category.is_some() {
            " JOIN service_categories sc ON sc.service_id = s.id \
             JOIN categories c ON c.id = sc.category_id"
        } else {
            ""
        };

        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM services s{}", join));
        Self::push_filters(&mut count_builder, filter);
        let total: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT s.* FROM services s{}", join));
        Self::push_filters(&mut builder, filter);

        let order = match filter.sort.as_deref() {
            Some("top-rated") => "s.avg_rating DESC",
            Some("cheapest") => "s.pricing_sats ASC",
            Some("most-reviewed") => "s.rating_count DESC",
            _ => "s.created_at DESC",
        };
        builder.push(" ORDER BY ").push(order);

        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 100);
        builder
            .push(" LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind((page - 1) * page_size);

        let services = builder.build_query_as::<Service>().fetch_all(pool).await?;
        Ok((services, total))
    }

    fn push_filters(builder: &mut QueryBuilder<Sqlite>, filter: &ListFilter) {
        builder.push(" WHERE s.status != 'purged'");
        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q);
            builder
                .push(" AND (s.name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR s.description LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category) = filter.category.as_ref().filter(|c| !c.is_empty()) {
            builder.push(" AND c.slug = ").push_bind(category.clone());
        }
        if let Some(status) = filter.status.as_ref().filter(|s| !s.is_empty()) {
            builder.push(" AND s.status = ").push_bind(status.clone());
        }
        if filter.verified {
            builder.push(" AND s.domain_verified = 1");
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        body: &ServiceCreate,
        slug: &str,
        edit_token_hash: &str,
    ) -> AppResult<Service> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (
                name, slug, url, description, pricing_sats, pricing_model,
                protocol, owner_name, owner_contact, logo_url, edit_token_hash,
                domain_verified, avg_rating, rating_count, status,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0.0, 0, 'unverified', ?, ?)
            RETURNING *
            "#,
        )
        .bind(&body.name)
        .bind(slug)
        .bind(&body.url)
        .bind(&body.description)
        .bind(body.pricing_sats)
        .bind(&body.pricing_model)
        .bind(&body.protocol)
        .bind(&body.owner_name)
        .bind(&body.owner_contact)
        .bind(&body.logo_url)
        .bind(edit_token_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_categories(&mut tx, service.id, &body.category_ids).await?;
        tx.commit().await?;
        Ok(service)
    }

    /// Reclaim a purged row for a fresh submission of the same URL. The id
    /// (and any ratings pointing at it) survives; profile, slug, token, and
    /// categories are replaced and the listing starts over as unverified.
    pub async fn overwrite_purged(
        pool: &SqlitePool,
        id: i64,
        body: &ServiceCreate,
        slug: &str,
        edit_token_hash: &str,
    ) -> AppResult<Service> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        let service = sqlx::query_as::<_, Service>(
            r#"
            UPDATE services SET
                name = ?, slug = ?, url = ?, description = ?, pricing_sats = ?,
                pricing_model = ?, protocol = ?, owner_name = ?, owner_contact = ?,
                logo_url = ?, edit_token_hash = ?, domain_challenge = NULL,
                domain_challenge_expires_at = NULL, domain_verified = 0,
                status = 'unverified', updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&body.name)
        .bind(slug)
        .bind(&body.url)
        .bind(&body.description)
        .bind(body.pricing_sats)
        .bind(&body.pricing_model)
        .bind(&body.protocol)
        .bind(&body.owner_name)
        .bind(&body.owner_contact)
        .bind(&body.logo_url)
        .bind(edit_token_hash)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_categories(&mut tx, service.id, &body.category_ids).await?;
        tx.commit().await?;
        Ok(service)
    }

    /// Persist the editable profile columns of an already-merged `Service`,
    /// optionally replacing its categories in the same transaction.
    pub async fn update_profile(
        pool: &SqlitePool,
        service: &Service,
        category_ids: Option<&[i64]>,
    ) -> AppResult<Service> {
        let mut tx = pool.begin().await?;
        let updated = sqlx::query_as::<_, Service>(
            r#"
            UPDATE services SET
                name = ?, description = ?, pricing_sats = ?, pricing_model = ?,
                protocol = ?, owner_name = ?, owner_contact = ?, logo_url = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.pricing_sats)
        .bind(&service.pricing_model)
        .bind(&service.protocol)
        .bind(&service.owner_name)
        .bind(&service.owner_contact)
        .bind(&service.logo_url)
        .bind(Utc::now())
        .bind(service.id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(ids) = category_ids {
            Self::replace_categories(&mut tx, service.id, ids).await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Tombstone a listing: invisible to reads, edit token destroyed, row
    /// kept so the URL can be resubmitted in place.
    pub async fn purge(pool: &SqlitePool, id: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE services SET
                status = 'purged', edit_token_hash = NULL, domain_challenge = NULL,
                domain_challenge_expires_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_challenge(
        pool: &SqlitePool,
        id: i64,
        challenge: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE services SET domain_challenge = ?, domain_challenge_expires_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(challenge)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Rotate the edit token on every affected listing and clear the
    /// recovering listing's challenge, all in one transaction: readers see
    /// either the old state everywhere or the new state everywhere.
    pub async fn rotate_edit_tokens(
        pool: &SqlitePool,
        affected_ids: &[i64],
        new_hash: &str,
        recovering_id: i64,
    ) -> AppResult<()> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        for id in affected_ids {
            sqlx::query(
                "UPDATE services SET edit_token_hash = ?, domain_verified = 1, updated_at = ? WHERE id = ?",
            )
            .bind(new_hash)
            .bind(now)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "UPDATE services SET domain_challenge = NULL, domain_challenge_expires_at = NULL WHERE id = ?",
        )
        .bind(recovering_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // --- analytics aggregates ---

    pub async fn count_non_purged(pool: &SqlitePool) -> AppResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM services WHERE status != 'purged'")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn avg_price_sats(pool: &SqlitePool) -> AppResult<f64> {
        let avg: Option<f64> =
            sqlx::query_scalar("SELECT AVG(pricing_sats) FROM services WHERE status != 'purged'")
                .fetch_one(pool)
                .await?;
        Ok(avg.unwrap_or(0.0))
    }

    pub async fn top_rated(pool: &SqlitePool, limit: i64) -> AppResult<Vec<Service>> {
        let services = sqlx::query_as::<_, Service>(
            r#"
            SELECT * FROM services
            WHERE status != 'purged' AND rating_count >= 1
            ORDER BY avg_rating DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(services)
    }

    // --- slug helpers ---

    pub async fn unique_slug(pool: &SqlitePool, text: &str) -> AppResult<String> {
        let base = slugify(text);
        if !Self::slug_exists(pool, &base).await? {
            return Ok(base);
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{}-{}", base, counter);
            if !Self::slug_exists(pool, &candidate).await? {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    async fn slug_exists(pool: &SqlitePool, slug: &str) -> AppResult<bool> {
        // Slug uniqueness spans purged rows too; the unique index covers the
        // whole table.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services WHERE slug = ?")
            .bind(slug)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    async fn replace_categories(
        tx: &mut Transaction<'_, Sqlite>,
        service_id: i64,
        category_ids: &[i64],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM service_categories WHERE service_id = ?")
            .bind(service_id)
            .execute(&mut **tx)
            .await?;
        for category_id in category_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO service_categories (service_id, category_id) VALUES (?, ?)",
            )
            .bind(service_id)
            .bind(*category_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in text.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch);
            pending_dash = false;
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("service");
    }
    slug
}
