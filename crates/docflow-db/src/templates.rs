//! Extraction template repository implementation.
//!
//! Templates carry a pgvector embedding over `"{supplier} {client_name}"`;
//! similarity search uses cosine distance (`<=>`) with the score reported
//! as `1 - distance`.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use docflow_core::{
    new_v7, Error, ExtractionTemplate, Result, SuggestedField, TemplateRepository,
    UpsertTemplateRequest,
};

/// PostgreSQL implementation of [`TemplateRepository`].
pub struct PgTemplateRepository {
    pool: PgPool,
}

impl PgTemplateRepository {
    /// Create a new PgTemplateRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn template_from_row(row: &PgRow) -> Result<ExtractionTemplate> {
        let header: JsonValue = row.get("header_fields");
        let line: JsonValue = row.get("line_item_fields");
        Ok(ExtractionTemplate {
            id: row.get("id"),
            client_id: row.get("client_id"),
            supplier: row.get("supplier"),
            client_name: row.get("client_name"),
            header_fields: serde_json::from_value::<Vec<SuggestedField>>(header)?,
            line_item_fields: serde_json::from_value::<Vec<SuggestedField>>(line)?,
            created_at: row.get("created_at"),
            created_by: row.get("created_by"),
        })
    }

    const TEMPLATE_COLUMNS: &'static str = "id, client_id, supplier, client_name, header_fields, \
         line_item_fields, created_at, created_by";
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    async fn insert(&self, req: UpsertTemplateRequest, embedding: Vec<f32>) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            r#"
            INSERT INTO extraction_template
                (id, client_id, supplier, client_name, header_fields, line_item_fields,
                 embedding, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(req.client_id)
        .bind(&req.supplier)
        .bind(&req.client_name)
        .bind(serde_json::to_value(&req.header_fields)?)
        .bind(serde_json::to_value(&req.line_item_fields)?)
        .bind(Vector::from(embedding))
        .bind(Utc::now())
        .bind(req.created_by)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn update(
        &self,
        id: Uuid,
        req: UpsertTemplateRequest,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE extraction_template
            SET supplier = $2, client_name = $3, header_fields = $4,
                line_item_fields = $5, embedding = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&req.supplier)
        .bind(&req.client_name)
        .bind(serde_json::to_value(&req.header_fields)?)
        .bind(serde_json::to_value(&req.line_item_fields)?)
        .bind(Vector::from(embedding))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::TemplateNotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExtractionTemplate>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM extraction_template WHERE id = $1",
            Self::TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::template_from_row).transpose()
    }

    async fn find_by_client_supplier(
        &self,
        client_id: Option<Uuid>,
        supplier: &str,
    ) -> Result<Option<ExtractionTemplate>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM extraction_template \
             WHERE client_id IS NOT DISTINCT FROM $1 AND supplier = $2",
            Self::TEMPLATE_COLUMNS
        ))
        .bind(client_id)
        .bind(supplier)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::template_from_row).transpose()
    }

    async fn find_similar(
        &self,
        query: &[f32],
        limit: i64,
    ) -> Result<Vec<(ExtractionTemplate, f32)>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, 1.0 - (embedding <=> $1::vector) AS score \
             FROM extraction_template \
             ORDER BY embedding <=> $1::vector \
             LIMIT $2",
            Self::TEMPLATE_COLUMNS
        ))
        .bind(Vector::from(query.to_vec()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                let template = Self::template_from_row(row)?;
                let score: f64 = row.get("score");
                Ok((template, score as f32))
            })
            .collect()
    }
}
