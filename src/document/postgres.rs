use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Pool, Postgres};

use super::{Document, DocumentError, DocumentStore, DocumentWrite};

/// Document store backed by the `documents` table.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: Pool<Postgres>,
}

impl PostgresDocumentStore {
    /// Create a new [`PostgresDocumentStore`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentError> {
        let fields = sqlx::query_scalar::<_, Json<Document>>(
            r#"SELECT fields FROM documents WHERE collection = $1 AND id = $2"#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(fields.map(|Json(document)| document))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        write: DocumentWrite,
    ) -> Result<(), DocumentError> {
        let mut tx = self.pool.begin().await?;

        // Server timestamps follow the database clock.
        let now = sqlx::query_scalar::<_, DateTime<Utc>>("SELECT now()")
            .fetch_one(&mut *tx)
            .await?;
        let document = write.resolve(now);

        sqlx::query(
            r#"INSERT INTO documents (collection, id, fields)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET fields = EXCLUDED.fields"#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&document))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
