use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use crate::core::naming::is_sql_identifier;

/// Where a many-to-many relation keeps its membership rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotSpec {
    pub table: String,
    pub foreign_pivot_key: String,
    pub related_pivot_key: String,
    pub related_table: String,
    pub related_key: String,
}

/// Where a one-to-many relation finds its child rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    pub table: String,
    pub foreign_key: String,
    pub key: String,
}

/// Storage primitives the relation handle is built on. Set algebra for
/// attach/detach/sync is done by the caller; backends only move rows.
#[async_trait]
pub trait RelationStore: Send + Sync {
    async fn find(&self, table: &str, key: &str, id: i64) -> Result<Option<Value>, StoreError>;

    async fn related_keys(&self, pivot: &PivotSpec, owner: i64) -> Result<Vec<i64>, StoreError>;

    async fn insert_pivot(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        related: &[i64],
    ) -> Result<(), StoreError>;

    async fn delete_pivot(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        related: &[i64],
    ) -> Result<u64, StoreError>;

    /// Related rows ordered by related key, each with a `pivot` object.
    async fn related_page(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError>;

    /// Child rows whose foreign key is `owner`, ordered by their own key.
    async fn child_page(
        &self,
        child: &ChildSpec,
        owner: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("row {key} does not exist in '{table}'")]
    ForeignKey { table: String, key: i64 },
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

impl StoreError {
    /// Constraint failures are caused by the request (e.g. an id that does
    /// not exist); everything else is a fault of the service.
    pub fn is_constraint(&self) -> bool {
        match self {
            StoreError::ForeignKey { .. } => true,
            StoreError::Sql(sqlx::Error::Database(db_err)) => {
                db_err.is_foreign_key_violation() || db_err.is_unique_violation()
            }
            _ => false,
        }
    }
}

fn quote(ident: &str) -> Result<String, StoreError> {
    if is_sql_identifier(ident) {
        Ok(format!("\"{ident}\""))
    } else {
        Err(StoreError::InvalidIdentifier(ident.to_string()))
    }
}

// Pivot columns are often `integer`; the cast lets them decode as i64.
fn related_keys_sql(pivot: &PivotSpec) -> Result<String, StoreError> {
    Ok(format!(
        "SELECT {rk}::bigint FROM {table} WHERE {fk} = $1 ORDER BY {rk}",
        rk = quote(&pivot.related_pivot_key)?,
        table = quote(&pivot.table)?,
        fk = quote(&pivot.foreign_pivot_key)?,
    ))
}

fn child_page_sql(child: &ChildSpec) -> Result<String, StoreError> {
    Ok(format!(
        "SELECT to_jsonb(c) FROM {table} c WHERE c.{fk} = $1 ORDER BY c.{key} LIMIT $2 OFFSET $3",
        table = quote(&child.table)?,
        fk = quote(&child.foreign_key)?,
        key = quote(&child.key)?,
    ))
}

#[derive(Clone)]
pub struct PgRelationStore {
    pool: PgPool,
}

impl PgRelationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationStore for PgRelationStore {
    async fn find(&self, table: &str, key: &str, id: i64) -> Result<Option<Value>, StoreError> {
        let sql = format!(
            "SELECT to_jsonb(t) FROM {} t WHERE t.{} = $1",
            quote(table)?,
            quote(key)?
        );
        let row: Option<(Value,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn related_keys(&self, pivot: &PivotSpec, owner: i64) -> Result<Vec<i64>, StoreError> {
        let sql = related_keys_sql(pivot)?;
        let rows: Vec<(i64,)> = sqlx::query_as(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn insert_pivot(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        related: &[i64],
    ) -> Result<(), StoreError> {
        if related.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT INTO {table} ({fk}, {rk}) SELECT $1, UNNEST($2::bigint[])",
            table = quote(&pivot.table)?,
            fk = quote(&pivot.foreign_pivot_key)?,
            rk = quote(&pivot.related_pivot_key)?,
        );
        sqlx::query(&sql)
            .bind(owner)
            .bind(related)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_pivot(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        related: &[i64],
    ) -> Result<u64, StoreError> {
        if related.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {table} WHERE {fk} = $1 AND {rk} = ANY($2)",
            table = quote(&pivot.table)?,
            fk = quote(&pivot.foreign_pivot_key)?,
            rk = quote(&pivot.related_pivot_key)?,
        );
        let result = sqlx::query(&sql)
            .bind(owner)
            .bind(related)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn related_page(
        &self,
        pivot: &PivotSpec,
        owner: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError> {
        let fk = quote(&pivot.foreign_pivot_key)?;
        let rk = quote(&pivot.related_pivot_key)?;
        let sql = format!(
            r#"
            SELECT to_jsonb(r) || jsonb_build_object(
                'pivot', jsonb_build_object('{fk_name}', p.{fk}, '{rk_name}', p.{rk})
            )
            FROM {related} r
            JOIN {table} p ON p.{rk} = r.{related_key}
            WHERE p.{fk} = $1
            ORDER BY r.{related_key}
            LIMIT $2 OFFSET $3
            "#,
            fk_name = pivot.foreign_pivot_key,
            rk_name = pivot.related_pivot_key,
            related = quote(&pivot.related_table)?,
            table = quote(&pivot.table)?,
            related_key = quote(&pivot.related_key)?,
        );
        let rows: Vec<(Value,)> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(row,)| row).collect())
    }

    async fn child_page(
        &self,
        child: &ChildSpec,
        owner: i64,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>, StoreError> {
        let sql = child_page_sql(child)?;
        let rows: Vec<(Value,)> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(row,)| row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_wraps_plain_identifiers() {
        assert_eq!(quote("role_user").unwrap(), "\"role_user\"");
    }

    #[test]
    fn related_keys_are_read_as_bigint() {
        let pivot = PivotSpec {
            table: "role_user".into(),
            foreign_pivot_key: "user_id".into(),
            related_pivot_key: "role_id".into(),
            related_table: "roles".into(),
            related_key: "id".into(),
        };
        assert_eq!(
            related_keys_sql(&pivot).unwrap(),
            r#"SELECT "role_id"::bigint FROM "role_user" WHERE "user_id" = $1 ORDER BY "role_id""#
        );
    }

    #[test]
    fn child_page_filters_on_foreign_key() {
        let child = ChildSpec {
            table: "posts".into(),
            foreign_key: "user_id".into(),
            key: "id".into(),
        };
        let sql = child_page_sql(&child).unwrap();
        assert!(sql.contains(r#"FROM "posts" c WHERE c."user_id" = $1"#));
        assert!(sql.ends_with(r#"ORDER BY c."id" LIMIT $2 OFFSET $3"#));
    }

    #[test]
    fn quote_rejects_injection() {
        let err = quote("users\"; DROP TABLE users; --").unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier(_)));
        assert!(!err.is_constraint());
    }

    #[test]
    fn foreign_key_errors_are_constraints() {
        let err = StoreError::ForeignKey {
            table: "roles".into(),
            key: 9,
        };
        assert!(err.is_constraint());
        assert!(!StoreError::Sql(sqlx::Error::RowNotFound).is_constraint());
    }
}
