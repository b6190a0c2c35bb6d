// crates/trustwatch-db/src/offsets.rs
use crate::DbError;
use sqlx::PgPool;

/// Records the next offset to poll for a brand partition. Committed after the
/// store acknowledges every effect of the record, so a crash replays at most
/// the uncommitted tail.
///
/// # Errors
///
/// Returns `DbError` on database query failure.
pub async fn commit_offset(pool: &PgPool, brand: &str, offset: i64) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO partition_offsets (brand, committed_offset) \
         VALUES ($1, $2) \
         ON CONFLICT (brand) DO UPDATE SET \
           committed_offset = EXCLUDED.committed_offset, \
           updated_at = NOW()",
    )
    .bind(brand)
    .bind(offset)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the committed offset for a brand partition, or 0 for a partition
/// that has never been polled.
///
/// # Errors
///
/// Returns `DbError` on database query failure.
pub async fn get_committed_offset(pool: &PgPool, brand: &str) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar::<_, i64>(
        "SELECT committed_offset FROM partition_offsets WHERE brand = $1",
    )
    .bind(brand)
    .fetch_optional(pool)
    .await?
    .unwrap_or(0))
}
