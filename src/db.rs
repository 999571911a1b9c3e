use sqlx::SqlitePool;

/// Create the chat tables if they are not there yet. Ids and timestamps are
/// assigned by sqlite on insert.
pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chattings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id TEXT,
            send_user_id INTEGER NOT NULL,
            message TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}
