use sqlx::SqlitePool;

/// One outstanding placement sub-task handed to the upload/download queue.
/// Persisted so the batch coordinator's "zero outstanding sub-tasks" check
/// survives process restarts.
#[derive(Debug, Clone)]
pub struct TransferTaskRow {
    pub id: String,
    pub scrape_file_id: String,
    pub batch_no: String,
    pub artifact: String,
    pub source_path: String,
    pub source_url: Option<String>,
    pub dest_path: String,
    pub dest_ident: String,
    pub status: String,
    pub reason: Option<String>,
    pub created_ts: i64,
    pub updated_ts: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewTransferTask {
    pub scrape_file_id: String,
    pub batch_no: String,
    pub artifact: String,
    pub source_path: String,
    pub source_url: Option<String>,
    pub dest_path: String,
    pub dest_ident: String,
}

pub async fn create_task(
    pool: &SqlitePool,
    new: &NewTransferTask,
) -> Result<TransferTaskRow, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO transfer_task (id, scrape_file_id, batch_no, artifact, source_path, \
         source_url, dest_path, dest_ident, status, created_ts, updated_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'queued', ?, ?)",
    )
    .bind(&id)
    .bind(&new.scrape_file_id)
    .bind(&new.batch_no)
    .bind(&new.artifact)
    .bind(&new.source_path)
    .bind(&new.source_url)
    .bind(&new.dest_path)
    .bind(&new.dest_ident)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(TransferTaskRow {
        id,
        scrape_file_id: new.scrape_file_id.clone(),
        batch_no: new.batch_no.clone(),
        artifact: new.artifact.clone(),
        source_path: new.source_path.clone(),
        source_url: new.source_url.clone(),
        dest_path: new.dest_path.clone(),
        dest_ident: new.dest_ident.clone(),
        status: "queued".to_string(),
        reason: None,
        created_ts: now,
        updated_ts: now,
    })
}

pub async fn mark_done(pool: &SqlitePool, task_id: &str) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result =
        sqlx::query("UPDATE transfer_task SET status = 'done', updated_ts = ? WHERE id = ?")
            .bind(now)
            .bind(task_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_failed(
    pool: &SqlitePool,
    task_id: &str,
    reason: &str,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE transfer_task SET status = 'failed', reason = ?, updated_ts = ? WHERE id = ?",
    )
    .bind(reason)
    .bind(now)
    .bind(task_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Outstanding sub-tasks for one file.
pub async fn pending_for_file(
    pool: &SqlitePool,
    scrape_file_id: &str,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM transfer_task WHERE scrape_file_id = ? AND status = 'queued'",
    )
    .bind(scrape_file_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Outstanding sub-tasks across a whole batch.
pub async fn pending_for_batch(pool: &SqlitePool, batch_no: &str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM transfer_task WHERE batch_no = ? AND status = 'queued'",
    )
    .bind(batch_no)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
