use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const PATH_COLUMNS: &str = "id, name, backend_kind, media_kind, source_path, source_ident, \
     dest_path, dest_ident, transfer_mode, scrape_mode, folder_template, file_template, \
     classify, min_video_size_mb, ai_assist, ai_prompt, strip_keywords, max_workers, \
     is_scraping, created_ts, updated_ts";

/// One configured library mapping.
#[derive(Debug, Clone)]
pub struct ScrapePathRow {
    pub id: String,
    pub name: String,
    pub backend_kind: String,
    pub media_kind: String,
    pub source_path: String,
    pub source_ident: String,
    pub dest_path: String,
    pub dest_ident: String,
    pub transfer_mode: String,
    pub scrape_mode: String,
    pub folder_template: String,
    pub file_template: String,
    pub classify: bool,
    pub min_video_size_mb: i64,
    pub ai_assist: bool,
    pub ai_prompt: Option<String>,
    pub strip_keywords: String,
    pub max_workers: i64,
    pub is_scraping: bool,
    pub created_ts: i64,
    pub updated_ts: i64,
}

/// Fields supplied when creating a scrape path; the rest use schema defaults.
#[derive(Debug, Clone)]
pub struct NewScrapePath {
    pub name: String,
    pub backend_kind: String,
    pub media_kind: String,
    pub source_path: String,
    pub source_ident: String,
    pub dest_path: String,
    pub dest_ident: String,
    pub transfer_mode: String,
    pub scrape_mode: String,
    pub folder_template: String,
    pub file_template: String,
    pub classify: bool,
    pub min_video_size_mb: i64,
    pub ai_assist: bool,
    pub ai_prompt: Option<String>,
    pub strip_keywords: String,
    pub max_workers: i64,
}

impl Default for NewScrapePath {
    fn default() -> Self {
        Self {
            name: String::new(),
            backend_kind: "local".into(),
            media_kind: "movie".into(),
            source_path: String::new(),
            source_ident: String::new(),
            dest_path: String::new(),
            dest_ident: String::new(),
            transfer_mode: "move".into(),
            scrape_mode: "scrape_rename".into(),
            folder_template: "{title} ({year})".into(),
            file_template: "{title} ({year}) - {se}".into(),
            classify: false,
            min_video_size_mb: 100,
            ai_assist: false,
            ai_prompt: None,
            strip_keywords: "[]".into(),
            max_workers: 0,
        }
    }
}

pub async fn create_scrape_path(
    pool: &SqlitePool,
    new: &NewScrapePath,
) -> Result<ScrapePathRow, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO scrape_path (id, name, backend_kind, media_kind, source_path, source_ident, \
         dest_path, dest_ident, transfer_mode, scrape_mode, folder_template, file_template, \
         classify, min_video_size_mb, ai_assist, ai_prompt, strip_keywords, max_workers, \
         is_scraping, created_ts, updated_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(&id)
    .bind(&new.name)
    .bind(&new.backend_kind)
    .bind(&new.media_kind)
    .bind(&new.source_path)
    .bind(&new.source_ident)
    .bind(&new.dest_path)
    .bind(&new.dest_ident)
    .bind(&new.transfer_mode)
    .bind(&new.scrape_mode)
    .bind(&new.folder_template)
    .bind(&new.file_template)
    .bind(new.classify)
    .bind(new.min_video_size_mb)
    .bind(new.ai_assist)
    .bind(&new.ai_prompt)
    .bind(&new.strip_keywords)
    .bind(new.max_workers)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(ScrapePathRow {
        id,
        name: new.name.clone(),
        backend_kind: new.backend_kind.clone(),
        media_kind: new.media_kind.clone(),
        source_path: new.source_path.clone(),
        source_ident: new.source_ident.clone(),
        dest_path: new.dest_path.clone(),
        dest_ident: new.dest_ident.clone(),
        transfer_mode: new.transfer_mode.clone(),
        scrape_mode: new.scrape_mode.clone(),
        folder_template: new.folder_template.clone(),
        file_template: new.file_template.clone(),
        classify: new.classify,
        min_video_size_mb: new.min_video_size_mb,
        ai_assist: new.ai_assist,
        ai_prompt: new.ai_prompt.clone(),
        strip_keywords: new.strip_keywords.clone(),
        max_workers: new.max_workers,
        is_scraping: false,
        created_ts: now,
        updated_ts: now,
    })
}

pub async fn get_scrape_path(
    pool: &SqlitePool,
    path_id: &str,
) -> Result<Option<ScrapePathRow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM scrape_path WHERE id = ?"
    ))
    .bind(path_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_path(&r)))
}

pub async fn list_scrape_paths(pool: &SqlitePool) -> Result<Vec<ScrapePathRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM scrape_path ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_path).collect())
}

/// Persist the running flag so a crash mid-run is externally observable.
pub async fn set_scraping(
    pool: &SqlitePool,
    path_id: &str,
    scraping: bool,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("UPDATE scrape_path SET is_scraping = ?, updated_ts = ? WHERE id = ?")
        .bind(scraping)
        .bind(now)
        .bind(path_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Clear `is_scraping` on every path; run at startup after a crash.
pub async fn reset_stuck_runs(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE scrape_path SET is_scraping = 0, updated_ts = ? WHERE is_scraping = 1",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Delete a scrape path unless a run is in progress.
///
/// File rows and category rows go with the path (FK cascade). Canonical
/// media rows created by this path are removed afterwards unless some other
/// path still references them.
pub async fn delete_scrape_path(pool: &SqlitePool, path_id: &str) -> Result<bool, sqlx::Error> {
    let running: Option<(bool,)> =
        sqlx::query_as("SELECT is_scraping FROM scrape_path WHERE id = ?")
            .bind(path_id)
            .fetch_optional(pool)
            .await?;

    match running {
        None => return Ok(false),
        Some((true,)) => return Ok(false),
        Some((false,)) => {}
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM scrape_path WHERE id = ?")
        .bind(path_id)
        .execute(&mut *tx)
        .await?;

    // Canonical rows survive only while a file row somewhere references them.
    sqlx::query(
        "DELETE FROM media WHERE scrape_path_id = ? \
         AND id NOT IN (SELECT media_id FROM scrape_file WHERE media_id IS NOT NULL)",
    )
    .bind(path_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_path(r: &SqliteRow) -> ScrapePathRow {
    ScrapePathRow {
        id: r.get("id"),
        name: r.get("name"),
        backend_kind: r.get("backend_kind"),
        media_kind: r.get("media_kind"),
        source_path: r.get("source_path"),
        source_ident: r.get("source_ident"),
        dest_path: r.get("dest_path"),
        dest_ident: r.get("dest_ident"),
        transfer_mode: r.get("transfer_mode"),
        scrape_mode: r.get("scrape_mode"),
        folder_template: r.get("folder_template"),
        file_template: r.get("file_template"),
        classify: r.get("classify"),
        min_video_size_mb: r.get("min_video_size_mb"),
        ai_assist: r.get("ai_assist"),
        ai_prompt: r.get("ai_prompt"),
        strip_keywords: r.get("strip_keywords"),
        max_workers: r.get("max_workers"),
        is_scraping: r.get("is_scraping"),
        created_ts: r.get("created_ts"),
        updated_ts: r.get("updated_ts"),
    }
}
