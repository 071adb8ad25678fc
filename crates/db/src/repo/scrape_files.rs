use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const FILE_COLUMNS: &str = "id, scrape_path_id, media_kind, status, source_path, source_ident, \
     dest_path, dest_ident, show_path, show_ident, season_path, season_ident, \
     season_number, episode_number, title, year, catalog_id, media_id, media_season_id, media_episode_id, \
     new_folder_name, new_file_name, resolution, is_hdr, audio_tracks, subtitle_tracks, \
     stream_info, size_bytes, batch_no, fail_reason, created_ts, updated_ts";

const TERMINAL_STATUSES: &str = "('renamed', 'rename_failed', 'scrape_failed', 'ignore')";

/// One record per scanned video file, plus the show/season grouping context
/// for TV. Both path and ident are always carried for every location so any
/// backend addressing scheme can be served.
#[derive(Debug, Clone)]
pub struct ScrapeFileRow {
    pub id: String,
    pub scrape_path_id: String,
    pub media_kind: String,
    pub status: String,
    pub source_path: String,
    pub source_ident: String,
    pub dest_path: String,
    pub dest_ident: String,
    pub show_path: String,
    pub show_ident: String,
    pub season_path: String,
    pub season_ident: String,
    pub season_number: i64,
    pub episode_number: i64,
    pub title: String,
    pub year: Option<i64>,
    pub catalog_id: Option<i64>,
    pub media_id: Option<String>,
    pub media_season_id: Option<String>,
    pub media_episode_id: Option<String>,
    pub new_folder_name: String,
    pub new_file_name: String,
    pub resolution: Option<String>,
    pub is_hdr: bool,
    pub audio_tracks: i64,
    pub subtitle_tracks: i64,
    pub stream_info: Option<String>,
    pub size_bytes: i64,
    pub batch_no: String,
    pub fail_reason: Option<String>,
    pub created_ts: i64,
    pub updated_ts: i64,
}

/// Fields known at scan time.
#[derive(Debug, Clone, Default)]
pub struct NewScrapeFile {
    pub scrape_path_id: String,
    pub media_kind: String,
    pub source_path: String,
    pub source_ident: String,
    pub show_path: String,
    pub show_ident: String,
    pub season_path: String,
    pub season_ident: String,
    pub season_number: i64,
    pub episode_number: i64,
    pub title: String,
    pub year: Option<i64>,
    pub catalog_id: Option<i64>,
    pub resolution: Option<String>,
    pub is_hdr: bool,
    pub subtitle_tracks: i64,
    pub size_bytes: i64,
    pub batch_no: String,
}

pub async fn create_scanned(
    pool: &SqlitePool,
    new: &NewScrapeFile,
) -> Result<String, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO scrape_file (id, scrape_path_id, media_kind, status, source_path, \
         source_ident, show_path, show_ident, season_path, season_ident, season_number, \
         episode_number, title, year, catalog_id, resolution, is_hdr, subtitle_tracks, \
         size_bytes, batch_no, created_ts, updated_ts) \
         VALUES (?, ?, ?, 'scanned', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new.scrape_path_id)
    .bind(&new.media_kind)
    .bind(&new.source_path)
    .bind(&new.source_ident)
    .bind(&new.show_path)
    .bind(&new.show_ident)
    .bind(&new.season_path)
    .bind(&new.season_ident)
    .bind(new.season_number)
    .bind(new.episode_number)
    .bind(&new.title)
    .bind(new.year)
    .bind(new.catalog_id)
    .bind(&new.resolution)
    .bind(new.is_hdr)
    .bind(new.subtitle_tracks)
    .bind(new.size_bytes)
    .bind(&new.batch_no)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn get_scrape_file(
    pool: &SqlitePool,
    file_id: &str,
) -> Result<Option<ScrapeFileRow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM scrape_file WHERE id = ?"
    ))
    .bind(file_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_file(&r)))
}

pub async fn find_by_source(
    pool: &SqlitePool,
    scrape_path_id: &str,
    source_path: &str,
) -> Result<Option<ScrapeFileRow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM scrape_file WHERE scrape_path_id = ? AND source_path = ?"
    ))
    .bind(scrape_path_id)
    .bind(source_path)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_file(&r)))
}

pub async fn list_by_status(
    pool: &SqlitePool,
    scrape_path_id: &str,
    status: &str,
) -> Result<Vec<ScrapeFileRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM scrape_file \
         WHERE scrape_path_id = ? AND status = ? ORDER BY source_path"
    ))
    .bind(scrape_path_id)
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_file).collect())
}

/// Rows across all paths currently awaiting the rollback sweep.
pub async fn list_rollbacking(pool: &SqlitePool) -> Result<Vec<ScrapeFileRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM scrape_file WHERE status = 'rollbacking' ORDER BY updated_ts"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_file).collect())
}

/// Every file of the same logical work discovered in the same scan pass.
pub async fn siblings_in_batch(
    pool: &SqlitePool,
    media_id: &str,
    batch_no: &str,
) -> Result<Vec<ScrapeFileRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM scrape_file WHERE media_id = ? AND batch_no = ?"
    ))
    .bind(media_id)
    .bind(batch_no)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_file).collect())
}

/// Siblings that share a show directory and batch, matched before enrichment
/// has linked them to a canonical work.
pub async fn siblings_by_show(
    pool: &SqlitePool,
    scrape_path_id: &str,
    show_ident: &str,
    batch_no: &str,
) -> Result<Vec<ScrapeFileRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM scrape_file \
         WHERE scrape_path_id = ? AND show_ident = ? AND batch_no = ?"
    ))
    .bind(scrape_path_id)
    .bind(show_ident)
    .bind(batch_no)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_file).collect())
}

/// Number of batch siblings that have not yet reached a terminal status.
pub async fn count_unfinished_in_batch(
    pool: &SqlitePool,
    media_id: &str,
    batch_no: &str,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM scrape_file \
         WHERE media_id = ? AND batch_no = ? AND status NOT IN {TERMINAL_STATUSES}"
    ))
    .bind(media_id)
    .bind(batch_no)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn update_status(
    pool: &SqlitePool,
    file_id: &str,
    status: &str,
    fail_reason: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE scrape_file SET status = ?, fail_reason = ?, updated_ts = ? WHERE id = ?",
    )
    .bind(status)
    .bind(fail_reason)
    .bind(now)
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Store the identification derived from filename heuristics or a user
/// override.
pub async fn set_identified(
    pool: &SqlitePool,
    file_id: &str,
    title: &str,
    year: Option<i64>,
    catalog_id: Option<i64>,
    season_number: i64,
    episode_number: i64,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE scrape_file SET title = ?, year = ?, catalog_id = ?, season_number = ?, \
         episode_number = ?, updated_ts = ? WHERE id = ?",
    )
    .bind(title)
    .bind(year)
    .bind(catalog_id)
    .bind(season_number)
    .bind(episode_number)
    .bind(now)
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn link_media(
    pool: &SqlitePool,
    file_id: &str,
    media_id: &str,
    media_season_id: Option<&str>,
    media_episode_id: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE scrape_file SET media_id = ?, media_season_id = ?, media_episode_id = ?, \
         updated_ts = ? WHERE id = ?",
    )
    .bind(media_id)
    .bind(media_season_id)
    .bind(media_episode_id)
    .bind(now)
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record the computed name fragments so later display never recomputes them.
pub async fn set_generated_names(
    pool: &SqlitePool,
    file_id: &str,
    new_folder_name: &str,
    new_file_name: &str,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE scrape_file SET new_folder_name = ?, new_file_name = ?, updated_ts = ? \
         WHERE id = ?",
    )
    .bind(new_folder_name)
    .bind(new_file_name)
    .bind(now)
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_dest(
    pool: &SqlitePool,
    file_id: &str,
    dest_path: &str,
    dest_ident: &str,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result =
        sqlx::query("UPDATE scrape_file SET dest_path = ?, dest_ident = ?, updated_ts = ? WHERE id = ?")
            .bind(dest_path)
            .bind(dest_ident)
            .bind(now)
            .bind(file_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Reset a record to its pre-scrape shape: identification rewritten, canonical
/// links and generated names cleared, status back to `scanned`.
pub async fn reset_to_scanned(
    pool: &SqlitePool,
    file_id: &str,
    title: &str,
    year: Option<i64>,
    catalog_id: Option<i64>,
    season_number: i64,
    episode_number: i64,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE scrape_file SET status = 'scanned', title = ?, year = ?, catalog_id = ?, \
         season_number = ?, episode_number = ?, media_id = NULL, media_season_id = NULL, \
         media_episode_id = NULL, new_folder_name = '', new_file_name = '', dest_path = '', \
         dest_ident = '', fail_reason = NULL, updated_ts = ? WHERE id = ?",
    )
    .bind(title)
    .bind(year)
    .bind(catalog_id)
    .bind(season_number)
    .bind(episode_number)
    .bind(now)
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_scrape_file(pool: &SqlitePool, file_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM scrape_file WHERE id = ?")
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn row_to_file(r: &SqliteRow) -> ScrapeFileRow {
    ScrapeFileRow {
        id: r.get("id"),
        scrape_path_id: r.get("scrape_path_id"),
        media_kind: r.get("media_kind"),
        status: r.get("status"),
        source_path: r.get("source_path"),
        source_ident: r.get("source_ident"),
        dest_path: r.get("dest_path"),
        dest_ident: r.get("dest_ident"),
        show_path: r.get("show_path"),
        show_ident: r.get("show_ident"),
        season_path: r.get("season_path"),
        season_ident: r.get("season_ident"),
        season_number: r.get("season_number"),
        episode_number: r.get("episode_number"),
        title: r.get("title"),
        year: r.get("year"),
        catalog_id: r.get("catalog_id"),
        media_id: r.get("media_id"),
        media_season_id: r.get("media_season_id"),
        media_episode_id: r.get("media_episode_id"),
        new_folder_name: r.get("new_folder_name"),
        new_file_name: r.get("new_file_name"),
        resolution: r.get("resolution"),
        is_hdr: r.get("is_hdr"),
        audio_tracks: r.get("audio_tracks"),
        subtitle_tracks: r.get("subtitle_tracks"),
        stream_info: r.get("stream_info"),
        size_bytes: r.get("size_bytes"),
        batch_no: r.get("batch_no"),
        fail_reason: r.get("fail_reason"),
        created_ts: r.get("created_ts"),
        updated_ts: r.get("updated_ts"),
    }
}
