use sqlx::SqlitePool;

/// One classification bucket mapped to a destination-backend folder.
/// An empty `folder_ident` means recognized but not yet provisioned.
#[derive(Debug, Clone)]
pub struct CategoryRow {
    pub id: String,
    pub scrape_path_id: String,
    pub name: String,
    pub folder_ident: String,
    pub folder_path: String,
    pub created_ts: i64,
}

pub async fn list_for_path(
    pool: &SqlitePool,
    scrape_path_id: &str,
) -> Result<Vec<CategoryRow>, sqlx::Error> {
    let rows: Vec<(String, String, String, String, String, i64)> = sqlx::query_as(
        "SELECT id, scrape_path_id, name, folder_ident, folder_path, created_ts \
         FROM scrape_category WHERE scrape_path_id = ? ORDER BY name",
    )
    .bind(scrape_path_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_category).collect())
}

pub async fn get_by_name(
    pool: &SqlitePool,
    scrape_path_id: &str,
    name: &str,
) -> Result<Option<CategoryRow>, sqlx::Error> {
    let row: Option<(String, String, String, String, String, i64)> = sqlx::query_as(
        "SELECT id, scrape_path_id, name, folder_ident, folder_path, created_ts \
         FROM scrape_category WHERE scrape_path_id = ? AND name = ?",
    )
    .bind(scrape_path_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_category))
}

/// Insert a bucket mapping with no folder yet; no-op if it already exists.
pub async fn insert_if_absent(
    pool: &SqlitePool,
    scrape_path_id: &str,
    name: &str,
) -> Result<CategoryRow, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO scrape_category (id, scrape_path_id, name, folder_ident, folder_path, created_ts) \
         VALUES (?, ?, ?, '', '', ?) ON CONFLICT(scrape_path_id, name) DO NOTHING",
    )
    .bind(&id)
    .bind(scrape_path_id)
    .bind(name)
    .bind(now)
    .execute(pool)
    .await?;

    let row = get_by_name(pool, scrape_path_id, name).await?;
    match row {
        Some(r) => Ok(r),
        None => Err(sqlx::Error::RowNotFound),
    }
}

/// Record the provisioned folder for a bucket.
pub async fn set_folder(
    pool: &SqlitePool,
    category_id: &str,
    folder_ident: &str,
    folder_path: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE scrape_category SET folder_ident = ?, folder_path = ? WHERE id = ?",
    )
    .bind(folder_ident)
    .bind(folder_path)
    .bind(category_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Drop the mapping row for a retired bucket. The on-backend folder is left
/// alone; a taxonomy edit must never destroy user data.
pub async fn delete_category(pool: &SqlitePool, category_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM scrape_category WHERE id = ?")
        .bind(category_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn row_to_category(r: (String, String, String, String, String, i64)) -> CategoryRow {
    CategoryRow {
        id: r.0,
        scrape_path_id: r.1,
        name: r.2,
        folder_ident: r.3,
        folder_path: r.4,
        created_ts: r.5,
    }
}
