use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const MEDIA_COLUMNS: &str = "id, scrape_path_id, kind, catalog_id, title, original_title, year, \
     overview, content_rating, genres, actors, directors, poster_url, backdrop_url, logo_url, \
     season_count, episode_count, created_ts, updated_ts";

/// Canonical catalog-derived work, shared by every file referencing it.
#[derive(Debug, Clone)]
pub struct MediaRow {
    pub id: String,
    pub scrape_path_id: String,
    pub kind: String,
    pub catalog_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub overview: Option<String>,
    pub content_rating: Option<String>,
    pub genres: String,
    pub actors: String,
    pub directors: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub logo_url: Option<String>,
    pub season_count: i64,
    pub episode_count: i64,
    pub created_ts: i64,
    pub updated_ts: i64,
}

#[derive(Debug, Clone)]
pub struct MediaSeasonRow {
    pub id: String,
    pub media_id: String,
    pub season_number: i64,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub poster_url: Option<String>,
    pub episode_count: i64,
    pub created_ts: i64,
}

#[derive(Debug, Clone)]
pub struct MediaEpisodeRow {
    pub id: String,
    pub media_id: String,
    pub media_season_id: String,
    pub season_number: i64,
    pub episode_number: i64,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub still_url: Option<String>,
    pub created_ts: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewMedia {
    pub scrape_path_id: String,
    pub kind: String,
    pub catalog_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub overview: Option<String>,
    pub content_rating: Option<String>,
    pub genres: String,
    pub actors: String,
    pub directors: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub logo_url: Option<String>,
}

pub async fn find_by_catalog(
    pool: &SqlitePool,
    catalog_id: i64,
    kind: &str,
) -> Result<Option<MediaRow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {MEDIA_COLUMNS} FROM media WHERE catalog_id = ? AND kind = ?"
    ))
    .bind(catalog_id)
    .bind(kind)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| row_to_media(&r)))
}

/// Lookup by normalized title + year, the fallback when no catalog id is known.
pub async fn find_by_title_year(
    pool: &SqlitePool,
    kind: &str,
    title: &str,
    year: Option<i64>,
) -> Result<Option<MediaRow>, sqlx::Error> {
    let row = match year {
        Some(y) => {
            sqlx::query(&format!(
                "SELECT {MEDIA_COLUMNS} FROM media \
                 WHERE kind = ? AND LOWER(title) = LOWER(?) AND year = ?"
            ))
            .bind(kind)
            .bind(title)
            .bind(y)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {MEDIA_COLUMNS} FROM media WHERE kind = ? AND LOWER(title) = LOWER(?)"
            ))
            .bind(kind)
            .bind(title)
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(row.map(|r| row_to_media(&r)))
}

pub async fn get_media(pool: &SqlitePool, media_id: &str) -> Result<Option<MediaRow>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?"))
        .bind(media_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| row_to_media(&r)))
}

/// Insert a canonical work, or return the existing row when a concurrent
/// worker (or an earlier episode of the same show) already created it.
/// Exactly one row exists per (catalog_id, kind) pair.
pub async fn insert_or_get_media(
    pool: &SqlitePool,
    new: &NewMedia,
) -> Result<(MediaRow, bool), sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query(
        "INSERT INTO media (id, scrape_path_id, kind, catalog_id, title, original_title, year, \
         overview, content_rating, genres, actors, directors, poster_url, backdrop_url, \
         logo_url, season_count, episode_count, created_ts, updated_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?) \
         ON CONFLICT(catalog_id, kind) DO NOTHING",
    )
    .bind(&id)
    .bind(&new.scrape_path_id)
    .bind(&new.kind)
    .bind(new.catalog_id)
    .bind(&new.title)
    .bind(&new.original_title)
    .bind(new.year)
    .bind(&new.overview)
    .bind(&new.content_rating)
    .bind(&new.genres)
    .bind(&new.actors)
    .bind(&new.directors)
    .bind(&new.poster_url)
    .bind(&new.backdrop_url)
    .bind(&new.logo_url)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        return Ok((
            MediaRow {
                id,
                scrape_path_id: new.scrape_path_id.clone(),
                kind: new.kind.clone(),
                catalog_id: new.catalog_id,
                title: new.title.clone(),
                original_title: new.original_title.clone(),
                year: new.year,
                overview: new.overview.clone(),
                content_rating: new.content_rating.clone(),
                genres: new.genres.clone(),
                actors: new.actors.clone(),
                directors: new.directors.clone(),
                poster_url: new.poster_url.clone(),
                backdrop_url: new.backdrop_url.clone(),
                logo_url: new.logo_url.clone(),
                season_count: 0,
                episode_count: 0,
                created_ts: now,
                updated_ts: now,
            },
            true,
        ));
    }

    let existing = find_by_catalog(pool, new.catalog_id, &new.kind).await?;
    match existing {
        Some(row) => Ok((row, false)),
        None => Err(sqlx::Error::RowNotFound),
    }
}

pub async fn get_season(
    pool: &SqlitePool,
    media_id: &str,
    season_number: i64,
) -> Result<Option<MediaSeasonRow>, sqlx::Error> {
    let row: Option<(
        String,
        String,
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
        i64,
    )> = sqlx::query_as(
        "SELECT id, media_id, season_number, name, overview, air_date, poster_url, \
         episode_count, created_ts FROM media_season WHERE media_id = ? AND season_number = ?",
    )
    .bind(media_id)
    .bind(season_number)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_season))
}

/// Create the season row on first encounter. The parent's season counter is
/// bumped only when a row was actually inserted, never on the lookup path.
pub async fn ensure_season(
    pool: &SqlitePool,
    media_id: &str,
    season_number: i64,
    name: Option<&str>,
    overview: Option<&str>,
    air_date: Option<&str>,
    poster_url: Option<&str>,
) -> Result<(MediaSeasonRow, bool), sqlx::Error> {
    if let Some(existing) = get_season(pool, media_id, season_number).await? {
        return Ok((existing, false));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO media_season (id, media_id, season_number, name, overview, air_date, \
         poster_url, episode_count, created_ts) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?) \
         ON CONFLICT(media_id, season_number) DO NOTHING",
    )
    .bind(&id)
    .bind(media_id)
    .bind(season_number)
    .bind(name)
    .bind(overview)
    .bind(air_date)
    .bind(poster_url)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let created = result.rows_affected() > 0;
    if created {
        sqlx::query("UPDATE media SET season_count = season_count + 1, updated_ts = ? WHERE id = ?")
            .bind(now)
            .bind(media_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if created {
        Ok((
            MediaSeasonRow {
                id,
                media_id: media_id.to_string(),
                season_number,
                name: name.map(String::from),
                overview: overview.map(String::from),
                air_date: air_date.map(String::from),
                poster_url: poster_url.map(String::from),
                episode_count: 0,
                created_ts: now,
            },
            true,
        ))
    } else {
        // Lost the race to a sibling worker; return what it inserted.
        let row = get_season(pool, media_id, season_number).await?;
        match row {
            Some(r) => Ok((r, false)),
            None => Err(sqlx::Error::RowNotFound),
        }
    }
}

pub async fn get_episode(
    pool: &SqlitePool,
    media_id: &str,
    season_number: i64,
    episode_number: i64,
) -> Result<Option<MediaEpisodeRow>, sqlx::Error> {
    let row: Option<(
        String,
        String,
        String,
        i64,
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
    )> = sqlx::query_as(
        "SELECT id, media_id, media_season_id, season_number, episode_number, title, overview, \
         air_date, still_url, created_ts FROM media_episode \
         WHERE media_id = ? AND season_number = ? AND episode_number = ?",
    )
    .bind(media_id)
    .bind(season_number)
    .bind(episode_number)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_episode))
}

/// Create the episode row on first encounter, bumping both the parent work's
/// and the season's episode counters exactly once per new child.
pub async fn ensure_episode(
    pool: &SqlitePool,
    media_id: &str,
    media_season_id: &str,
    season_number: i64,
    episode_number: i64,
    title: Option<&str>,
    overview: Option<&str>,
    air_date: Option<&str>,
    still_url: Option<&str>,
) -> Result<(MediaEpisodeRow, bool), sqlx::Error> {
    if let Some(existing) = get_episode(pool, media_id, season_number, episode_number).await? {
        return Ok((existing, false));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO media_episode (id, media_id, media_season_id, season_number, \
         episode_number, title, overview, air_date, still_url, created_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(media_id, season_number, episode_number) DO NOTHING",
    )
    .bind(&id)
    .bind(media_id)
    .bind(media_season_id)
    .bind(season_number)
    .bind(episode_number)
    .bind(title)
    .bind(overview)
    .bind(air_date)
    .bind(still_url)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let created = result.rows_affected() > 0;
    if created {
        sqlx::query(
            "UPDATE media SET episode_count = episode_count + 1, updated_ts = ? WHERE id = ?",
        )
        .bind(now)
        .bind(media_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE media_season SET episode_count = episode_count + 1 WHERE id = ?")
            .bind(media_season_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if created {
        Ok((
            MediaEpisodeRow {
                id,
                media_id: media_id.to_string(),
                media_season_id: media_season_id.to_string(),
                season_number,
                episode_number,
                title: title.map(String::from),
                overview: overview.map(String::from),
                air_date: air_date.map(String::from),
                still_url: still_url.map(String::from),
                created_ts: now,
            },
            true,
        ))
    } else {
        let row = get_episode(pool, media_id, season_number, episode_number).await?;
        match row {
            Some(r) => Ok((r, false)),
            None => Err(sqlx::Error::RowNotFound),
        }
    }
}

/// Drop a canonical work and its seasons/episodes (FK cascade).
pub async fn delete_media(pool: &SqlitePool, media_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM media WHERE id = ?")
        .bind(media_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove canonical rows no longer referenced by any file row. Used after
/// failed-record cleanup so half-scraped works do not linger.
pub async fn delete_unreferenced(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM media WHERE id NOT IN \
         (SELECT media_id FROM scrape_file WHERE media_id IS NOT NULL)",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn row_to_media(r: &SqliteRow) -> MediaRow {
    MediaRow {
        id: r.get("id"),
        scrape_path_id: r.get("scrape_path_id"),
        kind: r.get("kind"),
        catalog_id: r.get("catalog_id"),
        title: r.get("title"),
        original_title: r.get("original_title"),
        year: r.get("year"),
        overview: r.get("overview"),
        content_rating: r.get("content_rating"),
        genres: r.get("genres"),
        actors: r.get("actors"),
        directors: r.get("directors"),
        poster_url: r.get("poster_url"),
        backdrop_url: r.get("backdrop_url"),
        logo_url: r.get("logo_url"),
        season_count: r.get("season_count"),
        episode_count: r.get("episode_count"),
        created_ts: r.get("created_ts"),
        updated_ts: r.get("updated_ts"),
    }
}

fn row_to_season(
    r: (
        String,
        String,
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
        i64,
    ),
) -> MediaSeasonRow {
    MediaSeasonRow {
        id: r.0,
        media_id: r.1,
        season_number: r.2,
        name: r.3,
        overview: r.4,
        air_date: r.5,
        poster_url: r.6,
        episode_count: r.7,
        created_ts: r.8,
    }
}

fn row_to_episode(
    r: (
        String,
        String,
        String,
        i64,
        i64,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
    ),
) -> MediaEpisodeRow {
    MediaEpisodeRow {
        id: r.0,
        media_id: r.1,
        media_season_id: r.2,
        season_number: r.3,
        episode_number: r.4,
        title: r.5,
        overview: r.6,
        air_date: r.7,
        still_url: r.8,
        created_ts: r.9,
    }
}
