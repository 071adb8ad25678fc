//! End-to-end pipeline scenarios against an in-memory database, a temp-dir
//! local backend, and a mock catalog.

use std::path::Path;
use std::sync::Arc;

use medorg_backend::local::LocalBackend;
use medorg_backend::StorageBackend;
use medorg_catalog::provider::{Candidate, CatalogProvider};
use medorg_catalog::{CatalogError, EpisodeDetail, SeasonDetail, WorkDetail};
use medorg_db::repo::{media, scrape_files, scrape_paths};
use medorg_scrape::orchestrator::{Orchestrator, OrchestratorOptions};
use medorg_scrape::rollback::{self, RescrapeRequest};
use sqlx::SqlitePool;

/// Catalog double: one movie and one TV show, with a switch that makes every
/// search ambiguous.
struct MockCatalog {
    movie: WorkDetail,
    tv: WorkDetail,
    ambiguous: bool,
}

impl MockCatalog {
    fn new() -> Self {
        Self {
            movie: WorkDetail {
                catalog_id: 603,
                title: "The Matrix".into(),
                year: Some(1999),
                overview: Some("A hacker learns the truth.".into()),
                content_rating: Some("R".into()),
                genres: vec!["Action".into(), "Science Fiction".into()],
                actors: vec!["Keanu Reeves".into()],
                directors: vec!["Lana Wachowski".into()],
                ..Default::default()
            },
            tv: WorkDetail {
                catalog_id: 123,
                title: "Show".into(),
                year: Some(2008),
                overview: Some("A show about a show.".into()),
                content_rating: Some("TV-14".into()),
                genres: vec!["Drama".into()],
                actors: vec!["Lead Actor".into()],
                directors: vec![],
                ..Default::default()
            },
            ambiguous: false,
        }
    }

    fn candidate(detail: &WorkDetail) -> Candidate {
        Candidate {
            catalog_id: detail.catalog_id,
            title: detail.title.clone(),
            year: detail.year,
            overview: detail.overview.clone(),
            poster_url: None,
        }
    }
}

#[async_trait::async_trait]
impl CatalogProvider for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_movie(
        &self,
        _title: &str,
        _year: Option<i32>,
        _language: &str,
    ) -> Result<Vec<Candidate>, CatalogError> {
        if self.ambiguous {
            return Ok(vec![
                Self::candidate(&self.movie),
                Self::candidate(&self.tv),
            ]);
        }
        Ok(vec![Self::candidate(&self.movie)])
    }

    async fn search_tv(
        &self,
        _title: &str,
        _year: Option<i32>,
        _language: &str,
    ) -> Result<Vec<Candidate>, CatalogError> {
        if self.ambiguous {
            return Ok(vec![Self::candidate(&self.tv), Self::candidate(&self.movie)]);
        }
        Ok(vec![Self::candidate(&self.tv)])
    }

    async fn movie_detail(
        &self,
        catalog_id: i64,
        _language: &str,
    ) -> Result<WorkDetail, CatalogError> {
        if catalog_id == self.movie.catalog_id {
            Ok(self.movie.clone())
        } else {
            Err(CatalogError::NotFound)
        }
    }

    async fn tv_detail(&self, catalog_id: i64, _language: &str) -> Result<WorkDetail, CatalogError> {
        if catalog_id == self.tv.catalog_id {
            Ok(self.tv.clone())
        } else {
            Err(CatalogError::NotFound)
        }
    }

    async fn season_detail(
        &self,
        _tv_catalog_id: i64,
        season_number: i32,
        _language: &str,
    ) -> Result<SeasonDetail, CatalogError> {
        Ok(SeasonDetail {
            season_number,
            name: Some(format!("Season {season_number}")),
            overview: None,
            air_date: Some("2008-01-20".into()),
            poster_url: None,
            episodes: Vec::new(),
        })
    }

    async fn episode_detail(
        &self,
        _tv_catalog_id: i64,
        season_number: i32,
        episode_number: i32,
        _language: &str,
    ) -> Result<EpisodeDetail, CatalogError> {
        Ok(EpisodeDetail {
            season_number,
            episode_number,
            title: Some(format!("Episode {episode_number}")),
            overview: None,
            air_date: None,
            still_url: None,
        })
    }
}

/// Pooled SQLite connections each see a private `:memory:` database, so the
/// tests use a throwaway file in the test's temp dir instead.
async fn test_pool(dir: &Path) -> SqlitePool {
    let db_path = dir.join("medorg-test.db");
    let pool = medorg_db::connect(&db_path.to_string_lossy())
        .await
        .unwrap();
    medorg_db::migrate::run(&pool).await.unwrap();
    pool
}

async fn make_path(
    pool: &SqlitePool,
    media_kind: &str,
    scrape_mode: &str,
    source: &Path,
    dest: &Path,
) -> scrape_paths::ScrapePathRow {
    scrape_paths::create_scrape_path(
        pool,
        &scrape_paths::NewScrapePath {
            name: format!("{media_kind} library"),
            media_kind: media_kind.into(),
            scrape_mode: scrape_mode.into(),
            source_path: source.to_string_lossy().into_owned(),
            source_ident: source.to_string_lossy().into_owned(),
            dest_path: dest.to_string_lossy().into_owned(),
            dest_ident: dest.to_string_lossy().into_owned(),
            min_video_size_mb: 0,
            max_workers: 4,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

async fn make_orchestrator(
    pool: &SqlitePool,
    path: &scrape_paths::ScrapePathRow,
    catalog: Arc<dyn CatalogProvider>,
    data_dir: &Path,
) -> Orchestrator {
    Orchestrator::init(
        pool.clone(),
        path.clone(),
        catalog,
        OrchestratorOptions {
            data_dir: data_dir.to_path_buf(),
            language: "en-US".into(),
            has_catalog_credentials: true,
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn end_to_end_two_episode_season() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    let data = tmp.path().join("data");
    std::fs::create_dir_all(source.join("Show/Season 01")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(source.join("Show/Season 01/Show.S01E01.mkv"), b"ep1").unwrap();
    std::fs::write(source.join("Show/Season 01/Show.S01E02.mkv"), b"ep2").unwrap();

    let pool = test_pool(tmp.path()).await;
    let path = make_path(&pool, "tvshow", "scrape_rename", &source, &dest).await;
    let orchestrator =
        make_orchestrator(&pool, &path, Arc::new(MockCatalog::new()), &data).await;

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);

    // One canonical work, one season with two episodes.
    let show = media::find_by_catalog(&pool, 123, "tvshow")
        .await
        .unwrap()
        .expect("canonical media row");
    assert_eq!(show.season_count, 1);
    assert_eq!(show.episode_count, 2);
    let season = media::get_season(&pool, &show.id, 1).await.unwrap().unwrap();
    assert_eq!(season.episode_count, 2);
    assert!(media::get_episode(&pool, &show.id, 1, 1).await.unwrap().is_some());
    assert!(media::get_episode(&pool, &show.id, 1, 2).await.unwrap().is_some());

    // Both file rows terminal, sharing one batch.
    let renamed = scrape_files::list_by_status(&pool, &path.id, "renamed")
        .await
        .unwrap();
    assert_eq!(renamed.len(), 2);
    assert_eq!(renamed[0].batch_no, renamed[1].batch_no);

    // Canonical library layout at the destination.
    let e1 = dest.join("Show (2008)/Season 01/Show (2008) - S01E01.mkv");
    let e2 = dest.join("Show (2008)/Season 01/Show (2008) - S01E02.mkv");
    assert!(e1.exists(), "missing {}", e1.display());
    assert!(e2.exists(), "missing {}", e2.display());
    assert!(!source.join("Show/Season 01/Show.S01E01.mkv").exists());

    // Recorded destinations point at the placed files.
    for row in &renamed {
        assert!(Path::new(&row.dest_path).exists());
        assert_eq!(row.season_number, 1);
    }

    // Show-level sidecars landed once, episode nfo per file.
    assert!(dest.join("Show (2008)/tvshow.nfo").exists());
    assert!(dest
        .join("Show (2008)/Season 01/Show (2008) - S01E01.nfo")
        .exists());

    // Batch complete with nothing outstanding: staging subtree reclaimed.
    let staging_work = data
        .join("staging")
        .join(&path.id)
        .join("tvshow")
        .join(&show.id);
    assert!(!staging_work.exists(), "staging not reclaimed");

    // Run finished: the persisted running flag is clear again.
    let after = scrape_paths::get_scrape_path(&pool, &path.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!after.is_scraping);
}

#[tokio::test]
async fn dedup_two_episodes_one_canonical_row() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(source.join("Show/Season 01")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(source.join("Show/Season 01/Show.S01E01.mkv"), b"ep1").unwrap();
    std::fs::write(source.join("Show/Season 01/Show.S01E02.mkv"), b"ep2").unwrap();

    let pool = test_pool(tmp.path()).await;
    let path = make_path(&pool, "tvshow", "scrape_only", &source, &dest).await;
    let orchestrator = make_orchestrator(
        &pool,
        &path,
        Arc::new(MockCatalog::new()),
        &tmp.path().join("data"),
    )
    .await;
    orchestrator.run().await.unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_season")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_episode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);

    // Scrape-only leaves the videos where they were.
    assert!(source.join("Show/Season 01/Show.S01E01.mkv").exists());
}

#[tokio::test]
async fn rescrape_scanned_record_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src/Movies");
    std::fs::create_dir_all(source.join("The Matrix (1999)")).unwrap();
    std::fs::write(
        source.join("The Matrix (1999)/The.Matrix.1999.mkv"),
        b"movie",
    )
    .unwrap();

    let pool = test_pool(tmp.path()).await;
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(&dest).unwrap();
    let path = make_path(&pool, "movie", "scrape_rename", &source, &dest).await;

    // Seed a scanned row without running the pipeline.
    let file_id = scrape_files::create_scanned(
        &pool,
        &scrape_files::NewScrapeFile {
            scrape_path_id: path.id.clone(),
            media_kind: "movie".into(),
            source_path: source
                .join("The Matrix (1999)/The.Matrix.1999.mkv")
                .to_string_lossy()
                .into_owned(),
            source_ident: source
                .join("The Matrix (1999)/The.Matrix.1999.mkv")
                .to_string_lossy()
                .into_owned(),
            show_path: source.join("The Matrix (1999)").to_string_lossy().into_owned(),
            show_ident: source.join("The Matrix (1999)").to_string_lossy().into_owned(),
            season_number: -1,
            episode_number: -1,
            title: "The Matrix".into(),
            year: Some(1999),
            batch_no: "batch-1".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let catalog: Arc<dyn CatalogProvider> = Arc::new(MockCatalog::new());
    let req = RescrapeRequest {
        title: Some("The Matrix".into()),
        year: Some(1999),
        ..Default::default()
    };

    rollback::rescrape_file(&pool, &catalog, &path, &file_id, &req, "en-US")
        .await
        .unwrap();
    rollback::rescrape_file(&pool, &catalog, &path, &file_id, &req, "en-US")
        .await
        .unwrap();

    let file = scrape_files::get_scrape_file(&pool, &file_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.status, "scanned");
    assert_eq!(file.catalog_id, Some(603));
    assert_eq!(file.title, "The Matrix");

    // Still no canonical row (nothing scraped), and definitely no duplicates.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn ambiguous_match_requires_disambiguation() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(source.join("Unclear Movie")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(source.join("Unclear Movie/Unclear.Movie.mkv"), b"m").unwrap();

    let pool = test_pool(tmp.path()).await;
    let path = make_path(&pool, "movie", "scrape_rename", &source, &dest).await;

    let mut catalog = MockCatalog::new();
    catalog.ambiguous = true;
    let orchestrator =
        make_orchestrator(&pool, &path, Arc::new(catalog), &tmp.path().join("data")).await;

    let summary = orchestrator.run().await.unwrap();
    assert_eq!(summary.failed, 1);

    let failed = scrape_files::list_by_status(&pool, &path.id, "scrape_failed")
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0]
        .fail_reason
        .as_deref()
        .unwrap()
        .contains("candidates"));

    // Never silently pick one: no canonical row was created.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    // The source file is untouched.
    assert!(source.join("Unclear Movie/Unclear.Movie.mkv").exists());

    // Failed records stay queryable until explicitly cleared.
    let cleared = medorg_scrape::maintenance::clear_failed_scrapes(&pool, &path.id)
        .await
        .unwrap();
    assert_eq!(cleared, 1);
    let failed = scrape_files::list_by_status(&pool, &path.id, "scrape_failed")
        .await
        .unwrap();
    assert!(failed.is_empty());
}

#[tokio::test]
async fn flat_show_folder_defaults_to_season_one() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(source.join("Show")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    // No season folder and no season marker in the filename.
    std::fs::write(source.join("Show/Show.EP05.mkv"), b"ep5").unwrap();

    let pool = test_pool(tmp.path()).await;
    let path = make_path(&pool, "tvshow", "scrape_only", &source, &dest).await;
    let orchestrator = make_orchestrator(
        &pool,
        &path,
        Arc::new(MockCatalog::new()),
        &tmp.path().join("data"),
    )
    .await;
    orchestrator.run().await.unwrap();

    let renamed = scrape_files::list_by_status(&pool, &path.id, "renamed")
        .await
        .unwrap();
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].season_number, 1);
    assert_eq!(renamed[0].episode_number, 5);

    let show = media::find_by_catalog(&pool, 123, "tvshow")
        .await
        .unwrap()
        .unwrap();
    assert!(media::get_season(&pool, &show.id, 1).await.unwrap().is_some());
}

#[tokio::test]
async fn movie_rollback_restores_pre_scrape_state() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    let data = tmp.path().join("data");
    std::fs::create_dir_all(source.join("The Matrix (1999)")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    let original = source.join("The Matrix (1999)/The.Matrix.1999.mkv");
    std::fs::write(&original, b"movie bytes").unwrap();

    let pool = test_pool(tmp.path()).await;
    let path = make_path(&pool, "movie", "scrape_rename", &source, &dest).await;
    let catalog: Arc<dyn CatalogProvider> = Arc::new(MockCatalog::new());
    let orchestrator = make_orchestrator(&pool, &path, catalog.clone(), &data).await;
    orchestrator.run().await.unwrap();

    let placed = dest.join("The Matrix (1999)/The Matrix (1999).mkv");
    assert!(placed.exists(), "missing {}", placed.display());
    assert!(!original.exists());

    let renamed = scrape_files::list_by_status(&pool, &path.id, "renamed")
        .await
        .unwrap();
    assert_eq!(renamed.len(), 1);
    let file_id = renamed[0].id.clone();

    // Park the record, then sweep.
    rollback::rescrape_file(
        &pool,
        &catalog,
        &path,
        &file_id,
        &RescrapeRequest::default(),
        "en-US",
    )
    .await
    .unwrap();
    let file = scrape_files::get_scrape_file(&pool, &file_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.status, "rollbacking");

    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new());
    let restored = rollback::run_rollback_sweep(&pool, &path, &backend)
        .await
        .unwrap();
    assert_eq!(restored, 1);

    // The video is back at its source, destination artifacts are gone.
    assert!(original.exists());
    assert!(!placed.exists());
    assert!(!dest.join("The Matrix (1999)").exists());

    // Identification exactly as held before the scrape; links cleared.
    let file = scrape_files::get_scrape_file(&pool, &file_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.status, "scanned");
    assert_eq!(file.title, "The Matrix");
    assert_eq!(file.year, Some(1999));
    assert!(file.media_id.is_none());
    assert!(file.media_season_id.is_none());
    assert!(file.media_episode_id.is_none());
    assert!(file.dest_path.is_empty());
    assert!(file.new_file_name.is_empty());

    // The discarded canonical row went with it.
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn rename_only_renames_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(source.join("Movies")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(source.join("Movies/The.Matrix.1999.mkv"), b"m").unwrap();
    // An adjacent subtitle adopts the generated name.
    std::fs::write(source.join("Movies/The.Matrix.1999.en.srt"), b"subs").unwrap();

    let pool = test_pool(tmp.path()).await;
    let path = make_path(&pool, "movie", "rename_only", &source, &dest).await;
    let orchestrator = make_orchestrator(
        &pool,
        &path,
        Arc::new(MockCatalog::new()),
        &tmp.path().join("data"),
    )
    .await;
    orchestrator.run().await.unwrap();

    // Renamed under the source root, not relocated to dest.
    assert!(source.join("Movies/The Matrix (1999).mkv").exists());
    assert!(source.join("Movies/The Matrix (1999).en.srt").exists());
    assert!(!source.join("Movies/The.Matrix.1999.mkv").exists());
    assert!(std::fs::read_dir(&dest).unwrap().next().is_none());

    let renamed = scrape_files::list_by_status(&pool, &path.id, "renamed")
        .await
        .unwrap();
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].new_file_name, "The Matrix (1999).mkv");
}

#[tokio::test]
async fn second_scan_requeues_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(source.join("Show/Season 01")).unwrap();
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(source.join("Show/Season 01/Show.S01E01.mkv"), b"ep1").unwrap();

    let pool = test_pool(tmp.path()).await;
    let path = make_path(&pool, "tvshow", "scrape_only", &source, &dest).await;
    let orchestrator = make_orchestrator(
        &pool,
        &path,
        Arc::new(MockCatalog::new()),
        &tmp.path().join("data"),
    )
    .await;

    let first = orchestrator.run().await.unwrap();
    assert_eq!(first.scanned, 1);

    let second = orchestrator.run().await.unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(second.processed, 0);

    // Counters were not re-incremented by the second pass.
    let show = media::find_by_catalog(&pool, 123, "tvshow")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(show.season_count, 1);
    assert_eq!(show.episode_count, 1);
}
