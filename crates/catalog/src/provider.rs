use crate::{CatalogError, EpisodeDetail, SeasonDetail, WorkDetail};

/// A metadata catalog that can search works and fetch per-level detail.
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Search for a movie by title and optional year.
    async fn search_movie(
        &self,
        title: &str,
        year: Option<i32>,
        language: &str,
    ) -> Result<Vec<Candidate>, CatalogError>;

    /// Search for a TV show by title and optional first-air year.
    async fn search_tv(
        &self,
        title: &str,
        year: Option<i32>,
        language: &str,
    ) -> Result<Vec<Candidate>, CatalogError>;

    async fn movie_detail(&self, catalog_id: i64, language: &str)
        -> Result<WorkDetail, CatalogError>;

    async fn tv_detail(&self, catalog_id: i64, language: &str) -> Result<WorkDetail, CatalogError>;

    async fn season_detail(
        &self,
        tv_catalog_id: i64,
        season_number: i32,
        language: &str,
    ) -> Result<SeasonDetail, CatalogError>;

    async fn episode_detail(
        &self,
        tv_catalog_id: i64,
        season_number: i32,
        episode_number: i32,
        language: &str,
    ) -> Result<EpisodeDetail, CatalogError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
    pub catalog_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
}
