//! TMDB (The Movie Database) catalog client.
//!
//! Uses TMDB API v3: https://developer.themoviedb.org/docs

use tracing::debug;

use crate::provider::{Candidate, CatalogProvider};
use crate::{CatalogError, EpisodeDetail, SeasonDetail, WorkDetail};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

pub struct TmdbCatalog {
    api_key: String,
    /// Region used when picking a certification from release data.
    region: String,
    client: reqwest::Client,
}

impl TmdbCatalog {
    pub fn new(api_key: String) -> Self {
        Self::with_region(api_key, "US".to_string())
    }

    pub fn with_region(api_key: String, region: String) -> Self {
        Self {
            api_key,
            region,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, CatalogError> {
        let mut all_params = vec![("api_key", self.api_key.as_str())];
        all_params.extend_from_slice(params);

        let url = format!("{BASE_URL}{path}");
        debug!(url = %url, "TMDB request");

        let resp = self
            .client
            .get(&url)
            .query(&all_params)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound);
        }

        if !resp.status().is_success() {
            return Err(CatalogError::Provider(format!(
                "TMDB returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| CatalogError::Provider(format!("parse JSON: {e}")))
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbCatalog {
    fn name(&self) -> &str {
        "tmdb"
    }

    async fn search_movie(
        &self,
        title: &str,
        year: Option<i32>,
        language: &str,
    ) -> Result<Vec<Candidate>, CatalogError> {
        let mut params = vec![("query", title), ("language", language)];
        let year_str = year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push(("year", y));
        }

        let data = self.get_json("/search/movie", &params).await?;
        let results = data["results"].as_array().cloned().unwrap_or_default();

        Ok(results
            .iter()
            .take(10)
            .map(|r| Candidate {
                catalog_id: r["id"].as_i64().unwrap_or(0),
                title: r["title"].as_str().unwrap_or("Unknown").to_string(),
                year: r["release_date"]
                    .as_str()
                    .and_then(|d| d.get(..4))
                    .and_then(|y| y.parse().ok()),
                overview: r["overview"].as_str().map(|s| s.to_string()),
                poster_url: r["poster_path"]
                    .as_str()
                    .map(|p| format!("{IMAGE_BASE}/w500{p}")),
            })
            .collect())
    }

    async fn search_tv(
        &self,
        title: &str,
        year: Option<i32>,
        language: &str,
    ) -> Result<Vec<Candidate>, CatalogError> {
        let mut params = vec![("query", title), ("language", language)];
        let year_str = year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push(("first_air_date_year", y));
        }

        let data = self.get_json("/search/tv", &params).await?;
        let results = data["results"].as_array().cloned().unwrap_or_default();

        Ok(results
            .iter()
            .take(10)
            .map(|r| Candidate {
                catalog_id: r["id"].as_i64().unwrap_or(0),
                title: r["name"].as_str().unwrap_or("Unknown").to_string(),
                year: r["first_air_date"]
                    .as_str()
                    .and_then(|d| d.get(..4))
                    .and_then(|y| y.parse().ok()),
                overview: r["overview"].as_str().map(|s| s.to_string()),
                poster_url: r["poster_path"]
                    .as_str()
                    .map(|p| format!("{IMAGE_BASE}/w500{p}")),
            })
            .collect())
    }

    async fn movie_detail(
        &self,
        catalog_id: i64,
        language: &str,
    ) -> Result<WorkDetail, CatalogError> {
        let data = self
            .get_json(
                &format!("/movie/{catalog_id}"),
                &[
                    ("language", language),
                    ("append_to_response", "credits,release_dates"),
                ],
            )
            .await?;

        Ok(parse_movie_detail(&data, &self.region))
    }

    async fn tv_detail(&self, catalog_id: i64, language: &str) -> Result<WorkDetail, CatalogError> {
        let data = self
            .get_json(
                &format!("/tv/{catalog_id}"),
                &[
                    ("language", language),
                    ("append_to_response", "credits,content_ratings"),
                ],
            )
            .await?;

        Ok(parse_tv_detail(&data, &self.region))
    }

    async fn season_detail(
        &self,
        tv_catalog_id: i64,
        season_number: i32,
        language: &str,
    ) -> Result<SeasonDetail, CatalogError> {
        let data = self
            .get_json(
                &format!("/tv/{tv_catalog_id}/season/{season_number}"),
                &[("language", language)],
            )
            .await?;

        Ok(parse_season_detail(&data))
    }

    async fn episode_detail(
        &self,
        tv_catalog_id: i64,
        season_number: i32,
        episode_number: i32,
        language: &str,
    ) -> Result<EpisodeDetail, CatalogError> {
        let data = self
            .get_json(
                &format!("/tv/{tv_catalog_id}/season/{season_number}/episode/{episode_number}"),
                &[("language", language)],
            )
            .await?;

        Ok(parse_episode_detail(&data))
    }
}

fn parse_movie_detail(data: &serde_json::Value, region: &str) -> WorkDetail {
    let (actors, directors) = extract_credits(data.get("credits"));

    WorkDetail {
        catalog_id: data["id"].as_i64().unwrap_or(0),
        title: data["title"].as_str().unwrap_or("Unknown").to_string(),
        original_title: data["original_title"].as_str().map(|s| s.to_string()),
        year: data["release_date"]
            .as_str()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok()),
        overview: data["overview"].as_str().map(|s| s.to_string()),
        content_rating: extract_movie_certification(data.get("release_dates"), region),
        genres: extract_names(data["genres"].as_array()),
        actors,
        directors,
        poster_url: data["poster_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/original{p}")),
        backdrop_url: data["backdrop_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/original{p}")),
        logo_url: None,
    }
}

fn parse_tv_detail(data: &serde_json::Value, region: &str) -> WorkDetail {
    let (actors, directors) = extract_credits(data.get("credits"));

    WorkDetail {
        catalog_id: data["id"].as_i64().unwrap_or(0),
        title: data["name"].as_str().unwrap_or("Unknown").to_string(),
        original_title: data["original_name"].as_str().map(|s| s.to_string()),
        year: data["first_air_date"]
            .as_str()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok()),
        overview: data["overview"].as_str().map(|s| s.to_string()),
        content_rating: extract_tv_certification(data.get("content_ratings"), region),
        genres: extract_names(data["genres"].as_array()),
        actors,
        directors,
        poster_url: data["poster_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/original{p}")),
        backdrop_url: data["backdrop_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/original{p}")),
        logo_url: None,
    }
}

fn parse_season_detail(data: &serde_json::Value) -> SeasonDetail {
    let episodes = data["episodes"].as_array().cloned().unwrap_or_default();

    SeasonDetail {
        season_number: data["season_number"].as_i64().unwrap_or(0) as i32,
        name: data["name"].as_str().map(|s| s.to_string()),
        overview: data["overview"].as_str().map(|s| s.to_string()),
        air_date: data["air_date"].as_str().map(|s| s.to_string()),
        poster_url: data["poster_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/original{p}")),
        episodes: episodes.iter().map(parse_episode_detail).collect(),
    }
}

fn parse_episode_detail(data: &serde_json::Value) -> EpisodeDetail {
    EpisodeDetail {
        season_number: data["season_number"].as_i64().unwrap_or(0) as i32,
        episode_number: data["episode_number"].as_i64().unwrap_or(0) as i32,
        title: data["name"].as_str().map(|s| s.to_string()),
        overview: data["overview"].as_str().map(|s| s.to_string()),
        air_date: data["air_date"].as_str().map(|s| s.to_string()),
        still_url: data["still_path"]
            .as_str()
            .map(|p| format!("{IMAGE_BASE}/w300{p}")),
    }
}

fn extract_names(values: Option<&Vec<serde_json::Value>>) -> Vec<String> {
    values
        .map(|vs| {
            vs.iter()
                .filter_map(|v| v["name"].as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn extract_credits(credits: Option<&serde_json::Value>) -> (Vec<String>, Vec<String>) {
    let mut actors = Vec::new();
    let mut directors = Vec::new();

    if let Some(credits) = credits {
        if let Some(cast) = credits["cast"].as_array() {
            for person in cast.iter().take(20) {
                if let Some(name) = person["name"].as_str() {
                    actors.push(name.to_string());
                }
            }
        }

        if let Some(crew) = credits["crew"].as_array() {
            for person in crew {
                if person["job"].as_str() == Some("Director") {
                    if let Some(name) = person["name"].as_str() {
                        directors.push(name.to_string());
                    }
                }
            }
        }
    }

    (actors, directors)
}

/// Movie certification lives in per-region release data; take the first
/// non-empty certification for the configured region.
fn extract_movie_certification(
    release_dates: Option<&serde_json::Value>,
    region: &str,
) -> Option<String> {
    let results = release_dates?["results"].as_array()?;
    let regional = results
        .iter()
        .find(|r| r["iso_3166_1"].as_str() == Some(region))?;
    let dates = regional["release_dates"].as_array()?;
    dates
        .iter()
        .filter_map(|d| d["certification"].as_str())
        .find(|c| !c.is_empty())
        .map(String::from)
}

fn extract_tv_certification(
    content_ratings: Option<&serde_json::Value>,
    region: &str,
) -> Option<String> {
    let results = content_ratings?["results"].as_array()?;
    results
        .iter()
        .find(|r| r["iso_3166_1"].as_str() == Some(region))
        .and_then(|r| r["rating"].as_str())
        .filter(|c| !c.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_movie_detail_from_json() {
        let json = serde_json::json!({
            "id": 27205,
            "title": "Inception",
            "original_title": "Inception",
            "overview": "A thief who steals corporate secrets...",
            "release_date": "2010-07-16",
            "poster_path": "/poster.jpg",
            "backdrop_path": "/backdrop.jpg",
            "genres": [
                { "id": 28, "name": "Action" },
                { "id": 878, "name": "Science Fiction" }
            ],
            "credits": {
                "cast": [
                    { "name": "Leonardo DiCaprio", "character": "Cobb" }
                ],
                "crew": [
                    { "name": "Christopher Nolan", "job": "Director" }
                ]
            },
            "release_dates": {
                "results": [
                    {
                        "iso_3166_1": "DE",
                        "release_dates": [{ "certification": "12" }]
                    },
                    {
                        "iso_3166_1": "US",
                        "release_dates": [
                            { "certification": "" },
                            { "certification": "PG-13" }
                        ]
                    }
                ]
            }
        });

        let detail = parse_movie_detail(&json, "US");
        assert_eq!(detail.catalog_id, 27205);
        assert_eq!(detail.title, "Inception");
        assert_eq!(detail.year, Some(2010));
        assert_eq!(detail.content_rating.as_deref(), Some("PG-13"));
        assert_eq!(detail.genres.len(), 2);
        assert_eq!(detail.actors, vec!["Leonardo DiCaprio"]);
        assert_eq!(detail.directors, vec!["Christopher Nolan"]);
        assert!(detail.poster_url.as_ref().unwrap().contains("/poster.jpg"));
    }

    #[test]
    fn parse_tv_detail_from_json() {
        let json = serde_json::json!({
            "id": 1396,
            "name": "Breaking Bad",
            "original_name": "Breaking Bad",
            "overview": "A high school chemistry teacher...",
            "first_air_date": "2008-01-20",
            "poster_path": "/bb.jpg",
            "genres": [{ "name": "Drama" }],
            "content_ratings": {
                "results": [
                    { "iso_3166_1": "US", "rating": "TV-MA" }
                ]
            }
        });

        let detail = parse_tv_detail(&json, "US");
        assert_eq!(detail.catalog_id, 1396);
        assert_eq!(detail.title, "Breaking Bad");
        assert_eq!(detail.year, Some(2008));
        assert_eq!(detail.content_rating.as_deref(), Some("TV-MA"));
    }

    #[test]
    fn parse_season_detail_with_episodes() {
        let json = serde_json::json!({
            "season_number": 1,
            "name": "Season 1",
            "air_date": "2008-01-20",
            "poster_path": "/s1.jpg",
            "episodes": [
                {
                    "season_number": 1,
                    "episode_number": 1,
                    "name": "Pilot",
                    "air_date": "2008-01-20",
                    "still_path": "/e1.jpg"
                },
                {
                    "season_number": 1,
                    "episode_number": 2,
                    "name": "Cat's in the Bag..."
                }
            ]
        });

        let season = parse_season_detail(&json);
        assert_eq!(season.season_number, 1);
        assert_eq!(season.episodes.len(), 2);
        assert_eq!(season.episodes[0].title.as_deref(), Some("Pilot"));
        assert!(season.episodes[0].still_url.as_ref().unwrap().contains("/e1.jpg"));
        assert!(season.episodes[1].still_url.is_none());
    }

    #[test]
    fn missing_region_certification_is_none() {
        let json = serde_json::json!({
            "results": [
                { "iso_3166_1": "FR", "release_dates": [{ "certification": "U" }] }
            ]
        });
        assert_eq!(extract_movie_certification(Some(&json), "US"), None);
    }
}
