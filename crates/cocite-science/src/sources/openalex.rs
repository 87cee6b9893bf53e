use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cocite_core::config::OPENALEX;
use cocite_core::{AppConfig, Identifier, IdentifierKind};
use reqwest::Url;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, ScienceError};
use crate::http::Delay;
use crate::sources::{
    CitationProvider, MetadataProvider, SourceContext, WorkMetadata, dedup_identifiers,
};

const OPENALEX_ID_PREFIX: &str = "https://openalex.org/";
const REFERENCE_BATCH_SIZE: usize = 25;
const CITATIONS_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAlexWork {
    pub id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub authors: Vec<String>,
    pub cited_by_count: u32,
    pub referenced_works: Vec<String>,
    pub venue: Option<String>,
}

impl OpenAlexWork {
    pub fn from_json(v: &Value) -> Result<Self> {
        let id = v
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ScienceError::Parse("OpenAlex work without id".to_string()))?
            .to_string();

        let doi = v.get("doi").and_then(Value::as_str).map(ToOwned::to_owned);

        let title = v
            .get("title")
            .or_else(|| v.get("display_name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);

        let publication_year = v
            .get("publication_year")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok());

        let authors = v
            .get("authorships")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|a| a.get("author")?.get("display_name")?.as_str())
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let cited_by_count = v
            .get("cited_by_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);

        let referenced_works = v
            .get("referenced_works")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            doi,
            title,
            publication_year,
            authors,
            cited_by_count,
            referenced_works,
            venue: parse_venue(v),
        })
    }

    /// `W2741809807` from `https://openalex.org/W2741809807`.
    pub fn short_id(&self) -> &str {
        short_openalex_id(&self.id)
    }
}

impl From<OpenAlexWork> for WorkMetadata {
    fn from(work: OpenAlexWork) -> Self {
        Self {
            title: work.title,
            authors: work.authors,
            year: work.publication_year,
            venue: work.venue,
            cited_by_count: Some(work.cited_by_count),
            canonical_url: Some(work.id),
        }
    }
}

pub struct OpenAlexSource {
    ctx: SourceContext,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexSource {
    pub fn from_config(config: &AppConfig, delay: Arc<dyn Delay>) -> Result<Self> {
        Ok(Self {
            ctx: SourceContext::new(config, OPENALEX, Duration::from_millis(100), delay)?,
            base_url: config.providers.openalex_base_url.trim_end_matches('/').to_string(),
            mailto: config.polite_email().map(ToOwned::to_owned),
        })
    }

    pub async fn fetch_work(&self, id: &Identifier) -> Result<OpenAlexWork> {
        let cache_key = format!("work:{id}");
        if let Some(cached) = self.ctx.cached::<OpenAlexWork>(&cache_key).await {
            return Ok(cached);
        }

        let selector = match id.kind() {
            IdentifierKind::Doi => format!("doi:{id}"),
            IdentifierKind::Numeric => format!("mag:{id}"),
        };
        let url = self.url(&format!("works/{selector}"), &[])?;
        let json: Value = self.ctx.client.get_json(url.as_str(), HeaderMap::new()).await?;
        let work = OpenAlexWork::from_json(&json)?;

        self.ctx.store(&cache_key, &work).await;
        Ok(work)
    }

    /// Look up DOIs for a batch of OpenAlex work ids. Works without a DOI are
    /// dropped.
    async fn resolve_dois(&self, work_ids: &[&str]) -> Result<Vec<Identifier>> {
        let filter = format!("openalex:{}", work_ids.join("|"));
        let per_page = work_ids.len().to_string();
        let url = self.url(
            "works",
            &[
                ("filter", filter.as_str()),
                ("per-page", per_page.as_str()),
                ("select", "id,doi"),
            ],
        )?;
        let json: Value = self.ctx.client.get_json(url.as_str(), HeaderMap::new()).await?;
        Ok(dois_from_results(&json))
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path);
        let mut url = Url::parse(&raw)
            .map_err(|e| ScienceError::Parse(format!("invalid URL {raw}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some(email) = &self.mailto {
                pairs.append_pair("mailto", email);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    /// Seed lookup that treats an unknown work as "nothing to report".
    async fn seed_work(&self, id: &Identifier) -> Result<Option<OpenAlexWork>> {
        match self.fetch_work(id).await {
            Ok(work) => Ok(Some(work)),
            Err(ScienceError::NotFound(_)) => {
                warn!(identifier = %id, "[OpenAlex] work not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CitationProvider for OpenAlexSource {
    fn name(&self) -> &str {
        OPENALEX
    }

    async fn references(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        let cache_key = format!("references:{id}");
        if let Some(cached) = self.ctx.cached::<Vec<Identifier>>(&cache_key).await {
            return Ok(cached);
        }

        let Some(work) = self.seed_work(id).await? else {
            return Ok(Vec::new());
        };
        if work.referenced_works.is_empty() {
            warn!(identifier = %id, "[OpenAlex] no referenced works");
            self.ctx.store(&cache_key, &Vec::<Identifier>::new()).await;
            return Ok(Vec::new());
        }
        info!(
            identifier = %id,
            count = work.referenced_works.len(),
            "[OpenAlex] found referenced works"
        );

        let short_ids = work
            .referenced_works
            .iter()
            .map(|w| short_openalex_id(w))
            .collect::<Vec<_>>();
        let mut dois = Vec::new();
        let mut failed_batches = 0usize;
        for batch in short_ids.chunks(REFERENCE_BATCH_SIZE) {
            match self.resolve_dois(batch).await {
                Ok(found) => dois.extend(found),
                // A bad batch loses those references only.
                Err(e) => {
                    failed_batches += 1;
                    warn!(identifier = %id, error = %e, "[OpenAlex] reference batch failed");
                }
            }
        }

        let dois = dedup_identifiers(dois);
        debug!(identifier = %id, dois = dois.len(), "[OpenAlex] references resolved");
        // Partial lists are returned but never cached.
        if failed_batches == 0 {
            self.ctx.store(&cache_key, &dois).await;
        }
        Ok(dois)
    }

    async fn citations(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        let cache_key = format!("citations:{id}");
        if let Some(cached) = self.ctx.cached::<Vec<Identifier>>(&cache_key).await {
            return Ok(cached);
        }

        let Some(work) = self.seed_work(id).await? else {
            return Ok(Vec::new());
        };
        let filter = format!("cites:{}", work.short_id());
        let per_page = CITATIONS_PER_PAGE.to_string();

        let mut dois = Vec::new();
        let mut cursor = "*".to_string();
        loop {
            let url = self.url(
                "works",
                &[
                    ("filter", filter.as_str()),
                    ("per-page", per_page.as_str()),
                    ("select", "id,doi"),
                    ("cursor", cursor.as_str()),
                ],
            )?;
            let json: Value = self.ctx.client.get_json(url.as_str(), HeaderMap::new()).await?;
            let page_len = json
                .get("results")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            dois.extend(dois_from_results(&json));

            let next = json
                .get("meta")
                .and_then(|m| m.get("next_cursor"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty());
            match next {
                Some(next) if page_len > 0 && next != cursor => cursor = next.to_string(),
                _ => break,
            }
        }

        let dois = dedup_identifiers(dois);
        info!(identifier = %id, count = dois.len(), "[OpenAlex] citing DOIs collected");
        self.ctx.store(&cache_key, &dois).await;
        Ok(dois)
    }
}

#[async_trait]
impl MetadataProvider for OpenAlexSource {
    async fn metadata(&self, id: &Identifier) -> Result<WorkMetadata> {
        Ok(self.fetch_work(id).await?.into())
    }
}

fn short_openalex_id(id: &str) -> &str {
    id.strip_prefix(OPENALEX_ID_PREFIX).unwrap_or(id)
}

fn dois_from_results(json: &Value) -> Vec<Identifier> {
    json.get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|work| work.get("doi").and_then(Value::as_str))
                .filter_map(Identifier::parse_opt)
                .filter(Identifier::is_doi)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

/// Venue name, trying the newer location fields before the legacy ones.
fn parse_venue(v: &Value) -> Option<String> {
    let display_name = |source: Option<&Value>| {
        source
            .and_then(|s| s.get("display_name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
    };

    display_name(v.get("host_venue"))
        .or_else(|| display_name(v.get("primary_location").and_then(|l| l.get("source"))))
        .or_else(|| {
            v.get("locations")
                .and_then(Value::as_array)?
                .iter()
                .find_map(|loc| display_name(loc.get("source")))
        })
        .or_else(|| {
            v.get("biblio")
                .and_then(|b| b.get("venue"))
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::http::{DiskCache, NoDelay};

    fn source(base_url: &str) -> OpenAlexSource {
        let mut config = AppConfig::default();
        config.http.cache_enabled = false;
        config.http.max_retries = 0;
        config.providers.openalex_base_url = base_url.to_string();
        OpenAlexSource::from_config(&config, Arc::new(NoDelay)).unwrap()
    }

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    #[test]
    fn parses_work_with_venue_fallbacks() {
        let value = json!({
            "id": "https://openalex.org/W2741809807",
            "doi": "https://doi.org/10.7717/peerj.4375",
            "title": "The state of OA",
            "publication_year": 2018,
            "authorships": [
                {"author": {"display_name": "Heather Piwowar"}},
                {"author": {"display_name": ""}}
            ],
            "cited_by_count": 812,
            "primary_location": {"source": {"display_name": "PeerJ"}},
            "referenced_works": ["https://openalex.org/W1"]
        });

        let work = OpenAlexWork::from_json(&value).unwrap();
        assert_eq!(work.short_id(), "W2741809807");
        assert_eq!(work.authors, vec!["Heather Piwowar"]);
        assert_eq!(work.venue.as_deref(), Some("PeerJ"));

        let meta = WorkMetadata::from(work);
        assert_eq!(meta.year, Some(2018));
        assert_eq!(meta.cited_by_count, Some(812));
        assert_eq!(meta.canonical_url.as_deref(), Some("https://openalex.org/W2741809807"));
    }

    #[test]
    fn work_without_id_is_a_parse_error() {
        assert!(OpenAlexWork::from_json(&json!({"title": "x"})).is_err());
    }

    #[tokio::test]
    async fn references_resolve_to_dois() {
        let mut server = Server::new_async().await;
        let _work = server
            .mock("GET", "/works/doi:10.1000/seed")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "id": "https://openalex.org/W100",
                    "referenced_works": [
                        "https://openalex.org/W1",
                        "https://openalex.org/W2",
                        "https://openalex.org/W3"
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _batch = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("filter".into(), "openalex:W1|W2|W3".into()))
            .with_status(200)
            .with_body(
                json!({
                    "results": [
                        {"id": "https://openalex.org/W1", "doi": "https://doi.org/10.1/A"},
                        {"id": "https://openalex.org/W2", "doi": null},
                        {"id": "https://openalex.org/W3", "doi": "https://doi.org/10.1/b"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let refs = source(&server.url()).references(&id("10.1000/SEED")).await.unwrap();
        assert_eq!(refs, vec![id("10.1/a"), id("10.1/b")]);
    }

    fn doi_results(ids: std::ops::RangeInclusive<usize>) -> String {
        let results: Vec<Value> = ids
            .map(|i| {
                json!({
                    "id": format!("https://openalex.org/W{i}"),
                    "doi": format!("https://doi.org/10.1/ref{i}")
                })
            })
            .collect();
        json!({ "results": results }).to_string()
    }

    fn batch_filter(ids: std::ops::RangeInclusive<usize>) -> String {
        let joined = ids.map(|i| format!("W{i}")).collect::<Vec<_>>().join("|");
        format!("openalex:{joined}")
    }

    #[tokio::test]
    async fn failed_reference_batch_is_not_cached() {
        let cache_dir = tempfile::TempDir::new().unwrap();
        let cached_source = |url: &str| {
            let mut src = source(url);
            src.ctx.cache = Some(DiskCache::new(
                cache_dir.path(),
                OPENALEX,
                Duration::from_secs(3600),
            ));
            src
        };

        let mut server = Server::new_async().await;
        let referenced: Vec<String> =
            (1..=30).map(|i| format!("https://openalex.org/W{i}")).collect();
        let _work = server
            .mock("GET", "/works/doi:10.1000/seed")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"id": "https://openalex.org/W100", "referenced_works": referenced})
                    .to_string(),
            )
            .create_async()
            .await;
        let broken = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("filter".into(), batch_filter(1..=25)))
            .with_status(500)
            .create_async()
            .await;
        let _tail = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("filter".into(), batch_filter(26..=30)))
            .with_status(200)
            .with_body(doi_results(26..=30))
            .create_async()
            .await;

        let first = cached_source(&server.url())
            .references(&id("10.1000/seed"))
            .await
            .unwrap();
        assert_eq!(first.len(), 5);

        broken.remove_async().await;
        let _head = server
            .mock("GET", "/works")
            .match_query(Matcher::UrlEncoded("filter".into(), batch_filter(1..=25)))
            .with_status(200)
            .with_body(doi_results(1..=25))
            .create_async()
            .await;

        let second = cached_source(&server.url())
            .references(&id("10.1000/seed"))
            .await
            .unwrap();
        assert_eq!(second.len(), 30);

        // complete lists are cached
        let third = cached_source("http://127.0.0.1:1")
            .references(&id("10.1000/seed"))
            .await
            .unwrap();
        assert_eq!(third, second);
    }

    #[tokio::test]
    async fn citations_follow_cursor() {
        let mut server = Server::new_async().await;
        let _work = server
            .mock("GET", "/works/doi:10.1000/seed")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"id": "https://openalex.org/W100"}).to_string())
            .create_async()
            .await;
        let _first = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "cites:W100".into()),
                Matcher::UrlEncoded("cursor".into(), "*".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "meta": {"next_cursor": "page2"},
                    "results": [{"id": "https://openalex.org/W7", "doi": "https://doi.org/10.2/c"}]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _second = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "cites:W100".into()),
                Matcher::UrlEncoded("cursor".into(), "page2".into()),
            ]))
            .with_status(200)
            .with_body(
                json!({
                    "meta": {"next_cursor": null},
                    "results": [{"id": "https://openalex.org/W8", "doi": "https://doi.org/10.2/d"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let cites = source(&server.url()).citations(&id("10.1000/seed")).await.unwrap();
        assert_eq!(cites, vec![id("10.2/c"), id("10.2/d")]);
    }

    #[tokio::test]
    async fn unknown_work_yields_empty_list() {
        let mut server = Server::new_async().await;
        let _missing = server
            .mock("GET", "/works/mag:123456")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let refs = source(&server.url()).references(&id("123456")).await.unwrap();
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_propagated() {
        let mut server = Server::new_async().await;
        let _boom = server
            .mock("GET", "/works/doi:10.1000/seed")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let err = source(&server.url()).citations(&id("10.1000/seed")).await.unwrap_err();
        assert!(matches!(err, ScienceError::ApiError(_, _)));
    }
}
