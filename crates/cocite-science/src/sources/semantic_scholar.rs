use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cocite_core::config::SEMANTIC_SCHOLAR;
use cocite_core::{AppConfig, Direction, Identifier, IdentifierKind};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, ScienceError};
use crate::http::Delay;
use crate::sources::{CitationProvider, SourceContext, dedup_identifiers};

const EDGE_FIELDS: &str = "externalIds";
const PAGE_LIMIT: usize = 1000;
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

/// Path id understood by the Graph API: `DOI:<doi>` or `MAG:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S2PaperId(String);

impl S2PaperId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Identifier> for S2PaperId {
    fn from(id: &Identifier) -> Self {
        match id.kind() {
            IdentifierKind::Doi => Self(format!("DOI:{id}")),
            IdentifierKind::Numeric => Self(format!("MAG:{id}")),
        }
    }
}

impl fmt::Display for S2PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One page of `/references` or `/citations`.
#[derive(Debug, Default)]
struct EdgePage {
    dois: Vec<Identifier>,
    /// Raw edge count, including edges without a DOI.
    len: usize,
    withheld: bool,
}

impl EdgePage {
    fn from_json(json: &Value, direction: Direction) -> Self {
        let paper_key = match direction {
            Direction::References => "citedPaper",
            Direction::Citations => "citingPaper",
        };
        let Some(data) = json.get("data") else {
            return Self::default();
        };
        if data.is_null() {
            return Self {
                withheld: true,
                ..Self::default()
            };
        }
        let edges = data.as_array().map(Vec::as_slice).unwrap_or_default();
        let dois = edges
            .iter()
            .filter_map(|edge| {
                edge.get(paper_key)?
                    .get("externalIds")?
                    .get("DOI")?
                    .as_str()
            })
            .filter_map(Identifier::parse_opt)
            .filter(Identifier::is_doi)
            .collect();
        Self {
            dois,
            len: edges.len(),
            withheld: false,
        }
    }
}

pub struct SemanticScholarSource {
    ctx: SourceContext,
    api_key: Option<String>,
    base_url: String,
}

impl SemanticScholarSource {
    pub fn from_config(config: &AppConfig, delay: Arc<dyn Delay>) -> Result<Self> {
        let api_key = config
            .providers
            .semantic_scholar_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToOwned::to_owned);
        let min_interval = if api_key.is_some() {
            Duration::from_millis(100)
        } else {
            Duration::from_secs(1)
        };

        Ok(Self {
            ctx: SourceContext::new(config, SEMANTIC_SCHOLAR, min_interval, delay)?,
            api_key,
            base_url: config
                .providers
                .semantic_scholar_base_url
                .trim_end_matches('/')
                .to_string(),
        })
    }

    async fn fetch_edges(&self, id: &Identifier, direction: Direction) -> Result<Vec<Identifier>> {
        let cache_key = format!("{direction}:{id}");
        if let Some(cached) = self.ctx.cached::<Vec<Identifier>>(&cache_key).await {
            return Ok(cached);
        }

        let paper_id = S2PaperId::from(id);
        let mut dois = Vec::new();
        let mut offset = 0usize;
        let mut complete = true;
        loop {
            let url = self.edge_url(&paper_id, direction, offset)?;
            let json: Value = match self
                .ctx
                .client
                .get_json(url.as_str(), self.auth_headers()?)
                .await
            {
                Ok(json) => json,
                Err(ScienceError::NotFound(_)) => {
                    debug!(paper = %paper_id, "[SemanticScholar] paper not found");
                    break;
                }
                Err(e) if offset == 0 => return Err(e),
                // Later pages fail past the API's offset cap; keep what we have.
                Err(e) => {
                    warn!(
                        paper = %paper_id,
                        offset,
                        collected = dois.len(),
                        error = %e,
                        "[SemanticScholar] citation page failed, keeping earlier pages"
                    );
                    complete = false;
                    break;
                }
            };

            let page = EdgePage::from_json(&json, direction);
            if page.withheld {
                return Err(ScienceError::DataWithheld {
                    source_name: SEMANTIC_SCHOLAR.to_string(),
                    what: direction.to_string(),
                    identifier: id.to_string(),
                });
            }
            dois.extend(page.dois);

            // The references endpoint returns everything in one page.
            if direction == Direction::References || page.len < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
        }

        let dois = dedup_identifiers(dois);
        info!(
            paper = %paper_id,
            direction = %direction,
            count = dois.len(),
            "[SemanticScholar] extracted DOIs"
        );
        if complete {
            self.ctx.store(&cache_key, &dois).await;
        }
        Ok(dois)
    }

    fn edge_url(&self, paper_id: &S2PaperId, direction: Direction, offset: usize) -> Result<Url> {
        let raw = format!("{}/paper/{}/{}", self.base_url, paper_id, direction);
        let mut url = Url::parse(&raw)
            .map_err(|e| ScienceError::Parse(format!("invalid URL {raw}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("fields", EDGE_FIELDS)
                .append_pair("limit", &PAGE_LIMIT.to_string());
            if direction == Direction::Citations {
                pairs.append_pair("offset", &offset.to_string());
            }
        }
        Ok(url)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.api_key.as_deref() {
            let value =
                HeaderValue::from_str(key).map_err(|e| ScienceError::Parse(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl CitationProvider for SemanticScholarSource {
    fn name(&self) -> &str {
        SEMANTIC_SCHOLAR
    }

    async fn references(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        self.fetch_edges(id, Direction::References)
            .await
            .inspect_err(|e| {
                if e.is_withheld() {
                    warn!(identifier = %id, "[SemanticScholar] references blocked by publisher");
                }
            })
    }

    async fn citations(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        self.fetch_edges(id, Direction::Citations).await
    }
}
