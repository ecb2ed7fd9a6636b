use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{SolutionConfig, SolutionSourceConfig};
use crate::database::Database;
use crate::models::{Language, Question, Solution, SolutionSlot};
use crate::log_service_warn;

const MARKUP_TAG: &str = r"<[^>]*>";
const CODE_TABLE: &str = r#"(?s)<table[^>]*class="[^"]*highlight[^"]*"[^>]*>(.*?)</table>"#;

#[derive(Debug, Clone)]
enum Extraction {
    WholeDocument,
    Capture { pattern: Regex, markup: Option<Regex> },
}

/// Extracts a solution snippet from a fetched page
#[derive(Debug, Clone)]
pub struct SearchPredicate {
    extraction: Extraction,
}

impl SearchPredicate {
    /// Capture group 1 of `pattern` is the snippet
    pub fn new(pattern: &str, strip_markup: bool) -> Result<Self> {
        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() < 2 {
            return Err(anyhow!("Search pattern must contain a capture group"));
        }
        let markup = if strip_markup {
            Some(Regex::new(MARKUP_TAG)?)
        } else {
            None
        };
        Ok(Self {
            extraction: Extraction::Capture { pattern, markup },
        })
    }

    /// The whole response body, for raw file URLs
    pub fn whole_document() -> Self {
        Self {
            extraction: Extraction::WholeDocument,
        }
    }

    /// The highlighted code table of a rendered repository page
    pub fn code_table() -> Result<Self> {
        Self::new(CODE_TABLE, true)
    }

    pub fn extract(&self, document: &str) -> Option<String> {
        let text = match &self.extraction {
            Extraction::WholeDocument => document.to_string(),
            Extraction::Capture { pattern, markup } => {
                let captured = pattern.captures(document)?.get(1)?.as_str();
                match markup {
                    Some(markup) => decode_entities(&markup.replace_all(captured, "")),
                    None => captured.to_string(),
                }
            }
        };
        let text = text.trim_matches(|c: char| c == '\n' || c == '\r');
        if text.trim().is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Title slug used in solution URLs: lowercase alphanumerics, other runs become `-`
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[derive(Debug, Clone)]
pub struct SolutionSource {
    pub language: Language,
    pub url_template: String,
    pub predicate: SearchPredicate,
}

impl SolutionSource {
    pub fn from_config(config: &SolutionSourceConfig) -> Result<Self> {
        // Rendered pages need the code table pulled out, raw files are used as-is
        let predicate = if config.url_template.contains("/blob/") {
            SearchPredicate::code_table()?
        } else {
            SearchPredicate::whole_document()
        };
        Ok(Self {
            language: config.language.clone(),
            url_template: config.url_template.clone(),
            predicate,
        })
    }

    pub fn url_for(&self, question: &Question) -> String {
        self.url_template.replace("{slug}", &slugify(&question.title))
    }
}

#[async_trait]
pub trait SolutionFetcher: Send + Sync {
    /// `Ok(None)` when the page exists but holds no snippet, or does not exist
    async fn fetch(&self, url: &str, predicate: &SearchPredicate) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct HttpSolutionFetcher {
    client: Client,
}

impl HttpSolutionFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SolutionFetcher for HttpSolutionFetcher {
    async fn fetch(&self, url: &str, predicate: &SearchPredicate) -> Result<Option<String>> {
        debug!(url = %url, "Fetching solution page");
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!(
                "Solution request to {} failed with status {}",
                url,
                response.status()
            ));
        }

        let document = response.text().await?;
        Ok(predicate.extract(&document))
    }
}

enum FetchOutcome {
    Stored(String),
    Missing,
    /// The displayed question changed before the fetch finished
    Stale,
}

#[derive(Clone)]
pub struct SolutionService {
    db: Database,
    fetcher: Arc<dyn SolutionFetcher>,
    sources: Arc<Vec<SolutionSource>>,
    displayed: Arc<watch::Sender<i64>>,
}

impl SolutionService {
    pub fn new(db: Database, fetcher: Arc<dyn SolutionFetcher>, sources: Vec<SolutionSource>) -> Self {
        let (displayed, _) = watch::channel(0);
        Self {
            db,
            fetcher,
            sources: Arc::new(sources),
            displayed: Arc::new(displayed),
        }
    }

    pub fn from_config(db: Database, config: &SolutionConfig) -> Result<Self> {
        let fetcher = HttpSolutionFetcher::new(Duration::from_secs(config.timeout_secs))?;
        let sources = config
            .sources
            .iter()
            .map(SolutionSource::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(db, Arc::new(fetcher), sources))
    }

    pub fn sources(&self) -> &[SolutionSource] {
        &self.sources
    }

    /// Mark `question_id` as the question currently on screen
    pub fn show(&self, question_id: i64) {
        self.displayed.send_replace(question_id);
    }

    pub fn displayed(&self) -> watch::Receiver<i64> {
        self.displayed.subscribe()
    }

    pub async fn solution(&self, question_id: i64) -> Result<Solution> {
        self.db.get_solution(question_id).await
    }

    /// Show `question` and fill in its missing snippets
    pub async fn populate_displayed(&self, question: &Question) -> Result<BTreeMap<Language, SolutionSlot>> {
        self.show(question.id);
        self.populate(question, self.displayed()).await
    }

    /// Fetch every configured language with no stored snippet, concurrently.
    ///
    /// A finished fetch is written only while `displayed` still points at
    /// `question`, checked again once the write gate is held. Each write touches its own language row, so fetches for
    /// different languages never overwrite one another. Failed languages
    /// come back as `NotAvailable` and stay unstored so a later view retries.
    pub async fn populate(
        &self,
        question: &Question,
        displayed: watch::Receiver<i64>,
    ) -> Result<BTreeMap<Language, SolutionSlot>> {
        let stored = self.db.get_solution(question.id).await?;
        let mut slots: BTreeMap<Language, SolutionSlot> = stored
            .snippets
            .into_iter()
            .map(|(language, content)| (language, SolutionSlot::Available(content)))
            .collect();

        let mut handles = Vec::new();
        for source in self.sources.iter().filter(|s| !slots.contains_key(&s.language)) {
            let fetcher = self.fetcher.clone();
            let db = self.db.clone();
            let displayed = displayed.clone();
            let question_id = question.id;
            let language = source.language.clone();
            let predicate = source.predicate.clone();
            let url = source.url_for(question);

            let handle = tokio::spawn(async move {
                let fetched = fetcher.fetch(&url, &predicate).await;
                if *displayed.borrow() != question_id {
                    debug!(question_id, language = %language, "Discarding solution for a question no longer shown");
                    return (language, FetchOutcome::Stale);
                }
                match fetched {
                    Ok(Some(content)) => match db
                        .upsert_solution_if(question_id, &language, &content, || *displayed.borrow() == question_id)
                        .await
                    {
                        Ok(true) => (language, FetchOutcome::Stored(content)),
                        // The user moved on while the write waited for the gate
                        Ok(false) if *displayed.borrow() != question_id => (language, FetchOutcome::Stale),
                        Ok(false) => (language, FetchOutcome::Missing),
                        Err(error) => {
                            warn!(question_id, language = %language, error = %error, "Failed to store solution");
                            (language, FetchOutcome::Missing)
                        }
                    },
                    Ok(None) => (language, FetchOutcome::Missing),
                    Err(error) => {
                        warn!(question_id, language = %language, url = %url, error = %error, "Solution fetch failed");
                        (language, FetchOutcome::Missing)
                    }
                }
            });
            handles.push(handle);
        }

        let fetched = handles.len();
        for joined in futures_util::future::join_all(handles).await {
            match joined {
                Ok((language, FetchOutcome::Stored(content))) => {
                    slots.insert(language, SolutionSlot::Available(content));
                }
                Ok((language, FetchOutcome::Missing)) => {
                    slots.insert(language, SolutionSlot::NotAvailable);
                }
                Ok((_, FetchOutcome::Stale)) => {}
                Err(error) => {
                    log_service_warn!("solution_service", "populate", format!("fetch task failed: {}", error));
                }
            }
        }

        if fetched > 0 {
            info!(question_id = question.id, fetched, available = slots.len(), "Solutions populated");
        }
        Ok(slots)
    }
}
