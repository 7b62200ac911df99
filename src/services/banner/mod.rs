//! # Banner
//!
//! Adapter for Ellucian Banner registration sites. Class staging is a
//! three-phase protocol over one session cookie:
//!
//! 1. cookie issuance (`term/termSelection`)
//! 2. term association (`term/search`)
//! 3. paginated search (`searchResults/searchResults`), one worker per page
//!
//! Full collections then fetch each section's course description.

pub mod config;
pub mod description;
pub mod transform;
pub mod wire;

pub use config::BannerSchoolConfig;

use crate::error::{CatalogError, Result};
use crate::http::{
    ReqwestTransport, RetryPolicy, Transport, UpstreamClient, UpstreamError, UpstreamRequest,
};
use crate::models::{School, TermCollection};
use crate::services::Service;
use crate::staging::EntryQuery;
use async_trait::async_trait;
use futures::stream::{self, TryStreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use transform::{decode_term, ClassAccumulator};
use wire::{BannerSection, BannerTerm, SearchResults};

pub const SERVICE_NAME: &str = "banner";
const SESSION_COOKIE: &str = "JSESSIONID";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// In-flight description lookups; the school's limiter does the real pacing
const DESCRIPTION_CONCURRENCY: usize = 8;
/// Largest search total accepted from the sizing request
const MAX_TERM_SECTIONS: u32 = 100_000;

#[derive(Debug, Clone)]
struct BannerSchool {
    config: BannerSchoolConfig,
    client: UpstreamClient,
}

pub struct BannerService {
    schools: HashMap<String, BannerSchool>,
    order: Vec<String>,
}

impl BannerService {
    /// Network-backed service, one client and limiter per school.
    pub fn new(configs: Vec<BannerSchoolConfig>) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?);
        Self::with_transport(configs, transport, RetryPolicy::default())
    }

    /// Every school's layered client wraps `transport`.
    pub fn with_transport(
        configs: Vec<BannerSchoolConfig>,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let mut schools = HashMap::new();
        let mut order = Vec::new();
        for config in configs {
            if schools.contains_key(&config.id) {
                warn!(school_id = %config.id, "Duplicate Banner school config ignored");
                continue;
            }
            config.validate()?;
            let base_url = url::Url::parse(&config.base_url()).map_err(|e| {
                CatalogError::configuration(format!("Invalid Banner hostname {}: {e}", config.hostname))
            })?;
            let client =
                UpstreamClient::new(base_url, config.rate_limiter, retry, Arc::clone(&transport));
            order.push(config.id.clone());
            schools.insert(config.id.clone(), BannerSchool { config, client });
        }
        Ok(Self { schools, order })
    }

    fn school(&self, school_id: &str) -> Result<&BannerSchool> {
        self.schools
            .get(school_id)
            .ok_or_else(|| CatalogError::UnsupportedSchool {
                service_name: SERVICE_NAME.to_string(),
                school_id: school_id.to_string(),
            })
    }

    /// Upstream client for a school, e.g. to pause its traffic
    pub fn client(&self, school_id: &str) -> Option<&UpstreamClient> {
        self.schools.get(school_id).map(|s| &s.client)
    }
}

impl BannerSchool {
    async fn open_session(&self, term_code: &str) -> std::result::Result<String, UpstreamError> {
        let selection = self
            .client
            .send(UpstreamRequest::get(self.client.url("term/termSelection?mode=search")?))
            .await?;
        let cookie = selection.cookie(SESSION_COOKIE).ok_or_else(|| {
            UpstreamError::assumption_violation("term/termSelection", "no session cookie issued")
        })?;

        let association = UpstreamRequest::post_form(
            self.client.url("term/search?mode=search")?,
            vec![("term".to_string(), term_code.to_string())],
        )
        .with_cookie(SESSION_COOKIE, &cookie);
        self.client.send(association).await?;

        Ok(cookie)
    }

    async fn fetch_terms(&self) -> std::result::Result<Vec<BannerTerm>, UpstreamError> {
        let path = format!(
            "classSearch/getTerms?searchTerm=&offset=1&max={}",
            self.config.max_term_count
        );
        let response = self
            .client
            .send(UpstreamRequest::get(self.client.url(&path)?))
            .await?;
        response.json("getTerms")
    }

    async fn search_all_sections(
        &self,
        term_code: &str,
        cookie: &str,
    ) -> std::result::Result<Vec<BannerSection>, UpstreamError> {
        let sizing = search_page(&self.client, term_code, cookie, 0, 1).await?;
        let total = sizing.total_count;
        if total > MAX_TERM_SECTIONS {
            return Err(UpstreamError::assumption_violation(
                "searchResults",
                format!("totalCount {total} exceeds {MAX_TERM_SECTIONS} sections"),
            ));
        }
        let page_size = self.config.max_section_page_count.max(1);
        let pages = total.div_ceil(page_size);
        debug!(
            school_id = %self.config.id,
            term = %term_code,
            total,
            pages,
            "Banner search sized"
        );

        let mut workers = JoinSet::new();
        for page in 0..pages {
            let client = self.client.clone();
            let term_code = term_code.to_string();
            let cookie = cookie.to_string();
            workers.spawn(async move {
                search_page(&client, &term_code, &cookie, page * page_size, page_size).await
            });
        }

        let mut sections = Vec::with_capacity(total as usize);
        while let Some(joined) = workers.join_next().await {
            let page = joined
                .map_err(|e| UpstreamError::transient("searchResults worker", e.to_string()))??;
            sections.extend(page.data.unwrap_or_default());
        }
        Ok(sections)
    }

    async fn fetch_description(
        &self,
        term_code: &str,
        cookie: &str,
        crn: &str,
    ) -> std::result::Result<Option<String>, UpstreamError> {
        let request = UpstreamRequest::post_form(
            self.client.url("searchResults/getCourseDescription")?,
            vec![
                ("term".to_string(), term_code.to_string()),
                ("courseReferenceNumber".to_string(), crn.to_string()),
            ],
        )
        .with_cookie(SESSION_COOKIE, cookie);
        let response = self.client.send(request).await?;
        description::parse_description(&response.body)
    }
}

async fn search_page(
    client: &UpstreamClient,
    term_code: &str,
    cookie: &str,
    offset: u32,
    page_size: u32,
) -> std::result::Result<SearchResults, UpstreamError> {
    let path = format!(
        "searchResults/searchResults?txt_term={term_code}&pageOffset={offset}&pageMaxSize={page_size}\
         &sortColumn=subjectDescription&sortDirection=asc"
    );
    let request = UpstreamRequest::get(client.url(&path)?).with_cookie(SESSION_COOKIE, cookie);
    let response = client.send(request).await?;
    let results: SearchResults = response.json("searchResults")?;
    if !results.success && results.total_count > 0 {
        return Err(UpstreamError::assumption_violation(
            "searchResults",
            "search reported failure with results",
        ));
    }
    Ok(results)
}

#[async_trait]
impl Service for BannerService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn list_valid_schools(&self) -> Result<Vec<School>> {
        Ok(self
            .order
            .iter()
            .filter_map(|id| self.schools.get(id))
            .map(|s| s.config.school())
            .collect())
    }

    async fn get_term_collections(&self, school: &School) -> Result<Vec<TermCollection>> {
        let banner = self.school(&school.id)?;
        let mut terms = Vec::new();
        for raw in banner.fetch_terms().await? {
            match decode_term(&school.id, &raw)? {
                Some(term) => terms.push(term),
                None => debug!(school_id = %school.id, code = %raw.code, "Skipping term without season"),
            }
        }
        Ok(terms)
    }

    async fn stage_all_classes(
        &self,
        query: &dyn EntryQuery,
        school_id: &str,
        term_collection: &TermCollection,
        full_collection: bool,
    ) -> Result<()> {
        let banner = self.school(school_id)?;
        let term_code = term_collection.id.as_str();

        let cookie = banner.open_session(term_code).await?;
        let sections = banner.search_all_sections(term_code, &cookie).await?;

        let mut accumulator = ClassAccumulator::new(school_id, term_code);
        for section in sections {
            accumulator.add_section(section);
        }

        // Description workers share the course map
        let accumulator = Mutex::new(accumulator);
        if full_collection {
            let crns = accumulator.lock().crns();
            let accumulator = &accumulator;
            let cookie = cookie.as_str();
            stream::iter(crns.into_iter().map(Ok::<_, UpstreamError>))
                .try_for_each_concurrent(DESCRIPTION_CONCURRENCY, |crn| async move {
                    if let Some(text) = banner.fetch_description(term_code, cookie, &crn).await? {
                        accumulator.lock().attach_description(&crn, text);
                    }
                    Ok(())
                })
                .await?;
        }

        let data = accumulator.into_inner().into_class_data();
        info!(
            school_id = %school_id,
            term_collection_id = %term_code,
            courses = data.courses.len(),
            professors = data.professors.len(),
            sections = data.sections.len(),
            meeting_times = data.meeting_times.len(),
            full_collection,
            "Banner snapshot collected"
        );
        query.insert_class_data(data).await?;
        Ok(())
    }
}
