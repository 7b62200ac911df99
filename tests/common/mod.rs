//! Shared setup for database-backed integration tests.
//!
//! Every test here needs a disposable Postgres database named by
//! `TEST_DB_CONN`; the catalog tables are truncated on setup.

#![allow(dead_code)]

use catalog_sync::config::CatalogConfig;
use catalog_sync::database::{reset_catalog, DatabaseConnection, MIGRATOR};
use catalog_sync::http::fixture::{response_with_cookie, FixtureTransport};
use catalog_sync::http::{RateLimiterConfig, RetryPolicy};
use catalog_sync::models::TermCollection;
use catalog_sync::orchestration::{CollectionRunSummary, Orchestrator};
use catalog_sync::services::{BannerSchoolConfig, BannerService, Service};
use reqwest::Method;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const TERMS: &str = include_str!("../fixtures/banner/terms.json");
pub const SEARCH: &str = include_str!("../fixtures/banner/search_results.json");
pub const SEARCH_UPDATED: &str = include_str!("../fixtures/banner/search_results_updated.json");
pub const SEARCH_MEETINGS: &str = include_str!("../fixtures/banner/search_results_meetings.json");
pub const SEARCH_MEETINGS_UPDATED: &str =
    include_str!("../fixtures/banner/search_results_meetings_updated.json");
pub const DESCRIPTION: &str = include_str!("../fixtures/banner/course_description.html");

pub const SCHOOL: &str = "marist";
pub const FALL_2024: &str = "202440";
pub const SPRING_2024: &str = "202420";
pub const SEARCH_PATH: &str = "searchResults/searchResults";

pub struct TestContext {
    pub db: DatabaseConnection,
    pub transport: Arc<FixtureTransport>,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestContext {
    pub fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    pub async fn term(&self, term_collection_id: &str) -> TermCollection {
        TermCollection::find(self.pool(), SCHOOL, term_collection_id)
            .await
            .expect("term lookup")
            .expect("term was upserted during setup")
    }

    pub async fn collect(&self, term_collection_id: &str, full: bool) -> CollectionRunSummary {
        let term = self.term(term_collection_id).await;
        self.orchestrator
            .update_all_sections_of_school_with_service(&term, None, full, &CancellationToken::new())
            .await
            .expect("collection run")
    }

    /// Serve the next collections from the updated search fixture
    pub fn use_updated_sections(&self) {
        self.serve_sections(SEARCH_UPDATED);
    }

    /// Serve the next collections from `body`
    pub fn serve_sections(&self, body: &str) {
        self.transport.add_body(Method::GET, SEARCH_PATH, body);
    }
}

pub fn banner_fixture() -> Arc<FixtureTransport> {
    Arc::new(
        FixtureTransport::new()
            .with_body(Method::GET, "classSearch/getTerms", TERMS)
            .with_route(
                Method::GET,
                "term/termSelection",
                response_with_cookie("JSESSIONID", "INTEGRATION"),
            )
            .with_body(Method::POST, "term/search", "{\"fwdUrl\":\"/\"}")
            .with_body(Method::GET, SEARCH_PATH, SEARCH)
            .with_body(Method::POST, "searchResults/getCourseDescription", DESCRIPTION),
    )
}

pub fn marist_config() -> BannerSchoolConfig {
    BannerSchoolConfig {
        id: SCHOOL.to_string(),
        name: "Marist College".to_string(),
        hostname: "banner.marist.test".to_string(),
        max_term_count: 10,
        max_section_page_count: 2,
        rate_limiter: RateLimiterConfig {
            rate: 1000.0,
            burst: 100,
            max_increase: 0.0,
        },
    }
}

/// Connect, migrate, truncate and seed `marist` with its term collections.
/// `None` when no test database is configured.
pub async fn setup() -> Option<TestContext> {
    dotenvy::dotenv().ok();
    let Ok(url) = std::env::var("TEST_DB_CONN") else {
        eprintln!("Skipping test: TEST_DB_CONN is not set");
        return None;
    };

    let config = CatalogConfig::from_lookup(|key| match key {
        "DB_CONN" => Some(url.clone()),
        "LOCAL" => Some("true".to_string()),
        "DB_MAX_CONNECTIONS" => Some("5".to_string()),
        _ => None,
    })
    .expect("test config");

    let db = DatabaseConnection::connect(&config).await.expect("connect");
    MIGRATOR.run(db.pool()).await.expect("migrations");
    reset_catalog(db.pool(), &config).await.expect("reset");

    let transport = banner_fixture();
    let retry = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    };
    let banner: Arc<dyn Service> = Arc::new(
        BannerService::with_transport(vec![marist_config()], transport.clone(), retry)
            .expect("banner service"),
    );
    let orchestrator = Arc::new(
        Orchestrator::new(db.pool().clone(), vec![banner])
            .await
            .expect("orchestrator"),
    );

    orchestrator.upsert_all_schools().await.expect("schools");
    orchestrator
        .upsert_school_terms_with_service(SCHOOL, None)
        .await
        .expect("terms");

    Some(TestContext {
        db,
        transport,
        orchestrator,
    })
}
