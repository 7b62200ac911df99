//! # Orchestrator
//!
//! Owns the `school_id -> service` mapping and drives collection runs:
//! open history, clear staging, stage through the service, promote, close
//! history. At most one run per `(school, term collection)` is in flight.

use crate::database::SqlFunctionExecutor;
use crate::error::{CatalogError, Result};
use crate::logging::log_collection_operation;
use crate::messaging::CollectionMessage;
use crate::models::{CollectionStatus, School, TermCollection, TermCollectionHistory};
use crate::services::Service;
use crate::staging::StagingEntryQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// A run currently holding its term lock
#[derive(Debug, Clone, Serialize)]
pub struct RunningCollection {
    pub history_id: i64,
    pub school_id: String,
    pub term_collection_id: String,
    pub service_name: String,
    pub is_full: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionRunSummary {
    pub history_id: i64,
    pub school_id: String,
    pub term_collection_id: String,
    pub service_name: String,
    pub status: CollectionStatus,
    pub changed_rows: i64,
    #[serde(skip)]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolWithService {
    pub school: School,
    pub service_name: String,
}

/// Executes one queued collection job
#[async_trait]
pub trait CollectionRunner: Send + Sync {
    async fn run_collection(
        &self,
        message: &CollectionMessage,
        cancel: &CancellationToken,
    ) -> Result<CollectionRunSummary>;
}

/// Removes the registry entry however the run ends
struct RunningGuard<'a> {
    running: &'a DashMap<i64, RunningCollection>,
    history_id: i64,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.history_id);
    }
}

pub struct Orchestrator {
    pool: PgPool,
    services: Vec<Arc<dyn Service>>,
    /// First registered service for each school
    school_services: HashMap<String, (School, Arc<dyn Service>)>,
    /// Every school each service lists, by service name
    supported: HashMap<String, HashSet<String>>,
    run_locks: DashMap<(String, String), Arc<tokio::sync::Mutex<()>>>,
    running: DashMap<i64, RunningCollection>,
    flagged: Mutex<HashSet<(String, String)>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("services", &self.services.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("schools", &self.school_services.len())
            .field("running", &self.running.len())
            .finish()
    }
}

impl Orchestrator {
    /// Ask every service for its schools and fix the school mapping.
    /// When two services list the same school the first registered wins.
    pub async fn new(pool: PgPool, services: Vec<Arc<dyn Service>>) -> Result<Self> {
        let mut school_services: HashMap<String, (School, Arc<dyn Service>)> = HashMap::new();
        let mut supported: HashMap<String, HashSet<String>> = HashMap::new();

        for service in &services {
            if supported.contains_key(service.name()) {
                return Err(CatalogError::configuration(format!(
                    "Service {} registered twice",
                    service.name()
                )));
            }
            let schools = service.list_valid_schools().await?;
            let listed = supported.entry(service.name().to_string()).or_default();

            for school in schools {
                listed.insert(school.id.clone());
                match school_services.get(&school.id) {
                    Some((_, owner)) => warn!(
                        school_id = %school.id,
                        kept = %owner.name(),
                        ignored = %service.name(),
                        "School listed by more than one service"
                    ),
                    None => {
                        school_services.insert(school.id.clone(), (school, Arc::clone(service)));
                    }
                }
            }
        }

        info!(
            services = services.len(),
            schools = school_services.len(),
            "Orchestrator ready"
        );

        Ok(Self {
            pool,
            services,
            school_services,
            supported,
            run_locks: DashMap::new(),
            running: DashMap::new(),
            flagged: Mutex::new(HashSet::new()),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Explicit service by name, otherwise the school's default service.
    pub fn resolve_service(
        &self,
        school_id: &str,
        service_name: Option<&str>,
    ) -> Result<Arc<dyn Service>> {
        match service_name {
            Some(name) => {
                let service = self
                    .services
                    .iter()
                    .find(|s| s.name() == name)
                    .ok_or_else(|| CatalogError::UnknownService {
                        service_name: name.to_string(),
                    })?;
                let lists_school = self
                    .supported
                    .get(name)
                    .is_some_and(|schools| schools.contains(school_id));
                if !lists_school {
                    return Err(CatalogError::UnsupportedSchool {
                        service_name: name.to_string(),
                        school_id: school_id.to_string(),
                    });
                }
                Ok(Arc::clone(service))
            }
            None => self
                .school_services
                .get(school_id)
                .map(|(_, service)| Arc::clone(service))
                .ok_or_else(|| CatalogError::unknown_school(school_id)),
        }
    }

    /// Upsert every known school. Returns the schools, sorted by id.
    #[instrument(skip(self))]
    pub async fn upsert_all_schools(&self) -> Result<Vec<School>> {
        let mut schools: Vec<School> = self
            .school_services
            .values()
            .map(|(school, _)| school.clone())
            .collect();
        schools.sort_by(|a, b| a.id.cmp(&b.id));

        let mut created = 0;
        for school in &schools {
            if School::upsert(&self.pool, school).await? {
                created += 1;
            }
        }
        info!(total = schools.len(), created, "Schools upserted");
        Ok(schools)
    }

    /// Refresh terms for every school. A failing school is logged and skipped;
    /// returns the number of term collections upserted.
    #[instrument(skip(self))]
    pub async fn upsert_all_terms(&self) -> Result<usize> {
        let mut school_ids: Vec<&String> = self.school_services.keys().collect();
        school_ids.sort();

        let mut upserted = 0;
        for school_id in school_ids {
            match self.upsert_school_terms_with_service(school_id, None).await {
                Ok(terms) => upserted += terms.len(),
                Err(e) => {
                    self.flag_if_needed(school_id, None, &e);
                    error!(school_id = %school_id, error = %e, "Failed to refresh terms");
                }
            }
        }
        Ok(upserted)
    }

    #[instrument(skip(self))]
    pub async fn upsert_school_terms_with_service(
        &self,
        school_id: &str,
        service_name: Option<&str>,
    ) -> Result<Vec<TermCollection>> {
        let service = self.resolve_service(school_id, service_name)?;
        let school = match self.school_services.get(school_id) {
            Some((school, _)) => school.clone(),
            None => School::find_by_id(&self.pool, school_id)
                .await?
                .ok_or_else(|| CatalogError::unknown_school(school_id))?,
        };
        School::upsert(&self.pool, &school).await?;

        let terms = service.get_term_collections(&school).await?;
        for term in &terms {
            TermCollection::upsert(&self.pool, term).await?;
        }
        info!(
            school_id = %school_id,
            service = %service.name(),
            terms = terms.len(),
            "Term collections upserted"
        );
        Ok(terms)
    }

    /// Run one collection for `term_collection` to completion.
    ///
    /// Cancellation aborts the service call; the run is closed as `Failure`
    /// and its staging rows are left for the next run to clear.
    #[instrument(skip(self, term_collection, cancel), fields(school_id = %term_collection.school_id, term_collection_id = %term_collection.id))]
    pub async fn update_all_sections_of_school_with_service(
        &self,
        term_collection: &TermCollection,
        service_name: Option<&str>,
        full_collection: bool,
        cancel: &CancellationToken,
    ) -> Result<CollectionRunSummary> {
        let school_id = term_collection.school_id.as_str();
        let term_id = term_collection.id.as_str();
        let service = self.resolve_service(school_id, service_name)?;

        let lock = self
            .run_locks
            .entry((school_id.to_string(), term_id.to_string()))
            .or_default()
            .clone();
        let _term_guard = tokio::select! {
            guard = lock.lock() => guard,
            _ = cancel.cancelled() => return Err(self.cancelled(term_collection)),
        };

        let started = Instant::now();
        let history =
            TermCollectionHistory::open(&self.pool, school_id, term_id, full_collection).await?;
        self.running.insert(
            history.id,
            RunningCollection {
                history_id: history.id,
                school_id: school_id.to_string(),
                term_collection_id: term_id.to_string(),
                service_name: service.name().to_string(),
                is_full: full_collection,
                started_at: history.start_time,
            },
        );
        let _running_guard = RunningGuard {
            running: &self.running,
            history_id: history.id,
        };

        let outcome = self
            .drive_run(service.as_ref(), term_collection, history.id, full_collection, cancel)
            .await;
        let status = match outcome {
            Ok(_) => CollectionStatus::Success,
            Err(_) => CollectionStatus::Failure,
        };
        let closed = TermCollectionHistory::finish(&self.pool, history.id, status).await;
        let duration = started.elapsed();

        match outcome {
            Ok(changed_rows) => {
                closed?;
                let details = format!("changed_rows={changed_rows}");
                log_collection_operation(
                    "update_all_sections",
                    school_id,
                    Some(term_id),
                    "success",
                    Some(duration),
                    Some(&details),
                );
                Ok(CollectionRunSummary {
                    history_id: history.id,
                    school_id: school_id.to_string(),
                    term_collection_id: term_id.to_string(),
                    service_name: service.name().to_string(),
                    status,
                    changed_rows,
                    duration,
                })
            }
            Err(e) => {
                if let Err(close_err) = closed {
                    error!(history_id = history.id, error = %close_err, "Failed to close run");
                }
                self.flag_if_needed(school_id, Some(service.name()), &e);
                let details = e.to_string();
                log_collection_operation(
                    "update_all_sections",
                    school_id,
                    Some(term_id),
                    "failure",
                    Some(duration),
                    Some(&details),
                );
                Err(e)
            }
        }
    }

    async fn drive_run(
        &self,
        service: &dyn Service,
        term_collection: &TermCollection,
        history_id: i64,
        full_collection: bool,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let executor = SqlFunctionExecutor::new(self.pool.clone());
        executor.ready_courses_meetings_staging(history_id).await?;

        let query = StagingEntryQuery::new(
            self.pool.clone(),
            &term_collection.school_id,
            &term_collection.id,
            history_id,
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled(term_collection)),
            staged = service.stage_all_classes(
                &query,
                &term_collection.school_id,
                term_collection,
                full_collection,
            ) => staged?,
        }

        let changed = executor.move_staged_courses_and_meetings(history_id).await?;
        Ok(changed)
    }

    fn cancelled(&self, term_collection: &TermCollection) -> CatalogError {
        CatalogError::Cancelled {
            school_id: term_collection.school_id.clone(),
            term_collection_id: term_collection.id.clone(),
        }
    }

    fn flag_if_needed(&self, school_id: &str, service_name: Option<&str>, err: &CatalogError) {
        if !err.needs_manual_review() {
            return;
        }
        let service_name = service_name
            .map(str::to_string)
            .or_else(|| {
                self.school_services
                    .get(school_id)
                    .map(|(_, s)| s.name().to_string())
            })
            .unwrap_or_default();
        error!(
            school_id = %school_id,
            service = %service_name,
            error = %err,
            manual_review = true,
            "Upstream assumption violated"
        );
        self.flagged.lock().insert((school_id.to_string(), service_name));
    }

    /// Runs currently in flight, oldest first
    pub fn list_running_collections(&self) -> Vec<RunningCollection> {
        let mut running: Vec<RunningCollection> =
            self.running.iter().map(|entry| entry.value().clone()).collect();
        running.sort_by_key(|r| r.history_id);
        running
    }

    /// Each known school with the service that collects it, sorted by school id
    pub fn get_schools_with_service(&self) -> Vec<SchoolWithService> {
        let sorted: BTreeMap<&String, &(School, Arc<dyn Service>)> =
            self.school_services.iter().collect();
        sorted
            .into_values()
            .map(|(school, service)| SchoolWithService {
                school: school.clone(),
                service_name: service.name().to_string(),
            })
            .collect()
    }

    /// `(school_id, service_name)` pairs whose upstream no longer matches expectations
    pub fn flagged_for_review(&self) -> Vec<(String, String)> {
        let mut flagged: Vec<_> = self.flagged.lock().iter().cloned().collect();
        flagged.sort();
        flagged
    }
}

#[async_trait]
impl CollectionRunner for Orchestrator {
    async fn run_collection(
        &self,
        message: &CollectionMessage,
        cancel: &CancellationToken,
    ) -> Result<CollectionRunSummary> {
        let term = match &message.school_id {
            Some(school_id) => {
                TermCollection::find(&self.pool, school_id, &message.term_collection_id).await?
            }
            None => TermCollection::find_by_id(&self.pool, &message.term_collection_id).await?,
        }
        .ok_or_else(|| CatalogError::UnknownTermCollection {
            term_collection_id: message.term_collection_id.clone(),
        })?;

        self.update_all_sections_of_school_with_service(
            &term,
            message.service.as_deref(),
            message.is_full_collection,
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::UpstreamError;
    use crate::staging::EntryQuery;
    use sqlx::postgres::PgPoolOptions;

    struct StaticService {
        name: &'static str,
        schools: Vec<School>,
    }

    #[async_trait]
    impl Service for StaticService {
        fn name(&self) -> &str {
            self.name
        }

        async fn list_valid_schools(&self) -> Result<Vec<School>> {
            Ok(self.schools.clone())
        }

        async fn get_term_collections(&self, _school: &School) -> Result<Vec<TermCollection>> {
            Ok(Vec::new())
        }

        async fn stage_all_classes(
            &self,
            _query: &dyn EntryQuery,
            _school_id: &str,
            _term_collection: &TermCollection,
            _full_collection: bool,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/catalog_unused")
            .unwrap()
    }

    async fn orchestrator() -> Orchestrator {
        let banner: Arc<dyn Service> = Arc::new(StaticService {
            name: "banner",
            schools: vec![School::new("marist", "Marist College"), School::new("temple", "Temple")],
        });
        let other: Arc<dyn Service> = Arc::new(StaticService {
            name: "other",
            schools: vec![School::new("marist", "Marist (other)"), School::new("vassar", "Vassar")],
        });
        Orchestrator::new(lazy_pool(), vec![banner, other]).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_registered_service_wins() {
        let orchestrator = orchestrator().await;
        let schools = orchestrator.get_schools_with_service();

        let pairs: Vec<(&str, &str)> = schools
            .iter()
            .map(|s| (s.school.id.as_str(), s.service_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("marist", "banner"), ("temple", "banner"), ("vassar", "other")]
        );
        assert_eq!(schools[0].school.name, "Marist College");
    }

    #[tokio::test]
    async fn test_resolve_service() {
        let orchestrator = orchestrator().await;

        assert_eq!(orchestrator.resolve_service("marist", None).unwrap().name(), "banner");
        assert_eq!(
            orchestrator.resolve_service("marist", Some("other")).unwrap().name(),
            "other"
        );
        assert!(matches!(
            orchestrator.resolve_service("temple", Some("other")),
            Err(CatalogError::UnsupportedSchool { .. })
        ));
        assert!(matches!(
            orchestrator.resolve_service("marist", Some("nope")),
            Err(CatalogError::UnknownService { .. })
        ));
        assert!(matches!(
            orchestrator.resolve_service("nowhere", None),
            Err(CatalogError::UnknownSchool { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_service_names_rejected() {
        let a: Arc<dyn Service> = Arc::new(StaticService {
            name: "banner",
            schools: vec![],
        });
        let b: Arc<dyn Service> = Arc::new(StaticService {
            name: "banner",
            schools: vec![],
        });
        let err = Orchestrator::new(lazy_pool(), vec![a, b]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_flagging_only_for_assumption_violations() {
        let orchestrator = orchestrator().await;

        let transient = CatalogError::from(UpstreamError::transient("GET", "reset"));
        orchestrator.flag_if_needed("marist", Some("banner"), &transient);
        assert!(orchestrator.flagged_for_review().is_empty());

        let violation = CatalogError::from(UpstreamError::assumption_violation("getTerms", "shape"));
        orchestrator.flag_if_needed("vassar", None, &violation);
        assert_eq!(
            orchestrator.flagged_for_review(),
            vec![("vassar".to_string(), "other".to_string())]
        );
    }

    #[tokio::test]
    async fn test_nothing_running_initially() {
        assert!(orchestrator().await.list_running_collections().is_empty());
    }
}
