//! # Services
//!
//! A [`Service`] adapts one upstream protocol family. Adapters carry all of
//! their own configuration; the orchestrator only sees this capability set.

pub mod banner;

use crate::error::Result;
use crate::models::{School, TermCollection};
use crate::staging::EntryQuery;
use async_trait::async_trait;

#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Schools this service knows how to scrape
    async fn list_valid_schools(&self) -> Result<Vec<School>>;

    /// Discover the school's current terms from upstream.
    async fn get_term_collections(&self, school: &School) -> Result<Vec<TermCollection>>;

    /// Stage a complete snapshot of the term through `query`.
    ///
    /// When `full_collection` is false, fields that are expensive to fetch
    /// (course descriptions) may be left empty.
    async fn stage_all_classes(
        &self,
        query: &dyn EntryQuery,
        school_id: &str,
        term_collection: &TermCollection,
        full_collection: bool,
    ) -> Result<()>;
}

pub use banner::{BannerSchoolConfig, BannerService};
