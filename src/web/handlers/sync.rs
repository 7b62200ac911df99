//! # Sync Handlers
//!
//! Cursor-paged reads of the change log. A client that keeps feeding the
//! returned cursor back until no data comes back has seen every change.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::sync_limits::effective_limit;
use crate::logging::log_sync_request;
use crate::models::{School, SyncChange, TermCollection};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncAllParams {
    #[serde(rename = "lastSyncSequence", default)]
    pub last_sync_sequence: u32,
    #[serde(rename = "maxRecordsCount")]
    pub max_records_count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncAllResponse {
    pub data: Vec<SyncChange>,
    pub new_latest_sync: u32,
}

/// Per-school cursor: a bare sequence, or a sequence per term collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchoolSyncCursor {
    Sequence(u32),
    Terms(BTreeMap<String, u32>),
}

#[derive(Debug, Deserialize)]
pub struct SyncSchoolsRequest {
    pub schools: BTreeMap<String, SchoolSyncCursor>,
    pub max_records_per_request: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncSchoolsResponse {
    pub new_sync_term_sequences: BTreeMap<String, SchoolSyncCursor>,
    pub sync_data: Vec<SyncChange>,
}

fn wire_sequence(sequence: i64) -> ApiResult<u32> {
    u32::try_from(sequence).map_err(|_| {
        tracing::error!(sequence, "Change sequence exceeds the sync cursor range");
        ApiError::Internal
    })
}

fn last_sequence(changes: &[SyncChange]) -> ApiResult<Option<u32>> {
    changes.last().map(|c| wire_sequence(c.sequence)).transpose()
}

/// GET /sync/all?lastSyncSequence=&maxRecordsCount=
pub async fn sync_all(
    State(state): State<AppState>,
    params: Result<Query<SyncAllParams>, QueryRejection>,
) -> ApiResult<Json<SyncAllResponse>> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let limit = effective_limit(params.max_records_count);
    let from = params.last_sync_sequence;

    let data = SyncChange::list_since(&state.pool, i64::from(from), i64::from(limit)).await?;
    let new_latest_sync = last_sequence(&data)?.unwrap_or(from);

    log_sync_request("/sync/all", Some(i64::from(from)), data.len(), limit);
    Ok(Json(SyncAllResponse {
        data,
        new_latest_sync,
    }))
}

/// POST /sync/schools
///
/// Schools are served in id order and share one record budget, so a school
/// later in the order may come back with no data and an unchanged cursor.
pub async fn sync_schools(
    State(state): State<AppState>,
    body: Result<Json<SyncSchoolsRequest>, JsonRejection>,
) -> ApiResult<Json<SyncSchoolsResponse>> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let limit = effective_limit(request.max_records_per_request);

    // Reject unknown schools and terms before returning anything
    for (school_id, cursor) in &request.schools {
        if School::find_by_id(&state.pool, school_id).await?.is_none() {
            return Err(ApiError::not_found(format!("Unknown school: {school_id}")));
        }
        if let SchoolSyncCursor::Terms(terms) = cursor {
            for term_id in terms.keys() {
                if TermCollection::find(&state.pool, school_id, term_id)
                    .await?
                    .is_none()
                {
                    return Err(ApiError::bad_request(format!(
                        "Unknown term collection {term_id} for school {school_id}"
                    )));
                }
            }
        }
    }

    let mut remaining = limit;
    let mut sync_data = Vec::new();
    let mut new_sync_term_sequences = BTreeMap::new();

    for (school_id, cursor) in request.schools {
        let advanced = match cursor {
            SchoolSyncCursor::Sequence(from) => {
                let changes = if remaining == 0 {
                    Vec::new()
                } else {
                    SyncChange::list_for_school_since(
                        &state.pool,
                        &school_id,
                        i64::from(from),
                        i64::from(remaining),
                    )
                    .await?
                };
                let next = last_sequence(&changes)?.unwrap_or(from);
                remaining = remaining.saturating_sub(changes.len() as u32);
                sync_data.extend(changes);
                SchoolSyncCursor::Sequence(next)
            }
            SchoolSyncCursor::Terms(terms) => {
                let changes = if remaining == 0 || terms.is_empty() {
                    Vec::new()
                } else {
                    let cursors: Vec<(String, i64)> = terms
                        .iter()
                        .map(|(term_id, seq)| (term_id.clone(), i64::from(*seq)))
                        .collect();
                    SyncChange::list_for_school_terms_since(
                        &state.pool,
                        &school_id,
                        &cursors,
                        i64::from(remaining),
                    )
                    .await?
                };
                let last = last_sequence(&changes)?;
                remaining = remaining.saturating_sub(changes.len() as u32);
                sync_data.extend(changes);
                SchoolSyncCursor::Terms(advance_terms(terms, last))
            }
        };
        new_sync_term_sequences.insert(school_id, advanced);
    }

    log_sync_request("/sync/schools", None, sync_data.len(), limit);
    Ok(Json(SyncSchoolsResponse {
        new_sync_term_sequences,
        sync_data,
    }))
}

/// Every term moves to `max(previous, last returned)`.
fn advance_terms(terms: BTreeMap<String, u32>, last: Option<u32>) -> BTreeMap<String, u32> {
    terms
        .into_iter()
        .map(|(term_id, previous)| {
            let next = last.map_or(previous, |last| previous.max(last));
            (term_id, next)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_shapes() {
        let request: SyncSchoolsRequest = serde_json::from_value(json!({
            "schools": {
                "marist": {"202440": 0, "202420": 12},
                "temple": 40,
            }
        }))
        .unwrap();

        assert_eq!(request.max_records_per_request, None);
        assert_eq!(request.schools["temple"], SchoolSyncCursor::Sequence(40));
        match &request.schools["marist"] {
            SchoolSyncCursor::Terms(terms) => {
                assert_eq!(terms["202440"], 0);
                assert_eq!(terms["202420"], 12);
            }
            other => panic!("expected term cursor, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_cursor_rejected() {
        let parsed = serde_json::from_value::<SyncSchoolsRequest>(json!({
            "schools": {"marist": -1}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_advance_terms() {
        let terms = BTreeMap::from([("202440".to_string(), 3), ("202420".to_string(), 9)]);

        let advanced = advance_terms(terms.clone(), Some(7));
        assert_eq!(advanced["202440"], 7);
        assert_eq!(advanced["202420"], 9);

        assert_eq!(advance_terms(terms.clone(), None), terms);
    }

    #[test]
    fn test_response_serializes_cursors_in_request_shape() {
        let response = SyncSchoolsResponse {
            new_sync_term_sequences: BTreeMap::from([
                ("marist".to_string(), SchoolSyncCursor::Terms(BTreeMap::from([("202440".to_string(), 5)]))),
                ("temple".to_string(), SchoolSyncCursor::Sequence(2)),
            ]),
            sync_data: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "new_sync_term_sequences": {"marist": {"202440": 5}, "temple": 2},
                "sync_data": [],
            })
        );
    }
}
