//! Record CRUD, listing, and history endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Json;
use axum::routing::get;
use axum::{Router, routing::post};
use serde::{Deserialize, Serialize};
use tessera_core::error::EngineError;
use tessera_core::event::EventRecord;
use tessera_core::principal::Principal;
use tessera_core::record::Record;
use tessera_engine::{ListQuery, SortSpec};

use crate::error::ApiError;
use crate::state::AppState;

/// Default page size when the client does not pass `limit`.
const DEFAULT_LIMIT: usize = 25;

/// Raw JSON field values as supplied by the client.
type RawFields = serde_json::Map<String, serde_json::Value>;

/// Query parameters for GET /entities/{entity}/records.
#[derive(Debug, Deserialize)]
struct ListParams {
    /// Comma-separated `field:value` pairs, matched exactly.
    filter: Option<String>,
    /// Sort field, `-` prefixed for descending.
    sort: Option<String>,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

/// Response body for GET /entities/{entity}/records.
#[derive(Debug, Serialize)]
struct ListResponse {
    records: Vec<Record>,
    /// Matching records before pagination.
    total: usize,
}

/// POST /entities/{entity}/records
async fn create_record(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RawFields>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let principal = principal_from(&headers);
    let record = state.engine.create(&entity, &body, principal).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /entities/{entity}/records
async fn list_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let query = ListQuery {
        filters: parse_filters(params.filter.as_deref())?,
        sort: params.sort.as_deref().map(SortSpec::from_pattern),
        offset: params.offset,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT),
    };
    let page = state.engine.list(&entity, &query)?;
    Ok(Json(ListResponse {
        records: page.records,
        total: page.total,
    }))
}

/// GET /entities/{entity}/records/{id}
async fn get_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, u64)>,
) -> Result<Json<Record>, ApiError> {
    Ok(Json(state.engine.get(&entity, id)?))
}

/// PUT /entities/{entity}/records/{id}
async fn update_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, u64)>,
    headers: HeaderMap,
    Json(body): Json<RawFields>,
) -> Result<Json<Record>, ApiError> {
    let expected = expected_version(&headers)?;
    let principal = principal_from(&headers);
    let record = state
        .engine
        .update(&entity, id, expected, &body, principal)
        .await?;
    Ok(Json(record))
}

/// DELETE /entities/{entity}/records/{id}
async fn delete_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, u64)>,
    headers: HeaderMap,
) -> Result<Json<Record>, ApiError> {
    let expected = expected_version(&headers)?;
    let principal = principal_from(&headers);
    let record = state.engine.delete(&entity, id, expected, principal).await?;
    Ok(Json(record))
}

/// GET /entities/{entity}/records/{id}/history
async fn record_history(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, u64)>,
) -> Result<Json<Vec<EventRecord>>, ApiError> {
    Ok(Json(state.engine.history(&entity, id)?))
}

/// Returns the record router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/entities/{entity}/records",
            post(create_record).get(list_records),
        )
        .route(
            "/entities/{entity}/records/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route(
            "/entities/{entity}/records/{id}/history",
            get(record_history),
        )
}

fn principal_from(headers: &HeaderMap) -> Principal {
    headers
        .get("x-principal")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|identity| !identity.is_empty())
        .map_or_else(Principal::anonymous, Principal::new)
}

fn expected_version(headers: &HeaderMap) -> Result<u64, ApiError> {
    let value = headers
        .get(header::IF_MATCH)
        .ok_or(ApiError::MissingIfMatch)?;
    let text = value
        .to_str()
        .map_err(|_| ApiError::InvalidIfMatch("<non-ascii>".to_owned()))?;
    text.trim()
        .trim_matches('"')
        .parse()
        .map_err(|_| ApiError::InvalidIfMatch(text.to_owned()))
}

fn parse_filters(raw: Option<&str>) -> Result<Vec<(String, String)>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (field, value) = pair.split_once(':').ok_or_else(|| {
                EngineError::Validation(format!(
                    "filter '{pair}' is not in the form field:value"
                ))
            })?;
            Ok((field.to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if_match_accepts_bare_and_quoted_versions() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_MATCH, "3".parse().unwrap());
        assert_eq!(expected_version(&headers).unwrap(), 3);

        headers.insert(header::IF_MATCH, "\"7\"".parse().unwrap());
        assert_eq!(expected_version(&headers).unwrap(), 7);
    }

    #[test]
    fn test_missing_if_match_is_a_precondition_error() {
        let headers = HeaderMap::new();
        assert!(matches!(
            expected_version(&headers),
            Err(ApiError::MissingIfMatch)
        ));
    }

    #[test]
    fn test_non_numeric_if_match_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_MATCH, "latest".parse().unwrap());
        assert!(matches!(
            expected_version(&headers),
            Err(ApiError::InvalidIfMatch(_))
        ));
    }

    #[test]
    fn test_filter_pairs_parse_and_malformed_pairs_are_rejected() {
        assert_eq!(parse_filters(None).unwrap(), Vec::new());
        assert_eq!(
            parse_filters(Some("name:Ada,age:36")).unwrap(),
            vec![
                ("name".to_owned(), "Ada".to_owned()),
                ("age".to_owned(), "36".to_owned()),
            ]
        );
        assert!(parse_filters(Some("name")).is_err());
    }

    #[test]
    fn test_principal_defaults_to_anonymous() {
        let headers = HeaderMap::new();
        assert_eq!(principal_from(&headers), Principal::anonymous());

        let mut headers = HeaderMap::new();
        headers.insert("x-principal", "svc-batch".parse().unwrap());
        assert_eq!(principal_from(&headers), Principal::new("svc-batch"));
    }
}
