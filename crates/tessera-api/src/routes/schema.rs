//! Schema reload boundary.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::{Router, routing::put};
use tessera_schema::EntityConfig;

use crate::error::ApiError;
use crate::state::AppState;

/// PUT /schema
///
/// Accepts a complete definition set. The whole set is validated before the
/// active generation is swapped; on any error the previous generation keeps
/// serving.
async fn reload_schema(
    State(state): State<AppState>,
    Json(configs): Json<Vec<EntityConfig>>,
) -> Result<StatusCode, ApiError> {
    let defs = configs
        .into_iter()
        .map(EntityConfig::build)
        .collect::<Result<Vec<_>, _>>()?;
    state.engine.reload_schema(defs)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the schema router.
pub fn router() -> Router<AppState> {
    Router::new().route("/schema", put(reload_schema))
}
