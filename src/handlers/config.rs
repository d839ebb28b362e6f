use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config
    })))
}

/// Partial runtime update. Only fields present in the body change; bridges
/// started after the update pick up the new audio and pipeline settings.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": current_config
    })))
}
