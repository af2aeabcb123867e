//! Liveness and readiness probes.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct Check {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Check {
    fn from_result(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Check {
                ok: true,
                error: None,
            },
            Err(error) => Check {
                ok: false,
                error: Some(error),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Checks {
    sqlite: Check,
    disk: Check,
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /readyz`: 503 unless the catalog database answers and the asset
/// directory accepts writes.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let checks = Checks {
        sqlite: Check::from_result(ping_catalog(&state.products.db).await),
        disk: Check::from_result(probe_asset_dir(&state.assets.base_path).await),
    };
    let ready = checks.sqlite.ok && checks.disk.ok;
    if !ready {
        tracing::warn!(?checks, "catalog not ready");
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": if ready { "ok" } else { "unavailable" },
        "checks": checks,
    });
    (status, Json(body))
}

async fn ping_catalog(db: &SqlitePool) -> Result<(), String> {
    let one: i64 = sqlx::query_scalar("SELECT 1")
        .fetch_one(db)
        .await
        .map_err(|err| err.to_string())?;
    if one == 1 {
        Ok(())
    } else {
        Err(format!("SELECT 1 returned {one}"))
    }
}

/// Round-trip a marker file through the asset directory.
async fn probe_asset_dir(dir: &Path) -> Result<(), String> {
    let marker = dir.join(format!(".readyz-{}", Uuid::new_v4().simple()));
    let outcome = async {
        fs::write(&marker, b"readyz").await?;
        let read = fs::read(&marker).await?;
        Ok::<_, std::io::Error>(read == b"readyz")
    }
    .await;
    let _ = fs::remove_file(&marker).await;

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => Err("marker file content mismatch".into()),
        Err(err) => Err(err.to_string()),
    }
}
