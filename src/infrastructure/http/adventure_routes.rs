//! Adventure API routes

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::application::dto::{DocumentListResponseDto, ExportRequest, ImportOptions, ImportSummary};
use crate::application::services::AdventureError;
use crate::domain::entities::CollectionInfo;
use crate::domain::value_objects::{DocumentKind, UnknownKind};
use crate::infrastructure::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub preserve_folders: Option<bool>,
}

fn error_response(error: AdventureError) -> (StatusCode, String) {
    let status = match &error {
        AdventureError::SystemMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AdventureError::MalformedBundle(_) | AdventureError::Archive(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

/// List documents of a kind
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<DocumentListResponseDto>, (StatusCode, String)> {
    let kind: DocumentKind = kind
        .parse()
        .map_err(|e: UnknownKind| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let documents = state
        .adventure_service
        .list_documents(kind)
        .await
        .map_err(error_response)?;

    Ok(Json(DocumentListResponseDto { kind, documents }))
}

/// List collection packs
pub async fn list_collections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CollectionInfo>>, (StatusCode, String)> {
    let collections = state
        .adventure_service
        .list_collections()
        .await
        .map_err(error_response)?;
    Ok(Json(collections))
}

/// Export the selected documents as a bundle download
pub async fn export_adventure(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExportRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let bundle = state
        .adventure_service
        .export(request)
        .await
        .map_err(error_response)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", bundle.filename),
            ),
        ],
        bundle.bytes,
    ))
}

/// Import an uploaded bundle
pub async fn import_adventure(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<Json<ImportSummary>, (StatusCode, String)> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty upload".to_string()));
    }

    let options = ImportOptions {
        preserve_folders: query.preserve_folders,
    };
    let summary = state
        .adventure_service
        .import(&body, options)
        .await
        .map_err(error_response)?;

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::application::services::{AdventureServiceImpl, EngineSettings};
    use crate::domain::entities::StoreEnvironment;
    use crate::infrastructure::archive::ZipArchiveCodec;
    use crate::infrastructure::config::AppConfig;
    use crate::infrastructure::http::create_routes;
    use crate::infrastructure::persistence::InMemoryContentStore;

    fn config(system_id: &str) -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            server_port: 0,
            world_id: "world".to_string(),
            system_id: system_id.to_string(),
            system_version: "1.0.0".to_string(),
            core_version: "0.7.9".to_string(),
            active_modules: Vec::new(),
            asset_root: "adventures".to_string(),
            max_folder_depth: 3,
            revisit_timeout_secs: 60,
            max_upload_mb: 1,
            max_unpacked_mb: 4,
        }
    }

    fn app(store: Arc<InMemoryContentStore>, config: AppConfig) -> Router {
        let codec = ZipArchiveCodec::new(config.max_unpacked_bytes());
        let service = AdventureServiceImpl::new(store, Arc::new(codec), EngineSettings::default());
        let max_upload = config.max_upload_bytes();
        create_routes(max_upload).with_state(Arc::new(AppState::with_service(config, Arc::new(service))))
    }

    fn store_for(system_id: &str) -> Arc<InMemoryContentStore> {
        Arc::new(InMemoryContentStore::with_environment(StoreEnvironment {
            world_id: "world".to_string(),
            system_id: system_id.to_string(),
            system_version: "1.0.0".to_string(),
            core_version: "0.7.9".to_string(),
            active_modules: Vec::new(),
        }))
    }

    async fn export_goblins() -> Vec<u8> {
        let store = store_for("dnd5e");
        let goblin = store
            .insert_document(DocumentKind::Actor, json!({ "name": "Goblin" }))
            .await;
        let response = app(store, config("dnd5e"))
            .oneshot(
                Request::post("/api/adventures/export")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "name": "Goblin Den", "documents": { "Actor": [goblin.id] } }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Goblin Den.fvttadv\""
        );
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn import(router: Router, uri: &str, bytes: Vec<u8>) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::post(uri).body(Body::from(bytes)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        (status, to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec())
    }

    #[tokio::test]
    async fn test_exported_bundle_imports_through_the_api() {
        let bundle = export_goblins().await;
        let destination = store_for("dnd5e");

        let (status, body) = import(
            app(destination.clone(), config("dnd5e")),
            "/api/adventures/import?preserve_folders=false",
            bundle,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let summary: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary["name"], json!("Goblin Den"));
        assert_eq!(summary["created"]["Actor"], json!(1));
        assert_eq!(destination.documents(DocumentKind::Actor).await.len(), 1);
    }

    #[tokio::test]
    async fn test_import_for_other_system_is_unprocessable() {
        let bundle = export_goblins().await;
        let (status, body) = import(app(store_for("pf2e"), config("pf2e")), "/api/adventures/import", bundle).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(String::from_utf8(body).unwrap().contains("dnd5e"));
    }

    #[tokio::test]
    async fn test_non_zip_upload_is_a_bad_request() {
        let (status, _) = import(
            app(store_for("dnd5e"), config("dnd5e")),
            "/api/adventures/import",
            b"not a bundle".to_vec(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_document_listing_accepts_folder_names() {
        let store = store_for("dnd5e");
        store
            .insert_document(DocumentKind::JournalEntry, json!({ "name": "Rumours" }))
            .await;
        let router = app(store, config("dnd5e"));

        let response = router
            .clone()
            .oneshot(Request::get("/api/documents/journal").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listing: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(listing["kind"], json!("JournalEntry"));
        assert_eq!(listing["documents"][0]["name"], json!("Rumours"));

        let response = router
            .oneshot(Request::get("/api/documents/wizard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
