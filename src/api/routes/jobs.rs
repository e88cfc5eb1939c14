use actix_web::{post, web, HttpRequest, HttpResponse};
use uuid::Uuid;

use crate::core::job_service::JobService;
use crate::domain::NewJobRequest;
use crate::utils::error::{AppError, Result};
use crate::utils::validation::validate_uuid;

/// En-tête portant l'identifiant du propriétaire
pub const OWNER_HEADER: &str = "X-User-Id";

fn owner_from(req: &HttpRequest) -> Result<Uuid> {
    let value = req
        .headers()
        .get(OWNER_HEADER)
        .ok_or_else(|| AppError::BadRequest(format!("{} header is required", OWNER_HEADER)))?
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{} header is not valid text", OWNER_HEADER)))?;
    validate_uuid(value)
}

/// Endpoint de création de job
#[post("/jobs")]
pub async fn create_job(
    req: HttpRequest,
    request: web::Json<NewJobRequest>,
    jobs: web::Data<JobService>,
) -> Result<HttpResponse> {
    let owner = owner_from(&req)?;
    let detail = jobs.create_job(owner, request.into_inner()).await?;
    Ok(HttpResponse::Accepted().json(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job_service::TaskRunner;
    use crate::infrastructure::memory::MemoryStore;
    use crate::infrastructure::presets::{default_tags, JsonPresetParser};
    use crate::utils::config::PresetFailurePolicy;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use assert_json_diff::assert_json_eq;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Arc;

    struct NoopRunner;

    #[async_trait]
    impl TaskRunner for NoopRunner {
        async fn run(&self, _job_uid: Uuid) -> Result<()> {
            Ok(())
        }
    }

    async fn service(store: &MemoryStore) -> web::Data<JobService> {
        web::Data::new(JobService::new(
            Arc::new(store.clone()),
            Arc::new(NoopRunner),
            Arc::new(JsonPresetParser::new()),
            PathBuf::from("./uploads"),
            PresetFailurePolicy::Reject,
        ))
    }

    fn body(formats: &[&str]) -> Value {
        json!({
            "name": "TestJob",
            "description": "Test description",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-10.85, 6.25], [-10.85, 6.40], [-10.62, 6.40], [-10.62, 6.25], [-10.85, 6.25]]]
            },
            "formats": formats,
        })
    }

    #[actix_web::test]
    async fn test_create_job_is_accepted() {
        let store = MemoryStore::with_reference_data().await;
        let app = test::init_service(
            App::new()
                .app_data(service(&store).await)
                .configure(crate::api::config),
        )
        .await;
        let owner = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/jobs")
            .insert_header((OWNER_HEADER, owner.to_string()))
            .set_json(body(&["shp", "gpkg"]))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let detail: Value = test::read_body_json(resp).await;
        assert_eq!(detail["name"], "TestJob");
        assert_eq!(detail["owner"], owner.to_string());
        assert_eq!(detail["formats"].as_array().unwrap().len(), 2);
        assert_eq!(detail["tags"].as_array().unwrap().len(), default_tags().len());
        assert_eq!(store.job_count().await, 1);
    }

    #[actix_web::test]
    async fn test_invalid_formats_payload() {
        let store = MemoryStore::with_reference_data().await;
        let app = test::init_service(
            App::new()
                .app_data(service(&store).await)
                .configure(crate::api::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/jobs")
            .insert_header((OWNER_HEADER, Uuid::new_v4().to_string()))
            .set_json(body(&["nope"]))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let payload: Value = test::read_body_json(resp).await;
        assert_json_eq!(payload, json!({ "formats": ["Invalid format uid(s)."] }));
        assert_eq!(store.job_count().await, 0);
    }

    #[actix_web::test]
    async fn test_validation_errors_are_listed_by_field() {
        let store = MemoryStore::with_reference_data().await;
        let app = test::init_service(
            App::new()
                .app_data(service(&store).await)
                .configure(crate::api::config),
        )
        .await;

        let mut invalid = body(&["shp"]);
        invalid["name"] = json!("");
        let req = test::TestRequest::post()
            .uri("/api/jobs")
            .insert_header((OWNER_HEADER, Uuid::new_v4().to_string()))
            .set_json(invalid)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let payload: Value = test::read_body_json(resp).await;
        assert!(payload["name"].is_array());
    }

    #[actix_web::test]
    async fn test_owner_header_and_body_are_required() {
        let store = MemoryStore::with_reference_data().await;
        let app = test::init_service(
            App::new()
                .app_data(service(&store).await)
                .configure(crate::api::config),
        )
        .await;

        let no_owner = test::TestRequest::post()
            .uri("/api/jobs")
            .set_json(body(&["shp"]))
            .to_request();
        let resp = test::call_service(&app, no_owner).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let malformed = test::TestRequest::post()
            .uri("/api/jobs")
            .insert_header((OWNER_HEADER, Uuid::new_v4().to_string()))
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, malformed).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let payload: Value = test::read_body_json(resp).await;
        assert_eq!(payload["id"], "bad_request");

        assert_eq!(store.job_count().await, 0);
    }
}
