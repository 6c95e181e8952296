pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

use crate::analysis::handlers as analysis;
use crate::middleware::{process_time, rate_limit, security_headers, track_metrics};
use crate::profile::handlers as profile;
use crate::state::AppState;

/// Room for multipart boundaries and the non-file form fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Success envelope shared by the analysis and profile endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let rate_limiter = state.rate_limiter.clone();
    let metrics = state.metrics.clone();

    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/info", get(health::info_handler))
        .route("/api/v1/health/metrics", get(health::metrics_handler))
        .route("/api/v1/health/status", get(health::status_handler))
        // Analysis API
        .route(
            "/api/v1/analysis/analyze",
            post(analysis::handle_analyze_image),
        )
        .route(
            "/api/v1/analysis/analyze-text",
            post(analysis::handle_analyze_text),
        )
        .route("/api/v1/analysis/quick", post(analysis::handle_quick))
        .route(
            "/api/v1/analysis/validate-image",
            post(analysis::handle_validate_image),
        )
        .route("/api/v1/analysis/feedback", post(analysis::handle_feedback))
        .route("/api/v1/analysis/:id", get(analysis::handle_get_analysis))
        .route(
            "/api/v1/analysis/:id/report",
            get(analysis::handle_get_report),
        )
        .route(
            "/api/v1/analysis/:id/feedback",
            get(analysis::handle_list_feedback),
        )
        // Profile API
        .route("/api/v1/profile", post(profile::handle_create_profile))
        .route(
            "/api/v1/profile/:session_id",
            get(profile::handle_get_profile).put(profile::handle_update_profile),
        )
        .route(
            "/api/v1/profile/:session_id/history",
            get(profile::handle_history),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(from_fn(process_time))
        .layer(from_fn_with_state(rate_limiter, rate_limit))
        .layer(from_fn_with_state(metrics, track_metrics))
        .with_state(state);

    for layer in security_headers() {
        router = router.layer(layer);
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ocr::preprocess::tests::{png_bytes, striped};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const CEREAL: &str = "Nutrition Facts\nServing Size 1 cup (30g)\nCalories 120\n\
        Sodium 210mg\nTotal Carbohydrate 26g\nTotal Sugars 18g\nProtein 2g\n\
        Ingredients: corn, sugar, high fructose corn syrup, salt, red 40, wheat starch";

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfake-image-body";

    fn app() -> Router {
        build_router(AppState::for_tests())
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn multipart_request(uri: &str, file: &[u8], extra: &[(&str, &str)]) -> Request<Body> {
        let boundary = "label-analyzer-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"label.png\"\r\n\
                 Content-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
        for (name, value) in extra {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn analyze_text(app: &Router, body: Value) -> Value {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/analysis/analyze-text", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn test_health_reports_backends() {
        let response = app().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::X_CONTENT_TYPE_OPTIONS],
            "nosniff"
        );
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert!(response.headers().contains_key("x-process-time"));

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ai_backend"], "mock");
        assert_eq!(body["ocr_backend"], "sample");
    }

    #[tokio::test]
    async fn test_info_lists_endpoints() {
        let response = app().oneshot(get_request("/api/v1/info")).await.unwrap();
        let body = body_json(response).await;
        assert!(body["endpoints"]["analyze_text"].is_string());
    }

    #[tokio::test]
    async fn test_analyze_text_with_inline_profile() {
        let app = app();
        let body = analyze_text(
            &app,
            json!({
                "extracted_text": CEREAL,
                "user_profile": {"allergies": ["Wheat"], "health_conditions": ["Diabetes"]}
            }),
        )
        .await;

        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(data["nutrition_data"]["total_sugars"], 18.0);
        assert_eq!(data["chemical_analysis"]["overall_risk_level"], "high");
        assert_eq!(data["health_recommendation"]["recommendation_type"], "limit");
        assert_eq!(
            data["health_recommendation"]["allergen_warnings"][0],
            "Contains Wheat - matches your allergy profile"
        );
        assert_eq!(
            data["health_recommendation"]["health_condition_warnings"][0],
            "High sugar content - monitor blood glucose"
        );
        assert_eq!(data["health_recommendation"]["insight_source"], "mock");
    }

    #[tokio::test]
    async fn test_analyze_text_rejects_blank_text() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis/analyze-text",
                json!({"extracted_text": "   "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_profile_session_flow() {
        let app = app();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/profile",
                json!({"allergies": [" Peanuts "], "dietary_restrictions": ["vegan"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let session_id = created["data"]["session_id"].as_str().unwrap().to_string();
        assert_eq!(created["data"]["profile"]["allergies"][0], "Peanuts");

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/v1/profile/{session_id}"),
                json!({"allergies": ["corn"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/v1/profile/{session_id}")))
            .await
            .unwrap();
        let fetched = body_json(response).await;
        assert_eq!(fetched["data"]["profile"]["allergies"], json!(["corn"]));

        // Session profile is applied when the request carries none.
        let analysis = analyze_text(
            &app,
            json!({"extracted_text": CEREAL, "session_id": session_id}),
        )
        .await;
        assert_eq!(
            analysis["data"]["health_recommendation"]["allergen_warnings"][0],
            "Contains corn - matches your allergy profile"
        );

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/v1/profile/{session_id}/history")))
            .await
            .unwrap();
        let history = body_json(response).await;
        assert_eq!(history["data"]["total"], 1);
        assert_eq!(
            history["data"]["analyses"][0]["analysis_id"],
            analysis["data"]["analysis_id"]
        );
    }

    #[tokio::test]
    async fn test_unknown_session_rejected_even_with_inline_profile() {
        let app = app();
        let missing = uuid::Uuid::new_v4();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis/analyze-text",
                json!({
                    "extracted_text": CEREAL,
                    "user_profile": {"allergies": ["corn"]},
                    "session_id": missing
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(multipart_request(
                "/api/v1/analysis/analyze",
                PNG_BYTES,
                &[
                    ("user_profile", r#"{"allergies": ["corn"]}"#),
                    ("session_id", &missing.to_string()),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_inline_profile_overrides_session_profile() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/profile",
                json!({"allergies": ["corn"]}),
            ))
            .await
            .unwrap();
        let created = body_json(response).await;
        let session_id = created["data"]["session_id"].clone();

        let analysis = analyze_text(
            &app,
            json!({
                "extracted_text": CEREAL,
                "user_profile": {"allergies": ["Salt"]},
                "session_id": session_id
            }),
        )
        .await;
        assert_eq!(
            analysis["data"]["health_recommendation"]["allergen_warnings"],
            json!(["Contains Salt - matches your allergy profile"])
        );
        assert_eq!(analysis["data"]["session_id"], session_id);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let missing = uuid::Uuid::new_v4();
        let response = app()
            .oneshot(get_request(&format!("/api/v1/profile/{missing}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_as_json_and_markdown() {
        let app = app();
        let analysis = analyze_text(
            &app,
            json!({"extracted_text": CEREAL, "user_profile": {"allergies": ["wheat"]}}),
        )
        .await;
        let id = analysis["data"]["analysis_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/v1/analysis/{id}/report")))
            .await
            .unwrap();
        let report = body_json(response).await;
        assert_eq!(report["data"]["score_display"], "6.0/10");
        assert_eq!(report["data"]["verdict"], "moderate");
        assert_eq!(
            report["data"]["warnings"][0],
            "Contains wheat - matches your allergy profile"
        );

        let response = app
            .clone()
            .oneshot(get_request(&format!(
                "/api/v1/analysis/{id}/report?format=markdown"
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/markdown"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let markdown = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(markdown.contains("**Health Score:** 6.0/10 (Moderate)"));
        assert!(markdown.contains("- Contains wheat - matches your allergy profile"));

        let response = app
            .oneshot(get_request(&format!("/api/v1/analysis/{id}/report?format=pdf")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_analysis_is_not_found() {
        let missing = uuid::Uuid::new_v4();
        let response = app()
            .oneshot(get_request(&format!("/api/v1/analysis/{missing}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_feedback_validation() {
        let app = app();
        let analysis = analyze_text(&app, json!({"extracted_text": CEREAL})).await;
        let id = analysis["data"]["analysis_id"].clone();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis/feedback",
                json!({"analysis_id": id, "feedback_type": "accuracy", "rating": 5, "comment": "Spot on"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["data"]["feedback_id"].is_string());

        let response = app
            .clone()
            .oneshot(get_request(&format!(
                "/api/v1/analysis/{}/feedback",
                id.as_str().unwrap()
            )))
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed["data"]["total"], 1);
        assert_eq!(listed["data"]["feedback"][0]["comment"], "Spot on");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis/feedback",
                json!({"analysis_id": id, "feedback_type": "general", "rating": 9}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis/feedback",
                json!({"analysis_id": uuid::Uuid::new_v4(), "feedback_type": "bug_report"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_quick_assessment_extracts_score() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/api/v1/analysis/quick",
                json!({"text": CEREAL}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["health_score"], 6.0);
        assert_eq!(body["data"]["verdict"], "moderate");
    }

    #[tokio::test]
    async fn test_image_upload_runs_sample_ocr() {
        let response = app()
            .oneshot(multipart_request(
                "/api/v1/analysis/analyze",
                PNG_BYTES,
                &[("user_profile", r#"{"allergies": ["almonds"]}"#)],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let data = &body["data"];
        assert!(data["extracted_text"]
            .as_str()
            .unwrap()
            .starts_with("Nutrition Facts"));
        assert!((data["ocr_confidence"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images() {
        let response = app()
            .oneshot(multipart_request(
                "/api/v1/analysis/analyze",
                b"%PDF-1.7 not an image",
                &[],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_profile_json() {
        let response = app()
            .oneshot(multipart_request(
                "/api/v1/analysis/analyze",
                PNG_BYTES,
                &[("user_profile", "{not json")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validate_image() {
        let response = app()
            .oneshot(multipart_request(
                "/api/v1/analysis/validate-image",
                PNG_BYTES,
                &[],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["format"], "png");
        assert_eq!(body["data"]["mime_type"], "image/png");
        assert_eq!(body["data"]["validation"]["is_valid"], true);
        // Signature only; the body does not decode.
        assert!(body["data"]["quality"].is_null());
        assert!(body["data"]["validation"]["issues"]
            .as_array()
            .unwrap()
            .contains(&json!("Image could not be decoded for a quality check")));
    }

    #[tokio::test]
    async fn test_validate_image_reports_quality() {
        let png = png_bytes(&striped(120, 60));
        let response = app()
            .oneshot(multipart_request(
                "/api/v1/analysis/validate-image",
                &png,
                &[],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data = &body_json(response).await["data"];

        let quality = &data["quality"];
        assert_eq!(quality["width"], 120);
        assert_eq!(quality["height"], 60);
        assert_eq!(quality["sharpness"], 1.0);
        let score = quality["score"].as_f64().unwrap();
        assert!(score > 0.5 && score <= 1.0);
        assert!(quality["issues"][0]
            .as_str()
            .unwrap()
            .starts_with("Low resolution (120x60)"));

        assert_eq!(data["preprocessing"], "original");
        assert_eq!(data["preprocessing_steps"], json!(["none"]));
        assert!(data["validation"]["issues"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_count_requests_by_route() {
        let app = app();
        app.clone().oneshot(get_request("/health")).await.unwrap();
        let missing = uuid::Uuid::new_v4();
        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/v1/analysis/{missing}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(get_request("/api/v1/health/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let application = &body["data"]["application"];

        // The metrics request itself is counted once it completes.
        assert_eq!(application["requests_total"], 2);
        assert_eq!(application["success_count"], 1);
        assert_eq!(application["error_count"], 1);
        assert_eq!(application["success_rate"], 0.5);
        assert_eq!(application["requests_by_endpoint"]["GET /health"], 1);
        assert_eq!(
            application["requests_by_endpoint"]["GET /api/v1/analysis/:id"],
            1
        );
        assert_eq!(body["data"]["store"]["stored_analyses"], 0);
        assert!(body["data"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_rate_limited_requests_are_counted_as_errors() {
        let mut config = Config::for_tests();
        config.rate_limit_per_minute = 1;
        let state = AppState::from_config(config).unwrap();
        let app = build_router(state.clone());

        for _ in 0..2 {
            app.clone().oneshot(get_request("/api/v1/info")).await.unwrap();
        }

        let snapshot = state.metrics.snapshot().await;
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.requests_by_endpoint["GET /api/v1/info"], 2);
    }

    #[tokio::test]
    async fn test_status_reports_services_and_configuration() {
        let response = app()
            .oneshot(get_request("/api/v1/health/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data = &body_json(response).await["data"];

        assert_eq!(data["overall_status"], "healthy");
        assert_eq!(data["services"]["ocr"]["status"], "healthy");
        assert_eq!(data["services"]["ocr"]["backend"], "sample");
        assert_eq!(data["services"]["analysis"]["backend"], "mock");
        assert_eq!(
            data["configuration"]["rate_limit_per_minute"],
            Config::for_tests().rate_limit_per_minute
        );
    }

    #[tokio::test]
    async fn test_status_degraded_without_ocr_binary() {
        let mut config = Config::for_tests();
        config.ocr_backend = crate::config::OcrBackend::Tesseract;
        config.tesseract_cmd = "definitely-not-tesseract-xyz".to_string();
        let app = build_router(AppState::from_config(config).unwrap());

        let response = app
            .oneshot(get_request("/api/v1/health/status"))
            .await
            .unwrap();
        let data = &body_json(response).await["data"];
        assert_eq!(data["overall_status"], "degraded");
        assert_eq!(data["services"]["ocr"]["status"], "unhealthy");
        assert!(data["services"]["ocr"]["error"]
            .as_str()
            .unwrap()
            .contains("definitely-not-tesseract-xyz"));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let mut config = Config::for_tests();
        config.max_upload_bytes = 16;
        let app = build_router(AppState::from_config(config).unwrap());
        let response = app
            .oneshot(multipart_request(
                "/api/v1/analysis/analyze",
                &[PNG_BYTES, &[0u8; 64]].concat(),
                &[],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429() {
        let mut config = Config::for_tests();
        config.rate_limit_per_minute = 2;
        let app = build_router(AppState::from_config(config).unwrap());

        let request = |ip: &str| {
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");

        let response = app.oneshot(request("198.51.100.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
