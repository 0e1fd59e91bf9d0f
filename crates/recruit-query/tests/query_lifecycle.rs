use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use jsonwebtoken::{encode, EncodingKey, Header};
use recruit_query::config::ScoringConfig;
use recruit_query::queries::{
    query_router, Claims, HttpScoringSource, NewQueryDocument, QueryDocument, QueryField,
    QueryFilter, QueryId, QueryService, QueryStore, RepositoryError, TokenVerifier,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "lifecycle-secret";

#[derive(Default)]
struct SharedStore {
    documents: Mutex<BTreeMap<QueryId, QueryDocument>>,
}

impl QueryStore for SharedStore {
    fn insert(&self, document: NewQueryDocument) -> Result<QueryId, RepositoryError> {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        let id = QueryId(format!("q{}", guard.len() + 1));
        guard.insert(id.clone(), document.into_document(id.clone()));
        Ok(id)
    }

    fn find_by_id(&self, id: &QueryId) -> Result<Option<QueryDocument>, RepositoryError> {
        Ok(self
            .documents
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned())
    }

    fn find_by_filter(&self, filter: &QueryFilter) -> Result<Vec<QueryDocument>, RepositoryError> {
        Ok(self
            .documents
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect())
    }

    fn update_fields(&self, id: &QueryId, fields: Vec<QueryField>) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("store mutex poisoned");
        let document = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        for field in fields {
            field.apply(document);
        }
        Ok(())
    }
}

fn token(scope: &str) -> String {
    let claims = Claims {
        sub: "auth0|lifecycle".to_string(),
        scope: scope.to_string(),
        exp: chrono::Utc::now().timestamp() + 600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token encodes")
}

fn request(method: Method, uri: &str, scope: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(scope)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serializable")))
        .expect("request builds")
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json payload")
}

async fn mount_students(server: &MockServer, degree_id: &str, students: Value) {
    Mock::given(method("GET"))
        .and(path("/students"))
        .and(query_param("degree_id", degree_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(students))
        .mount(server)
        .await;
}

#[tokio::test]
async fn recruiter_query_lifecycle_against_scoring_service() {
    let server = MockServer::start().await;
    mount_students(
        &server,
        "cs",
        json!([
            {"student_address": "alice", "avg": 72.0, "complete": true, "timestamp": "2012-01-01 09:00"},
            {"student_address": "bob", "avg": 65.5, "complete": false, "timestamp": "2012-01-01 09:00"},
        ]),
    )
    .await;
    mount_students(
        &server,
        "maths",
        json!([
            {"student_address": "bob", "avg": 61.0, "complete": true, "timestamp": "2012-01-01 09:00"},
            {"student_address": "carol", "avg": 88.0, "complete": true, "timestamp": "2012-01-01 09:00"},
        ]),
    )
    .await;

    let scoring = HttpScoringSource::new(&ScoringConfig {
        base_url: server.uri(),
        timeout_ms: 2_000,
    })
    .expect("scoring client builds");
    let service = Arc::new(QueryService::new(
        Arc::new(SharedStore::default()),
        Arc::new(scoring),
    ));
    let router = query_router(service, Arc::new(TokenVerifier::new(SECRET)));

    let created = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/queries",
            "recruiter",
            json!({
                "customer_id": "acme",
                "event": {"title": "Careers fair"},
                "criteria": [{"university_id": "u1", "degree_id": "cs", "min_aggregate": 60}],
            }),
        ))
        .await
        .expect("router responds");
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = json_body(created).await;
    assert_eq!(created["notified"], json!(["alice", "bob"]));
    let query_id = created["id"].as_str().expect("id").to_string();

    let expanded = router
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/queries/{query_id}/expand"),
            "recruiter",
            json!({"criteria": [
                {"university_id": "u1", "degree_id": "cs", "min_aggregate": 60},
                {"university_id": "u1", "degree_id": "maths", "min_aggregate": 55},
            ]}),
        ))
        .await
        .expect("router responds");
    assert_eq!(expanded.status(), StatusCode::OK);
    let expanded = json_body(expanded).await;
    assert_eq!(expanded["notified"], json!(["carol"]));
    assert_eq!(
        expanded["query"]["results"].as_array().map(Vec::len),
        Some(2)
    );

    let status = router
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/queries/{query_id}/status"),
            "student",
            json!({"student_address": "carol", "viewed": true, "accepted": true}),
        ))
        .await
        .expect("router responds");
    assert_eq!(status.status(), StatusCode::OK);

    let report = router
        .clone()
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/queries/{query_id}"),
            "recruiter",
            Value::Null,
        ))
        .await
        .expect("router responds");
    assert_eq!(report.status(), StatusCode::OK);
    let report = json_body(report).await;
    let accepted = report["metrics"]["accepted"].as_f64().expect("ratio");
    assert!((accepted - 1.0 / 3.0).abs() < 1e-9);

    let rsvp = router
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/queries/{query_id}/rsvp"),
            "registree",
            Value::Null,
        ))
        .await
        .expect("router responds");
    let rsvp = json_body(rsvp).await;
    assert_eq!(rsvp["accepted"], json!(["carol"]));
    assert_eq!(rsvp["pending"], json!(["alice", "bob"]));
}
