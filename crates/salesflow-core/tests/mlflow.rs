use salesflow_core::config::{TrackingBackend, TrackingConfig};
use salesflow_core::eda::sink::{MlflowSink, RunStatus, TrackingError, TrackingSink};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const EXPERIMENTS_GET: &str = "/api/2.0/mlflow/experiments/get-by-name";
const EXPERIMENTS_CREATE: &str = "/api/2.0/mlflow/experiments/create";
const RUNS_CREATE: &str = "/api/2.0/mlflow/runs/create";
const RUNS_UPDATE: &str = "/api/2.0/mlflow/runs/update";

fn tracking_config(uri: String, username: Option<&str>) -> TrackingConfig {
    TrackingConfig {
        backend: TrackingBackend::Mlflow,
        tracking_uri: uri,
        experiment_name: "sales-eda".to_string(),
        username: username.map(str::to_string),
        password: username.map(|_| "secret".to_string()),
        ..TrackingConfig::default()
    }
}

async fn mount_run(server: &MockServer, artifact_uri: &str) {
    Mock::given(method("POST"))
        .and(path(RUNS_CREATE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run": { "info": { "run_id": "abc123", "artifact_uri": artifact_uri } }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(RUNS_UPDATE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

fn calls(requests: &[Request]) -> Vec<(String, String)> {
    requests
        .iter()
        .map(|request| (request.method.to_string(), request.url.path().to_string()))
        .collect()
}

fn body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_experiment_is_created_and_run_is_finished() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EXPERIMENTS_GET))
        .and(query_param("experiment_name", "sales-eda"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "RESOURCE_DOES_NOT_EXIST"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(EXPERIMENTS_CREATE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "experiment_id": "7" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_run(&server, "mlflow-artifacts:/7/abc123/artifacts").await;
    Mock::given(method("PUT"))
        .and(path("/api/2.0/mlflow-artifacts/artifacts/7/abc123/artifacts/plots/a.svg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = tracking_config(server.uri(), Some("alice"));
    let run_id = tokio::task::spawn_blocking(move || {
        let mut sink = MlflowSink::open(&config).unwrap();
        sink.log_artifact("plots/a.svg", b"<svg/>").unwrap();
        sink.finish(RunStatus::Finished).unwrap();
        assert!(matches!(
            sink.log_artifact("plots/b.svg", b"<svg/>"),
            Err(TrackingError::Finished(_))
        ));
        sink.run_id().to_string()
    })
    .await
    .unwrap();
    assert_eq!(run_id, "abc123");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        calls(&requests),
        vec![
            ("GET".to_string(), EXPERIMENTS_GET.to_string()),
            ("POST".to_string(), EXPERIMENTS_CREATE.to_string()),
            ("POST".to_string(), RUNS_CREATE.to_string()),
            (
                "PUT".to_string(),
                "/api/2.0/mlflow-artifacts/artifacts/7/abc123/artifacts/plots/a.svg".to_string()
            ),
            ("POST".to_string(), RUNS_UPDATE.to_string()),
        ]
    );
    for request in &requests {
        let auth = request.headers.get("authorization").unwrap().to_str().unwrap();
        assert_eq!(auth, "Basic YWxpY2U6c2VjcmV0");
    }

    assert_eq!(body(&requests[1]), json!({ "name": "sales-eda" }));
    let created = body(&requests[2]);
    assert_eq!(created["experiment_id"], "7");
    assert!(created["start_time"].is_i64());
    assert_eq!(requests[3].body, b"<svg/>");
    assert_eq!(
        requests[3].headers.get("content-type").unwrap().to_str().unwrap(),
        "image/svg+xml"
    );
    let update = body(&requests[4]);
    assert_eq!(update["run_id"], "abc123");
    assert_eq!(update["status"], "FINISHED");
    assert!(update["end_time"].is_i64());
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_experiment_is_reused_and_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(EXPERIMENTS_GET))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "experiment": { "experiment_id": "3", "name": "sales-eda" }
        })))
        .mount(&server)
        .await;
    mount_run(&server, "s3://bucket/3/abc123/artifacts").await;
    Mock::given(method("PUT"))
        .and(path("/api/2.0/mlflow-artifacts/artifacts/3/abc123/artifacts/plots/a.svg"))
        .respond_with(ResponseTemplate::new(500).set_body_string("disk full"))
        .mount(&server)
        .await;

    let config = tracking_config(server.uri(), None);
    tokio::task::spawn_blocking(move || {
        let mut sink = MlflowSink::open(&config).unwrap();
        let err = sink.log_artifact("plots/a.svg", b"<svg/>").unwrap_err();
        assert!(matches!(
            err,
            TrackingError::Api { status, ref body, .. } if status.as_u16() == 500 && body == "disk full"
        ));
        sink.finish(RunStatus::Failed).unwrap();
        sink.finish(RunStatus::Failed).unwrap();
    })
    .await
    .unwrap();

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<String> = calls(&requests).into_iter().map(|(_, path)| path).collect();
    assert!(!paths.iter().any(|path| path == EXPERIMENTS_CREATE));
    assert_eq!(body(&requests[1])["experiment_id"], "3");
    assert!(requests.iter().all(|request| request.headers.get("authorization").is_none()));

    let updates: Vec<&Request> = requests
        .iter()
        .filter(|request| request.url.path() == RUNS_UPDATE)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(body(updates[0])["status"], "FAILED");
}
