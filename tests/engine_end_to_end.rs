//! Engine runs against a mock platform API, through real HTTP and rendering

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

use scanreport::application::{ReportEngine, RunOptions};
use scanreport::domain::period::ReportPeriod;
use scanreport::domain::recipe::Recipe;
use scanreport::infrastructure::{FileCache, PlatformClient, RetryConfig};

const SEVERITY_RECIPE: &str = r#"
name: Findings by Severity
endpoint: /public/v0/findings
transforms:
  - group_by:
      by: [severity]
      aggregations: ["COUNT"]
  - sort: { by: severity, order: severity }
output:
  formats: [csv, xlsx, html]
  charts:
    - type: bar
      x: severity
      y: count
"#;

const JOIN_RECIPE: &str = r#"
name: Labelled Findings
endpoint: /public/v0/findings
additional_queries:
  projects:
    endpoint: /public/v0/projects
transforms:
  - join:
      with: projects
      left_on: project
      right_on: id
      select:
        name: project_label
  - select:
      columns: [id, project_label, severity]
output:
  formats: [csv]
"#;

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}

fn client(server: &ServerGuard) -> PlatformClient {
    PlatformClient::new(
        server.url(),
        "secret",
        Duration::from_secs(5),
        100,
        fast_retry(),
    )
    .expect("client should build")
}

fn recipe(yaml: &str) -> Recipe {
    serde_yaml::from_str(yaml).expect("recipe yaml should parse")
}

fn options(output: &TempDir) -> RunOptions {
    RunOptions {
        period: ReportPeriod::from_dates("2025-01-01", "2025-03-31").expect("period"),
        project: None,
        project_version: None,
        formats: Vec::new(),
        output_dir: output.path().to_path_buf(),
    }
}

// Offset pagination keeps requesting until a page repeats ids it has already
// seen, so a fixed mock body answers exactly two requests per fetch.
fn findings_body() -> String {
    json!({
        "items": [
            {"id": "f-1", "severity": "CRITICAL", "component": "openssl"},
            {"id": "f-2", "severity": "CRITICAL", "component": "log4j"},
            {"id": "f-3", "severity": "HIGH", "component": "openssl"},
        ]
    })
    .to_string()
}

#[tokio::test]
async fn full_run_renders_every_configured_format() {
    let mut server = mockito::Server::new_async().await;
    let findings = server
        .mock("GET", "/public/v0/findings")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(findings_body())
        .expect(2)
        .create_async()
        .await;

    let output = TempDir::new().expect("output dir");
    let engine = ReportEngine::new(Arc::new(client(&server)), None, Vec::new());
    let target = recipe(SEVERITY_RECIPE);

    let summary = engine
        .run(std::slice::from_ref(&target), &options(&output))
        .await;

    assert!(summary.all_succeeded(), "{:?}", summary.failed_recipes());
    findings.assert_async().await;

    let dir = output.path().join("Findings_by_Severity");
    let csv = std::fs::read_to_string(dir.join("Findings_by_Severity.csv")).expect("csv");
    assert!(csv.starts_with("severity,count"), "{csv}");
    assert!(csv.contains("CRITICAL,2"), "{csv}");
    assert!(csv.contains("HIGH,1"), "{csv}");
    assert!(dir.join("Findings_by_Severity.xlsx").exists());

    let html = std::fs::read_to_string(dir.join("Findings_by_Severity.html")).expect("html");
    assert!(html.contains("plotly"), "chart runtime missing from page");
    assert!(html.contains("Findings by Severity"));
}

#[tokio::test]
async fn warm_cache_answers_the_second_run_without_the_network() {
    let mut server = mockito::Server::new_async().await;
    let findings = server
        .mock("GET", "/public/v0/findings")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(findings_body())
        .expect(2)
        .create_async()
        .await;

    let cache_dir = TempDir::new().expect("cache dir");
    let output = TempDir::new().expect("output dir");
    let target = recipe(SEVERITY_RECIPE);

    for _ in 0..2 {
        let cache =
            FileCache::new(cache_dir.path(), Duration::from_secs(600)).expect("cache");
        let engine = ReportEngine::new(Arc::new(client(&server)), Some(cache), Vec::new());
        let summary = engine
            .run(std::slice::from_ref(&target), &options(&output))
            .await;
        assert!(summary.all_succeeded(), "{:?}", summary.failed_recipes());
    }

    // Two hits from the first run's pagination; the second run never fetched
    findings.assert_async().await;
}

#[tokio::test]
async fn side_queries_feed_join_transforms() {
    let mut server = mockito::Server::new_async().await;
    let findings = server
        .mock("GET", "/public/v0/findings")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": "f-1", "project": "p-1", "severity": "HIGH"},
                {"id": "f-2", "project": "p-2", "severity": "LOW"},
            ])
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;
    let projects = server
        .mock("GET", "/public/v0/projects")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": "p-1", "name": "gateway"},
                {"id": "p-2", "name": "billing"},
            ])
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let output = TempDir::new().expect("output dir");
    let engine = ReportEngine::new(Arc::new(client(&server)), None, Vec::new());
    let target = recipe(JOIN_RECIPE);

    let summary = engine
        .run(std::slice::from_ref(&target), &options(&output))
        .await;

    assert!(summary.all_succeeded(), "{:?}", summary.failed_recipes());
    findings.assert_async().await;
    projects.assert_async().await;

    let csv = std::fs::read_to_string(
        output
            .path()
            .join("Labelled_Findings")
            .join("Labelled_Findings.csv"),
    )
    .expect("csv");
    assert!(csv.starts_with("id,project_label,severity"), "{csv}");
    assert!(csv.contains("f-1,gateway,HIGH"), "{csv}");
    assert!(csv.contains("f-2,billing,LOW"), "{csv}");
}

#[tokio::test]
async fn authentication_failures_land_in_the_run_summary() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/public/v0/findings")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body("{}")
        .create_async()
        .await;

    let output = TempDir::new().expect("output dir");
    let engine = ReportEngine::new(Arc::new(client(&server)), None, Vec::new());
    let target = recipe(SEVERITY_RECIPE);

    let summary = engine
        .run(std::slice::from_ref(&target), &options(&output))
        .await;

    assert!(!summary.all_succeeded());
    assert_eq!(summary.failed_recipes(), vec!["Findings by Severity"]);
    let error = summary.outcomes[0]
        .result
        .as_ref()
        .err()
        .map(ToString::to_string)
        .unwrap_or_default();
    assert!(error.contains("Authentication failed"), "{error}");
    assert!(output.path().read_dir().expect("dir").next().is_none());
}
