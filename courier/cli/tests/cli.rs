//! Integration tests for the courier CLI.
//!
//! These tests verify end-to-end CLI behavior using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn courier_cmd(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.arg("--store").arg(store);
    for var in [
        "COURIER_BASE_URL",
        "COURIER_TIMEOUT_SECS",
        "COURIER_MAX_SCRIPT_STEPS",
        "COURIER_USER_AGENT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_import(dir: &Path, base_url: &str) -> std::path::PathBuf {
    let file = dir.join("import.json");
    let document = json!({
        "collections": [{
            "workspace": "acme",
            "name": "users",
            "apis": [{
                "name": "get_user",
                "method": "GET",
                "url": "{{base_url}}/users/{id}",
                "headers": [{"key": "Authorization", "value": "Bearer {{token}}"}],
                "post_request": "env.set(\"last_name\", response.body.name)"
            }]
        }],
        "environments": [{
            "workspace": "acme",
            "name": "dev",
            "variables": [
                {"name": "base_url", "type": "default", "initial_value": base_url},
                {"name": "token", "type": "secret", "initial_value": "s3cret"}
            ]
        }]
    });
    std::fs::write(&file, document.to_string()).unwrap();
    file
}

#[test]
fn cli_shows_help() {
    let store = TempDir::new().unwrap();
    courier_cmd(store.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run API definitions"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("import"));
}

#[test]
fn cli_shows_version() {
    let store = TempDir::new().unwrap();
    courier_cmd(store.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("courier 0.1.0"));
}

#[test]
fn import_then_list() {
    let store = TempDir::new().unwrap();
    let file = write_import(store.path(), "http://localhost:1");

    courier_cmd(store.path())
        .args(["import"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "imported 1 collection(s) and 1 environment(s)",
        ));

    courier_cmd(store.path())
        .args(["list", "acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users"))
        .stdout(predicate::str::contains("get_user"))
        .stdout(predicate::str::contains("dev (2 variables)"));
}

#[test]
fn run_unknown_collection_fails() {
    let store = TempDir::new().unwrap();
    courier_cmd(store.path())
        .args(["run", "acme", "missing", "get_user"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("collection not found: acme/missing"));
}

#[test]
fn run_rejects_malformed_path_param() {
    let store = TempDir::new().unwrap();
    courier_cmd(store.path())
        .args(["run", "acme", "users", "get_user", "-p", "id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[tokio::test(flavor = "multi_thread")]
async fn run_executes_and_persists_environment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/7"))
        .and(query_param("expand", "team"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Grace"})))
        .expect(2)
        .mount(&server)
        .await;

    let store = TempDir::new().unwrap();
    let file = write_import(store.path(), &server.uri());
    courier_cmd(store.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success();

    courier_cmd(store.path())
        .args([
            "run", "acme", "users", "get_user", "--env", "dev", "-p", "id=7", "-q", "expand=team",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Grace\""));

    let environments = std::fs::read_to_string(store.path().join("environments.jsonl")).unwrap();
    assert!(environments.contains("\"last_name\""));
    assert!(environments.contains("Grace"));

    courier_cmd(store.path())
        .args([
            "run", "acme", "users", "get_user", "--env", "dev", "-p", "id=7", "-q", "expand=team",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"done\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_execution_exits_with_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = TempDir::new().unwrap();
    let file = write_import(store.path(), &server.uri());
    courier_cmd(store.path())
        .arg("import")
        .arg(&file)
        .assert()
        .success();

    courier_cmd(store.path())
        .args(["run", "acme", "users", "get_user", "--env", "dev", "-p", "id=1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error [in_flight]: HTTP 500: boom"));
}
