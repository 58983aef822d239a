//! HTTP-level tests for the cluster client against a mock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use virsync_client::{
    ApiError, ClusterApi, ClusterConfig, HttpClient, TaskState, TaskWaitOptions, endpoints,
    wait_task,
};

async fn setup() -> (MockServer, HttpClient) {
    let server = MockServer::start().await;
    let client = HttpClient::new(ClusterConfig {
        host: server.uri(),
        username: "admin".to_string(),
        password: "admin".to_string(),
        accept_invalid_certs: false,
    })
    .unwrap();
    (server, client)
}

#[tokio::test]
async fn list_filters_by_query() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/VirDomain"))
        .and(query_param("name", "demo-vm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"uuid": "vm-1", "name": "demo-vm", "mem": 1073741824u64, "numVCPU": 2}
        ])))
        .mount(&server)
        .await;

    let records = client
        .list(endpoints::VIR_DOMAIN, &[("name", "demo-vm".to_string())])
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["uuid"], "vm-1");
}

#[tokio::test]
async fn get_missing_record_returns_none() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/VirDomain/nope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let record = client.get(endpoints::VIR_DOMAIN, "nope").await.unwrap();
    assert!(record.is_none());
}

#[tokio::test]
async fn create_returns_task_handle() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/VirDomain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "taskTag": "t-42",
            "createdUUID": "vm-new"
        })))
        .mount(&server)
        .await;

    let handle = client
        .create(endpoints::VIR_DOMAIN, json!({"name": "demo-vm"}))
        .await
        .unwrap();

    assert_eq!(handle.task_tag, "t-42");
    assert_eq!(handle.created_uuid(), Some("vm-new"));
}

#[tokio::test]
async fn conflict_is_mapped_to_operation_conflict() {
    let (server, client) = setup().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/VirDomain/vm-1"))
        .respond_with(ResponseTemplate::new(409).set_body_string("resource busy"))
        .mount(&server)
        .await;

    let err = client
        .update(endpoints::VIR_DOMAIN, "vm-1", json!({"mem": 1}))
        .await
        .unwrap_err();

    match err {
        ApiError::Conflict(detail) => assert_eq!(detail, "resource busy"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn server_error_passes_status_and_body_through() {
    let (server, client) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/VirDomain/vm-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
        .mount(&server)
        .await;

    let err = client.delete(endpoints::VIR_DOMAIN, "vm-1").await.unwrap_err();

    match err {
        ApiError::Api { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "internal failure");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn task_status_decodes_state() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/TaskTag/t-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "COMPLETE",
            "formattedDescription": "done"
        })))
        .mount(&server)
        .await;

    let status = client.task_status("t-42").await.unwrap();
    assert_eq!(status.state, TaskState::Complete);
}

#[tokio::test]
async fn wait_task_polls_until_complete() {
    let (server, client) = setup().await;
    // First poll sees RUNNING, all later polls COMPLETE.
    Mock::given(method("GET"))
        .and(path("/rest/v1/TaskTag/t-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "RUNNING"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/TaskTag/t-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "COMPLETE"})))
        .mount(&server)
        .await;

    let handle = virsync_client::TaskHandle {
        task_tag: "t-7".to_string(),
        created_uuid: String::new(),
    };
    let opts = TaskWaitOptions {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
    };

    wait_task(&client, &handle, &opts).await.unwrap();
}

#[tokio::test]
async fn wait_task_surfaces_task_failure() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/TaskTag/t-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "ERROR",
            "formattedDescription": "disk full"
        })))
        .mount(&server)
        .await;

    let handle = virsync_client::TaskHandle {
        task_tag: "t-9".to_string(),
        created_uuid: String::new(),
    };
    let err = wait_task(&client, &handle, &TaskWaitOptions::default())
        .await
        .unwrap_err();

    match err {
        ApiError::TaskFailed { tag, detail } => {
            assert_eq!(tag, "t-9");
            assert_eq!(detail, "disk full");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn wait_task_times_out_on_stuck_task() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/TaskTag/t-stuck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "RUNNING"})))
        .mount(&server)
        .await;

    let handle = virsync_client::TaskHandle {
        task_tag: "t-stuck".to_string(),
        created_uuid: String::new(),
    };
    let opts = TaskWaitOptions {
        timeout: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
    };

    let err = wait_task(&client, &handle, &opts).await.unwrap_err();
    assert!(matches!(err, ApiError::TaskTimeout { .. }));
}

#[tokio::test]
async fn wait_task_is_a_no_op_without_a_tag() {
    let (_server, client) = setup().await;
    // Synchronous operations answer with an empty task tag.
    let handle = virsync_client::TaskHandle::default();
    wait_task(&client, &handle, &TaskWaitOptions::default())
        .await
        .unwrap();
}
