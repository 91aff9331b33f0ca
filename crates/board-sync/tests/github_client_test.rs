//! Integration tests for the GraphQL client against a mock server.

use board_sync::{GitHubClient, SyncError};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issue_node(number: u64, labels: &[&str]) -> Value {
    json!({
        "content": {
            "__typename": "Issue",
            "number": number,
            "title": format!("Issue {number}"),
            "body": null,
            "url": format!("https://github.com/acme/app/issues/{number}"),
            "state": "OPEN",
            "labels": { "nodes": labels.iter().map(|l| json!({ "name": l })).collect::<Vec<_>>() },
            "parent": null,
            "subIssues": { "nodes": [] },
            "projectItems": { "nodes": [] }
        }
    })
}

fn page(nodes: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "data": {
            "organization": {
                "projectV2": {
                    "items": {
                        "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next },
                        "nodes": nodes
                    }
                }
            }
        }
    })
}

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::with_url("ghp_test", &format!("{}/graphql", server.uri())).unwrap()
}

#[tokio::test]
async fn test_fetch_follows_cursor_across_pages() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer ghp_test"))
        .and(body_partial_json(json!({ "variables": { "org": "acme", "number": 7, "after": null } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![issue_node(1, &["epic"]), issue_node(2, &["user story"])],
            Some("cursor-1"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "after": "cursor-1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![issue_node(3, &["us"]), json!({ "content": { "__typename": "DraftIssue" } })],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server).fetch_project_items("acme", 7).await.unwrap();

    assert_eq!(items.len(), 4);
    let numbers: Vec<u64> = items.iter().filter_map(|i| i.issue()).map(|i| i.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(items[0].issue().unwrap().labels, vec!["epic"]);
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_project_items("acme", 7).await.unwrap_err();
    match err {
        SyncError::Transport { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_graphql_errors_are_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Bad credentials" }]
        })))
        .mount(&server)
        .await;

    let err = client(&server).fetch_project_items("acme", 7).await.unwrap_err();
    match err {
        SyncError::GraphQl(message) => assert!(message.contains("Bad credentials")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_missing_project_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "organization": { "projectV2": null } },
            "errors": [{
                "type": "NOT_FOUND",
                "message": "Could not resolve to a ProjectV2 with the number 99."
            }]
        })))
        .mount(&server)
        .await;

    let err = client(&server).fetch_project_items("acme", 99).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::ProjectNotFound { ref organization, number: 99 } if organization == "acme"
    ));
}

#[tokio::test]
async fn test_missing_organization_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "organization": null } })),
        )
        .mount(&server)
        .await;

    let err = client(&server).fetch_project_items("ghost", 1).await.unwrap_err();
    assert!(matches!(err, SyncError::ProjectNotFound { .. }));
}

#[tokio::test]
async fn test_malformed_body_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_project_items("acme", 7).await.unwrap_err();
    match err {
        SyncError::GraphQl(message) => assert!(message.starts_with("malformed response")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_missing_data_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = client(&server).fetch_project_items("acme", 7).await.unwrap_err();
    assert!(matches!(err, SyncError::GraphQl(ref message) if message == "No data in GraphQL response"));
}

#[tokio::test]
async fn test_next_page_without_cursor_stops() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "organization": { "projectV2": { "items": {
                "pageInfo": { "hasNextPage": true, "endCursor": null },
                "nodes": [issue_node(1, &["epic"])]
            } } } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server).fetch_project_items("acme", 7).await.unwrap();
    assert_eq!(items.len(), 1);
}
