//! Notification endpoints driven through the router.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use uuid::Uuid;

use common::{json_body, TestApp};

fn notify_body(user_id: Uuid, title: &str) -> serde_json::Value {
    json!({
        "userId": user_id,
        "title": {"primary": title, "alternate": format!("{title} بالعربية")},
        "message": {"primary": "Open to read", "alternate": ""},
        "kind": "success",
        "related": {"id": "42", "kind": "ticket"},
        "actionUrl": "/tickets/42"
    })
}

#[tokio::test]
async fn test_notify_then_list_in_both_locales() {
    let app = TestApp::new();
    let user = Uuid::new_v4();

    let response = app
        .post_json("/internal/v1/notifications", notify_body(user, "Ticket answered"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["userId"], user.to_string());
    assert_eq!(created["isRead"], false);
    assert_eq!(created["kind"], "success");

    let list = json_body(
        app.get(&format!("/api/v1/notifications?user_id={user}"))
            .await,
    )
    .await;
    assert_eq!(list["unreadCount"], 1);
    let first = &list["notifications"][0];
    assert_eq!(first["title"], "Ticket answered");
    assert_eq!(first["relatedId"], "42");
    assert_eq!(first["relatedKind"], "ticket");
    assert_eq!(first["actionUrl"], "/tickets/42");

    let list = json_body(
        app.get(&format!("/api/v1/notifications?user_id={user}&locale=ar"))
            .await,
    )
    .await;
    assert_eq!(list["notifications"][0]["title"], "Ticket answered بالعربية");
    // Empty alternate falls back to the primary text
    assert_eq!(list["notifications"][0]["message"], "Open to read");
}

#[tokio::test]
async fn test_accept_language_selects_locale() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    app.post_json("/internal/v1/notifications", notify_body(user, "Hello"))
        .await;

    let response = app
        .send(
            Request::get(format!("/api/v1/notifications?user_id={user}"))
                .header("accept-language", "ar-SA,en;q=0.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let list = json_body(response).await;
    assert_eq!(list["notifications"][0]["title"], "Hello بالعربية");
}

#[tokio::test]
async fn test_empty_title_is_bad_request() {
    let app = TestApp::new();
    let response = app
        .post_json("/internal/v1/notifications", notify_body(Uuid::new_v4(), ""))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
    assert!(app.repo.is_empty());
}

#[tokio::test]
async fn test_mark_read_of_other_users_notification_is_not_found() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let created = json_body(
        app.post_json("/internal/v1/notifications", notify_body(owner, "Private"))
            .await,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .post_json(
            &format!("/api/v1/notifications/{id}/read?user_id={intruder}"),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(
            Request::delete(format!("/api/v1/notifications/{id}?user_id={intruder}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let count = json_body(
        app.get(&format!("/api/v1/notifications/unread-count?user_id={owner}"))
            .await,
    )
    .await;
    assert_eq!(count["unreadCount"], 1);

    let response = app
        .post_json(
            &format!("/api/v1/notifications/{id}/read?user_id={owner}"),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let count = json_body(
        app.get(&format!("/api/v1/notifications/unread-count?user_id={owner}"))
            .await,
    )
    .await;
    assert_eq!(count["unreadCount"], 0);
}

#[tokio::test]
async fn test_read_all_and_delete() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        let created = json_body(
            app.post_json("/internal/v1/notifications", notify_body(user, title))
                .await,
        )
        .await;
        ids.push(created["id"].as_str().unwrap().to_string());
    }

    let response = app
        .post_json(
            &format!("/api/v1/notifications/read-all?user_id={user}"),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["updated"], 3);

    let response = app
        .send(
            Request::delete(format!("/api/v1/notifications/{}?user_id={user}", ids[0]))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let list = json_body(
        app.get(&format!("/api/v1/notifications?user_id={user}&limit=1&offset=0"))
            .await,
    )
    .await;
    assert_eq!(list["notifications"].as_array().unwrap().len(), 1);
    assert_eq!(list["notifications"][0]["title"], "c");
    assert_eq!(list["unreadCount"], 0);
}

#[tokio::test]
async fn test_notify_all_reaches_every_active_user() {
    let app = TestApp::new();
    let response = app
        .post_json(
            "/internal/v1/notifications/all",
            json!({
                "title": {"primary": "Scheduled maintenance", "alternate": ""},
                "message": {"primary": "Tonight at 02:00", "alternate": ""}
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["created"], app.users.len());

    for user in &app.users {
        let stored = app.repo.stored_for(*user);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind.as_str(), "info");
    }
}

#[tokio::test]
async fn test_missing_user_id_is_rejected() {
    let app = TestApp::new();
    let response = app.get("/api/v1/notifications").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_watchers() {
    let app = TestApp::new();
    let health = json_body(app.get("/health").await).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["connections"], 0);
    assert_eq!(health["watchers"]["article"], "stopped");
    assert_eq!(health["watchers"]["ticket"], "stopped");
}
