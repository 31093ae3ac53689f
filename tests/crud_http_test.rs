//! HTTP-level tests for the CRUD routes
//!
//! Each test builds the router over a temporary database and drives it with
//! `tower::ServiceExt::oneshot`.

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, TestApp, TestRequest};
use learou_core::{FieldValue, RecordId, Repository};
use tower::ServiceExt; // for `.oneshot()`

#[tokio::test]
async fn test_unauthenticated_create_is_forbidden() {
    let app = TestApp::new().await;
    let before = app.count("review").await;

    let response = app
        .router()
        .oneshot(TestRequest::post("/review/create/").form(&[("name", "Sneaky")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body, "You must be logged in to edit");
    assert_eq!(app.count("review").await, before);
}

#[tokio::test]
async fn test_gate_covers_form_pages() {
    let app = TestApp::new().await;
    let id = app.insert_named("review", "Existing").await;

    for uri in [
        "/review/create/".to_string(),
        format!("/review/update/{}/", id),
        format!("/review/delete/{}/", id),
    ] {
        let response = app
            .router()
            .oneshot(TestRequest::get(&uri).empty())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }

    // Reads stay public
    let response = app
        .router()
        .oneshot(TestRequest::get(&format!("/review/detail/{}/", id)).empty())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_full_page_create_redirects_to_detail() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(
            TestRequest::post("/link/create/")
                .authenticated()
                .form(&[("name", "Axum docs"), ("url", "https://docs.rs/axum")]),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("/link/detail/"));
    assert_eq!(app.count("link").await, 1);
}

#[tokio::test]
async fn test_fragment_create_sends_hx_redirect_and_notice() {
    let app = TestApp::new().await;
    let router = app.router();

    let response = router
        .clone()
        .oneshot(
            TestRequest::post("/review/create/")
                .authenticated()
                .htmx()
                .session("s1")
                .form(&[("name", "Insightful")]),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let target = response.headers()["hx-redirect"].to_str().unwrap();
    assert!(target.starts_with("/review/detail/"));

    // The next page of the same session shows the notice once
    let response = router
        .clone()
        .oneshot(TestRequest::get(target).session("s1").empty())
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["template"], "app/base_detail.html");
    assert_eq!(page["context"]["messages"][0]["level"], "success");
    assert_eq!(
        page["context"]["messages"][0]["message"],
        "Your item was successfully created!"
    );

    let response = router
        .oneshot(TestRequest::get("/review/").session("s1").empty())
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["context"]["messages"].as_array().unwrap().len(), 0);
    assert_eq!(page["context"]["records"][0]["name"], "Insightful");
}

#[tokio::test]
async fn test_fragment_invalid_update_navigates_back() {
    let app = TestApp::new().await;
    let id = app
        .insert(
            "link",
            &[
                ("name", FieldValue::text("Rust")),
                ("url", FieldValue::text("https://www.rust-lang.org")),
            ],
        )
        .await;
    let before = app.storage.get(&app.kind("link"), id).await.unwrap();
    let referer = format!("/link/update/{}/", id);

    let router = app.router();
    let response = router
        .clone()
        .oneshot(
            TestRequest::post(&format!("/link/update/{}/", id))
                .authenticated()
                .htmx()
                .session("s2")
                .referer(&referer)
                .form(&[("name", "Rust"), ("url", "not a url")]),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-redirect"], referer.as_str());
    let body = body_json(response).await;
    assert_eq!(body["errors"][0]["field"], "url");

    let after = app.storage.get(&app.kind("link"), id).await.unwrap();
    assert_eq!(before, after);

    let response = router
        .oneshot(TestRequest::get("/link/").session("s2").empty())
        .await
        .unwrap();
    let page = body_json(response).await;
    let messages = page["context"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["level"], "warning");
    assert_eq!(messages[1]["level"], "info");
    assert_eq!(
        messages[1]["message"],
        "Before trying again, check if your item was created or updated"
    );
}

#[tokio::test]
async fn test_fragment_failure_ignores_foreign_referer() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(
            TestRequest::post("/task/update/999/")
                .authenticated()
                .htmx()
                .referer("https://elsewhere.example/phish/")
                .form(&[("name", "Ghost")]),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-redirect"], "/task/");
}

#[tokio::test]
async fn test_fragment_failure_without_referer_falls_back_to_list() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(
            TestRequest::post("/task/update/999/")
                .authenticated()
                .htmx()
                .form(&[("name", "Ghost")]),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-redirect"], "/task/");
}

#[tokio::test]
async fn test_fragment_update_renders_fields() {
    let app = TestApp::new().await;
    let id = app.insert_named("bibliography", "TAOCP").await;

    let response = app
        .router()
        .oneshot(
            TestRequest::post(&format!("/bibliography/update/{}/", id))
                .authenticated()
                .htmx()
                .form(&[
                    ("name", "TAOCP"),
                    ("publication_date", "1968-01-01"),
                    ("extra_data", "Volume 1"),
                ]),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["template"], "app/partials/base_fields.html");
    assert_eq!(page["mode"], "fragment");
    let fields = page["context"]["fields"].as_array().unwrap();
    let value_of = |label: &str| {
        fields
            .iter()
            .find(|f| f["label"] == label)
            .map(|f| f["value"].clone())
            .unwrap()
    };
    assert_eq!(value_of("Publication date"), "1968-01-01");
    assert_eq!(value_of("Extra data"), "Volume 1");
    assert_eq!(value_of("Authors"), "-");
    assert_eq!(
        page["context"]["messages"][0]["message"],
        "Your item was successfully updated!"
    );
}

#[tokio::test]
async fn test_full_page_invalid_create_rerenders_form() {
    let app = TestApp::new().await;
    app.insert_named("author", "Knuth").await;

    let response = app
        .router()
        .oneshot(
            TestRequest::post("/author/create/")
                .authenticated()
                .form(&[("name", "Knuth"), ("description", "Again")]),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let page = body_json(response).await;
    assert_eq!(page["template"], "app/base_form.html");
    assert_eq!(page["context"]["errors"][0]["field"], "name");
    let description = page["context"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["name"] == "description")
        .unwrap();
    assert_eq!(description["values"][0], "Again");
    assert_eq!(app.count("author").await, 1);
}

#[tokio::test]
async fn test_full_page_delete_redirects_to_list() {
    let app = TestApp::new().await;
    let id = app.insert_named("technology", "Rust").await;
    let router = app.router();

    let response = router
        .clone()
        .oneshot(
            TestRequest::get(&format!("/technology/delete/{}/", id))
                .authenticated()
                .empty(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["template"], "app/base_detail.html");
    assert_eq!(page["context"]["action"], format!("/technology/delete/{}/", id));

    let response = router
        .clone()
        .oneshot(
            TestRequest::post(&format!("/technology/delete/{}/", id))
                .authenticated()
                .empty(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/technology/");

    let response = router
        .oneshot(TestRequest::get(&format!("/technology/detail/{}/", id)).empty())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_fragment_delete_sends_hx_redirect() {
    let app = TestApp::new().await;
    let id = app.insert_named("cheatsheet", "Git").await;

    let response = app
        .router()
        .oneshot(
            TestRequest::post(&format!("/cheatsheet/delete/{}/", id))
                .authenticated()
                .htmx()
                .empty(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["hx-redirect"], "/cheatsheet/");
    assert_eq!(app.count("cheatsheet").await, 0);
}

#[tokio::test]
async fn test_missing_and_malformed_ids_are_not_found() {
    let app = TestApp::new().await;

    for uri in ["/diary/detail/77/", "/diary/detail/abc/"] {
        let response = app
            .router()
            .oneshot(TestRequest::get(uri).empty())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        let page = body_json(response).await;
        assert_eq!(page["template"], "app/error.html");
    }
}

#[tokio::test]
async fn test_fragment_detail_uses_fields_partial() {
    let app = TestApp::new().await;
    let id = app.insert_named("review", "Short").await;

    let response = app
        .router()
        .oneshot(
            TestRequest::get(&format!("/review/detail/{}/", id))
                .htmx()
                .empty(),
        )
        .await
        .unwrap();

    let page = body_json(response).await;
    assert_eq!(page["template"], "app/partials/base_fields.html");
    assert_eq!(page["context"]["record"]["id"], id.0);
}

#[tokio::test]
async fn test_session_cookie_is_issued() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(TestRequest::get("/").empty())
        .await
        .unwrap();
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("learou_session="));

    let response = app
        .router()
        .oneshot(TestRequest::get("/").session("known").empty())
        .await
        .unwrap();
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_home_and_health() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(TestRequest::get("/").authenticated().empty())
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["template"], "home.html");
    assert_eq!(page["context"]["kinds"].as_array().unwrap().len(), 19);
    assert_eq!(page["context"]["user"], "ana");

    let response = app
        .router()
        .oneshot(TestRequest::get("/health").empty())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "ok");
}

#[tokio::test]
async fn test_to_many_selection_from_repeated_keys() {
    let app = TestApp::new().await;
    let first = app.insert_named("review", "First").await;
    let second = app.insert_named("review", "Second").await;
    let first_id = first.to_string();
    let second_id = second.to_string();

    let response = app
        .router()
        .oneshot(
            TestRequest::post("/author/create/")
                .authenticated()
                .form(&[
                    ("name", "Hopper"),
                    ("review", &second_id),
                    ("review", &first_id),
                ]),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let authors = app.storage.list_all(&app.kind("author")).await.unwrap();
    assert_eq!(
        authors[0].value("review"),
        &FieldValue::Refs(vec![first, second])
    );
    assert_ne!(first, RecordId(0));
}
