// Copyright 2023 Remi Bernotavicius

use super::{router, AppState};
use crate::database::{self, models::UserRole};
use crate::images;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt as _;

struct TestApp {
    app: Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let state = AppState::new(database::test_pool(), images::temp_media_root(), 6);
        Self {
            app: router(state.clone(), &[]),
            state,
        }
    }

    fn conn(&self) -> database::PooledConnectionHandle {
        self.state.pool.get().unwrap()
    }

    /// Signs `username` up and returns a token for them.
    fn user(&self, username: &str, role: UserRole) -> String {
        let conn = &mut self.conn();
        let user = crate::users::signup_for_test(conn, username);
        crate::users::set_role(conn, &user.email, role).unwrap();
        crate::users::issue_token(conn, &user.email, &user.confirmation_code).unwrap()
    }

    async fn raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.raw(method, uri, token, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(self.state.media_root.as_path());
    }
}

#[tokio::test]
async fn signup_login_logout() {
    let t = TestApp::new();

    let (status, body) = t
        .call(
            Method::POST,
            "/api/users/",
            None,
            Some(json!({"email": "Ann@Example.com", "username": "ann"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "ann@example.com");

    let code = crate::users::find_by_email(&mut t.conn(), "ann@example.com")
        .unwrap()
        .unwrap()
        .confirmation_code;

    let (status, body) = t
        .call(
            Method::POST,
            "/api/auth/token/login/",
            None,
            Some(json!({"email": "ann@example.com", "confirmation_code": "WRONG"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["confirmation_code"].is_array());

    let (status, body) = t
        .call(
            Method::POST,
            "/api/auth/token/login/",
            None,
            Some(json!({"email": "ann@example.com", "confirmation_code": code})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["auth_token"].as_str().unwrap().to_owned();

    let (status, body) = t.call(Method::GET, "/api/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "ann");

    let (status, _) = t
        .call(Method::POST, "/api/auth/token/logout/", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = t.call(Method::GET, "/api/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());

    let (status, _) = t.call(Method::GET, "/api/users/me/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_writes_need_an_admin() {
    let t = TestApp::new();
    let admin = t.user("admin", UserRole::Admin);
    let user = t.user("user", UserRole::User);
    let tag = json!({"name": "Breakfast", "color": "#E26C2D", "slug": "breakfast"});

    let (status, _) = t
        .call(Method::POST, "/api/tags/", Some(&user), Some(tag.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = t
        .call(Method::POST, "/api/tags/", Some(&admin), Some(tag.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["slug"], "breakfast");

    let (status, body) = t
        .call(Method::POST, "/api/tags/", Some(&admin), Some(tag))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_string());

    for (name, unit) in [("Sugar", "g"), ("salt", "g"), ("milk", "ml")] {
        let (status, _) = t
            .call(
                Method::POST,
                "/api/ingredients/",
                Some(&admin),
                Some(json!({"name": name, "measurement_unit": unit})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = t.call(Method::GET, "/api/ingredients/?name=s", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Sugar", "salt"]);

    let uri = format!("/api/tags/{}/", created["id"]);
    let (status, _) = t.call(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = t.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], format!("tag {} not found", created["id"]));
}

#[tokio::test]
async fn recipes_cart_and_download() {
    use crate::catalog::{ingredient_for_test, tag_for_test};

    let t = TestApp::new();
    let cook = t.user("cook", UserRole::User);
    let (lunch, flour, eggs) = {
        let conn = &mut t.conn();
        (
            tag_for_test(conn, "lunch"),
            ingredient_for_test(conn, "flour", "g"),
            ingredient_for_test(conn, "eggs", "pcs"),
        )
    };

    let recipe = |name: &str, amount: i32| {
        json!({
            "tags": [lunch.id],
            "ingredients": [{"id": flour.id, "amount": amount}, {"id": eggs.id, "amount": 2}],
            "name": name,
            "image": images::TINY_PNG,
            "text": "mix and bake",
            "cooking_time": 30,
        })
    };

    let (status, _) = t
        .call(Method::POST, "/api/recipes/", None, Some(recipe("pie", 100)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, pie) = t
        .call(Method::POST, "/api/recipes/", Some(&cook), Some(recipe("pie", 100)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pie["ingredients"][0]["name"], "flour");
    assert_eq!(pie["author"]["username"], "cook");
    let image = pie["image"].as_str().unwrap().to_owned();
    assert!(image.starts_with("/media/recipes/images/"));

    let response = t.raw(Method::GET, &image, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, bread) = t
        .call(Method::POST, "/api/recipes/", Some(&cook), Some(recipe("bread", 250)))
        .await;

    let (status, listing) = t
        .call(Method::GET, "/api/recipes/?tags=lunch&tags=dinner&limit=1", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 2);
    assert_eq!(listing["results"][0]["name"], "bread");
    assert_eq!(
        listing["next"],
        "/api/recipes/?tags=lunch&tags=dinner&limit=1&page=2"
    );
    assert!(listing["previous"].is_null());

    for id in [&pie["id"], &bread["id"]] {
        let (status, summary) = t
            .call(
                Method::POST,
                &format!("/api/recipes/{id}/shopping_cart/"),
                Some(&cook),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(summary["cooking_time"], 30);
    }
    let (status, body) = t
        .call(
            Method::POST,
            &format!("/api/recipes/{}/shopping_cart/", pie["id"]),
            Some(&cook),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_string());

    let (_, in_cart) = t
        .call(Method::GET, "/api/recipes/?is_in_shopping_cart=1", Some(&cook), None)
        .await;
    assert_eq!(in_cart["count"], 2);
    assert_eq!(in_cart["results"][0]["is_in_shopping_cart"], true);

    let response = t
        .raw(
            Method::GET,
            "/api/recipes/download_shopping_cart/?format=txt",
            Some(&cook),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"shopping_list.txt\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<_> = text.lines().skip(3).collect();
    assert_eq!(lines, vec!["eggs (pcs) – 4", "flour (g) – 350"]);

    let response = t
        .raw(
            Method::GET,
            "/api/recipes/download_shopping_cart/",
            Some(&cook),
            None,
        )
        .await;
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");

    let (status, _) = t
        .call(
            Method::GET,
            "/api/recipes/download_shopping_cart/?format=docx",
            Some(&cook),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn editing_someone_elses_recipe_is_forbidden() {
    use crate::catalog::ingredient_for_test;

    let t = TestApp::new();
    let cook = t.user("cook", UserRole::User);
    let stranger = t.user("stranger", UserRole::User);
    let recipe = {
        let conn = &mut t.conn();
        let author = crate::users::find_by_email(conn, "cook@example.com")
            .unwrap()
            .unwrap();
        let salt = ingredient_for_test(conn, "salt", "g");
        crate::recipes::recipe_for_test(conn, &author, "brine", &[], &[(salt.id, 5)])
    };
    let uri = format!("/api/recipes/{}/", recipe.id);

    let (status, _) = t.call(Method::DELETE, &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .call(
            Method::PATCH,
            &uri,
            Some(&cook),
            Some(json!({"tags": [], "ingredients": [{"id": 12345, "amount": 1}]})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "ingredient 12345 not found");

    let (status, _) = t.call(Method::DELETE, &uri, Some(&cook), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn subscriptions_over_http() {
    let t = TestApp::new();
    let reader = t.user("reader", UserRole::User);
    t.user("writer", UserRole::User);
    let writer_id = crate::users::find_by_email(&mut t.conn(), "writer@example.com")
        .unwrap()
        .unwrap()
        .id;

    let uri = format!("/api/users/{writer_id}/subscribe/?recipes_limit=1");
    let (status, body) = t.call(Method::POST, &uri, Some(&reader), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_subscribed"], true);
    assert_eq!(body["recipes_count"], 0);

    let (status, body) = t
        .call(Method::GET, "/api/users/subscriptions/", Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["username"], "writer");

    let (_, detail) = t
        .call(Method::GET, &format!("/api/users/{writer_id}/"), Some(&reader), None)
        .await;
    assert_eq!(detail["is_subscribed"], true);

    let (status, _) = t.call(Method::DELETE, &uri, Some(&reader), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.call(Method::DELETE, &uri, Some(&reader), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let t = TestApp::new();
    let cook = t.user("cook", UserRole::User);

    let (status, body) = t
        .call(
            Method::POST,
            "/api/recipes/",
            Some(&cook),
            Some(json!({
                "tags": [],
                "ingredients": [],
                "name": "pie",
                "text": "mix",
                "cooking_time": "x",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["body"][0].as_str().unwrap().contains("cooking_time"));

    let (status, body) = t.call(Method::GET, "/api/recipes/abc/", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["id"].is_array());

    let (status, body) = t
        .call(
            Method::POST,
            "/api/auth/token/login/",
            None,
            Some(json!({"email": "cook@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["body"][0]
        .as_str()
        .unwrap()
        .contains("confirmation_code"));

    let (status, body) = t
        .call(Method::GET, "/api/users/?limit=many", Some(&cook), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["limit"].is_array());
}

#[tokio::test]
async fn huge_page_numbers_are_rejected() {
    let t = TestApp::new();

    let (status, body) = t
        .call(
            Method::GET,
            "/api/recipes/?page=9223372036854775807&limit=100",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["page"].is_array());
}
