use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub email: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeBody {
    pub category_ids: Vec<i64>,
}

fn required_email(email: Option<String>) -> AppResult<String> {
    email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("Missing required parameters email".into()))
}

/// GET /subscriptions?email=
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> AppResult<Json<Value>> {
    let email = required_email(query.email)?;
    let subscriptions = state
        .subscriptions
        .list(&email)
        .await
        .map_err(|e| e.or_generic("Failed to fetch subscriptions"))?;
    Ok(Json(json!(subscriptions)))
}

/// POST /subscriptions?email=
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
    Json(body): Json<SubscribeBody>,
) -> AppResult<Json<Value>> {
    let email = required_email(query.email)?;
    state
        .subscriptions
        .subscribe(&email, &body.category_ids)
        .await
        .map_err(|e| e.or_generic("Failed to update subscriptions"))?;
    Ok(Json(json!({ "message": "Email verification sent" })))
}

/// GET /subscriptions/verify?email=&token=
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<Value>> {
    let email = required_email(query.email)?;
    let token = query
        .token
        .ok_or_else(|| AppError::InvalidInput("Missing required parameters token".into()))?;
    state
        .subscriptions
        .verify(&email, &token)
        .await
        .map_err(|e| e.or_generic("Failed to verify email"))?;
    Ok(Json(json!({ "message": "Email verified" })))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use crate::api::test_app::{app, send};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_then_verify() {
        let app = app(None);

        let request = Request::builder()
            .method("POST")
            .uri("/subscriptions?email=amy%40example.com")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"categoryIds": [1, 3]}"#))
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Email verification sent");
        assert_eq!(app.email.sent().len(), 1);

        let (status, body) = send(&app.router, get("/subscriptions?email=amy%40example.com")).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<i64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["categoryId"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 3]);

        let (status, body) =
            send(&app.router, get("/subscriptions/verify?email=amy%40example.com&token=bad")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid token");

        let token = app.subscriptions.token_for("amy@example.com").unwrap();
        let uri = format!("/subscriptions/verify?email=amy%40example.com&token={}", token);
        let (status, _) = send(&app.router, get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.subscriptions.is_verified("amy@example.com"));
    }

    #[tokio::test]
    async fn test_missing_email_is_bad_request() {
        let app = app(None);

        let (status, body) = send(&app.router, get("/subscriptions")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required parameters email");
    }
}
