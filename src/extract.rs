use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ApiError;

/// `axum::Json` answers malformed bodies with plain-text 422s; this
/// wrapper keeps every request-parsing failure inside the 400 JSON
/// envelope the rest of the API speaks.
#[derive(Debug)]
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => {
                Err(ApiError::InvalidInput(rejection.body_text()).into_response())
            }
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Same treatment for path parameters: a malformed `:id` answers 400
/// with the envelope instead of axum's plain-text rejection.
pub struct Path<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Path(value)) => Ok(Path(value)),
            Err(rejection) => {
                Err(ApiError::InvalidInput(rejection.body_text()).into_response())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    #[allow(dead_code)]
    struct AddItemBody {
        product_id: Uuid,
        quantity: i32,
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_field_answers_400_with_envelope() {
        let req = HttpRequest::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"quantity":2}"#))
            .unwrap();
        let err = Json::<AddItemBody>::from_request(req, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let v = body_json(err).await;
        assert_eq!(v["success"], serde_json::Value::Bool(false));
        assert!(v["message"].is_string());
    }

    #[tokio::test]
    async fn syntactically_broken_body_answers_400_with_envelope() {
        let req = HttpRequest::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = Json::<AddItemBody>::from_request(req, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let v = body_json(err).await;
        assert_eq!(v["success"], serde_json::Value::Bool(false));
    }

    #[tokio::test]
    async fn missing_content_type_answers_400_with_envelope() {
        let req = HttpRequest::builder()
            .method("POST")
            .body(Body::from(r#"{"productId":"x","quantity":2}"#))
            .unwrap();
        let err = Json::<AddItemBody>::from_request(req, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let v = body_json(err).await;
        assert_eq!(v["success"], serde_json::Value::Bool(false));
    }

    #[tokio::test]
    async fn malformed_path_id_answers_400_with_envelope() {
        async fn show(Path(id): Path<Uuid>) -> String {
            id.to_string()
        }
        let app = Router::new().route("/items/:id", get(show));
        let res = app
            .oneshot(
                HttpRequest::get("/items/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let v = body_json(res).await;
        assert_eq!(v["success"], serde_json::Value::Bool(false));
    }

    #[tokio::test]
    async fn well_formed_path_id_passes_through() {
        async fn show(Path(id): Path<Uuid>) -> String {
            id.to_string()
        }
        let id = Uuid::new_v4();
        let app = Router::new().route("/items/:id", get(show));
        let res = app
            .oneshot(
                HttpRequest::get(format!("/items/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
