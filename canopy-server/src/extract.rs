use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use canopy_core::ModelError;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// A JSON request body.  An empty body reads as `{}`; decoding errors map
/// onto MISSING_FIELD and VALIDATION_ERROR.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ModelError::Validation(e.to_string()))?;
        parse(&bytes).map(JsonBody)
    }
}

pub fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        bytes
    };
    serde_json::from_slice(body).map_err(|e| ModelError::invalid_body(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Named {
        name: String,
    }

    #[derive(Deserialize, Debug, Default)]
    #[serde(default)]
    struct Optional {
        title: Option<String>,
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        let parsed: Optional = parse(b"  ").unwrap();
        assert!(parsed.title.is_none());
    }

    #[test]
    fn test_missing_field_code() {
        let err = parse::<Named>(b"{}").unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELD");
        assert_eq!(parse::<Named>(br#"{"name": "x"}"#).unwrap().name, "x");
    }

    #[test]
    fn test_malformed_json() {
        assert_eq!(parse::<Named>(b"{nope").unwrap_err().code(), "VALIDATION_ERROR");
    }
}
