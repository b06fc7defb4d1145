use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const SUBJECT_HEADER: &str = "x-identity-subject";
pub const NAME_HEADER: &str = "x-identity-name";

/// Caller identity as forwarded by the fronting auth proxy after token
/// verification: the identity provider's stable opaque subject plus
/// optional display claims. The core never inspects tokens itself.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub name: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(SUBJECT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(AppError::Unauthorized)?;

        let name = parts
            .headers
            .get(NAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(Identity { subject, name })
    }
}
