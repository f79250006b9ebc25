//! Validated JSON extractor.
//!
//! Every way a body can be unusable ends up as one of two error codes:
//! `validation-error` when the JSON parsed but a field is wrong (bad value,
//! unknown enum variant such as a role, missing field), `bad-request` when
//! there is no usable JSON at all. Messages name the offending field.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use common::AppError;

const SERDE_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// JSON extractor that automatically validates the payload.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(rejection_error)?;

        value.validate().map_err(|e| AppError::validation(first_field_error(&e)))?;

        Ok(ValidatedJson(value))
    }
}

fn rejection_error(rejection: JsonRejection) -> AppError {
    match rejection {
        // `role: unknown variant ...`, `missing field ...`
        JsonRejection::JsonDataError(e) => {
            let text = e.body_text();
            AppError::validation(text.strip_prefix(SERDE_PREFIX).unwrap_or(&text).to_string())
        }
        JsonRejection::MissingJsonContentType(_) => {
            AppError::BadRequest("Expected an application/json body".to_string())
        }
        other => AppError::BadRequest(other.body_text()),
    }
}

/// The alphabetically first failing field, so the answer is stable.
fn first_field_error(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .find_map(|(field, errors)| {
            errors.first().map(|error| match &error.message {
                Some(message) => format!("{}: {}", field, message),
                None => format!("{}: invalid value", field),
            })
        })
        .unwrap_or_else(|| "Validation failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(email(message = "Invalid email format"))]
        email: String,
        #[validate(length(min = 8))]
        password: String,
    }

    #[test]
    fn first_failing_field_is_named() {
        let payload = Signup {
            email: "nope".into(),
            password: "short".into(),
        };
        let errors = payload.validate().unwrap_err();
        assert_eq!(first_field_error(&errors), "email: Invalid email format");
    }

    #[test]
    fn fields_without_message_still_name_themselves() {
        let payload = Signup {
            email: "a@x.com".into(),
            password: "short".into(),
        };
        let errors = payload.validate().unwrap_err();
        assert_eq!(first_field_error(&errors), "password: invalid value");
    }
}
