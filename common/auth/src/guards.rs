use axum::http::StatusCode;

/// Authorization gate over a role loaded from the profile store.
///
/// This is deliberately separate from authentication: a verified token whose
/// profile carries an under-privileged (or missing) role must still be
/// rejected.
#[derive(Debug, Clone)]
pub enum GuardError {
    MissingProfile,
    Forbidden { required: Vec<String> },
}

impl GuardError {
    pub fn into_response(self) -> (StatusCode, String) {
        match self {
            GuardError::MissingProfile => (
                StatusCode::FORBIDDEN,
                "No profile found for authenticated account".to_string(),
            ),
            GuardError::Forbidden { required } => (
                StatusCode::FORBIDDEN,
                if required.is_empty() {
                    "Insufficient role".to_string()
                } else {
                    format!("Insufficient role. Required one of: {}", required.join(", "))
                },
            ),
        }
    }
}

impl From<GuardError> for (StatusCode, String) {
    fn from(value: GuardError) -> Self {
        value.into_response()
    }
}

pub fn ensure_role(role: Option<&str>, allowed: &[&str]) -> Result<(), GuardError> {
    let Some(role) = role else {
        return Err(GuardError::MissingProfile);
    };

    if allowed.iter().any(|required| role == *required) {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            required: allowed.iter().map(|value| value.to_string()).collect(),
        })
    }
}
