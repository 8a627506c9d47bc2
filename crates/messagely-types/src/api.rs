use serde::{Deserialize, Serialize};

use crate::ValidationError;
use crate::models::UserProfile;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;

// -- JWT Claims --

/// Session token claims. The username is the only claim; tokens carry no
/// expiry and are trusted without a store lookup once the signature checks out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
}

/// The `_token` field every protected request carries in its JSON body.
/// Other fields are ignored here; the handler deserializes its own request type.
#[derive(Debug, Default, Deserialize)]
pub struct TokenEnvelope {
    #[serde(rename = "_token")]
    pub token: Option<String>,
}

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let len = self.username.chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
            return Err(ValidationError::UsernameLength {
                min: USERNAME_MIN_LEN,
                max: USERNAME_MAX_LEN,
            });
        }
        if !self
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(ValidationError::UsernameCharset);
        }
        if self.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(ValidationError::PasswordTooShort { min: PASSWORD_MIN_LEN });
        }
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("phone", &self.phone),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Missing { field });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

// -- Messages --

/// Body of `POST /messages`. The sender is never read from here; it comes
/// from the verified session.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to_username: String,
    pub body: String,
}

impl SendMessageRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.to_username.is_empty() {
            return Err(ValidationError::Missing { field: "to_username" });
        }
        if self.body.is_empty() {
            return Err(ValidationError::Missing { field: "body" });
        }
        Ok(())
    }
}

// -- Errors --

/// JSON body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
}
