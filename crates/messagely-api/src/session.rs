use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use messagely_types::api::Claims;

use crate::config::AuthConfig;
use crate::error::ApiError;

/// Signs and verifies session tokens (HS256, username as the only claim).
///
/// Tokens never expire and are not checked against the user table: a valid
/// signature is enough to act as the embedded username.
#[derive(Clone)]
pub struct SessionAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            encoding: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret_key.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, username: &str) -> Result<String, ApiError> {
        let claims = Claims {
            username: username.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("Failed to sign session token: {}", e))?;
        Ok(token)
    }

    pub fn verify(&self, token: Option<&str>) -> Result<Claims, ApiError> {
        let token = token.ok_or(ApiError::Unauthenticated)?;
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| ApiError::Unauthenticated)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashParams;

    fn authenticator(secret: &str) -> SessionAuthenticator {
        SessionAuthenticator::new(&AuthConfig {
            secret_key: secret.into(),
            hash: HashParams::minimal(),
        })
    }

    #[test]
    fn issued_token_verifies_to_username() {
        let sessions = authenticator("secret");
        let token = sessions.issue("alice").unwrap();
        let claims = sessions.verify(Some(&token)).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn missing_or_garbage_token_is_unauthenticated() {
        let sessions = authenticator("secret");
        assert!(matches!(sessions.verify(None), Err(ApiError::Unauthenticated)));
        assert!(matches!(
            sessions.verify(Some("not.a.token")),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = authenticator("other").issue("alice").unwrap();
        assert!(matches!(
            authenticator("secret").verify(Some(&token)),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let sessions = authenticator("secret");
        let token = sessions.issue("alice").unwrap();
        let forged_payload = sessions.issue("mallory").unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = forged_payload.split('.').nth(1).unwrap();
        let forged = parts.join(".");

        assert!(matches!(sessions.verify(Some(&forged)), Err(ApiError::Unauthenticated)));
    }
}
