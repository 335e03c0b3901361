use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Claims, TokenType};

/// Identity baked into both token kinds.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: u64,
    pub email: String,
    pub role: u8,
    pub employee_id: Option<u64>,
}

fn issue(
    subject: &TokenSubject,
    token_type: TokenType,
    config: &Config,
) -> Result<(String, Claims), jsonwebtoken::errors::Error> {
    let ttl = match token_type {
        TokenType::Access => config.access_token_ttl,
        TokenType::Refresh => config.refresh_token_ttl,
    };

    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.email.clone(),
        role: subject.role,
        exp: Utc::now().timestamp() as usize + ttl,
        iss: config.jwt_issuer.clone(),
        jti: Uuid::new_v4().to_string(),
        token_type,
        employee_id: subject.employee_id,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn generate_access_token(
    subject: &TokenSubject,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue(subject, TokenType::Access, config).map(|(token, _)| token)
}

pub fn generate_refresh_token(
    subject: &TokenSubject,
    config: &Config,
) -> Result<(String, Claims), jsonwebtoken::errors::Error> {
    issue(subject, TokenType::Refresh, config)
}

/// Checks signature, expiry and issuer.
pub fn verify_token(token: &str, config: &Config) -> Result<Claims, String> {
    let mut validation = Validation::default();
    validation.set_issuer(&[config.jwt_issuer.as_str()]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

impl From<&Claims> for TokenSubject {
    fn from(claims: &Claims) -> Self {
        TokenSubject {
            user_id: claims.user_id,
            email: claims.sub.clone(),
            role: claims.role,
            employee_id: claims.employee_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: 42,
            email: "manager@example.com".into(),
            role: 2,
            employee_id: Some(7),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let config = test_config();
        let token = generate_access_token(&subject(), &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "manager@example.com");
        assert_eq!(claims.employee_id, Some(7));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_tokens_get_unique_ids() {
        let config = test_config();
        let (_, a) = generate_refresh_token(&subject(), &config).unwrap();
        let (_, b) = generate_refresh_token(&subject(), &config).unwrap();
        assert_eq!(a.token_type, TokenType::Refresh);
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn rejects_wrong_secret_and_issuer() {
        let config = test_config();
        let token = generate_access_token(&subject(), &config).unwrap();

        let mut other_secret = test_config();
        other_secret.jwt_secret = "a-completely-different-secret-value!!".into();
        assert!(verify_token(&token, &other_secret).is_err());

        let mut other_issuer = test_config();
        other_issuer.jwt_issuer = "someone-else".into();
        assert!(verify_token(&token, &other_issuer).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(verify_token("not.a.jwt", &test_config()).is_err());
    }
}
