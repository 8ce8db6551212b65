use crate::config::JwtConfig;
use crate::error::{AppError, Result};
use crate::models::{Identity, IdentityKind};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id, as a string
    pub sub: String,
    pub kind: IdentityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    pub fn identity(&self) -> Result<Identity> {
        let id = self.sub.parse::<i64>().map_err(|_| AppError::Unauthorized)?;
        Ok(Identity {
            id,
            kind: self.kind,
            role: self.role.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

/// Issues and verifies HS256 bearer tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expire_days),
        }
    }

    fn claims_for(&self, identity: &Identity, token_type: TokenType) -> Claims {
        let now = Utc::now();
        let (ttl, jti) = match token_type {
            TokenType::Access => (self.access_ttl, None),
            TokenType::Refresh => (self.refresh_ttl, Some(Uuid::new_v4().to_string())),
        };

        Claims {
            sub: identity.id.to_string(),
            kind: identity.kind,
            role: identity.role.clone(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti,
        }
    }

    pub(crate) fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            AppError::Internal
        })
    }

    pub fn create_access_token(&self, identity: &Identity) -> Result<String> {
        self.encode_claims(&self.claims_for(identity, TokenType::Access))
    }

    pub fn create_refresh_token(&self, identity: &Identity) -> Result<String> {
        self.encode_claims(&self.claims_for(identity, TokenType::Refresh))
    }

    pub fn create_token_pair(&self, identity: &Identity) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.create_access_token(identity)?,
            refresh_token: self.create_refresh_token(identity)?,
            token_type: "bearer",
        })
    }

    /// Check signature and expiry. Any failure is `Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Verify an access token and return the identity it carries.
    pub fn verify_access(&self, token: &str) -> Result<Identity> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized);
        }
        claims.identity()
    }

    /// Exchange a refresh token for a new token pair.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.verify(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AppError::Unauthorized);
        }
        self.create_token_pair(&claims.identity()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&JwtConfig {
            secret: "test-secret".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
        })
    }

    #[test]
    fn test_access_token_round_trip() {
        let svc = service();
        let identity = Identity::admin(12, "teller");

        let token = svc.create_access_token(&identity).unwrap();
        assert_eq!(svc.verify_access(&token).unwrap(), identity);
    }

    #[test]
    fn test_access_token_lifetime() {
        let svc = service();
        let token = svc.create_access_token(&Identity::user(1)).unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 30 * 60);
        assert!(claims.jti.is_none());
    }

    #[test]
    fn test_refresh_token_carries_jti() {
        let svc = service();
        let token = svc.create_refresh_token(&Identity::user(1)).unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let svc = service();
        let token = svc.create_refresh_token(&Identity::user(1)).unwrap();
        assert!(matches!(svc.verify_access(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_refresh_exchanges_pair() {
        let svc = service();
        let identity = Identity::admin(4, "support");
        let pair = svc.create_token_pair(&identity).unwrap();

        let next = svc.refresh(&pair.refresh_token).unwrap();
        assert_eq!(svc.verify_access(&next.access_token).unwrap(), identity);
        assert!(svc.refresh(&pair.access_token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service().create_access_token(&Identity::user(1)).unwrap();
        let other = TokenService::new(&JwtConfig {
            secret: "another-secret".to_string(),
            access_token_expire_minutes: 30,
            refresh_token_expire_days: 7,
        });
        assert!(matches!(other.verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let now = Utc::now().timestamp();
        let token = svc
            .encode_claims(&Claims {
                sub: "1".to_string(),
                kind: IdentityKind::User,
                role: None,
                token_type: TokenType::Access,
                iat: now - 7200,
                exp: now - 3600,
                jti: None,
            })
            .unwrap();
        assert!(svc.verify_access(&token).is_err());
    }

    #[test]
    fn test_non_numeric_subject_rejected() {
        let svc = service();
        let now = Utc::now().timestamp();
        let token = svc
            .encode_claims(&Claims {
                sub: "alice".to_string(),
                kind: IdentityKind::User,
                role: None,
                token_type: TokenType::Access,
                iat: now,
                exp: now + 60,
                jti: None,
            })
            .unwrap();
        assert!(svc.verify_access(&token).is_err());
    }
}
