use std::collections::HashSet;

use jsonwebtoken::{
    decode, encode, errors::Error, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    TokenData, Validation,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::routes::auth::claims::TokenUse;

/// Minimum acceptable size for the JWT secret in bytes.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;
/// Minimum number of unique bytes expected for the JWT secret to avoid trivially guessable values.
const MIN_UNIQUE_JWT_BYTES: usize = 8;

#[derive(Debug, Error)]
pub enum JwtSecretError {
    #[error("JWT_SECRET must be set")]
    Missing,
    #[error("JWT_SECRET must be at least {required} bytes, but {actual} bytes were provided")]
    TooShort { actual: usize, required: usize },
    #[error(
        "JWT_SECRET must contain sufficient entropy (at least {required} unique bytes); only {actual} unique bytes found"
    )]
    LowEntropy { actual: usize, required: usize },
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Result<Self, JwtSecretError> {
        let bytes = secret.as_ref();
        validate_secret(bytes)?;

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

pub trait JwtKeyProvider {
    fn jwt_keys(&self) -> &JwtKeys;
    fn jwt_issuer(&self) -> &str;
    fn jwt_audience(&self) -> &str;
}

/// Keys plus the issuer/audience pair every token is stamped with.
#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub keys: JwtKeys,
    pub issuer: String,
    pub audience: String,
}

impl JwtSettings {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Result<Self, JwtSecretError> {
        if secret.is_empty() {
            return Err(JwtSecretError::Missing);
        }
        Ok(Self {
            keys: JwtKeys::from_secret(secret)?,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        })
    }

    pub fn sign<C: SignedClaims>(&self, claims: C) -> Result<String, Error> {
        create_jwt(claims, &self.keys, &self.issuer, &self.audience)
    }

    pub fn verify<C: SignedClaims>(&self, token: &str, expected_use: TokenUse) -> Result<C, Error> {
        decode_jwt::<C>(token, &self.keys, &self.issuer, &self.audience, expected_use)
            .map(|data| data.claims)
    }
}

impl JwtKeyProvider for JwtSettings {
    fn jwt_keys(&self) -> &JwtKeys {
        &self.keys
    }

    fn jwt_issuer(&self) -> &str {
        &self.issuer
    }

    fn jwt_audience(&self) -> &str {
        &self.audience
    }
}

/// Claim sets signed with the shared keys. `token_use` keeps them from being swapped.
pub trait SignedClaims: Serialize + DeserializeOwned {
    fn stamp(&mut self, issuer: &str, audience: &str);
    fn expires_at(&self) -> usize;
    fn token_use(&self) -> &TokenUse;
}

fn validate_secret(secret: &[u8]) -> Result<(), JwtSecretError> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(JwtSecretError::TooShort {
            actual: secret.len(),
            required: MIN_JWT_SECRET_LENGTH,
        });
    }

    let unique = secret.iter().copied().collect::<HashSet<_>>().len();
    if unique < MIN_UNIQUE_JWT_BYTES {
        return Err(JwtSecretError::LowEntropy {
            actual: unique,
            required: MIN_UNIQUE_JWT_BYTES,
        });
    }

    Ok(())
}

pub fn create_jwt<C: SignedClaims>(
    mut claims: C,
    keys: &JwtKeys,
    issuer: &str,
    audience: &str,
) -> Result<String, Error> {
    claims.stamp(issuer, audience);
    encode(&Header::default(), &claims, keys.encoding_key())
}

pub fn decode_jwt<C: SignedClaims>(
    token: &str,
    keys: &JwtKeys,
    issuer: &str,
    audience: &str,
    expected_use: TokenUse,
) -> Result<TokenData<C>, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    validation.iss = Some(HashSet::from([issuer.to_owned()]));
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.required_spec_claims.insert("exp".to_string());
    let data = decode::<C>(token, keys.decoding_key(), &validation)?;

    if *data.claims.token_use() != expected_use {
        return Err(Error::from(ErrorKind::InvalidToken));
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    if (data.claims.expires_at() as i64) <= now {
        return Err(Error::from(ErrorKind::ExpiredSignature));
    }

    Ok(data)
}
