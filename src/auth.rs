/*!
Password hashing and session tokens.

Passwords are stored as Argon2id PHC strings in the `users` table. A
successful login gets an HS256-signed JWT naming the user and role; every
subsequent request presents it as a bearer token, and is authorized from
the claims alone without going back to the database.
*/
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::{
    store::Store,
    user::{Role, User},
    workflow::Error,
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Error hashing password: {0}")]
    Hash(String),
    #[error("Error signing token: {0}")]
    Sign(String),
    #[error("Token has expired.")]
    Expired,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Outcome of checking somebody's credentials.
#[derive(Debug)]
pub enum AuthResult {
    /// The password is right.
    Ok,
    BadPassword,
    NoSuchUser,
    /// The password is right, and here is a token for the user.
    Token { token: String, user: User },
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// An unparseable `hash` just fails to verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash won't parse: {}", &e);
            false
        },
    }
}

/// A random alphanumeric string suitable for a signing secret.
pub fn random_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Claims {
    /// The user's uname.
    pub sub: String,
    pub uid: i64,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates session tokens.
pub struct Issuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Issuer {{ [ keys ], ttl: {:?} }}", &self.ttl)
    }
}

impl Issuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, u: &User) -> Result<String, AuthError> {
        log::trace!("Issuer::issue( {:?} ) called.", u.uname());

        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: u.uname().to_owned(),
            uid: u.id(),
            role: u.role(),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Sign(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })?;
        Ok(data.claims)
    }
}

/// Checks `password` against the stored hash for `uname`.
pub async fn check_password(
    store: &Store,
    uname: &str,
    password: &str,
) -> Result<(AuthResult, Option<User>), Error> {
    log::trace!("check_password( Store, {:?}, [ password ] ) called.", uname);

    let u = match store.get_user_by_uname(uname).await? {
        None => { return Ok((AuthResult::NoSuchUser, None)); },
        Some(u) => u,
    };

    if verify_password(password, u.password_hash()) {
        Ok((AuthResult::Ok, Some(u)))
    } else {
        Ok((AuthResult::BadPassword, Some(u)))
    }
}

/// Checks credentials and, if they're good, issues a token.
pub async fn authenticate(
    store: &Store,
    issuer: &Issuer,
    uname: &str,
    password: &str,
) -> Result<AuthResult, Error> {
    log::trace!("authenticate( Store, Issuer, {:?}, [ password ] ) called.", uname);

    match check_password(store, uname, password).await? {
        (AuthResult::Ok, Some(user)) => {
            let token = issuer.issue(&user)?;
            log::info!("Issued token to {:?} ({}).", user.uname(), user.role());
            Ok(AuthResult::Token { token, user })
        },
        (res, _) => {
            log::info!("Failed login for {:?}: {:?}", uname, &res);
            Ok(res)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;
    use crate::user::BaseUser;

    fn student() -> User {
        BaseUser {
            id: 12,
            name: "John Smith".to_owned(),
            uname: "jsmith".to_owned(),
            password_hash: String::new(),
        }.into_student("3.2".to_owned(), 1)
    }

    #[test]
    fn hash_and_verify() {
        ensure_logging();

        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not a hash"));

        // Salted, so the same password hashes differently each time.
        assert_ne!(hash, hash_password("hunter2").unwrap());
    }

    #[test]
    fn issue_and_validate() {
        ensure_logging();

        let issuer = Issuer::new("frogs", Duration::minutes(10));
        let token = issuer.issue(&student()).unwrap();
        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.sub, "jsmith");
        assert_eq!(claims.uid, 12);
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn expired_token() {
        ensure_logging();

        let issuer = Issuer::new("frogs", Duration::minutes(-5));
        let token = issuer.issue(&student()).unwrap();
        assert!(matches!(issuer.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn forged_tokens() {
        ensure_logging();

        let issuer = Issuer::new("frogs", Duration::minutes(10));
        let token = issuer.issue(&student()).unwrap();

        let other = Issuer::new("toads", Duration::minutes(10));
        assert!(matches!(other.validate(&token), Err(AuthError::InvalidToken(_))));

        // Flip the first character of the signature.
        let sig_start = token.rfind('.').unwrap() + 1;
        let mut tampered = token[..sig_start].to_owned();
        tampered.push(if token[sig_start..].starts_with('A') { 'B' } else { 'A' });
        tampered.push_str(&token[sig_start + 1..]);
        assert!(issuer.validate(&tampered).is_err());

        assert!(issuer.validate("not.a.token").is_err());
    }

    #[test]
    fn secrets() {
        let s = random_secret(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, random_secret(32));
    }
}
