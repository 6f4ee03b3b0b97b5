//! Password hashing and opaque web session tokens.

use anyhow::{bail, Result};

use rand::Rng;
use rand_distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct AuthTokenValue(pub String);

impl AuthTokenValue {
    pub fn generate() -> AuthTokenValue {
        let rng = rand::rng();
        let random_string: String = rng
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        AuthTokenValue(random_string)
    }
}

/// A web session, identified by an opaque token stored in the `session_token` cookie.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AuthToken {
    pub user_id: String,
    pub value: AuthTokenValue,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
    pub expires: SystemTime,
}

impl AuthToken {
    pub fn new(user_id: &str, max_age: Duration) -> AuthToken {
        let now = SystemTime::now();
        AuthToken {
            user_id: user_id.to_owned(),
            value: AuthTokenValue::generate(),
            created: now,
            last_used: None,
            expires: now + max_age,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires <= SystemTime::now()
    }
}

mod karaoke_argon2 {
    use anyhow::{anyhow, Result};
    use argon2::{
        password_hash::{
            rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        },
        Argon2,
    };

    #[cfg(not(feature = "test-fast-hasher"))]
    fn argon2() -> Argon2<'static> {
        Argon2::default()
    }

    #[cfg(feature = "test-fast-hasher")]
    fn argon2() -> Argon2<'static> {
        use argon2::{Algorithm, Params, Version};
        let params = Params::new(8, 1, 1, None).unwrap_or_default();
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    pub fn generate_b64_salt() -> String {
        SaltString::generate(&mut OsRng).to_string()
    }

    pub fn hash<T: AsRef<str>>(plain: &[u8], b64_salt: T) -> Result<String> {
        let salt = SaltString::from_b64(b64_salt.as_ref()).map_err(|err| anyhow!("{}", err))?;
        let hash_string = argon2()
            .hash_password(plain, &salt)
            .map_err(|err| anyhow!("{}", err))?
            .to_string();
        Ok(hash_string)
    }

    pub fn verify<T: AsRef<str>>(plain_pw: &[u8], target_hash: T) -> Result<bool> {
        let password_hash =
            PasswordHash::new(target_hash.as_ref()).map_err(|err| anyhow!("{}", err))?;
        // The hash string carries its own params, so verification works across hasher configs.
        Ok(argon2().verify_password(plain_pw, &password_hash).is_ok())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum KaraokeHasher {
    Argon2,
}

impl FromStr for KaraokeHasher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argon2" => Ok(KaraokeHasher::Argon2),
            _ => bail!("Unknown hasher {}", s),
        }
    }
}

impl fmt::Display for KaraokeHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KaraokeHasher::Argon2 => write!(f, "argon2"),
        }
    }
}

impl KaraokeHasher {
    pub fn generate_b64_salt(&self) -> String {
        match self {
            KaraokeHasher::Argon2 => karaoke_argon2::generate_b64_salt(),
        }
    }

    pub fn hash<T: AsRef<str>>(&self, plain: &[u8], b64_salt: T) -> Result<String> {
        match self {
            KaraokeHasher::Argon2 => karaoke_argon2::hash(plain, b64_salt),
        }
    }

    pub fn verify<T: AsRef<str>>(&self, plain_pw: T, target_hash: T) -> Result<bool> {
        match self {
            KaraokeHasher::Argon2 => {
                karaoke_argon2::verify(plain_pw.as_ref().as_bytes(), target_hash)
            }
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UsernamePasswordCredentials {
    pub user_id: String,
    pub salt: String,
    pub hash: String,
    pub hasher: KaraokeHasher,

    pub created: SystemTime,
    pub last_tried: Option<SystemTime>,
    pub last_used: Option<SystemTime>,
}

impl UsernamePasswordCredentials {
    pub fn create(user_id: &str, password: &str) -> Result<UsernamePasswordCredentials> {
        let hasher = KaraokeHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password.as_bytes(), &salt)?;
        Ok(UsernamePasswordCredentials {
            user_id: user_id.to_owned(),
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
            last_tried: None,
            last_used: None,
        })
    }

    pub fn verify(&self, password: &str) -> Result<bool> {
        self.hasher.verify(password, self.hash.as_str())
    }
}
