use std::fmt;

use axum::http::HeaderMap;

use crate::config::CredentialSource;
use crate::error::IdeError;

pub const ACCESS_KEY_ID_HEADER: &str = "x-fc-access-key-id";
pub const ACCESS_KEY_SECRET_HEADER: &str = "x-fc-access-key-secret";
pub const SECURITY_TOKEN_HEADER: &str = "x-fc-security-token";
pub const REGION_HEADER: &str = "x-fc-region";

pub const ACCESS_KEY_ID_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const SECURITY_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";
pub const REGION_ENV: &str = "AWS_REGION";

/// Object store credentials handed to the manager at runtime.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: Option<String>,
    pub region: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"***")
            .field("security_token", &self.security_token.as_ref().map(|_| "***"))
            .field("region", &self.region)
            .finish()
    }
}

impl Credential {
    pub fn resolve(source: CredentialSource, headers: &HeaderMap) -> Result<Self, IdeError> {
        match source {
            CredentialSource::Fc => Self::from_headers(headers),
            CredentialSource::Env => Self::from_env(),
        }
    }

    /// Read the credentials the function compute runtime puts on each request.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, IdeError> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self::build(
            get(ACCESS_KEY_ID_HEADER),
            get(ACCESS_KEY_SECRET_HEADER),
            get(SECURITY_TOKEN_HEADER),
            get(REGION_HEADER),
        )
        .map_err(|missing| {
            IdeError::Credential(format!(
                "can not get {missing} from the runtime request. Please make sure the function is granted access to the bucket"
            ))
        })
    }

    pub fn from_env() -> Result<Self, IdeError> {
        let get = |name: &str| std::env::var(name).ok();
        Self::build(
            get(ACCESS_KEY_ID_ENV),
            get(ACCESS_KEY_SECRET_ENV),
            get(SECURITY_TOKEN_ENV),
            get(REGION_ENV),
        )
        .map_err(|missing| {
            IdeError::Credential(format!("can not get {missing} from environment variable"))
        })
    }

    fn build(
        access_key_id: Option<String>,
        access_key_secret: Option<String>,
        security_token: Option<String>,
        region: Option<String>,
    ) -> Result<Self, &'static str> {
        let required = |value: Option<String>, name: &'static str| value.filter(|v| !v.is_empty()).ok_or(name);
        Ok(Self {
            access_key_id: required(access_key_id, "access key id")?,
            access_key_secret: required(access_key_secret, "access key secret")?,
            security_token: security_token.filter(|token| !token.is_empty()),
            region: required(region, "region")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serial_test::serial;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_from_headers() {
        let cred = Credential::from_headers(&headers(&[
            (ACCESS_KEY_ID_HEADER, "id"),
            (ACCESS_KEY_SECRET_HEADER, "secret"),
            (SECURITY_TOKEN_HEADER, "token"),
            (REGION_HEADER, "cn-hangzhou"),
        ]))
        .unwrap();

        assert_eq!(cred.access_key_id, "id");
        assert_eq!(cred.security_token.as_deref(), Some("token"));
        assert_eq!(cred.region, "cn-hangzhou");
        assert!(!format!("{cred:?}").contains("secret\""));
    }

    #[test]
    fn test_from_headers_token_optional() {
        let cred = Credential::from_headers(&headers(&[
            (ACCESS_KEY_ID_HEADER, "id"),
            (ACCESS_KEY_SECRET_HEADER, "secret"),
            (REGION_HEADER, "cn-hangzhou"),
        ]))
        .unwrap();
        assert_eq!(cred.security_token, None);
    }

    #[test]
    fn test_from_headers_missing_fields() {
        let err = Credential::from_headers(&headers(&[(ACCESS_KEY_ID_HEADER, "id")])).unwrap_err();
        assert!(matches!(err, IdeError::Credential(_)));
        assert!(err.to_string().contains("access key secret"));

        let err = Credential::from_headers(&headers(&[
            (ACCESS_KEY_ID_HEADER, "id"),
            (ACCESS_KEY_SECRET_HEADER, "secret"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        // SAFETY: serialized with the other environment tests
        unsafe {
            std::env::set_var(ACCESS_KEY_ID_ENV, "env-id");
            std::env::set_var(ACCESS_KEY_SECRET_ENV, "env-secret");
            std::env::remove_var(SECURITY_TOKEN_ENV);
            std::env::set_var(REGION_ENV, "us-east-1");
        }
        let cred = Credential::resolve(CredentialSource::Env, &HeaderMap::new());
        unsafe { std::env::remove_var(REGION_ENV) };
        let missing = Credential::from_env();
        unsafe {
            std::env::remove_var(ACCESS_KEY_ID_ENV);
            std::env::remove_var(ACCESS_KEY_SECRET_ENV);
        }

        let cred = cred.unwrap();
        assert_eq!(cred.access_key_id, "env-id");
        assert_eq!(cred.region, "us-east-1");
        assert!(missing.unwrap_err().to_string().contains("region"));
    }
}
