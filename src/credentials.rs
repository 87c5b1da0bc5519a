use crate::{http_client::RequestTimeout, Error, HttpClient, HttpError};
use chrono::Utc;
use http::header::{ACCEPT, CONTENT_TYPE};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::{
    basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
    AuthType, ClientId, ClientSecret, HttpRequest, HttpResponse, RefreshToken, RequestTokenError,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    error::Error as StdError,
    fmt,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

pub(crate) const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Cached tokens are refreshed once they expire within this margin.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Credentials read from a credentials file.
pub(crate) enum Credentials {
    ServiceAccount {
        client_email: String,
        private_key_id: Option<String>,
        token_uri: String,
        key: EncodingKey,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
        quota_project_id: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default)]
        token_uri: Option<String>,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        quota_project_id: Option<String>,
    },
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Transport failure of a token request.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct TokenTransportError(#[source] HttpError);

impl Credentials {
    /// Parse decoded credentials. Supports `service_account` and `authorized_user` files.
    pub(crate) fn from_json(value: Value) -> Result<Self, Error> {
        let file: CredentialsFile =
            serde_json::from_value(value).map_err(|err| Error::Credentials(err.to_string()))?;
        Ok(match file {
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
            } => Credentials::ServiceAccount {
                key: EncodingKey::from_rsa_pem(private_key.as_bytes())
                    .map_err(|err| Error::Credentials(format!("invalid private key: {}", err)))?,
                client_email,
                private_key_id,
                token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.into()),
            },
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                quota_project_id,
            } => Credentials::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri: DEFAULT_TOKEN_URI.into(),
                quota_project_id,
            },
        })
    }

    /// Project billed for quota according to the credentials.
    pub(crate) fn quota_project_id(&self) -> Option<&str> {
        match self {
            Credentials::ServiceAccount { .. } => None,
            Credentials::AuthorizedUser {
                quota_project_id, ..
            } => quota_project_id.as_deref(),
        }
    }

    /// Identifies the tokens these credentials get for the scopes.
    fn cache_key(&self, scopes: &[String]) -> String {
        let (principal, token_uri) = match self {
            Credentials::ServiceAccount {
                client_email,
                token_uri,
                ..
            } => (client_email, token_uri),
            Credentials::AuthorizedUser {
                refresh_token,
                token_uri,
                ..
            } => (refresh_token, token_uri),
        };
        format!("{} {} {}", principal, token_uri, scopes.join(" "))
    }

    /// Exchange the credentials for an OAuth 2.0 access token.
    ///
    /// Authorized users use the refresh token grant. Service accounts post a signed JWT bearer
    /// assertion (RFC 7523).
    pub(crate) fn fetch_access_token<C: HttpClient + ?Sized>(
        &self,
        client: &C,
        scopes: &[String],
        timeout: Option<Duration>,
    ) -> Result<BasicTokenResponse, Error> {
        let send = |mut request: HttpRequest| -> Result<HttpResponse, TokenTransportError> {
            if let Some(timeout) = timeout {
                request.extensions_mut().insert(RequestTimeout(timeout));
            }
            let response = client.send(request).map_err(TokenTransportError)?;
            Ok(response.map(|body| body.to_vec()))
        };

        match self {
            Credentials::ServiceAccount {
                client_email,
                private_key_id,
                token_uri,
                key,
            } => {
                let now = Utc::now().timestamp();
                let scope = scopes.join(" ");
                let claims = Claims {
                    iss: client_email,
                    scope: &scope,
                    aud: token_uri,
                    iat: now,
                    exp: now + ASSERTION_LIFETIME_SECS,
                };
                let mut header = Header::new(Algorithm::RS256);
                header.kid = private_key_id.clone();
                let assertion = jsonwebtoken::encode(&header, &claims, key)
                    .map_err(|err| Error::Credentials(format!("signing assertion: {}", err)))?;
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("grant_type", JWT_BEARER_GRANT_TYPE)
                    .append_pair("assertion", &assertion)
                    .finish();

                let request = http::Request::post(token_uri.as_str())
                    .header(ACCEPT, "application/json")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body.into_bytes())
                    .map_err(|err| Error::Token(err.to_string()))?;
                let response = send(request).map_err(|err| Error::Token(err.to_string()))?;
                decode_token_response(response)
            }
            Credentials::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
                ..
            } => {
                let token_url = TokenUrl::new(token_uri.clone())
                    .map_err(|err| Error::Credentials(format!("invalid token uri: {}", err)))?;
                let oauth_client = BasicClient::new(ClientId::new(client_id.clone()))
                    .set_client_secret(ClientSecret::new(client_secret.clone()))
                    .set_auth_type(AuthType::RequestBody)
                    .set_token_uri(token_url);
                let refresh_token = RefreshToken::new(refresh_token.clone());
                oauth_client
                    .exchange_refresh_token(&refresh_token)
                    .request(&send)
                    .map_err(token_error)
            }
        }
    }
}

fn decode_token_response(response: HttpResponse) -> Result<BasicTokenResponse, Error> {
    if !response.status().is_success() {
        let message = match serde_json::from_slice::<BasicErrorResponse>(response.body()) {
            Ok(error) => error.to_string(),
            Err(_) => String::from_utf8_lossy(response.body()).into_owned(),
        };
        return Err(Error::Token(format!(
            "{}: {}",
            response.status().as_u16(),
            message
        )));
    }
    serde_json::from_slice(response.body())
        .map_err(|err| Error::Token(format!("invalid token response: {}", err)))
}

fn token_error<E: StdError + 'static>(err: RequestTokenError<E, BasicErrorResponse>) -> Error {
    match err {
        RequestTokenError::ServerResponse(response) => Error::Token(response.to_string()),
        other => match other.source() {
            Some(source) => Error::Token(format!("{}: {}", other, source)),
            None => Error::Token(other.to_string()),
        },
    }
}

/// Access tokens shared by the clients of one factory.
///
/// A token is reused until it is about to expire. Tokens without a lifetime are not cached.
#[derive(Default)]
pub(crate) struct TokenCache {
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    key: String,
    secret: String,
    expires_at: Instant,
}

impl TokenCache {
    /// Return a cached access token for the credentials and scopes, or fetch a new one.
    pub(crate) fn access_token<C: HttpClient + ?Sized>(
        &self,
        credentials: &Credentials,
        client: &C,
        scopes: &[String],
        timeout: Option<Duration>,
    ) -> Result<String, Error> {
        let key = credentials.cache_key(scopes);
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref() {
            if token.key == key && Instant::now() + REFRESH_MARGIN < token.expires_at {
                return Ok(token.secret.clone());
            }
        }

        let response = credentials.fetch_access_token(client, scopes, timeout)?;
        let secret = response.access_token().secret().clone();
        *cached = response.expires_in().map(|expires_in| CachedToken {
            key,
            secret: secret.clone(),
            expires_at: Instant::now() + expires_in,
        });
        Ok(secret)
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ServiceAccount {
                client_email,
                token_uri,
                ..
            } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
            Credentials::AuthorizedUser {
                client_id,
                token_uri,
                ..
            } => f
                .debug_struct("AuthorizedUser")
                .field("client_id", client_id)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
        }
    }
}
