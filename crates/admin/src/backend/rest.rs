//! HTTP client for the hosted backend.
//!
//! # API Reference
//!
//! - Records: PostgREST under `{url}/rest/v1/{table}`
//!   - filters as `column=eq.value`, ordering as `order=column.desc`
//!   - writes send `Prefer: return=representation` so the affected rows come back
//! - Identity: GoTrue under `{url}/auth/v1`
//! - Authentication: `apikey` header always; `Authorization: Bearer` carries the
//!   signed-in user's access token, or the API key before sign-in
//!
//! # Sessions
//!
//! Sign-in keeps the GoTrue refresh token. The access token is refreshed
//! shortly before it expires and once more whenever a request is rejected
//! with 401. While a session is held, requests never fall back to the API
//! key; a session that cannot be refreshed fails with `Unauthorized` until
//! it is replaced or signed out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use billing_desk_core::{Email, UserId};

use super::{BackendError, Filter, IdentityProvider, Query, RecordStore, Table};
use crate::config::BackendConfig;
use crate::models::Principal;

/// PostgREST error code for a unique constraint violation.
const PG_UNIQUE_VIOLATION: &str = "23505";
/// PostgREST error code for a foreign key violation.
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
/// PostgREST error code for "no rows" on a single-object request.
const PGRST_NO_ROWS: &str = "PGRST116";
/// Refresh the access token when it expires within this many seconds.
const REFRESH_MARGIN_SECS: i64 = 30;

/// Hosted backend client.
///
/// Cheap to clone; clones share the HTTP connection pool and the signed-in
/// session token.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<RestBackendInner>,
}

struct RestBackendInner {
    client: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    session: RwLock<Option<AuthSession>>,
}

/// Tokens of the signed-in user.
struct AuthSession {
    access_token: SecretString,
    refresh_token: SecretString,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - TimeDelta::seconds(REFRESH_MARGIN_SECS) <= now)
    }
}

/// Error body returned by PostgREST and GoTrue.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        self.code.as_ref().map(|code| match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn message(self, status: StatusCode) -> String {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .unwrap_or_else(|| status.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: String,
    last_sign_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: String,
    /// Access token lifetime in seconds.
    expires_in: Option<i64>,
    user: UserResponse,
}

impl SessionResponse {
    /// Split into the stored tokens and the user.
    fn into_parts(self) -> (AuthSession, UserResponse) {
        let expires_at = self
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .map(|ttl| Utc::now() + ttl);
        let session = AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
        };
        (session, self.user)
    }
}

/// Sign-up returns a session when email confirmation is disabled and a bare
/// user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(SessionResponse),
    User(UserResponse),
}

impl TryFrom<UserResponse> for Principal {
    type Error = BackendError;

    fn try_from(user: UserResponse) -> Result<Self, Self::Error> {
        let email = Email::parse(&user.email)
            .map_err(|e| BackendError::Decode(format!("invalid principal email: {e}")))?;
        Ok(Self {
            id: UserId::new(user.id),
            email,
            last_sign_in_at: user.last_sign_in_at,
        })
    }
}

impl RestBackend {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Decode` if the API key is not a valid header
    /// value, or `BackendError::Transient` if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|e| BackendError::Decode(format!("invalid API key format: {e}")))?;
        api_key.set_sensitive(true);
        headers.insert("apikey", api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(RestBackendInner {
                client,
                base_url: config.url.clone(),
                api_key: config.api_key.clone(),
                session: RwLock::new(None),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| BackendError::Decode(format!("invalid endpoint {path}: {e}")))
    }

    fn table_url(&self, table: Table) -> Result<Url, BackendError> {
        self.endpoint(&format!("rest/v1/{}", table.name()))
    }

    /// The bearer token for the next request: the session's access token
    /// (refreshed first if it is about to expire), or the API key when
    /// nobody is signed in.
    async fn bearer(&self) -> Result<SecretString, BackendError> {
        let stale = {
            let session = self.inner.session.read().await;
            match session.as_ref() {
                None => return Ok(self.inner.api_key.clone()),
                Some(session) if !session.needs_refresh(Utc::now()) => {
                    return Ok(session.access_token.clone());
                }
                Some(session) => session.access_token.clone(),
            }
        };
        debug!("access token about to expire");
        self.refresh_session(&stale).await
    }

    async fn has_session(&self) -> bool {
        self.inner.session.read().await.is_some()
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// `stale` is the access token the caller found unusable; if another
    /// task already replaced it, the current token is returned without a
    /// second refresh.
    #[instrument(skip_all)]
    async fn refresh_session(&self, stale: &SecretString) -> Result<SecretString, BackendError> {
        let mut session = self.inner.session.write().await;
        let Some(current) = session.as_mut() else {
            return Err(BackendError::Unauthorized("signed out".to_owned()));
        };
        if current.access_token.expose_secret() != stale.expose_secret() {
            return Ok(current.access_token.clone());
        }

        let mut url = self.endpoint("auth/v1/token")?;
        url.set_query(Some("grant_type=refresh_token"));
        let request = self
            .inner
            .client
            .post(url)
            .json(&json!({ "refresh_token": current.refresh_token.expose_secret() }));

        let refreshed = match self.send_public::<SessionResponse>(request).await {
            Ok(refreshed) => refreshed,
            Err(error) => {
                warn!(error = %error, "session refresh failed");
                return Err(if error.is_transient() {
                    error
                } else {
                    BackendError::Unauthorized(format!("session expired: {error}"))
                });
            }
        };
        let (refreshed, _) = refreshed.into_parts();
        *current = refreshed;
        debug!("access token refreshed");
        Ok(current.access_token.clone())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let retry = request.try_clone();
        let bearer = self.bearer().await?;
        let response = dispatch(request, &bearer).await?;

        if response.status() == StatusCode::UNAUTHORIZED
            && self.has_session().await
            && let Some(retry) = retry
        {
            debug!("access token rejected, refreshing session");
            let bearer = self.refresh_session(&bearer).await?;
            return check(dispatch(retry, &bearer).await?).await;
        }
        check(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        decode(self.send(request).await?).await
    }

    /// Send an identity request authorized by the API key alone, whatever
    /// session is currently held.
    async fn send_public<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = dispatch(request, &self.inner.api_key).await?;
        decode(check(response).await?).await
    }

    async fn store_session(&self, response: SessionResponse) -> Result<Principal, BackendError> {
        let (session, user) = response.into_parts();
        *self.inner.session.write().await = Some(session);
        user.try_into()
    }
}

async fn dispatch(request: RequestBuilder, bearer: &SecretString) -> Result<Response, BackendError> {
    request
        .bearer_auth(bearer.expose_secret())
        .send()
        .await
        .map_err(|e| BackendError::Transient(e.to_string()))
}

async fn check(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(parse_error(response).await)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|e| BackendError::Decode(format!("failed to parse response: {e}")))
}

/// Render a query as PostgREST query-string parameters.
fn query_params(query: &Query) -> Vec<(String, String)> {
    let select = query.embed.map_or_else(
        || "*".to_owned(),
        |embed| format!("*,{}({})", embed.table.name(), embed.columns.join(",")),
    );

    let mut params = vec![("select".to_owned(), select)];
    params.extend(filter_params(&query.filters));
    if let Some(order) = query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_owned(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_owned(), limit.to_string()));
    }
    params
}

fn filter_params(filters: &[Filter]) -> impl Iterator<Item = (String, String)> + '_ {
    filters.iter().map(|filter| {
        let value = match &filter.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        (filter.column.to_owned(), format!("eq.{value}"))
    })
}

/// Map an error response onto the [`BackendError`] buckets.
async fn parse_error(response: Response) -> BackendError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let code = body.code();
    let message = body.message(status);

    match (status, code.as_deref()) {
        (_, Some(PG_UNIQUE_VIOLATION | PG_FOREIGN_KEY_VIOLATION)) | (StatusCode::CONFLICT, _) => {
            BackendError::Constraint(message)
        }
        (_, Some(PGRST_NO_ROWS)) | (StatusCode::NOT_FOUND, _) => BackendError::NotFound(message),
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            BackendError::Unauthorized(message)
        }
        (StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT, _) => {
            BackendError::Transient(message)
        }
        (s, _) if s.is_server_error() => BackendError::Transient(message),
        (s, _) => BackendError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl RecordStore for RestBackend {
    #[instrument(skip(self, query), fields(table = %table))]
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        let request = self
            .inner
            .client
            .get(self.table_url(table)?)
            .query(&query_params(query));
        let rows: Vec<Value> = self.send_json(request).await?;
        debug!(rows = rows.len(), "select completed");
        Ok(rows)
    }

    #[instrument(skip(self, record), fields(table = %table))]
    async fn insert(&self, table: Table, record: Value) -> Result<Value, BackendError> {
        let request = self
            .inner
            .client
            .post(self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(&record);
        let rows: Vec<Value> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode(format!("{table} insert returned no rows")))
    }

    #[instrument(skip(self, filters, patch), fields(table = %table))]
    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<u64, BackendError> {
        let params: Vec<(String, String)> = filter_params(filters).collect();
        let request = self
            .inner
            .client
            .patch(self.table_url(table)?)
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&patch);
        let rows: Vec<Value> = self.send_json(request).await?;
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl IdentityProvider for RestBackend {
    #[instrument(skip(self))]
    async fn current_user(&self) -> Result<Option<Principal>, BackendError> {
        if !self.has_session().await {
            return Ok(None);
        }

        let request = self.inner.client.get(self.endpoint("auth/v1/user")?);
        match self.send_json::<UserResponse>(request).await {
            Ok(user) => user.try_into().map(Some),
            Err(BackendError::Unauthorized(reason)) => {
                // The tokens stay in place so record calls keep failing
                // rather than running anonymously.
                warn!(%reason, "session rejected, no current user");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.set_query(Some("grant_type=password"));
        let request = self.inner.client.post(url).json(&json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        }));
        let session: SessionResponse = self.send_public(request).await?;
        self.store_session(session).await
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError> {
        let request = self.inner.client.post(self.endpoint("auth/v1/signup")?).json(&json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "data": { "role": "editor" },
        }));
        match self.send_public::<SignUpResponse>(request).await? {
            SignUpResponse::Session(session) => self.store_session(session).await,
            SignUpResponse::User(user) => user.try_into(),
        }
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        if !self.has_session().await {
            return Ok(());
        }
        let request = self.inner.client.post(self.endpoint("auth/v1/logout")?);
        let result = self.send(request).await.map(|_| ());
        // The local session is dropped even if the server call failed.
        *self.inner.session.write().await = None;
        result
    }
}
