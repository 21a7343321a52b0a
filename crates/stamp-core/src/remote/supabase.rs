//! Supabase (PostgREST) implementation of the remote entries table.
//!
//! Clients never send `updated_at`; the table stamps it on every write so
//! all devices filter on one clock:
//!
//! ```sql
//! alter table entries alter column updated_at set default now();
//!
//! create or replace function stamp_updated_at() returns trigger as $$
//! begin
//!     new.updated_at = now();
//!     return new;
//! end;
//! $$ language plpgsql;
//!
//! create trigger entries_stamp_updated_at
//!     before insert or update on entries
//!     for each row execute function stamp_updated_at();
//! ```

use std::env;
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::Deserialize;

use super::{OrderBy, RemoteError, RemoteFilter, RemoteTable};
use crate::models::EntryId;
use crate::sync::WirePayload;
use crate::util::{compact_text, format_iso_millis, is_http_url, normalize_text_option};
use crate::{Error, Result};

const ENV_URL: &str = "STAMP_SUPABASE_URL";
const ENV_ANON_KEY: &str = "STAMP_SUPABASE_ANON_KEY";
const ENV_ACCESS_TOKEN: &str = "STAMP_SUPABASE_ACCESS_TOKEN";
const ENV_TABLE: &str = "STAMP_SUPABASE_TABLE";
const ENV_PHOTO_BUCKET: &str = "STAMP_PHOTO_BUCKET";

const DEFAULT_TABLE: &str = "entries";
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Connection settings for a Supabase project.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub url: String,
    /// Public anon key, sent as `apikey`
    pub anon_key: String,
    /// Signed-in user's access token; the anon key is used as bearer when absent
    pub access_token: Option<String>,
    /// Entries table name
    pub table: String,
    /// Storage bucket for externalized photos; photos travel inline when absent
    pub photo_bucket: Option<String>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("table", &self.table)
            .field("photo_bucket", &self.photo_bucket)
            .finish()
    }
}

impl SupabaseConfig {
    /// Load Supabase configuration from environment variables.
    ///
    /// Returns `Ok(None)` when neither the URL nor the anon key is set.
    /// Returns an error when only one of them is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// PostgREST endpoint for the configured table.
    #[must_use]
    pub fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

pub(crate) fn parse_config(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<SupabaseConfig>> {
    let url = normalize_text_option(lookup(ENV_URL));
    let anon_key = normalize_text_option(lookup(ENV_ANON_KEY));

    let (url, anon_key) = match (url, anon_key) {
        (None, None) => return Ok(None),
        (Some(url), Some(anon_key)) => (url, anon_key),
        (None, Some(_)) => {
            return Err(Error::InvalidInput(format!(
                "Supabase configuration is incomplete. Missing: {ENV_URL}"
            )))
        }
        (Some(_), None) => {
            return Err(Error::InvalidInput(format!(
                "Supabase configuration is incomplete. Missing: {ENV_ANON_KEY}"
            )))
        }
    };

    if !is_http_url(&url) {
        return Err(Error::InvalidInput(format!(
            "{ENV_URL} must start with http:// or https://"
        )));
    }

    let table =
        normalize_text_option(lookup(ENV_TABLE)).unwrap_or_else(|| DEFAULT_TABLE.to_string());
    if !is_valid_identifier(&table) {
        return Err(Error::InvalidInput(format!(
            "{ENV_TABLE} must contain only letters, digits, and underscores"
        )));
    }

    Ok(Some(SupabaseConfig {
        url: url.trim_end_matches('/').to_string(),
        anon_key,
        access_token: normalize_text_option(lookup(ENV_ACCESS_TOKEN)),
        table,
        photo_bucket: normalize_text_option(lookup(ENV_PHOTO_BUCKET)),
    }))
}

/// HTTP client for the hosted entries table.
#[derive(Clone)]
pub struct SupabaseTableClient {
    table_url: String,
    anon_key: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl SupabaseTableClient {
    pub fn new(config: &SupabaseConfig) -> std::result::Result<Self, RemoteError> {
        if !is_http_url(&config.url) {
            return Err(RemoteError::InvalidConfiguration(
                "Supabase URL must include http:// or https://".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            table_url: config.table_url(),
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone(),
            client,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        authorize(request, &self.anon_key, self.access_token.as_deref())
    }
}

impl RemoteTable for SupabaseTableClient {
    async fn select(
        &self,
        filter: &RemoteFilter,
        order: OrderBy,
    ) -> std::result::Result<Vec<serde_json::Value>, RemoteError> {
        let filter_param = match filter {
            RemoteFilter::UpdatedSince(since) => {
                ("updated_at", format!("gte.{}", format_iso_millis(*since)))
            }
            RemoteFilter::IdIn(ids) if ids.is_empty() => return Ok(Vec::new()),
            RemoteFilter::IdIn(ids) => ("id", format!("in.({})", join_ids(ids))),
        };
        let direction = if order.descending { "desc" } else { "asc" };

        let request = self
            .client
            .get(&self.table_url)
            .query(&[("select", "*".to_string())])
            .query(&[filter_param])
            .query(&[("order", format!("{}.{direction}", order.column))])
            .header("Accept", "application/json");

        let response = ensure_success(self.authorize(request).send().await?).await?;
        let rows = response.json::<Vec<serde_json::Value>>().await?;
        tracing::debug!("Selected {} remote rows", rows.len());
        Ok(rows)
    }

    async fn upsert(&self, payloads: &[WirePayload]) -> std::result::Result<(), RemoteError> {
        if payloads.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .post(&self.table_url)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(payloads);

        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn delete(&self, id: &EntryId) -> std::result::Result<(), RemoteError> {
        let request = self
            .client
            .delete(&self.table_url)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal");

        ensure_success(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

/// Attach Supabase `apikey` and bearer headers.
pub(crate) fn authorize(
    request: RequestBuilder,
    anon_key: &str,
    access_token: Option<&str>,
) -> RequestBuilder {
    request
        .header("apikey", anon_key)
        .bearer_auth(access_token.unwrap_or(anon_key))
}

/// Turn a non-success response into `RemoteError::Api`.
pub(crate) async fn ensure_success(
    response: Response,
) -> std::result::Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Api {
        status: status.as_u16(),
        message: parse_api_error(&body),
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match payload.hint.and_then(|hint| normalize_text_option(Some(hint))) {
                Some(hint) => format!("{} (hint: {hint})", message.trim()),
                None => message.trim().to_string(),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed
    }
}

fn join_ids(ids: &[EntryId]) -> String {
    ids.iter()
        .map(EntryId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
