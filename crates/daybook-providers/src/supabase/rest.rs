//! PostgREST record store.

use std::sync::Arc;

use daybook_core::RecordKind;
use serde_json::Value;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, read_json, transport_error, user_agent};
use crate::identity::{IdentityProvider, require_session};
use crate::provider::BoxFuture;
use crate::store::{RecordStore, Row, Subscription};

use super::config::SupabaseConfig;
use super::map_status;
use super::realtime;

/// Record store backed by Supabase tables.
///
/// Requests carry the signed-in user's JWT, so row-level security applies
/// on top of the explicit `user_id` filters.
pub struct SupabaseStore {
    config: SupabaseConfig,
    http_client: reqwest::Client,
    identity: Arc<dyn IdentityProvider>,
}

impl SupabaseStore {
    pub fn new(
        config: SupabaseConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;
        let http_client = build_client(config.timeout, &user_agent())?;
        Ok(Self {
            config,
            http_client,
            identity,
        })
    }

    async fn access_token(&self) -> ProviderResult<String> {
        Ok(require_session(self.identity.as_ref()).await?.access_token)
    }

    fn request(
        &self,
        method: reqwest::Method,
        kind: RecordKind,
        token: &str,
    ) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, self.config.rest_url(kind.table()))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> ProviderResult<Vec<Value>> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }
        read_json(response).await
    }

    async fn list_impl(&self, kind: RecordKind, owner: &str) -> ProviderResult<Vec<Value>> {
        let token = self.access_token().await?;
        let request = self
            .request(reqwest::Method::GET, kind, &token)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", owner)),
                ("order", "created_at.desc".to_string()),
            ]);
        let rows = self.execute(request).await?;
        debug!(%kind, count = rows.len(), "listed rows");
        Ok(rows)
    }

    async fn insert_impl(
        &self,
        kind: RecordKind,
        owner: &str,
        mut fields: Row,
    ) -> ProviderResult<Value> {
        let token = self.access_token().await?;
        fields.insert("user_id".into(), Value::String(owner.to_string()));
        let request = self
            .request(reqwest::Method::POST, kind, &token)
            .header("Prefer", "return=representation")
            .json(&fields);
        let rows = self.execute(request).await?;
        first_row(rows).ok_or_else(|| {
            ProviderError::invalid_response(format!("insert into {} returned no row", kind.table()))
        })
    }

    async fn update_impl(
        &self,
        kind: RecordKind,
        owner: &str,
        id: &str,
        patch: Row,
    ) -> ProviderResult<Value> {
        let token = self.access_token().await?;
        let request = self
            .request(reqwest::Method::PATCH, kind, &token)
            .query(&owned_row_filter(owner, id))
            .header("Prefer", "return=representation")
            .json(&patch);
        let rows = self.execute(request).await?;
        first_row(rows).ok_or_else(|| not_found(kind, id))
    }

    async fn delete_impl(&self, kind: RecordKind, owner: &str, id: &str) -> ProviderResult<()> {
        let token = self.access_token().await?;
        let request = self
            .request(reqwest::Method::DELETE, kind, &token)
            .query(&owned_row_filter(owner, id))
            .header("Prefer", "return=representation");
        let rows = self.execute(request).await?;
        if rows.is_empty() {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    async fn subscribe_impl(&self, kind: RecordKind, owner: &str) -> ProviderResult<Subscription> {
        let token = self.access_token().await?;
        realtime::subscribe(&self.config, kind, owner, &token).await
    }
}

/// PostgREST answers an update or delete that matched nothing with an empty
/// array, which covers both missing rows and rows of other owners.
fn owned_row_filter(owner: &str, id: &str) -> [(&'static str, String); 2] {
    [("id", format!("eq.{}", id)), ("user_id", format!("eq.{}", owner))]
}

fn first_row(rows: Vec<Value>) -> Option<Value> {
    rows.into_iter().next()
}

fn not_found(kind: RecordKind, id: &str) -> ProviderError {
    ProviderError::not_found(format!("{} {} not found", kind, id)).with_provider("supabase")
}

impl RecordStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    fn list<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<Value>>> {
        Box::pin(self.list_impl(kind, owner))
    }

    fn insert<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        fields: Row,
    ) -> BoxFuture<'a, ProviderResult<Value>> {
        Box::pin(self.insert_impl(kind, owner, fields))
    }

    fn update<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        id: &'a str,
        patch: Row,
    ) -> BoxFuture<'a, ProviderResult<Value>> {
        Box::pin(self.update_impl(kind, owner, id, patch))
    }

    fn delete<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_impl(kind, owner, id))
    }

    fn subscribe<'a>(
        &'a self,
        kind: RecordKind,
        owner: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Subscription>> {
        Box::pin(self.subscribe_impl(kind, owner))
    }
}
