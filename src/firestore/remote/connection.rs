use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value as JsonValue;
use url::Url;

use crate::firestore::constants::{FIRESTORE_API_HOST, FIRESTORE_API_VERSION, FIRESTORE_EMULATOR_HOST_ENV};
use crate::firestore::error::{internal_error, invalid_argument, FirestoreResult};
use crate::firestore::logger::LOGGER;
use crate::firestore::model::DatabaseId;

use super::rpc_error::{map_error_payload, map_http_error};

/// REST transport rooted at `.../v1/projects/{project}/databases/{database}`.
#[derive(Clone, Debug)]
pub struct Connection {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ConnectionBuilder {
    database_id: DatabaseId,
    client: Option<Client>,
    emulator_host: Option<String>,
    api_key: Option<String>,
}

#[derive(Default, Clone, Debug)]
pub struct RequestContext {
    pub auth_token: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl ConnectionBuilder {
    pub fn new(database_id: DatabaseId) -> Self {
        Self {
            database_id,
            client: None,
            emulator_host: std::env::var(FIRESTORE_EMULATOR_HOST_ENV)
                .ok()
                .filter(|host| !host.is_empty()),
            api_key: None,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.emulator_host = Some(host.into());
        self
    }

    /// Sends `key=<api_key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn build(self) -> FirestoreResult<Connection> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .build()
                .map_err(|err| internal_error(err.to_string()))?,
        };
        let base_url = build_base_url(&self.database_id, self.emulator_host.as_deref());
        Url::parse(&base_url)
            .map_err(|err| invalid_argument(format!("Invalid Firestore endpoint '{base_url}': {err}")))?;
        Ok(Connection {
            client,
            base_url,
            api_key: self.api_key,
        })
    }
}

impl Connection {
    pub fn builder(database_id: DatabaseId) -> ConnectionBuilder {
        ConnectionBuilder::new(database_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one JSON request. `path` is relative to the database root and
    /// must already be percent-encoded.
    pub async fn invoke_json(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<JsonValue>,
        context: &RequestContext,
    ) -> FirestoreResult<JsonValue> {
        let url = self.request_url(path, query)?;
        LOGGER.debug(format!("{method} {}", url.path()));

        let mut request = self.build_request(method, url, context);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| internal_error(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| internal_error(err.to_string()))?;
        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        let json: JsonValue =
            serde_json::from_str(&text).map_err(|err| internal_error(err.to_string()))?;
        if let Some(error) = json.get("error") {
            return Err(map_error_payload(status.as_u16(), error));
        }
        Ok(json)
    }

    fn request_url(&self, path: &str, query: &[(String, String)]) -> FirestoreResult<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw)
            .map_err(|err| invalid_argument(format!("Invalid request path '{path}': {err}")))?;
        if !query.is_empty() || self.api_key.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some(api_key) = self.api_key.as_deref() {
                pairs.append_pair("key", api_key);
            }
        }
        Ok(url)
    }

    fn build_request(&self, method: Method, url: Url, context: &RequestContext) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Some(timeout) = context.request_timeout {
                builder = builder.timeout(timeout);
            }
        }
        if let Some(token) = context.auth_token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder = builder.header("Content-Type", "application/json");
        builder
    }
}

fn build_base_url(database_id: &DatabaseId, emulator_host: Option<&str>) -> String {
    match emulator_host {
        Some(host) => format!(
            "http://{host}/{api_version}/{}",
            database_id.database_name(),
            api_version = FIRESTORE_API_VERSION
        ),
        None => format!(
            "{host}/{api_version}/{}",
            database_id.database_name(),
            host = FIRESTORE_API_HOST,
            api_version = FIRESTORE_API_VERSION
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_production_and_emulator_urls() {
        let database_id = DatabaseId::default("demo");
        let connection = Connection::builder(database_id.clone())
            .with_emulator_host("localhost:8080")
            .build()
            .unwrap();
        assert_eq!(
            connection.base_url(),
            "http://localhost:8080/v1/projects/demo/databases/(default)"
        );
        assert_eq!(
            build_base_url(&database_id, None),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)"
        );
    }

    #[test]
    fn appends_api_key_and_query() {
        let connection = Connection::builder(DatabaseId::default("demo"))
            .with_emulator_host("localhost:8080")
            .with_api_key("secret")
            .build()
            .unwrap();
        let url = connection
            .request_url("documents/cities", &[("pageSize".to_string(), "10".to_string())])
            .unwrap();
        assert_eq!(url.query(), Some("pageSize=10&key=secret"));
        assert_eq!(url.path(), "/v1/projects/demo/databases/(default)/documents/cities");
    }
}
