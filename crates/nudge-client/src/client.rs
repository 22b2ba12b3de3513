// SPDX-FileCopyrightText: 2026 Nudge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `reqwest` client for the trigger and event storage API.

use std::time::Duration;

use async_trait::async_trait;
use nudge_config::model::BackendConfig;
use nudge_core::{
    EventId, EventPatch, EventStore, NewTriggerEvent, NudgeError, OrganizationId, SessionId,
    TriggerDefinition, TriggerEvent, TriggerId, TriggerStore,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// HTTP client for the storage API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl BackendClient {
    /// Builds a client from the `[backend]` config section.
    pub fn new(config: &BackendConfig) -> Result<Self, NudgeError> {
        let mut base = config.base_url.trim().to_string();
        // `Url::join` replaces the last path segment unless the base ends in '/'.
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            NudgeError::Config(format!("invalid backend.base_url `{}`: {e}", config.base_url))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| NudgeError::Config(format!("invalid API key header value: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| NudgeError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url,
            timeout: config.timeout(),
        })
    }

    /// Base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, NudgeError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| NudgeError::Config(format!("invalid endpoint `{path}`: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Sends a request and maps transport failures and non-2xx statuses.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, NudgeError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        debug!(status = %status, url = %response.url(), "backend response received");

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(NudgeError::Backend {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, NudgeError> {
        let body = response.text().await.map_err(|e| NudgeError::Transport {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body).map_err(|e| NudgeError::Decode {
            message: format!("failed to parse backend response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> NudgeError {
        if e.is_timeout() {
            NudgeError::Timeout {
                duration: self.timeout,
            }
        } else {
            NudgeError::Transport {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

/// `POST events` may answer with the stored row or with a one-element array,
/// depending on the storage gateway's representation preference.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum CreatedEvent {
    One(TriggerEvent),
    Many(Vec<TriggerEvent>),
}

#[async_trait]
impl TriggerStore for BackendClient {
    async fn list_enabled(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<TriggerDefinition>, NudgeError> {
        let url = self.endpoint(
            "triggers",
            &[
                ("organizationId", organization_id.as_str()),
                ("enabled", "true"),
                ("order", "priority.desc"),
            ],
        )?;
        let response = self.send(self.client.get(url)).await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl EventStore for BackendClient {
    async fn create(&self, event: NewTriggerEvent) -> Result<TriggerEvent, NudgeError> {
        let url = self.endpoint("events", &[])?;
        let response = self.send(self.client.post(url).json(&event)).await?;
        match Self::decode::<CreatedEvent>(response).await? {
            CreatedEvent::One(created) => Ok(created),
            CreatedEvent::Many(rows) => rows.into_iter().next().ok_or(NudgeError::Decode {
                message: "backend returned no row for created event".to_string(),
                source: None,
            }),
        }
    }

    async fn latest(
        &self,
        trigger_id: &TriggerId,
        session_id: &SessionId,
    ) -> Result<Option<TriggerEvent>, NudgeError> {
        let url = self.endpoint(
            "events",
            &[
                ("triggerId", trigger_id.as_str()),
                ("sessionId", session_id.as_str()),
                ("order", "triggeredAt.desc"),
                ("limit", "1"),
            ],
        )?;
        let response = self.send(self.client.get(url)).await?;
        let rows: Vec<TriggerEvent> = Self::decode(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn patch(&self, id: &EventId, patch: EventPatch) -> Result<(), NudgeError> {
        let url = self.endpoint(&format!("events/{}", id.as_str()), &[])?;
        self.send(self.client.patch(url).json(&patch)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nudge_core::{EventMetadata, TriggerKind};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, api_key: Option<&str>) -> BackendClient {
        BackendClient::new(&BackendConfig {
            base_url: format!("{base_url}/api"),
            api_key: api_key.map(str::to_string),
            timeout_secs: 2,
        })
        .unwrap()
    }

    fn new_event() -> NewTriggerEvent {
        NewTriggerEvent {
            trigger_id: "t1".into(),
            organization_id: "org-1".into(),
            customer_id: None,
            session_id: "s1".into(),
            page_url: "/pricing".into(),
            triggered_at: "2026-03-01T12:00:00Z".parse().unwrap(),
            engaged: false,
            converted: false,
            metadata: EventMetadata {
                scroll_percentage: 55,
                time_on_page_secs: 12,
                cart_value: 0.0,
                utm_source: None,
                utm_campaign: None,
            },
        }
    }

    #[tokio::test]
    async fn list_enabled_sends_org_filter_and_decodes_definitions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/triggers"))
            .and(query_param("organizationId", "org-1"))
            .and(query_param("enabled", "true"))
            .and(header("authorization", "Bearer key-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "t1", "type": "scroll_percentage", "conditions": {"scrollPercentage": 50},
                 "delaySeconds": 0, "priority": 9, "message": "Hi", "enabled": true},
                {"id": "t2", "type": "exit_intent", "conditions": {},
                 "delaySeconds": 1, "priority": 5, "message": "Wait", "enabled": true}
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), Some("key-1"));
        let defs = client.list_enabled(&"org-1".into()).await.unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].kind(), Some(TriggerKind::ScrollPercentage));
        assert_eq!(defs[1].priority, 5);
    }

    #[tokio::test]
    async fn list_enabled_maps_server_error_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/triggers"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), None);
        let err = client.list_enabled(&"org-1".into()).await.unwrap_err();
        assert!(
            matches!(err, NudgeError::Backend { status: 503, ref message } if message == "down"),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn list_enabled_rejects_non_array_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/triggers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "nope"})))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), None);
        let err = client.list_enabled(&"org-1".into()).await.unwrap_err();
        assert!(matches!(err, NudgeError::Decode { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn create_posts_camel_case_body_and_accepts_array_reply() {
        let server = MockServer::start().await;
        let event = new_event();
        let mut stored = serde_json::to_value(&event).unwrap();
        stored["id"] = json!("ev-1");

        Mock::given(method("POST"))
            .and(path("/api/events"))
            .and(body_json(serde_json::to_value(&event).unwrap()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([stored])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), None);
        let created = client.create(event.clone()).await.unwrap();
        assert_eq!(created.id.as_str(), "ev-1");
        assert_eq!(created.record, event);
    }

    #[tokio::test]
    async fn latest_returns_first_row_or_none() {
        let server = MockServer::start().await;
        let mut stored = serde_json::to_value(new_event()).unwrap();
        stored["id"] = json!("ev-7");

        Mock::given(method("GET"))
            .and(path("/api/events"))
            .and(query_param("triggerId", "t1"))
            .and(query_param("sessionId", "s1"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/events"))
            .and(query_param("triggerId", "t-missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), None);
        let found = client.latest(&"t1".into(), &"s1".into()).await.unwrap();
        assert_eq!(found.unwrap().id.as_str(), "ev-7");
        let missing = client
            .latest(&"t-missing".into(), &"s1".into())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn patch_sends_only_set_flags() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/events/ev-3"))
            .and(body_json(json!({"converted": true})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), None);
        client
            .patch(
                &"ev-3".into(),
                EventPatch {
                    engaged: None,
                    converted: Some(true),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let client = test_client("http://127.0.0.1:9", None);
        let err = client.list_enabled(&"org-1".into()).await.unwrap_err();
        assert!(err.is_transport(), "got: {err:?}");
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_its_last_segment() {
        let client = test_client("http://localhost:1234", None);
        let url = client.endpoint("triggers", &[("a", "b")]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/api/triggers?a=b");
    }
}
