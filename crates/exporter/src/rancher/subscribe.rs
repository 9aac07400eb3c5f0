//! Event ingress — one live subscription to the Rancher resource-change
//! stream, re-established on every failure.
//!
//! The reader normalizes each frame into an [`Event`] and forwards it over a
//! bounded channel to the classifier. The channel is sized so that bursts
//! (a large stack upgrade emits thousands of changes) do not block the
//! reader; if it ever fills up the reader blocks rather than dropping,
//! because a lost event would corrupt the classifier's attempt tracking for
//! that entity permanently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};
use url::Url;

use crate::error::{ExporterError, Result};
use crate::event::{EntityClass, Event, Health, ResourceState};
use crate::metrics::{ALL_TAG, UNKNOWN_TAG};
use crate::names::NameCache;
use crate::rancher::client::RancherClient;

/// Rancher label carrying `<stackName>/<serviceName>` on every container.
const LABEL_STACK_SERVICE: &str = "io.rancher.stack_service.name";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One frame of the subscription stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeFrame {
    #[serde(default, deserialize_with = "super::nullable")]
    resource_type: String,
    #[serde(default)]
    data: Option<FramePayload>,
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    #[serde(default)]
    resource: Option<ResourceChange>,
}

/// The raw resource object inside a change frame. Everything is optional on
/// the wire; absent and `null` both collapse to the empty value here.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ResourceChange {
    #[serde(deserialize_with = "super::nullable")]
    base_type: String,
    #[serde(deserialize_with = "super::nullable")]
    id: String,
    #[serde(deserialize_with = "super::nullable")]
    name: String,
    #[serde(deserialize_with = "super::nullable")]
    state: String,
    #[serde(deserialize_with = "super::nullable")]
    health_state: String,
    #[serde(deserialize_with = "super::nullable")]
    stack_id: String,
    #[serde(deserialize_with = "super::nullable")]
    service_ids: Vec<String>,
    #[serde(deserialize_with = "super::nullable")]
    labels: HashMap<String, String>,
}

/// Derive the subscription address from the REST endpoint.
pub fn subscribe_url(endpoint: &Url, project_id: &str) -> Result<Url> {
    let mut url = endpoint.clone();
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Err(ExporterError::WebsocketAddress(endpoint.clone())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ExporterError::WebsocketAddress(endpoint.clone()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ExporterError::OpaqueUrl(endpoint.clone()))?;
        path.pop_if_empty();
        path.extend(["projects", project_id, "subscribe"]);
    }
    url.set_query(Some("eventNames=resource.change&limit=-1&sockId=1"));
    Ok(url)
}

pub struct EventIngress {
    client: Arc<RancherClient>,
    names: Arc<NameCache>,
    project_id: String,
    url: Url,
    auth: HeaderValue,
    tx: mpsc::Sender<Event>,
    shutdown: broadcast::Receiver<()>,
}

impl EventIngress {
    pub fn new(
        client: Arc<RancherClient>,
        names: Arc<NameCache>,
        project_id: String,
        tx: mpsc::Sender<Event>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let url = subscribe_url(client.endpoint(), &project_id)?;
        let auth = HeaderValue::from_str(&client.auth_header())?;
        Ok(Self {
            client,
            names,
            project_id,
            url,
            auth,
            tx,
            shutdown,
        })
    }

    /// Subscribe and read until shutdown. Reconnects forever on failure,
    /// with a capped backoff that resets after every successful connect.
    pub async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let request = match self.request() {
                Ok(request) => request,
                Err(e) => {
                    // Only reachable if the endpoint itself is unusable.
                    error!(error = %e, "cannot build subscription request");
                    return;
                }
            };

            let connected = tokio::select! {
                _ = self.shutdown.recv() => return,
                result = connect_async(request) => result,
            };

            match connected {
                Ok((mut ws, _)) => {
                    info!(url = %self.url, "subscribed to resource changes");
                    backoff = INITIAL_BACKOFF;
                    if self.read_frames(&mut ws).await {
                        let _ = ws.close(None).await;
                        return;
                    }
                    warn!("websocket disconnected, reconnecting");
                }
                Err(e) => {
                    warn!(error = %e, delay_secs = backoff.as_secs(), "websocket connect failed");
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    fn request(&self) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request = self.url.as_str().into_client_request()?;
        request.headers_mut().insert(AUTHORIZATION, self.auth.clone());
        Ok(request)
    }

    /// Read frames until the socket fails (`false`) or shutdown is
    /// requested (`true`).
    async fn read_frames(&mut self, ws: &mut WsStream) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => return true,
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()).await,
                    // Pings and binary frames are not resource changes.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        return false;
                    }
                    None => return false,
                }
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        let frame: ChangeFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        if frame.resource_type.is_empty() {
            return;
        }
        let Some(resource) = frame.data.and_then(|d| d.resource) else {
            return;
        };
        if let Some(event) = self.normalize(resource).await {
            self.emit(event).await;
        }
    }

    /// Project a raw resource change onto the normalized event the
    /// classifier consumes, enriching ancestor names on the way.
    async fn normalize(&self, resource: ResourceChange) -> Option<Event> {
        if resource.name == ALL_TAG {
            warn!(
                name = %resource.name,
                "observed name collides with the reserved wildcard tag"
            );
        }

        let state = ResourceState::parse(&resource.state);
        let health = Health::parse(&resource.health_state);

        match resource.base_type.as_str() {
            "stack" => {
                self.names.record_stack(&resource.id, &resource.name);
                Some(Event {
                    class: EntityClass::Stack,
                    id: resource.id,
                    name: resource.name,
                    state,
                    health,
                    parent_id: String::new(),
                    stack_name: String::new(),
                    service_name: String::new(),
                })
            }
            "service" => {
                let stack_name = self
                    .names
                    .resolve_stack(&self.client, &self.project_id, &resource.stack_id)
                    .await;
                Some(Event {
                    class: EntityClass::Service,
                    id: resource.id,
                    name: resource.name,
                    state,
                    health,
                    parent_id: resource.stack_id,
                    stack_name,
                    service_name: String::new(),
                })
            }
            "instance" => {
                let label = resource
                    .labels
                    .get(LABEL_STACK_SERVICE)
                    .map(String::as_str)
                    .unwrap_or("");
                let (stack_name, service_name) = split_stack_service(label);
                let parent_id = resource.service_ids.first().cloned().unwrap_or_default();
                Some(Event {
                    class: EntityClass::Instance,
                    id: resource.id,
                    name: resource.name,
                    state,
                    health,
                    parent_id,
                    stack_name,
                    service_name,
                })
            }
            _ => None,
        }
    }

    async fn emit(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                // Blocking the reader is the lesser evil: a dropped event
                // would desynchronize the classifier for that entity.
                warn!("event buffer full, blocking the stream reader");
                if self.tx.send(event).await.is_err() {
                    warn!("event channel closed, event lost");
                }
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Split the `<stack>/<service>` label, substituting the reserved unknown
/// tag for any missing half.
fn split_stack_service(label: &str) -> (String, String) {
    let (stack, service) = match label.split_once('/') {
        Some((stack, service)) => (stack, service),
        None => (label, ""),
    };
    let stack = if stack.is_empty() { UNKNOWN_TAG } else { stack };
    let service = if service.is_empty() { UNKNOWN_TAG } else { service };
    (stack.to_string(), service.to_string())
}
