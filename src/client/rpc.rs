//! AMQP request/reply match function client
//!
//! Each run publishes the profile to the match function's request queue with
//! a fresh correlation id and an exclusive reply queue, then waits for the
//! matching reply. The broker connection is opened lazily on first use,
//! shared by every run through this client, and reopened once it closes.

use crate::client::trust::TrustMaterial;
use crate::client::wire::{RunReply, RunRequest};
use crate::client::MatchFunctionClient;
use crate::config::FunctionClientSettings;
use crate::context::FetchContext;
use crate::error::{FetchError, FetchResult, TransportError};
use crate::types::{FunctionEndpoint, Match, MatchProfile, TransportKind};
use amqprs::channel::{
    BasicConsumeArguments, BasicPublishArguments, Channel, QueueDeclareArguments,
};
use amqprs::connection::{Connection, OpenConnectionArguments};
use amqprs::tls::TlsAdaptor;
use amqprs::BasicProperties;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Holds the current broker connection and replaces it once closed
struct ConnectionSlot<C> {
    current: Mutex<Option<C>>,
}

impl<C> Default for ConnectionSlot<C> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<C: Clone> ConnectionSlot<C> {
    /// Return the stored connection while `is_open` holds for it, otherwise
    /// store and return a fresh one from `open`. A failed open leaves the
    /// slot empty.
    async fn get_or_open<O, Fut>(&self, is_open: impl Fn(&C) -> bool, open: O) -> FetchResult<C>
    where
        O: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<C>>,
    {
        let mut current = self.current.lock().await;
        if let Some(connection) = current.take() {
            if is_open(&connection) {
                *current = Some(connection.clone());
                return Ok(connection);
            }
            warn!("Broker connection closed, reopening");
        }

        let connection = open().await?;
        *current = Some(connection.clone());
        Ok(connection)
    }

    async fn is_open(&self, is_open: impl Fn(&C) -> bool) -> bool {
        self.current.lock().await.as_ref().is_some_and(is_open)
    }
}

/// Client for a match function reachable through an AMQP broker
pub struct RpcFunctionClient {
    endpoint: FunctionEndpoint,
    args: OpenConnectionArguments,
    request_queue: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    connection: ConnectionSlot<Connection>,
}

impl RpcFunctionClient {
    /// Prepare a client for the broker at `endpoint`.
    ///
    /// No network traffic happens here; TLS setup errors and invalid ports
    /// are reported immediately.
    pub fn new(
        endpoint: &FunctionEndpoint,
        trust: Option<&TrustMaterial>,
        settings: &FunctionClientSettings,
    ) -> FetchResult<Self> {
        let port = u16::try_from(endpoint.port).map_err(|_| {
            error!("Invalid match function port: {}", endpoint.port);
            FetchError::failed_to_connect()
        })?;

        let mut args = OpenConnectionArguments::new(
            &endpoint.host,
            port,
            &settings.rpc_username,
            &settings.rpc_password,
        );
        args.virtual_host(&settings.rpc_vhost);

        if let Some(trust) = trust {
            let adaptor = TlsAdaptor::without_client_auth(Some(trust.path()), endpoint.host.clone())
                .map_err(|e| {
                    error!(
                        "Failed to configure TLS for match function {}:{}: {}",
                        endpoint.host, endpoint.port, e
                    );
                    FetchError::failed_to_connect()
                })?;
            args.tls_adaptor(adaptor);
        }

        Ok(Self {
            endpoint: endpoint.clone(),
            args,
            request_queue: settings.rpc_queue.clone(),
            connect_timeout: settings.connect_timeout(),
            request_timeout: settings.request_timeout(),
            connection: ConnectionSlot::default(),
        })
    }

    pub fn request_queue(&self) -> &str {
        &self.request_queue
    }

    /// Whether an open broker connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.connection.is_open(Connection::is_open).await
    }

    async fn connection(&self) -> FetchResult<Connection> {
        self.connection
            .get_or_open(Connection::is_open, || async {
                let connection = tokio::time::timeout(
                    self.connect_timeout,
                    Connection::open(&self.args),
                )
                .await
                .map_err(|_| TransportError::Amqp {
                    message: format!(
                        "timed out connecting to {}:{}",
                        self.endpoint.host, self.endpoint.port
                    ),
                })?
                .map_err(TransportError::from)?;

                info!(
                    "Connected to match function broker at {}:{}",
                    self.endpoint.host, self.endpoint.port
                );
                Ok::<_, FetchError>(connection)
            })
            .await
    }

    /// One request/reply exchange, bounded by the request timeout
    async fn call_with_timeout(&self, profile: &MatchProfile) -> FetchResult<Vec<Match>> {
        tokio::time::timeout(self.request_timeout, self.call(profile))
            .await
            .map_err(|_| {
                FetchError::from(TransportError::Amqp {
                    message: format!(
                        "no reply from {}:{} within {}ms",
                        self.endpoint.host,
                        self.endpoint.port,
                        self.request_timeout.as_millis()
                    ),
                })
            })?
    }

    async fn call(&self, profile: &MatchProfile) -> FetchResult<Vec<Match>> {
        let connection = self.connection().await?;
        let channel = connection
            .open_channel(None)
            .await
            .map_err(TransportError::from)?;

        let result = self.call_on_channel(&channel, profile).await;

        if let Err(e) = channel.close().await {
            debug!("Failed to close reply channel: {}", e);
        }
        result
    }

    async fn call_on_channel(
        &self,
        channel: &Channel,
        profile: &MatchProfile,
    ) -> FetchResult<Vec<Match>> {
        let (reply_queue, _, _) = channel
            .queue_declare(QueueDeclareArguments::exclusive_server_named())
            .await
            .map_err(TransportError::from)?
            .ok_or_else(|| TransportError::Amqp {
                message: "broker did not name the reply queue".to_string(),
            })?;

        let correlation_id = Uuid::new_v4().to_string();
        let consume_args =
            BasicConsumeArguments::new(&reply_queue, &format!("mmf-reply-{}", correlation_id))
                .manual_ack(false)
                .finish();
        let (_consumer_tag, mut replies) = channel
            .basic_consume_rx(consume_args)
            .await
            .map_err(TransportError::from)?;

        let payload = serde_json::to_vec(&RunRequest {
            profile: profile.clone(),
        })
        .map_err(TransportError::from)?;

        let mut properties = BasicProperties::default();
        properties
            .with_correlation_id(&correlation_id)
            .with_reply_to(&reply_queue)
            .with_content_type("application/json");

        channel
            .basic_publish(
                properties,
                payload,
                BasicPublishArguments::new("", &self.request_queue),
            )
            .await
            .map_err(TransportError::from)?;

        while let Some(message) = replies.recv().await {
            let correlated = message
                .basic_properties
                .as_ref()
                .and_then(|properties| properties.correlation_id())
                .map(|id| id.as_str() == correlation_id.as_str())
                .unwrap_or(false);
            if !correlated {
                warn!(
                    "Discarding uncorrelated reply on {} (expected {})",
                    reply_queue, correlation_id
                );
                continue;
            }

            let content = message.content.unwrap_or_default();
            let reply: RunReply = serde_json::from_slice(&content).map_err(TransportError::from)?;
            return reply.into_result();
        }

        Err(TransportError::Amqp {
            message: "reply consumer closed before a response arrived".to_string(),
        }
        .into())
    }
}

#[async_trait]
impl MatchFunctionClient for RpcFunctionClient {
    async fn run(&self, ctx: &FetchContext, profile: &MatchProfile) -> FetchResult<Vec<Match>> {
        debug!(
            "Running RPC match function via {}:{} queue '{}' for profile '{}'",
            self.endpoint.host, self.endpoint.port, self.request_queue, profile.name
        );
        ctx.run(self.call_with_timeout(profile)).await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Rpc
    }
}
