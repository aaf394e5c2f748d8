use std::sync::Arc;

use bytes::Bytes;
use rx_ratelimit::BucketLimiter;
use rx_ratelimit::RouteKey;
use rx_types::GatewayBot;
use rx_types::ModifyGuildMember;
use rx_types::Snowflake;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::client::ReqwestTransport;
use crate::config::RestConfig;
use crate::encoder::carries_body;
use crate::encoder::encode;
use crate::errors::Error;
use crate::errors::Result;
use crate::interpreter::interpret;
use crate::interpreter::Classification;
use crate::interpreter::Interpretation;
use crate::interpreter::Payload;
use crate::request::RequestSpec;
use crate::route::Endpoint;
use crate::route::Route;
use crate::transport::Transport;
use crate::transport::TransportRequest;

/// Rate-governed REST client
///
/// Cheap to clone; clones share the connection pool and every bucket.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    limiter: BucketLimiter,
    config: RestConfig,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: RestConfig, transport: Arc<dyn Transport>) -> Self {
        Self { inner: Arc::new(Inner { transport, limiter: BucketLimiter::new(), config }) }
    }

    pub fn config(&self) -> &RestConfig {
        &self.inner.config
    }

    pub fn limiter(&self) -> &BucketLimiter {
        &self.inner.limiter
    }

    /// Perform one logical API call
    ///
    /// Waits out closed buckets, retries connection resets up to the request's budget,
    /// and closes every attachment before returning.
    pub async fn execute(&self, spec: RequestSpec) -> Result<Payload> {
        self.execute_with_cancel(spec, &CancellationToken::new()).await
    }

    /// [`execute`](Self::execute), abandoned as soon as `cancel` fires
    pub async fn execute_with_cancel(&self, mut spec: RequestSpec, cancel: &CancellationToken) -> Result<Payload> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.run(&mut spec) => result,
        };

        spec.close_attachments();
        result
    }

    pub async fn get_gateway_bot(&self) -> Result<GatewayBot> {
        self.execute(RequestSpec::builder(Endpoint::GetGatewayBot).build()).await?.deserialize()
    }

    pub async fn modify_guild_member(&self, guild_id: Snowflake, user_id: Snowflake, changes: &ModifyGuildMember, reason: Option<&str>) -> Result<Payload> {
        let route = Route::endpoint(Endpoint::ModifyGuildMember).param("guild_id", guild_id).param("user_id", user_id);
        let mut builder = RequestSpec::builder(route).json(changes)?;
        if let Some(reason) = reason {
            builder = builder.reason(reason);
        }
        self.execute(builder.build()).await
    }

    async fn run(&self, spec: &mut RequestSpec) -> Result<Payload> {
        let key = spec.route().key();
        let limiter = &self.inner.limiter;

        limiter.acquire_global().await;
        limiter.acquire(&key).await;

        let files = if carries_body(spec.route().method()) { read_attachments(spec).await? } else { Vec::new() };
        let request = encode(spec, files)?;

        self.send(&request, &key, spec.retries()).await
    }

    async fn send(&self, request: &TransportRequest, key: &RouteKey, budget: u32) -> Result<Payload> {
        let limiter = &self.inner.limiter;
        let config = &self.inner.config;

        let mut attempt = 1;
        let mut waited = false;

        loop {
            debug!(method = %request.method, path = %request.path, attempt, "Sending request");

            let response = match self.inner.transport.send(request).await {
                Ok(response) => response,
                Err(err) if err.is_transient() && attempt < budget => {
                    warn!(path = %request.path, attempt, budget, error = %err, backoff_secs = config.transient_backoff.as_secs_f64(), "Connection dropped, retrying");
                    tokio::time::sleep(config.transient_backoff).await;
                    limiter.acquire_global().await;
                    limiter.acquire(key).await;
                    attempt += 1;
                    continue;
                }
                Err(err) if err.is_transient() => return Err(Error::Connectivity { attempts: attempt, source: err }),
                Err(err) => return Err(Error::Transport(err)),
            };

            let Interpretation { report, outcome } = interpret(response.status, &response.headers, &response.body);
            limiter.report(key, &report);

            match outcome? {
                Classification::Success(payload) => return Ok(payload),
                Classification::ApplicationError(err) => {
                    debug!(path = %request.path, status = err.status, code = err.code, "Request rejected");
                    return Err(Error::Http(err));
                }
                Classification::RateLimited { global, reset_after, bucket } => {
                    // The buckets may already be closed for longer than this response's window
                    let wait = limiter.global().reopens_in().max(limiter.resolve(key).reopens_in()).unwrap_or(reset_after);
                    if config.auto_wait_rate_limits && !waited && wait <= config.max_rate_limit_wait {
                        warn!(path = %request.path, global, wait_secs = wait.as_secs_f64(), "Rate limited, waiting to re-issue request");
                        waited = true;
                        limiter.acquire_global().await;
                        limiter.acquire(key).await;
                        continue;
                    }
                    return Err(Error::RateLimited { global, retry_after: reset_after, bucket });
                }
            }
        }
    }
}

async fn read_attachments(spec: &mut RequestSpec) -> Result<Vec<Bytes>> {
    let mut files = Vec::with_capacity(spec.attachments.len());
    for attachment in &mut spec.attachments {
        let data = attachment.read().await.map_err(|source| Error::Attachment { name: attachment.name().to_string(), source })?;
        files.push(data);
    }
    Ok(files)
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use super::testing::*;
    use super::*;
    use crate::attachment::testing::CountingHandle;
    use crate::attachment::FileAttachment;
    use crate::errors::TransportError;
    use crate::transport::RequestBody;

    fn client(transport: &Arc<ScriptedTransport>) -> RestClient {
        RestClient::with_transport(test_config(), Arc::clone(transport) as Arc<dyn Transport>)
    }

    fn gateway() -> RequestSpec {
        RequestSpec::builder(Endpoint::GetGatewayBot).build()
    }

    fn message(channel: u64) -> Route {
        Route::endpoint(Endpoint::CreateMessage).param("channel_id", channel)
    }

    fn assert_close(actual: Duration, expected: Duration) {
        let diff = if actual > expected { actual - expected } else { expected - actual };
        assert!(diff <= Duration::from_millis(2), "expected ~{:?}, got {:?}", expected, actual);
    }

    const GATEWAY_BODY: &str =
        r#"{"url":"wss://gateway.discord.gg","shards":1,"session_start_limit":{"total":1000,"remaining":999,"reset_after":14400000,"max_concurrency":1}}"#;

    #[tokio::test(start_paused = true)]
    async fn test_gateway_bot_updates_bucket() {
        let transport = Arc::new(ScriptedTransport::new([Ok(json(
            200,
            &[("x-ratelimit-limit", "5"), ("x-ratelimit-remaining", "4"), ("x-ratelimit-reset-after", "1.0"), ("x-ratelimit-bucket", "gw")],
            GATEWAY_BODY,
        ))]));
        let client = client(&transport);

        let gateway = client.get_gateway_bot().await.unwrap();
        assert_eq!(gateway.url, "wss://gateway.discord.gg");
        assert_eq!(gateway.shards, 1);

        let bucket = client.limiter().resolve(&Route::endpoint(Endpoint::GetGatewayBot).key());
        assert!(!bucket.is_closed());
        assert_eq!(bucket.remaining(), Some(4));
        assert_eq!(transport.calls(), 1);

        let (_, request) = &transport.sent.lock()[0];
        assert_eq!(request.path, "/gateway/bot");
        assert_eq!(request.body, RequestBody::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_resets_exhaust_budget() {
        let transport = Arc::new(ScriptedTransport::new([
            Err(TransportError::ConnectionReset),
            Err(TransportError::ConnectionAborted),
            Err(TransportError::ConnectionReset),
            Ok(response(200, &[], "")),
        ]));
        let client = client(&transport);
        let start = Instant::now();

        let err = client.execute(RequestSpec::builder(Endpoint::GetGatewayBot).retries(3).build()).await.unwrap_err();

        assert!(matches!(err, Error::Connectivity { attempts: 3, source: TransportError::ConnectionReset }));
        assert_eq!(transport.calls(), 3);
        assert_close(Instant::now() - start, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_then_success() {
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::ConnectionReset), Ok(response(200, &[("content-type", "text/plain")], "ok"))]));
        let client = client(&transport);

        let payload = client.execute(RequestSpec::builder(Endpoint::GetGatewayBot).retries(2).build()).await.unwrap();
        assert_eq!(payload, Payload::Text("ok".into()));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_by_default() {
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::ConnectionReset)]));
        let err = client(&transport).execute(gateway()).await.unwrap_err();

        assert!(matches!(err, Error::Connectivity { attempts: 1, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_reset_waits_for_global_closure() {
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::ConnectionReset), Ok(response(204, &[], ""))]));
        let client = client(&transport);
        let start = Instant::now();

        let limiter = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            limiter.limiter().global().close_for(Duration::from_secs(30));
        });

        client.execute(RequestSpec::builder(Endpoint::GetGatewayBot).retries(2).build()).await.unwrap();

        let sent = transport.sent_at();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], start);
        assert_close(sent[1] - start, Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_reset_waits_for_route_pause() {
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::ConnectionReset), Ok(response(204, &[], ""))]));
        let client = client(&transport);
        let key = Route::endpoint(Endpoint::GetGatewayBot).key();
        let start = Instant::now();

        let limiter = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            limiter.limiter().resolve(&key).record(Some(0), Some(Duration::from_secs(9)));
        });

        client.execute(RequestSpec::builder(Endpoint::GetGatewayBot).retries(2).build()).await.unwrap();

        assert_close(transport.sent_at()[1] - start, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::Timeout)]));
        let err = client(&transport).execute(RequestSpec::builder(Endpoint::GetGatewayBot).retries(5).build()).await.unwrap_err();

        assert!(matches!(err, Error::Transport(TransportError::Timeout)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new([Ok(json(404, &[("x-ratelimit-remaining", "3")], r#"{"code":10013,"message":"Unknown User"}"#))]));
        let client = client(&transport);
        let route = Route::endpoint(Endpoint::GetGuildMember).param("guild_id", 1).param("user_id", 2);

        let err = client.execute(RequestSpec::builder(route.clone()).retries(3).build()).await.unwrap_err();

        match err {
            Error::Http(err) => {
                assert_eq!(err.status, 404);
                assert_eq!(err.code, 10013);
                assert_eq!(err.message, "Unknown User");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.limiter().resolve(&route.key()).remaining(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_429_waits_and_reissues() {
        let transport = Arc::new(ScriptedTransport::new([
            Ok(json(429, &[("x-ratelimit-global", "true"), ("x-ratelimit-reset-after", "2.5")], r#"{"retry_after":2.5,"global":true}"#)),
            Ok(json(200, &[], GATEWAY_BODY)),
        ]));
        let client = client(&transport);
        let start = Instant::now();

        let payload = client.execute(gateway()).await.unwrap();

        assert!(payload.json().is_some());
        let sent = transport.sent_at();
        assert_eq!(sent.len(), 2);
        assert_close(sent[1] - start, Duration::from_millis(2500));
        assert!(!client.limiter().global().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_429_blocks_other_routes() {
        let transport = Arc::new(ScriptedTransport::new([
            Ok(json(429, &[("x-ratelimit-global", "true"), ("x-ratelimit-reset-after", "2.5")], r#"{"retry_after":2.5,"global":true}"#)),
            Ok(json(200, &[], r#"{"id":"1"}"#)),
        ]));
        let mut config = test_config();
        config.auto_wait_rate_limits = false;
        let client = RestClient::with_transport(config, Arc::clone(&transport) as Arc<dyn Transport>);
        let start = Instant::now();

        let err = client.execute(gateway()).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { global: true, .. }));

        client.execute(RequestSpec::builder(message(9)).json_value(json!({"content": "hi"})).build()).await.unwrap();

        let sent = transport.sent_at();
        assert_eq!(sent[0], start);
        assert_close(sent[1] - start, Duration::from_millis(2500));

        // The 429 came from the global scope, so the route bucket stayed open
        assert!(!client.limiter().resolve(&Route::endpoint(Endpoint::GetGatewayBot).key()).is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_429_surfaced_when_auto_wait_disabled() {
        let transport = Arc::new(ScriptedTransport::new([Ok(json(429, &[("x-ratelimit-reset-after", "1.5"), ("x-ratelimit-bucket", "b")], r#"{"retry_after":1.5,"global":false}"#))]));
        let mut config = test_config();
        config.auto_wait_rate_limits = false;
        let client = RestClient::with_transport(config, Arc::clone(&transport) as Arc<dyn Transport>);

        let err = client.execute(gateway()).await.unwrap_err();

        match err {
            Error::RateLimited { global, retry_after, bucket } => {
                assert!(!global);
                assert_eq!(retry_after, Duration::from_millis(1500));
                assert_eq!(bucket.as_deref(), Some("b"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(client.limiter().resolve(&Route::endpoint(Endpoint::GetGatewayBot).key()).is_closed());
        assert!(!client.limiter().global().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_over_maximum_is_surfaced() {
        let transport = Arc::new(ScriptedTransport::new([Ok(json(429, &[("x-ratelimit-reset-after", "600")], "{}"))]));
        let err = client(&transport).execute(gateway()).await.unwrap_err();

        assert!(matches!(err, Error::RateLimited { retry_after, .. } if retry_after == Duration::from_secs(600)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_longer_global_closure_is_surfaced() {
        let transport = Arc::new(
            ScriptedTransport::new([Ok(json(429, &[("x-ratelimit-reset-after", "1")], r#"{"retry_after":1,"global":false}"#))]).with_latency(Duration::from_secs(1)),
        );
        let client = client(&transport);
        let start = Instant::now();

        let limiter = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            limiter.limiter().global().close_for(Duration::from_secs(120));
        });

        let err = client.execute(gateway()).await.unwrap_err();

        assert!(matches!(err, Error::RateLimited { global: false, .. }));
        assert_eq!(transport.calls(), 1);
        assert_close(Instant::now() - start, Duration::from_secs(1));
        assert!(client.limiter().global().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_429_is_surfaced() {
        let limited = || Ok(json(429, &[("x-ratelimit-reset-after", "1")], "{}"));
        let transport = Arc::new(ScriptedTransport::new([limited(), limited()]));

        let err = client(&transport).execute(gateway()).await.unwrap_err();

        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_delays_next_call() {
        let transport = Arc::new(ScriptedTransport::new([
            Ok(json(200, &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset-after", "1.0")], GATEWAY_BODY)),
            Ok(json(200, &[("x-ratelimit-remaining", "4"), ("x-ratelimit-reset-after", "1.0")], GATEWAY_BODY)),
        ]));
        let client = client(&transport);
        let start = Instant::now();

        client.execute(gateway()).await.unwrap();
        client.execute(gateway()).await.unwrap();

        let sent = transport.sent_at();
        assert_eq!(sent[0], start);
        assert_close(sent[1] - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_error_still_reports_headers() {
        let transport = Arc::new(ScriptedTransport::new([Ok(json(200, &[("x-ratelimit-remaining", "2")], "{broken"))]));
        let client = client(&transport);

        let err = client.execute(gateway()).await.unwrap_err();

        assert!(matches!(err, Error::Decode { status: 200, .. }));
        assert_eq!(client.limiter().resolve(&Route::endpoint(Endpoint::GetGatewayBot).key()).remaining(), Some(2));
    }

    fn with_attachments(route: Route, closes: &Arc<AtomicUsize>, n: usize) -> RequestSpec {
        RequestSpec::builder(route)
            .json_value(json!({"content": "files"}))
            .attachments((0..n).map(|i| FileAttachment::from_handle(format!("f{i}.txt"), CountingHandle::new(closes, b"data"))))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachments_closed_on_success() {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedTransport::new([Ok(json(200, &[], r#"{"id":"1"}"#))]));

        client(&transport).execute(with_attachments(message(1), &closes, 3)).await.unwrap();

        assert_eq!(closes.load(Ordering::SeqCst), 3);
        let (_, request) = &transport.sent.lock()[0];
        let RequestBody::Multipart { files, .. } = &request.body else {
            panic!("expected multipart");
        };
        assert_eq!(files.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachments_closed_on_http_error() {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedTransport::new([Ok(json(403, &[], r#"{"code":50013,"message":"Missing Permissions"}"#))]));

        let err = client(&transport).execute(with_attachments(message(1), &closes, 2)).await.unwrap_err();

        assert!(matches!(err, Error::Http(_)));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachments_closed_on_transport_fault() {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::ConnectionReset), Err(TransportError::ConnectionReset)]));
        let mut spec = with_attachments(message(1), &closes, 2);
        spec.retries = 2;

        let err = client(&transport).execute(spec).await.unwrap_err();

        assert!(matches!(err, Error::Connectivity { attempts: 2, .. }));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachments_closed_when_read_fails() {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedTransport::default());
        let spec = RequestSpec::builder(message(1))
            .attachment(FileAttachment::from_handle("ok.txt", CountingHandle::new(&closes, b"x")))
            .attachment(FileAttachment::from_handle("bad.txt", CountingHandle::failing(&closes)))
            .build();

        let err = client(&transport).execute(spec).await.unwrap_err();

        assert!(matches!(err, Error::Attachment { ref name, .. } if name == "bad.txt"));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachments_closed_when_encoding_fails() {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedTransport::default());

        let err = client(&transport).execute(with_attachments(Route::endpoint(Endpoint::CreateMessage), &closes, 2)).await.unwrap_err();

        assert!(matches!(err, Error::Route { .. }));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_closes_attachments() {
        let closes = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedTransport::default());
        let client = client(&transport);
        client.limiter().global().close_for(Duration::from_secs(30));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = client.execute_with_cancel(with_attachments(message(1), &closes, 2), &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_close(Instant::now() - start, Duration::from_secs(1));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_global_closure() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client(&transport);
        let start = Instant::now();
        client.limiter().global().close_for(Duration::from_secs(2));

        let calls: Vec<_> = (0..8u64)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move { client.execute(RequestSpec::builder(message(i)).json_value(json!({"content": i})).build()).await })
            })
            .collect();

        for result in futures::future::join_all(calls).await {
            result.unwrap().unwrap();
        }

        let sent = transport.sent_at();
        assert_eq!(sent.len(), 8);
        for at in sent {
            assert_close(at - start, Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_modify_guild_member_sends_patch_with_reason() {
        let transport = Arc::new(ScriptedTransport::new([Ok(response(204, &[], ""))]));
        let changes = ModifyGuildMember { nick: rx_types::Field::Null, ..Default::default() };

        let payload = client(&transport).modify_guild_member(Snowflake(1), Snowflake(2), &changes, Some("rename")).await.unwrap();

        assert!(payload.is_empty());
        let (_, request) = &transport.sent.lock()[0];
        assert_eq!(request.method, reqwest::Method::PATCH);
        assert_eq!(request.path, "/guilds/1/members/2");
        assert_eq!(request.headers["x-audit-log-reason"], "rename");
        let RequestBody::Json(body) = &request.body else {
            panic!("expected json");
        };
        assert_eq!(serde_json::from_slice::<serde_json::Value>(body).unwrap(), json!({"nick": null}));
    }
}
