//! Multi-backend router
//!
//! Builds the routing context, runs it through the strategy chain, and
//! executes the resulting selection through the resilient executor against
//! the matching backend. Supports single-shot calls with a fallback chain,
//! fire-and-forget shadow execution, consensus fan-out, and streaming
//! through the transformer chain.

use crate::backend::Backend;
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::{HedgedCall, HedgingExecutor, ResilientExecutor};
use crate::routing::{RoutingContext, RoutingStrategyChain};
use crate::stream::StreamTransformerChain;
use crate::types::{ChatRequest, ChatResponse, TokenStream};
use std::sync::Arc;
use std::time::Instant;

/// Routes chat requests to the optimal backend
pub struct MultiBackendRouter {
    backends: Vec<Arc<dyn Backend>>,
    strategy_chain: RoutingStrategyChain,
    stream_chain: StreamTransformerChain,
    executor: Arc<ResilientExecutor>,
    hedging: HedgingExecutor,
}

impl MultiBackendRouter {
    pub fn new(
        backends: Vec<Arc<dyn Backend>>,
        strategy_chain: RoutingStrategyChain,
        stream_chain: StreamTransformerChain,
        executor: Arc<ResilientExecutor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            backends,
            strategy_chain,
            stream_chain,
            executor,
            hedging: HedgingExecutor::new(),
        })
    }

    /// The resilient executor backing this router
    pub fn executor(&self) -> Arc<ResilientExecutor> {
        self.executor.clone()
    }

    /// Route a request to a single backend and return its response
    ///
    /// When the request names a shadow model, the shadow call is dispatched
    /// on a detached task first; its outcome is logged and discarded and can
    /// never delay or fail the primary response.
    pub async fn route(self: &Arc<Self>, request: ChatRequest) -> GatewayResult<ChatResponse> {
        if let Some(shadow_model) = request.shadow_model.clone() {
            self.dispatch_shadow(&request, &shadow_model);
        }
        self.dispatch(request).await
    }

    /// Query every candidate model concurrently and return all successes
    ///
    /// Used by consensus/voting logic layered above the router. Candidates
    /// without an available backend are skipped.
    pub async fn route_consensus(
        self: &Arc<Self>,
        request: &ChatRequest,
        candidate_models: &[String],
    ) -> Vec<ChatResponse> {
        let calls = self.candidate_calls(request, candidate_models);
        self.hedging.collect("consensus", calls).await
    }

    /// Race every candidate model and return the first success
    pub async fn route_hedged(
        self: &Arc<Self>,
        request: &ChatRequest,
        candidate_models: &[String],
    ) -> GatewayResult<ChatResponse> {
        let calls = self.candidate_calls(request, candidate_models);
        self.hedging.race("hedged-route", calls).await
    }

    /// Route a streaming request through the transformer chain
    ///
    /// The backend's raw token stream is wrapped by the stream processing
    /// chain (restoration, then guardrails) before it reaches the caller.
    pub async fn route_stream(&self, request: ChatRequest) -> GatewayResult<TokenStream> {
        let context = self.strategy_chain.apply(RoutingContext::from_request(request));
        let model = context.selected_model().to_string();
        tracing::debug!(model = %model, reason = ?context.routing_reason(), "streaming routing decision");
        let request = context.into_request();

        let raw = self.open_stream(&request, &model).await?;
        Ok(self.stream_chain.process(raw))
    }

    async fn dispatch(&self, request: ChatRequest) -> GatewayResult<ChatResponse> {
        let context = self.strategy_chain.apply(RoutingContext::from_request(request));
        let model = context.selected_model().to_string();
        tracing::debug!(model = %model, reason = ?context.routing_reason(), "routing decision");
        let request = context.into_request();

        let direct = self
            .find_backend_for(&model)
            .filter(|b| b.is_available());

        let Some(backend) = direct else {
            return self.fallback_chain(&request, &model, None).await;
        };

        let name = backend.name().to_string();
        let started = Instant::now();
        tracing::info!(backend = %name, model = %model, "routing to direct backend");

        let call_backend = backend.clone();
        let call_request = request.clone();
        let result = self
            .executor
            .execute(
                &name,
                || {
                    let backend = call_backend.clone();
                    let request = call_request.clone();
                    async move { backend.call(&request).await }
                },
                |error| {
                    tracing::warn!(backend = %name, %error, "direct backend failed, entering fallback chain");
                    self.fallback_chain(&request, &model, Some(backend.name()))
                },
            )
            .await;

        result.map(|mut response| {
            response.route.get_or_insert(name);
            response.latency_ms = Some(started.elapsed().as_millis() as u64);
            response
        })
    }

    /// Try every other available backend with its equivalent model
    async fn fallback_chain(
        &self,
        request: &ChatRequest,
        requested_model: &str,
        exclude: Option<&str>,
    ) -> GatewayResult<ChatResponse> {
        let mut attempted: Vec<String> = exclude.map(String::from).into_iter().collect();
        let mut tried_any = false;

        for backend in &self.backends {
            if Some(backend.name()) == exclude || !backend.is_available() {
                continue;
            }
            tried_any = true;

            let equivalent = backend.equivalent_model(requested_model);
            let fallback_request = request.with_model(&equivalent);
            let name = backend.name().to_string();
            attempted.push(name.clone());
            tracing::info!(
                backend = %name,
                model = %equivalent,
                original = requested_model,
                "routing to fallback backend"
            );

            let call_backend = backend.clone();
            let result = self
                .executor
                .execute(
                    &name,
                    || {
                        let backend = call_backend.clone();
                        let request = fallback_request.clone();
                        async move { backend.call(&request).await }
                    },
                    |error| async move { Err(error) },
                )
                .await;

            match result {
                Ok(mut response) => {
                    response.route = Some(format!("{name}-fallback"));
                    return Ok(response);
                }
                Err(error) => {
                    tracing::warn!(backend = %name, %error, "fallback backend failed");
                }
            }
        }

        if !tried_any && exclude.is_none() {
            return Err(GatewayError::NoBackendAvailable {
                model: requested_model.to_string(),
            });
        }
        Err(GatewayError::AllBackendsFailed { attempted })
    }

    /// Fire-and-forget shadow execution; never touches the primary path
    fn dispatch_shadow(self: &Arc<Self>, request: &ChatRequest, shadow_model: &str) {
        let router = Arc::clone(self);
        let mut shadow_request = request.with_model(shadow_model);
        shadow_request.shadow_model = None;
        shadow_request.stream = false;
        let shadow_model = shadow_model.to_string();

        tokio::spawn(async move {
            tracing::info!(model = %shadow_model, "dispatching shadow request");
            let started = Instant::now();
            match router.dispatch(shadow_request).await {
                Ok(response) => {
                    tracing::info!(
                        model = %shadow_model,
                        latency_ms = started.elapsed().as_millis() as u64,
                        total_tokens = response.usage.map(|u| u.total_tokens),
                        "shadow result recorded and discarded"
                    );
                }
                Err(error) => {
                    tracing::warn!(model = %shadow_model, %error, "shadow request failed");
                }
            }
        });
    }

    fn candidate_calls(
        self: &Arc<Self>,
        request: &ChatRequest,
        candidate_models: &[String],
    ) -> Vec<HedgedCall<ChatResponse>> {
        candidate_models
            .iter()
            .filter_map(|model| {
                let backend = self.find_backend_for(model).filter(|b| b.is_available());
                let Some(backend) = backend else {
                    tracing::warn!(model = %model, "no available backend for candidate, skipping");
                    return None;
                };
                let executor = self.executor.clone();
                let name = backend.name().to_string();
                let candidate_request = request.with_model(model);

                let call: HedgedCall<ChatResponse> = Box::pin(async move {
                    executor
                        .execute(
                            &name,
                            || {
                                let backend = backend.clone();
                                let request = candidate_request.clone();
                                async move { backend.call(&request).await }
                            },
                            |error| async move { Err(error) },
                        )
                        .await
                });
                Some(call)
            })
            .collect()
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
        model: &str,
    ) -> GatewayResult<TokenStream> {
        let direct = self.find_backend_for(model).filter(|b| b.is_available());

        let exclude = match direct {
            Some(backend) => {
                tracing::info!(backend = backend.name(), model = %model, "streaming from direct backend");
                match backend.call_stream(request).await {
                    Ok(stream) => return Ok(stream),
                    Err(error) => {
                        tracing::warn!(
                            backend = backend.name(),
                            %error,
                            "direct streaming failed, trying fallbacks"
                        );
                        Some(backend.name().to_string())
                    }
                }
            }
            None => None,
        };

        let mut attempted: Vec<String> = exclude.clone().into_iter().collect();
        for backend in &self.backends {
            if Some(backend.name()) == exclude.as_deref() || !backend.is_available() {
                continue;
            }
            let equivalent = backend.equivalent_model(model);
            let fallback_request = request.with_model(&equivalent);
            attempted.push(backend.name().to_string());

            match backend.call_stream(&fallback_request).await {
                Ok(stream) => return Ok(stream),
                Err(error) => {
                    tracing::warn!(backend = backend.name(), %error, "fallback streaming failed");
                }
            }
        }

        if attempted.is_empty() {
            return Err(GatewayError::NoBackendAvailable {
                model: model.to_string(),
            });
        }
        Err(GatewayError::AllBackendsFailed { attempted })
    }

    fn find_backend_for(&self, model: &str) -> Option<Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.supports_model(model))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::resilience::{BreakerConfig, RateLimitConfig, RetryConfig};
    use crate::types::ChatMessage;
    use std::time::Duration;

    fn executor() -> Arc<ResilientExecutor> {
        Arc::new(ResilientExecutor::new(
            BreakerConfig::default(),
            RetryConfig {
                max_attempts: 1,
                ..Default::default()
            },
            RateLimitConfig::default(),
        ))
    }

    fn router(backends: Vec<Arc<dyn Backend>>) -> Arc<MultiBackendRouter> {
        MultiBackendRouter::new(
            backends,
            RoutingStrategyChain::empty(),
            StreamTransformerChain::empty(),
            executor(),
        )
    }

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4", vec![ChatMessage::user("hello")])
    }

    fn healthy_backend(
        name: &'static str,
        models: &'static [&'static str],
        reply: &'static str,
    ) -> Arc<dyn Backend> {
        let mut backend = MockBackend::new();
        backend.expect_name().return_const(name.to_string());
        backend.expect_is_available().return_const(true);
        backend
            .expect_supports_model()
            .returning(move |m| models.contains(&m));
        backend
            .expect_equivalent_model()
            .returning(move |_| models[0].to_string());
        backend
            .expect_call()
            .returning(move |req| Ok(ChatResponse::new(req.model.clone(), reply)));
        Arc::new(backend)
    }

    fn failing_backend(
        name: &'static str,
        models: &'static [&'static str],
    ) -> Arc<dyn Backend> {
        let mut backend = MockBackend::new();
        backend.expect_name().return_const(name.to_string());
        backend.expect_is_available().return_const(true);
        backend
            .expect_supports_model()
            .returning(move |m| models.contains(&m));
        backend
            .expect_equivalent_model()
            .returning(move |_| models[0].to_string());
        backend
            .expect_call()
            .returning(move |_| Err(GatewayError::backend(name, "503 unavailable")));
        Arc::new(backend)
    }

    #[tokio::test]
    async fn test_routes_to_direct_backend() {
        let router = router(vec![healthy_backend("openai", &["gpt-4"], "hi there")]);

        let response = router.route(request()).await.unwrap();
        assert_eq!(response.content, "hi there");
        assert_eq!(response.route.as_deref(), Some("openai"));
        assert!(response.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_falls_back_when_direct_fails() {
        let router = router(vec![
            failing_backend("openai", &["gpt-4"]),
            healthy_backend("anthropic", &["claude-3-opus"], "fallback reply"),
        ]);

        let response = router.route(request()).await.unwrap();
        assert_eq!(response.content, "fallback reply");
        assert_eq!(response.route.as_deref(), Some("anthropic-fallback"));
        // The fallback received anthropic's equivalent model
        assert_eq!(response.model, "claude-3-opus");
    }

    #[tokio::test]
    async fn test_all_backends_failed_names_everyone() {
        let router = router(vec![
            failing_backend("openai", &["gpt-4"]),
            failing_backend("anthropic", &["claude-3-opus"]),
        ]);

        let error = router.route(request()).await.unwrap_err();
        match error {
            GatewayError::AllBackendsFailed { attempted } => {
                assert!(attempted.contains(&"openai".to_string()));
                assert!(attempted.contains(&"anthropic".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_backend_available() {
        let router = router(vec![]);
        let error = router.route(request()).await.unwrap_err();
        assert!(matches!(error, GatewayError::NoBackendAvailable { .. }));
    }

    #[tokio::test]
    async fn test_consensus_collects_successes() {
        let router = router(vec![
            healthy_backend("openai", &["gpt-4"], "vote a"),
            failing_backend("anthropic", &["claude-3-opus"]),
            healthy_backend("google", &["gemini-pro"], "vote b"),
        ]);

        let candidates = vec![
            "gpt-4".to_string(),
            "claude-3-opus".to_string(),
            "gemini-pro".to_string(),
        ];
        let responses = router.route_consensus(&request(), &candidates).await;

        let mut contents: Vec<_> = responses.iter().map(|r| r.content.clone()).collect();
        contents.sort();
        assert_eq!(contents, vec!["vote a", "vote b"]);
    }

    #[tokio::test]
    async fn test_hedged_route_returns_first_success() {
        let router = router(vec![
            failing_backend("openai", &["gpt-4"]),
            healthy_backend("google", &["gemini-pro"], "winner"),
        ]);

        let candidates = vec!["gpt-4".to_string(), "gemini-pro".to_string()];
        let response = router.route_hedged(&request(), &candidates).await.unwrap();
        assert_eq!(response.content, "winner");
    }

    #[tokio::test]
    async fn test_shadow_never_delays_primary() {
        let mut shadow_backend = MockBackend::new();
        shadow_backend
            .expect_name()
            .return_const("shadow-b".to_string());
        shadow_backend.expect_is_available().return_const(true);
        shadow_backend
            .expect_supports_model()
            .returning(|m| m == "shadow-model");
        shadow_backend
            .expect_equivalent_model()
            .returning(|_| "shadow-model".to_string());
        shadow_backend.expect_call().returning(|req| {
            let model = req.model.clone();
            // Deliberately slow shadow target
            std::thread::sleep(Duration::from_millis(5));
            Ok(ChatResponse::new(model, "slow shadow"))
        });

        let router = router(vec![
            healthy_backend("openai", &["gpt-4"], "fast primary"),
            Arc::new(shadow_backend),
        ]);

        let mut shadowed = request();
        shadowed.shadow_model = Some("shadow-model".to_string());

        let started = Instant::now();
        let response = router.route(shadowed).await.unwrap();
        assert_eq!(response.content, "fast primary");
        // Primary returned without waiting out the shadow's sleep budget
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_route_stream_passes_through_chain() {
        use crate::types::StreamChunk;
        use futures::StreamExt;

        let mut backend = MockBackend::new();
        backend.expect_name().return_const("openai".to_string());
        backend.expect_is_available().return_const(true);
        backend.expect_supports_model().returning(|m| m == "gpt-4");
        backend
            .expect_equivalent_model()
            .returning(|_| "gpt-4".to_string());
        backend.expect_call_stream().returning(|_| {
            let chunks = vec![
                Ok(StreamChunk::content("hello ")),
                Ok(StreamChunk::content("world")),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)) as TokenStream)
        });

        let router = router(vec![Arc::new(backend)]);
        let mut stream = router.route_stream(request()).await.unwrap();

        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            if let Some(content) = chunk.unwrap().content {
                out.push_str(&content);
            }
        }
        assert_eq!(out, "hello world");
    }
}
