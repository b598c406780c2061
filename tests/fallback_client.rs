use dirdoc::client::{FallbackClient, FallbackTier, GenerateError, RetryPolicy};
use dirdoc::contract::{collect_stream, single_chunk_stream, MockGenerationClient, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn policy(retries_per_tier: u32) -> RetryPolicy {
    RetryPolicy {
        retries_per_tier,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(10),
    }
}

fn tier(name: &str, mock: MockGenerationClient) -> FallbackTier {
    FallbackTier::new(name, Arc::new(mock))
}

#[tokio::test(start_paused = true)]
async fn fails_over_after_exhausting_first_tier() {
    let mut a = MockGenerationClient::new();
    a.expect_generate()
        .times(2)
        .returning(|_| Err(ProviderError::other("a is down")));
    let mut b = MockGenerationClient::new();
    b.expect_generate()
        .times(1)
        .returning(|_| Ok("from b".to_string()));

    let client = FallbackClient::new(vec![tier("a", a), tier("b", b)], policy(1));
    let generation = client
        .generate("prompt", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generation.text, "from b");
    assert_eq!(generation.tier, "b");
    assert_eq!(generation.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_retries() {
    let mut a = MockGenerationClient::new();
    a.expect_generate()
        .times(2)
        .returning(|_| Err(ProviderError::RateLimited { message: "slow down".into() }));

    let client = FallbackClient::new(vec![tier("a", a)], policy(2));
    let cancel = CancellationToken::new();

    // First backoff ends by 120ms; the second cannot end before 240ms.
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let err = client.generate("prompt", &cancel).await.unwrap_err();
    assert!(err.is_cancelled(), "expected cancellation, got {err}");
    assert_eq!(err.code(), "cancelled");
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_prevents_any_call() {
    let mut a = MockGenerationClient::new();
    a.expect_generate().never();

    let client = FallbackClient::new(vec![tier("a", a)], policy(2));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.generate("prompt", &cancel).await.unwrap_err();
    assert!(matches!(err, GenerateError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_reports_last_tier_and_attempts() {
    let mut a = MockGenerationClient::new();
    a.expect_generate()
        .times(2)
        .returning(|_| Err(ProviderError::other("a is down")));
    let mut b = MockGenerationClient::new();
    b.expect_generate()
        .times(2)
        .returning(|_| Err(ProviderError::other("b is down")));

    let client = FallbackClient::new(vec![tier("a", a), tier("b", b)], policy(1));
    let err = client
        .generate("prompt", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        GenerateError::Exhausted {
            tier,
            attempts,
            source,
        } => {
            assert_eq!(tier, "b");
            assert_eq!(attempts, 2);
            assert_eq!(source.to_string(), "b is down");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn permanent_error_skips_remaining_retries() {
    let mut a = MockGenerationClient::new();
    a.expect_generate()
        .times(1)
        .returning(|_| Err(ProviderError::Auth { message: "bad key".into() }));
    let mut b = MockGenerationClient::new();
    b.expect_generate()
        .times(1)
        .returning(|_| Ok("from b".to_string()));

    let client = FallbackClient::new(vec![tier("a", a), tier("b", b)], policy(3));
    let generation = client
        .generate("prompt", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(generation.tier, "b");
    assert_eq!(generation.attempts, 2);
}

#[tokio::test]
async fn no_tiers_is_its_own_error() {
    let client = FallbackClient::new(Vec::new(), RetryPolicy::default());
    let err = client
        .generate("prompt", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "no_tiers");
}

#[tokio::test]
async fn token_count_tries_each_tier_once() {
    let mut a = MockGenerationClient::new();
    a.expect_count_tokens()
        .times(1)
        .returning(|_| Err(ProviderError::Unsupported("count_tokens".into())));
    let mut b = MockGenerationClient::new();
    b.expect_count_tokens().times(1).returning(|_| Ok(42));

    let client = FallbackClient::new(vec![tier("a", a), tier("b", b)], policy(5));
    let count = client
        .count_tokens("some text", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(count, 42);
}

#[tokio::test]
async fn stream_uses_first_tier_that_accepts() {
    let mut a = MockGenerationClient::new();
    a.expect_stream()
        .times(1)
        .returning(|_| Err(ProviderError::other("no stream")));
    let mut b = MockGenerationClient::new();
    b.expect_stream()
        .times(1)
        .returning(|prompt| Ok(single_chunk_stream(format!("echo: {prompt}"))));

    let client = FallbackClient::new(vec![tier("a", a), tier("b", b)], policy(5));
    let rx = client
        .stream("hello", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(collect_stream(rx).await.unwrap(), "echo: hello");
}

#[tokio::test]
async fn stream_failure_on_every_tier_is_exhaustion() {
    let mut a = MockGenerationClient::new();
    a.expect_stream()
        .times(1)
        .returning(|_| Err(ProviderError::other("no stream")));

    let client = FallbackClient::new(vec![tier("a", a)], policy(5));
    let err = client
        .stream("hello", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "generation_exhausted");
}

#[tokio::test]
async fn close_reaches_every_tier_despite_failures() {
    let mut a = MockGenerationClient::new();
    a.expect_close()
        .times(1)
        .returning(|| Err(ProviderError::other("close failed")));
    let mut b = MockGenerationClient::new();
    b.expect_close().times(1).returning(|| Ok(()));

    let client = FallbackClient::new(vec![tier("a", a), tier("b", b)], policy(0));
    let err = client.close().await.unwrap_err();

    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, "a");
}

/// A tier whose calls hang for a minute before answering.
struct SlowClient;

#[async_trait::async_trait]
impl dirdoc::contract::GenerationClient for SlowClient {
    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("too late".to_string())
    }

    async fn count_tokens(&self, _text: &str) -> Result<usize, ProviderError> {
        Ok(0)
    }

    async fn stream(&self, prompt: &str) -> Result<dirdoc::contract::ChunkReceiver, ProviderError> {
        Ok(single_chunk_stream(self.generate(prompt).await?))
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_an_in_flight_call() {
    let client = FallbackClient::new(vec![FallbackTier::new("slow", Arc::new(SlowClient))], policy(2));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = client.generate("prompt", &cancel).await.unwrap_err();

    assert!(err.is_cancelled(), "expected cancellation, got {err}");
    assert!(
        started.elapsed() < Duration::from_secs(60),
        "call was not interrupted: {:?}",
        started.elapsed()
    );
}
