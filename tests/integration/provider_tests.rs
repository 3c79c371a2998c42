/*!
 * Translation stage against a live HTTP provider
 */

use anyhow::Result;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use translate_relay::app_config::{Config, TranslationProvider, TranslationWorkerSettings};
use translate_relay::messaging::{QueueConfig, Topic, WorkQueue};
use translate_relay::providers::translator_from_config;
use translate_relay::storage::{MemoryStore, NotifyingStore, ObjectStore};
use translate_relay::worker::{BatchWorker, EventSourceRunner, EventSourceSettings, TranslationStage};

use crate::common;

/// Ollama stand-in answering 503 to any prompt containing "BAD"
struct GenerateServer {
    base_url: String,
    rejected: Arc<AtomicUsize>,
}

impl GenerateServer {
    async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let rejected = Arc::new(AtomicUsize::new(0));

        let counter = rejected.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let _ = answer(socket, counter).await;
                });
            }
        });

        Ok(Self { base_url, rejected })
    }

    fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

async fn answer(mut socket: TcpStream, rejected: Arc<AtomicUsize>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..read]);
        if request_complete(&request) {
            break;
        }
    }

    let text = String::from_utf8_lossy(&request);
    let response = if text.contains("BAD") {
        rejected.fetch_add(1, Ordering::SeqCst);
        http_response("503 Service Unavailable", "overloaded")
    } else {
        http_response(
            "200 OK",
            r#"{"model":"llama3","created_at":"now","response":"Dia dhuit","done":true}"#,
        )
    };
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= header_end + 4 + content_length
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

#[tokio::test]
async fn test_pollOnce_withRejectedUnits_shouldAcknowledgeWholeBatch() -> Result<()> {
    common::init_logging();
    let server = GenerateServer::start().await?;

    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Ollama;
    for provider in &mut config.translation.available_providers {
        if provider.provider_type == "ollama" {
            provider.endpoint = server.base_url.clone();
            provider.timeout_secs = 5;
        }
    }
    config.translation_queue.invocation_timeout_secs = 5;
    config.translation_queue.visibility_timeout_secs = 30;
    config.validate()?;

    let queue = Arc::new(WorkQueue::new("txt-created-queue", QueueConfig::default()));
    let topic = Arc::new(Topic::new("new-translation", "New translation"));
    topic.subscribe(queue.clone());

    let store = Arc::new(NotifyingStore::new(MemoryStore::new()));
    store.create_bucket("source").await?;
    store.create_bucket("results").await?;
    store.on_object_created("source", topic.clone());

    let stage = TranslationStage::new(
        store.clone(),
        translator_from_config(&config.translation),
        TranslationWorkerSettings::new("results", "ga")?,
    );
    let runner = EventSourceRunner::new(
        queue.clone(),
        BatchWorker::new(stage),
        EventSourceSettings {
            batch_size: 10,
            max_batching_window: Duration::from_millis(50),
            receive_wait_time: Duration::from_millis(200),
            invocation_timeout: config.translation_queue.invocation_timeout(),
        },
    );

    store.put("source", "good.txt", Bytes::from("Hello")).await?;
    for i in 1..=3 {
        store
            .put("source", &format!("bad-{}.txt", i), Bytes::from(format!("BAD {}", i)))
            .await?;
    }

    let report = runner
        .poll_once()
        .await
        .expect("a batch was available")?;

    assert_eq!(report.units, 4);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed, 3);
    // one request per failing unit, no in-process retries
    assert_eq!(server.rejected(), 3);

    let stats = queue.stats();
    assert_eq!(stats.deleted, 4);
    assert!(stats.is_drained());
    assert_eq!(
        common::read_text(&*store, "results", "translated_good.txt").await?,
        "Dia dhuit"
    );
    assert!(store.get("results", "translated_bad-1.txt").await.is_err());
    Ok(())
}
