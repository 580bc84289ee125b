//! End-to-end runs of the public pipeline API over an in-memory transport.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use wordtally_lib::{
    Extracted, Extractor, FetchFailure, HttpResponse, HttpTransport, Pipeline, PipelineConfig,
    RankedWord, WordBank, WordTallyError,
};

/// Serves canned pages; anything else is a 404. URLs under `/flaky/`
/// fail with a 503 on their first request.
#[derive(Default)]
struct MemoryTransport {
    pages: HashMap<String, String>,
    requests: AtomicUsize,
    flaky_seen: std::sync::Mutex<Vec<String>>,
}

impl MemoryTransport {
    fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), format!(r#"<div class="post-body">{}</div>"#, body));
        self
    }
}

impl HttpTransport for MemoryTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchFailure> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if url.contains("/flaky/") {
            let mut seen = self.flaky_seen.lock().unwrap();
            if !seen.iter().any(|u| u == url) {
                seen.push(url.to_string());
                return Ok(HttpResponse::status(503));
            }
        }

        match self.pages.get(url) {
            Some(page) => Ok(HttpResponse::ok(page.clone())),
            None => Ok(HttpResponse::status(404)),
        }
    }
}

struct SlowTransport;

impl HttpTransport for SlowTransport {
    async fn get(&self, _url: &str) -> Result<HttpResponse, FetchFailure> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(HttpResponse::ok("<p>never seen in time, far too late</p>"))
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_fetch_workers(8)
        .with_tokenize_workers(3)
        .with_batch_size(4)
        .with_top_n(5)
        .with_rate_limit(10_000)
        .with_retry(2, Duration::from_millis(1))
}

fn url(i: usize) -> String {
    format!("http://essays.test/{}", i)
}

#[tokio::test]
async fn test_every_url_is_accounted_for() {
    let mut transport = MemoryTransport::default();
    let mut urls = Vec::new();
    for i in 0..30 {
        urls.push(url(i));
        if i % 5 != 0 {
            transport = transport.with_page(&url(i), "alpha beta alpha");
        }
    }

    let pipeline = Pipeline::with_transport(test_config(), transport).unwrap();
    let bank = Arc::new(WordBank::from_words(["alpha", "beta"]));
    let report = pipeline.run(urls, bank, CancellationToken::new()).await;

    assert!(!report.cancelled);
    assert_eq!(report.total_documents, 24);
    assert_eq!(report.total_errors, 6);
    assert_eq!(report.total_documents + report.total_errors, 30);
    assert_eq!(
        report.top_words,
        vec![
            RankedWord { word: "alpha".into(), count: 48 },
            RankedWord { word: "beta".into(), count: 24 },
        ]
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let transport = MemoryTransport::default()
        .with_page("http://essays.test/flaky/1", "gamma")
        .with_page("http://essays.test/flaky/2", "gamma delta");
    let urls = vec![
        "http://essays.test/flaky/1".to_string(),
        "http://essays.test/flaky/2".to_string(),
    ];

    let pipeline = Pipeline::with_transport(test_config(), transport).unwrap();
    let bank = Arc::new(WordBank::from_words(["gamma", "delta"]));
    let report = pipeline.run(urls, bank, CancellationToken::new()).await;

    assert_eq!(report.total_documents, 2);
    assert_eq!(report.total_errors, 0);
    assert_eq!(report.top_words[0], RankedWord { word: "gamma".into(), count: 2 });
}

#[tokio::test]
async fn test_report_serialization_shape() {
    let transport = MemoryTransport::default().with_page(&url(0), "zeta zeta eta");
    let pipeline = Pipeline::with_transport(test_config(), transport).unwrap();
    let bank = Arc::new(WordBank::from_words(["zeta", "eta"]));

    let report = pipeline
        .run(vec![url(0), url(1)], bank, CancellationToken::new())
        .await;
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();

    let object = json.as_object().unwrap();
    assert_eq!(object.len(), 3);
    assert_eq!(json["total_essays"], 1);
    assert_eq!(json["top_words"][0]["word"], "zeta");
    assert_eq!(json["top_words"][0]["count"], 2);
    assert!(json["timestamp"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_returns_partial_report() {
    let config = test_config().with_timeout(Duration::from_secs(2));
    let pipeline = Pipeline::with_transport(config, SlowTransport).unwrap();

    let started = tokio::time::Instant::now();
    let report = pipeline
        .run(
            (0..20).map(url).collect(),
            Arc::new(WordBank::from_words(["never"])),
            CancellationToken::new(),
        )
        .await;

    assert!(report.cancelled);
    assert_eq!(report.total_documents, 0);
    assert!(report.top_words.is_empty());
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_custom_extractor() {
    struct WholeBody;

    impl Extractor for WholeBody {
        fn extract(&self, raw: &[u8]) -> Extracted {
            Extracted {
                title: "raw".to_string(),
                body: String::from_utf8_lossy(raw).into_owned(),
            }
        }
    }

    let mut transport = MemoryTransport::default();
    transport
        .pages
        .insert(url(0), "plain text with words and more words".to_string());

    let pipeline = Pipeline::with_transport(test_config(), transport)
        .unwrap()
        .with_extractor(Arc::new(WholeBody));
    let bank = Arc::new(WordBank::from_words(["words", "text"]));
    let report = pipeline
        .run(vec![url(0)], bank, CancellationToken::new())
        .await;

    assert_eq!(report.top_words[0], RankedWord { word: "words".into(), count: 2 });
    assert_eq!(report.top_words[1], RankedWord { word: "text".into(), count: 1 });
}

#[tokio::test]
async fn test_run_from_files() {
    let mut urls = NamedTempFile::new().unwrap();
    writeln!(urls, "# essays").unwrap();
    writeln!(urls, "{}", url(0)).unwrap();
    writeln!(urls).unwrap();
    writeln!(urls, "{}", url(1)).unwrap();
    urls.flush().unwrap();

    let mut words = NamedTempFile::new().unwrap();
    writeln!(words, "kappa\nlambda\nno").unwrap();
    words.flush().unwrap();

    let transport = MemoryTransport::default()
        .with_page(&url(0), "kappa lambda kappa")
        .with_page(&url(1), "lambda no no no");
    let config = test_config()
        .with_essays_file(urls.path().to_string_lossy())
        .with_word_bank_file(words.path().to_string_lossy());

    let pipeline = Pipeline::with_transport(config, transport).unwrap();
    let report = pipeline.run_from_files(CancellationToken::new()).await.unwrap();

    assert_eq!(report.total_documents, 2);
    assert_eq!(report.top_words.len(), 2);
    assert_eq!(report.top_words[0].count, 2);
}

#[tokio::test]
async fn test_missing_word_bank_counts_nothing() {
    let mut urls = NamedTempFile::new().unwrap();
    writeln!(urls, "{}", url(0)).unwrap();
    urls.flush().unwrap();

    let transport = MemoryTransport::default().with_page(&url(0), "words that will not count");
    let config = test_config()
        .with_essays_file(urls.path().to_string_lossy())
        .with_word_bank_file("definitely/not/here/words.txt");

    let pipeline = Pipeline::with_transport(config, transport).unwrap();
    let report = pipeline.run_from_files(CancellationToken::new()).await.unwrap();

    assert_eq!(report.total_documents, 1);
    assert!(report.top_words.is_empty());
}

#[tokio::test]
async fn test_missing_url_list_is_fatal() {
    let config = test_config().with_essays_file("definitely/not/here/urls");
    let pipeline = Pipeline::with_transport(config, MemoryTransport::default()).unwrap();

    let err = pipeline
        .run_from_files(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WordTallyError::FileError { .. }));
}
