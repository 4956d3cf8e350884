use flate2::Compression;
use flate2::write::GzEncoder;
use metricsync::application::collector::MetricService;
use metricsync::application::system::ShutdownSignal;
use metricsync::domain::metric::{Collection, Metric};
use metricsync::domain::ports::MetricsTransport;
use metricsync::infrastructure::persistence::MemoryStorage;
use metricsync::infrastructure::security::{Decryptor, Encryptor, Envelope, Signer, TrustedSubnet};
use metricsync::infrastructure::transport::{TransportClient, TransportKind, TransportSettings};
use metricsync::interfaces::http::{self, AppState, ErrorBody};
use rsa::rand_core::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct TestServer {
    addr: String,
    shutdown: ShutdownSignal,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(state: AppState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let shutdown = ShutdownSignal::new();
        let rx = shutdown.subscribe();
        let handle = tokio::spawn(async move {
            http::serve(listener, state, rx).await.unwrap();
        });
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap();
    }
}

fn state(key: Option<&str>, decryptor: Decryptor, subnet: Option<TrustedSubnet>) -> AppState {
    let signer = Signer::new(key);
    AppState {
        service: MetricService::new(Arc::new(MemoryStorage::new()), signer.clone()),
        envelope: Envelope::new(signer, Encryptor::default(), decryptor),
        trusted_subnet: subnet,
    }
}

async fn client(addr: &str, key: Option<&str>, encryptor: Encryptor) -> TransportClient {
    TransportClient::connect(
        TransportKind::Http,
        TransportSettings {
            address: addr.to_string(),
            signer: Signer::new(key),
            encryptor,
            request_timeout: Duration::from_secs(5),
        },
    )
    .await
    .unwrap()
}

fn batch(metrics: Vec<Metric>) -> Collection {
    metrics.into_iter().map(|m| (m.id.clone(), m)).collect()
}

#[tokio::test]
async fn test_signed_encrypted_batch_round_trip() {
    let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
    let public = RsaPublicKey::from(&private);

    let server = TestServer::start(state(
        Some("secret"),
        Decryptor::new(Some(private)),
        None,
    ))
    .await;
    let agent = client(&server.addr, Some("secret"), Encryptor::new(Some(public))).await;

    agent
        .batch_update_metrics(batch(vec![
            Metric::counter("PollCount", 3),
            Metric::gauge("Alloc", 1.5),
        ]))
        .await
        .unwrap();
    agent
        .update_metric(Metric::counter("PollCount", 2))
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .post(server.url("/value"))
        .header("Content-Type", "application/json")
        .body(r#"{"id":"PollCount","type":"counter"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let fetched: Metric = response.json().await.unwrap();
    assert_eq!(fetched.delta, Some(5));
    assert!(Signer::new(Some("secret")).verify(&fetched));

    server.stop().await;
}

#[tokio::test]
async fn test_wrong_key_rejects_batch() {
    let server = TestServer::start(state(Some("secret"), Decryptor::default(), None)).await;
    let agent = client(&server.addr, Some("not-the-secret"), Encryptor::default()).await;

    let result = agent
        .batch_update_metrics(batch(vec![Metric::gauge("Alloc", 1.0)]))
        .await;
    assert!(result.is_err());

    let response = reqwest::get(server.url("/value/gauge/Alloc")).await.unwrap();
    assert_eq!(response.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn test_gzip_json_without_keys() {
    let server = TestServer::start(state(None, Decryptor::default(), None)).await;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(br#"[{"id":"Alloc","type":"gauge","value":3.25},{"id":"PollCount","type":"counter","delta":4}]"#)
        .unwrap();
    let body = encoder.finish().unwrap();

    let response = reqwest::Client::new()
        .post(server.url("/updates"))
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let value = reqwest::get(server.url("/value/gauge/Alloc"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(value, "3.25");

    let listing = reqwest::get(server.url("/")).await.unwrap().text().await.unwrap();
    assert!(listing.contains("Alloc"));
    assert!(listing.contains("PollCount"));

    server.stop().await;
}

#[tokio::test]
async fn test_batch_with_unknown_type_is_rejected_whole() {
    let server = TestServer::start(state(None, Decryptor::default(), None)).await;

    let response = reqwest::Client::new()
        .post(server.url("/updates"))
        .header("Content-Type", "application/json")
        .body(r#"[{"id":"Alloc","type":"gauge","value":1},{"id":"x","type":"histogram","value":1}]"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 501);
    let body: ErrorBody = response.json().await.unwrap();
    assert!(body.message.contains("Invalid metric type"));

    let response = reqwest::get(server.url("/value/gauge/Alloc")).await.unwrap();
    assert_eq!(response.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn test_trusted_subnet_gates_agents() {
    let loopback: TrustedSubnet = "127.0.0.0/8".parse().unwrap();
    let server = TestServer::start(state(None, Decryptor::default(), Some(loopback))).await;

    let agent = client(&server.addr, None, Encryptor::default()).await;
    agent
        .update_metric(Metric::gauge("Alloc", 1.0))
        .await
        .unwrap();

    let anonymous = reqwest::get(server.url("/ping")).await.unwrap();
    assert_eq!(anonymous.status(), 403);
    server.stop().await;

    let elsewhere: TrustedSubnet = "10.0.0.0/8".parse().unwrap();
    let server = TestServer::start(state(None, Decryptor::default(), Some(elsewhere))).await;
    let agent = client(&server.addr, None, Encryptor::default()).await;
    assert!(agent.update_metric(Metric::gauge("Alloc", 1.0)).await.is_err());
    server.stop().await;
}

#[tokio::test]
async fn test_ping() {
    let server = TestServer::start(state(None, Decryptor::default(), None)).await;
    let response = reqwest::get(server.url("/ping")).await.unwrap();
    assert_eq!(response.status(), 200);
    server.stop().await;
}
