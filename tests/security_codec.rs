use metricsync::domain::metric::{Metric, MetricKind};
use metricsync::infrastructure::security::{Decryptor, Encryptor, Envelope, Signer};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::{RsaPrivateKey, RsaPublicKey};

fn key_pair() -> (RsaPrivateKey, RsaPublicKey) {
    let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
    let public = RsaPublicKey::from(&private);
    (private, public)
}

fn many_metrics(n: usize) -> Vec<Metric> {
    (0..n)
        .map(|i| Metric::gauge(format!("CPUutilization{}", i + 1), i as f64 * 1.5))
        .collect()
}

#[test]
fn test_pem_files_round_trip_multi_chunk_batch() {
    let (private, public) = key_pair();
    let dir = tempfile::tempdir().unwrap();
    let private_path = dir.path().join("private.pem");
    let public_path = dir.path().join("public.pem");
    std::fs::write(&private_path, private.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    std::fs::write(&public_path, public.to_public_key_pem(LineEnding::LF).unwrap()).unwrap();

    let encryptor = Encryptor::from_file(Some(&public_path)).unwrap();
    let decryptor = Decryptor::from_file(Some(&private_path)).unwrap();
    let client = Envelope::new(Signer::new(Some("k")), encryptor, Decryptor::default());
    let server = Envelope::new(Signer::new(Some("k")), Encryptor::default(), decryptor);

    // Well past one 62-byte OAEP block
    let metrics = many_metrics(40);
    let sealed = client.seal_metrics(metrics.clone()).unwrap();
    let opened = server.open(&sealed, true).unwrap();
    let decoded: Vec<Metric> = serde_json::from_slice(&opened).unwrap();

    assert_eq!(decoded.len(), metrics.len());
    for (sent, received) in metrics.iter().zip(&decoded) {
        assert_eq!(sent.id, received.id);
        assert_eq!(sent.value, received.value);
        assert!(server.signer().verify(received));
    }
}

#[test]
fn test_pkcs1_pem_accepted() {
    let (private, public) = key_pair();
    let encryptor =
        Encryptor::from_pem(&public.to_pkcs1_pem(LineEnding::LF).unwrap()).unwrap();
    let decryptor =
        Decryptor::from_pem(&private.to_pkcs1_pem(LineEnding::LF).unwrap()).unwrap();

    let ciphertext = encryptor.encrypt(b"{\"id\":\"Alloc\"}").unwrap();
    assert_eq!(decryptor.decrypt(&ciphertext).unwrap(), b"{\"id\":\"Alloc\"}");
}

#[test]
fn test_wrong_private_key_fails() {
    let (_, public) = key_pair();
    let (other_private, _) = key_pair();

    let ciphertext = Encryptor::new(Some(public)).encrypt(b"payload").unwrap();
    assert!(Decryptor::new(Some(other_private)).decrypt(&ciphertext).is_err());
}

#[test]
fn test_empty_key_path_disables_encryption() {
    let encryptor = Encryptor::from_file(Some(std::path::Path::new(""))).unwrap();
    assert!(!encryptor.is_enabled());
    assert_eq!(encryptor.encrypt(b"plain").unwrap(), b"plain");

    assert!(Encryptor::from_file(Some(std::path::Path::new("/no/such/key.pem"))).is_err());
}

#[test]
fn test_tampered_metric_fails_verification() {
    let signer = Signer::new(Some("secret"));
    let mut metric = Metric::counter("PollCount", 10);
    signer.sign(&mut metric);
    assert!(signer.verify(&metric));

    metric.delta = Some(11);
    assert!(!signer.verify(&metric));

    let mut query = Metric::query("PollCount", MetricKind::Counter);
    query.hash = Some("zz-not-hex".into());
    assert!(!signer.verify(&query));
}
