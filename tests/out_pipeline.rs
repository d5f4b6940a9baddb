//! End-to-end behaviour of a run with in-memory registry and signer

mod common;

use async_trait::async_trait;
use registry_image_out::cli::Runner;
use registry_image_out::config::{ContentTrust, OutRequest};
use registry_image_out::digest::Digest;
use registry_image_out::error::{ImageError, OutError, RegistryError, SigningError};
use registry_image_out::image::{Blob, Image, TarballImage};
use registry_image_out::orchestrator::PushOrchestrator;
use registry_image_out::plan;
use registry_image_out::reference::Reference;
use registry_image_out::registry::{Credentials, Pusher, TransportPolicy};
use registry_image_out::trust::{PreparedTrust, Signer, TrustConfig, TrustSigner};
use std::path::Path;
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<String>>>;

struct FakeImage {
    manifest: Vec<u8>,
}

impl FakeImage {
    fn new() -> Self {
        Self {
            manifest: br#"{"schemaVersion":2}"#.to_vec(),
        }
    }
}

impl Image for FakeImage {
    fn digest(&self) -> Result<Digest, ImageError> {
        Ok(Digest::sha256(&self.manifest))
    }

    fn manifest_bytes(&self) -> Result<&[u8], ImageError> {
        Ok(&self.manifest)
    }

    fn manifest_media_type(&self) -> &str {
        "application/vnd.docker.distribution.manifest.v2+json"
    }

    fn blobs(&self) -> Vec<&Blob> {
        Vec::new()
    }
}

struct FakePusher {
    events: Events,
    policies: Mutex<Vec<TransportPolicy>>,
    digests: Mutex<Vec<Digest>>,
    fail_on: Option<String>,
}

impl FakePusher {
    fn new(events: Events, fail_on: Option<&str>) -> Self {
        Self {
            events,
            policies: Mutex::new(Vec::new()),
            digests: Mutex::new(Vec::new()),
            fail_on: fail_on.map(str::to_string),
        }
    }
}

#[async_trait]
impl Pusher for FakePusher {
    async fn push(
        &self,
        reference: &Reference,
        image: &dyn Image,
        _credentials: &Credentials,
        policy: TransportPolicy,
    ) -> Result<(), RegistryError> {
        self.events.lock().unwrap().push(format!("push {}", reference.identifier()));
        self.policies.lock().unwrap().push(policy);
        self.digests.lock().unwrap().push(image.digest()?);

        if self.fail_on.as_deref() == Some(reference.identifier().as_str()) {
            return Err(RegistryError::Status {
                operation: "manifest upload".to_string(),
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(())
    }
}

struct FakeSigner {
    events: Events,
    fail: bool,
}

#[async_trait]
impl Signer for FakeSigner {
    async fn sign(
        &self,
        reference: &Reference,
        _image: &dyn Image,
        _trust: &PreparedTrust,
    ) -> Result<(), SigningError> {
        self.events.lock().unwrap().push(format!("sign {}", reference.identifier()));
        if self.fail {
            return Err(SigningError::Notary {
                status: "exit status: 1".to_string(),
                stderr: "no key".to_string(),
            });
        }
        Ok(())
    }
}

fn trust_config(root: &Path) -> TrustConfig {
    TrustConfig {
        enabled: true,
        settings: ContentTrust {
            enable: true,
            server: "https://notary.example.com".to_string(),
            ..ContentTrust::default()
        },
        scratch_root: root.to_path_buf(),
        credentials: Credentials::default(),
    }
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn events(list: &[&str]) -> Vec<String> {
    tags(list)
}

#[tokio::test]
async fn test_tags_pushed_in_order_with_interleaved_signing() {
    let scratch = tempfile::tempdir().unwrap();
    let log = Events::default();
    let pusher = FakePusher::new(log.clone(), None);
    let signer = Arc::new(FakeSigner {
        events: log.clone(),
        fail: false,
    });
    let trust = TrustSigner::new(trust_config(scratch.path()), signer);

    let plan = plan::resolve("registry.example.com/ns/app", "1.0", &tags(&["v1", "latest", "stable"])).unwrap();
    let outcome = PushOrchestrator::new(&pusher, &trust)
        .run(&FakeImage::new(), &plan, &Credentials::default())
        .await
        .unwrap();

    assert_eq!(outcome.applied_tags, tags(&["v1", "latest", "stable"]));
    assert!(outcome.signing_failures.is_empty());
    assert_eq!(
        *log.lock().unwrap(),
        events(&[
            "push 1.0", "sign 1.0", "push v1", "sign v1", "push latest", "sign latest", "push stable",
            "sign stable",
        ])
    );
    assert_eq!(
        *pusher.policies.lock().unwrap(),
        vec![
            TransportPolicy::Retrying,
            TransportPolicy::Plain,
            TransportPolicy::Plain,
            TransportPolicy::Plain,
        ]
    );
}

#[tokio::test]
async fn test_primary_failure_stops_everything() {
    let scratch = tempfile::tempdir().unwrap();
    let log = Events::default();
    let pusher = FakePusher::new(log.clone(), Some("1.0"));
    let trust = TrustSigner::new(
        trust_config(scratch.path()),
        Arc::new(FakeSigner {
            events: log.clone(),
            fail: false,
        }),
    );

    let plan = plan::resolve("example.com/app", "1.0", &tags(&["v1", "v2"])).unwrap();
    let err = PushOrchestrator::new(&pusher, &trust)
        .run(&FakeImage::new(), &plan, &Credentials::default())
        .await
        .unwrap_err();

    assert!(matches!(err, OutError::Push { .. }));
    assert_eq!(*log.lock().unwrap(), events(&["push 1.0"]));
}

#[tokio::test]
async fn test_failed_tag_stops_remaining_tags() {
    let scratch = tempfile::tempdir().unwrap();
    let log = Events::default();
    let pusher = FakePusher::new(log.clone(), Some("b"));
    let trust = TrustSigner::new(
        trust_config(scratch.path()),
        Arc::new(FakeSigner {
            events: log.clone(),
            fail: false,
        }),
    );

    let plan = plan::resolve("example.com/app", "1.0", &tags(&["a", "b", "c"])).unwrap();
    let err = PushOrchestrator::new(&pusher, &trust)
        .run(&FakeImage::new(), &plan, &Credentials::default())
        .await
        .unwrap_err();

    match err {
        OutError::Tag { tag, reference, .. } => {
            assert_eq!(tag, "b");
            assert_eq!(reference.to_string(), "example.com/app:b");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        *log.lock().unwrap(),
        events(&["push 1.0", "sign 1.0", "push a", "sign a", "push b"])
    );
}

#[tokio::test]
async fn test_signing_failures_do_not_fail_the_run() {
    let scratch = tempfile::tempdir().unwrap();
    let log = Events::default();
    let pusher = FakePusher::new(log.clone(), None);
    let trust = TrustSigner::new(
        trust_config(scratch.path()),
        Arc::new(FakeSigner {
            events: log.clone(),
            fail: true,
        }),
    );

    let image = FakeImage::new();
    let plan = plan::resolve("example.com/app", "1.0", &tags(&["v1"])).unwrap();
    let outcome = PushOrchestrator::new(&pusher, &trust)
        .run(&image, &plan, &Credentials::default())
        .await
        .unwrap();

    assert_eq!(outcome.digest, image.digest().unwrap());
    assert_eq!(outcome.applied_tags, tags(&["v1"]));
    assert_eq!(outcome.signing_failures.len(), 2);
    assert_eq!(outcome.signing_failures[0].reference.to_string(), "example.com/app:1.0");
}

#[tokio::test]
async fn test_same_digest_for_every_reference() {
    let log = Events::default();
    let pusher = FakePusher::new(log, None);
    let trust = TrustSigner::new(
        TrustConfig::disabled(),
        Arc::new(FakeSigner {
            events: Events::default(),
            fail: false,
        }),
    );

    let image = FakeImage::new();
    let plan = plan::resolve("example.com/app", "1.0", &tags(&["a", "b", "c", "d"])).unwrap();
    let outcome = PushOrchestrator::new(&pusher, &trust)
        .run(&image, &plan, &Credentials::default())
        .await
        .unwrap();

    let digests = pusher.digests.lock().unwrap();
    assert_eq!(digests.len(), 5);
    assert!(digests.iter().all(|digest| *digest == outcome.digest));
}

fn runner(destination: &Path, log: &Events, pusher: Arc<FakePusher>) -> Runner {
    Runner::new(
        destination,
        pusher,
        Arc::new(FakeSigner {
            events: log.clone(),
            fail: false,
        }),
    )
}

#[tokio::test]
async fn test_full_run_from_request() {
    let destination = tempfile::tempdir().unwrap();
    let image_path = common::write_image_tarball(destination.path(), "image/image.tar");
    std::fs::write(destination.path().join("tags"), "v1\nstable\n").unwrap();

    let request = OutRequest::from_reader(
        br#"{
            "source": {
                "repository": "registry.example.com/ns/app",
                "tag": "1.0",
                "content_trust": {"enable": true, "server": "https://notary.example.com"}
            },
            "params": {"image": "image/image.tar", "additional_tags": "tags"}
        }"#
        .as_slice(),
    )
    .unwrap();

    let log = Events::default();
    let pusher = Arc::new(FakePusher::new(log.clone(), None));
    let result = runner(destination.path(), &log, pusher.clone())
        .run(&request)
        .await
        .unwrap();

    let expected = TarballImage::from_path(&image_path).unwrap().digest().unwrap();
    assert_eq!(result.version.digest, expected);
    assert_eq!(result.metadata_value("repository"), Some("registry.example.com/ns/app"));
    assert_eq!(result.metadata_value("tags"), Some("v1 stable 1.0"));
    assert_eq!(
        *log.lock().unwrap(),
        events(&["push 1.0", "sign 1.0", "push v1", "sign v1", "push stable", "sign stable"])
    );

    // the scratch notary config dir is gone once the run is over
    let leftovers: Vec<_> = std::fs::read_dir(destination.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("notary-config"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_missing_tag_file_fails_before_any_push() {
    let destination = tempfile::tempdir().unwrap();
    common::write_image_tarball(destination.path(), "image.tar");

    let request = OutRequest::from_reader(
        br#"{"source":{"repository":"example.com/app"},"params":{"image":"image.tar","additional_tags":"missing"}}"#
            .as_slice(),
    )
    .unwrap();

    let log = Events::default();
    let pusher = Arc::new(FakePusher::new(log.clone(), None));
    let err = runner(destination.path(), &log, pusher).run(&request).await.unwrap_err();

    assert!(matches!(err, OutError::TagParse(_)));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_tag_fails_before_any_push() {
    let destination = tempfile::tempdir().unwrap();
    common::write_image_tarball(destination.path(), "image.tar");

    let request = OutRequest::from_reader(
        br#"{"source":{"repository":"example.com/app"},"params":{"image":"image.tar","additional_tags":["ok","not ok"]}}"#
            .as_slice(),
    )
    .unwrap();

    let log = Events::default();
    let pusher = Arc::new(FakePusher::new(log.clone(), None));
    let err = runner(destination.path(), &log, pusher).run(&request).await.unwrap_err();

    assert!(matches!(err, OutError::ReferenceSyntax(_)));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_image_fails_before_any_push() {
    let destination = tempfile::tempdir().unwrap();
    let request = OutRequest::from_reader(
        br#"{"source":{"repository":"example.com/app"},"params":{"image":"nope.tar"}}"#.as_slice(),
    )
    .unwrap();

    let log = Events::default();
    let pusher = Arc::new(FakePusher::new(log.clone(), None));
    let err = runner(destination.path(), &log, pusher).run(&request).await.unwrap_err();

    assert!(matches!(err, OutError::ImageRead(_)));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_unknown_request_field_is_rejected() {
    let err = OutRequest::from_reader(
        br#"{"source":{"repository":"example.com/app","skip_tls":true},"params":{"image":"image.tar"}}"#.as_slice(),
    )
    .unwrap_err();
    assert!(matches!(err, OutError::RequestDecode(_)));
}
