//! Send/receive pipelines end to end against an in-memory store, plus
//! scripted backends for the failure paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use onetap_core::{Expiry, ExpiryUnit, ObjectId, OnetapError, OnetapResult, QuotaSnapshot};
use onetap_crypto::{encode_key, Cipher, SeededProvider, SymmetricKey};
use onetap_storage::{Backend, OperatorBackend};
use onetap_transfer::{
    CapabilityLink, Preview, ReceiveState, SendState, Stage, TransferOrchestrator,
    TransferOutcome, TransferSettings,
};
use opendal::Operator;
use tokio_util::sync::CancellationToken;

fn memory_backend(capacity: u64) -> OperatorBackend {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    OperatorBackend::new(op, capacity)
}

fn one_day() -> Expiry {
    Expiry::new(1, ExpiryUnit::Days).unwrap()
}

fn settings() -> TransferSettings {
    TransferSettings {
        quota_timeout: Duration::from_millis(200),
        upload_timeout: Duration::from_millis(200),
        fetch_timeout: Duration::from_millis(200),
        ..TransferSettings::default()
    }
}

fn uploaded_link(outcome: TransferOutcome) -> String {
    match outcome {
        TransferOutcome::Uploaded { link, .. } => link,
        other => panic!("expected upload, got {other:?}"),
    }
}

/// Backend with scripted answers that counts every call.
#[derive(Default)]
struct ScriptedBackend {
    available: u64,
    delay: Option<Duration>,
    usage_delay: Option<Duration>,
    stored: Mutex<Option<Vec<u8>>>,
    uploads: AtomicUsize,
    fetches: AtomicUsize,
    usages: AtomicUsize,
}

impl ScriptedBackend {
    fn roomy() -> Self {
        Self {
            available: u64::MAX,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
            + self.fetches.load(Ordering::SeqCst)
            + self.usages.load(Ordering::SeqCst)
    }

    async fn maybe_stall(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Backend for ScriptedBackend {
    async fn upload(&self, envelope: Vec<u8>, _expiry: Expiry) -> OnetapResult<ObjectId> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        *self.stored.lock().unwrap() = Some(envelope);
        ObjectId::new("scripted")
    }

    async fn fetch(&self, _id: &ObjectId) -> OnetapResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        self.stored
            .lock()
            .unwrap()
            .take()
            .ok_or(OnetapError::ObjectGone)
    }

    async fn usage(&self) -> OnetapResult<QuotaSnapshot> {
        self.usages.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.usage_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(QuotaSnapshot {
            available_bytes: self.available,
        })
    }
}

#[tokio::test]
async fn send_then_receive_roundtrip() {
    let orch = TransferOrchestrator::new(memory_backend(1 << 20), settings());
    let plaintext = b"quarterly numbers, do not forward".to_vec();

    let link = uploaded_link(orch.send("report.txt", &plaintext, one_day()).await);
    assert!(link.starts_with("https://onetap.app/view/"));
    assert!(link.contains("&filename=report.txt"));

    match orch.receive(&link).await {
        TransferOutcome::Downloaded {
            plaintext: got,
            filename,
            media_type,
        } => {
            assert_eq!(got, plaintext);
            assert_eq!(filename, "report.txt");
            assert_eq!(media_type.preview(), Preview::Text);
        }
        other => panic!("expected download, got {other:?}"),
    }
}

#[tokio::test]
async fn second_receive_reports_gone() {
    let orch = TransferOrchestrator::new(memory_backend(1 << 20), settings());
    let link = uploaded_link(orch.send("a.png", b"\x89PNG", one_day()).await);

    assert!(orch.receive(&link).await.is_success());
    let second = orch.receive(&link).await;
    assert!(matches!(second.error(), Some(OnetapError::ObjectGone)));
}

#[tokio::test]
async fn backend_only_sees_ciphertext() {
    let backend = Arc::new(ScriptedBackend::roomy());
    let orch = TransferOrchestrator::new(backend.clone(), settings());
    let plaintext = b"the secret sauce is mostly butter";

    uploaded_link(orch.send("recipe.txt", plaintext, one_day()).await);

    let stored = backend.stored.lock().unwrap().clone().unwrap();
    assert_eq!(stored.len(), 12 + plaintext.len() + 16);
    assert!(!stored.windows(6).any(|w| w == b"secret"));
}

#[tokio::test]
async fn seeded_cipher_makes_deterministic_links() {
    let make = || {
        TransferOrchestrator::with_cipher(
            ScriptedBackend::roomy(),
            Cipher::with_provider(SeededProvider::new(7)),
            settings(),
        )
    };
    let a = uploaded_link(make().send("x.bin", b"data", one_day()).await);
    let b = uploaded_link(make().send("x.bin", b"data", one_day()).await);
    assert_eq!(a, b);
}

#[tokio::test]
async fn quota_denied_before_upload() {
    let backend = Arc::new(ScriptedBackend {
        available: 10,
        ..Default::default()
    });
    let orch = TransferOrchestrator::new(backend.clone(), settings());

    let outcome = orch.send("big.txt", &[0u8; 64], one_day()).await;
    match outcome.error() {
        Some(OnetapError::QuotaExceeded {
            required,
            available,
        }) => {
            assert_eq!(*required, 64);
            assert_eq!(*available, 10);
        }
        other => panic!("expected quota error, got {other:?}"),
    }
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn quota_compares_file_size() {
    let backend = Arc::new(ScriptedBackend {
        available: 10,
        ..Default::default()
    });
    let orch = TransferOrchestrator::new(backend.clone(), settings());

    assert!(orch.send("ten.txt", &[7u8; 10], one_day()).await.is_success());
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);

    match orch.send("eleven.txt", &[7u8; 11], one_day()).await.error() {
        Some(OnetapError::QuotaExceeded {
            required: 11,
            available: 10,
        }) => {}
        other => panic!("expected quota error, got {other:?}"),
    }
}

#[tokio::test]
async fn file_too_large_rejected_without_network() {
    let backend = Arc::new(ScriptedBackend::roomy());
    let orch = TransferOrchestrator::new(
        backend.clone(),
        TransferSettings {
            max_file_bytes: 8,
            ..settings()
        },
    );

    let outcome = orch.send("nine.txt", b"123456789", one_day()).await;
    assert!(matches!(
        outcome.error(),
        Some(OnetapError::FileTooLarge { size: 9, limit: 8 })
    ));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn previewable_only_policy() {
    let backend = Arc::new(ScriptedBackend::roomy());
    let orch = TransferOrchestrator::new(
        backend.clone(),
        TransferSettings {
            previewable_only: true,
            ..settings()
        },
    );

    let outcome = orch.send("tool.exe", b"MZ", one_day()).await;
    assert!(matches!(outcome.error(), Some(OnetapError::NotPreviewable { .. })));
    assert_eq!(backend.calls(), 0);

    assert!(orch.send("photo.jpg", b"jpeg", one_day()).await.is_success());
}

#[tokio::test]
async fn malformed_links_never_touch_network() {
    let backend = Arc::new(ScriptedBackend::roomy());
    let orch = TransferOrchestrator::new(backend.clone(), settings());

    let cases = [
        "https://onetap.app/view/abc",
        "https://onetap.app/view/abc#filename=a.txt",
        "https://onetap.app/view/abc#key=not*base64",
        "https://onetap.app/view/abc#key=AAAA",
        "definitely not a link",
    ];
    for link in cases {
        let outcome = orch.receive(link).await;
        assert!(!outcome.is_success(), "{link}");
    }
    assert!(matches!(
        orch.receive(cases[0]).await.error(),
        Some(OnetapError::MissingKey)
    ));
    assert!(matches!(
        orch.receive(cases[3]).await.error(),
        Some(OnetapError::InvalidKeyLength { len: 3 })
    ));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn wrong_key_fails_authentication() {
    let orch = TransferOrchestrator::new(memory_backend(1 << 20), settings());
    let link = uploaded_link(orch.send("doc.pdf", b"%PDF-1.7", one_day()).await);

    let parsed = CapabilityLink::parse(&link).unwrap();
    let other = SymmetricKey::import_raw(&[9u8; 32]).unwrap();
    let forged = format!(
        "https://onetap.app/view/{}#key={}&filename=doc.pdf",
        parsed.object_id(),
        encode_key(&other)
    );

    let outcome = orch.receive(&forged).await;
    assert!(matches!(
        outcome.error(),
        Some(OnetapError::AuthenticationFailure)
    ));
}

#[tokio::test]
async fn stalled_upload_times_out() {
    let backend = ScriptedBackend {
        available: u64::MAX,
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let orch = TransferOrchestrator::new(backend, settings());

    let outcome = orch.send("slow.txt", b"zzz", one_day()).await;
    assert!(matches!(
        outcome.error(),
        Some(OnetapError::Timeout { stage: "upload" })
    ));
}

#[tokio::test]
async fn stalled_quota_check_times_out_before_upload() {
    let backend = Arc::new(ScriptedBackend {
        available: u64::MAX,
        usage_delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let orch = TransferOrchestrator::new(backend.clone(), settings());

    let outcome = orch.send("slow.txt", b"zzz", one_day()).await;
    assert!(matches!(
        outcome.error(),
        Some(OnetapError::Timeout {
            stage: "quota check"
        })
    ));
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stalled_fetch_times_out() {
    let backend = ScriptedBackend {
        available: u64::MAX,
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let orch = TransferOrchestrator::new(backend, settings());
    let link = format!(
        "https://onetap.app/view/abc#key={}",
        encode_key(&SymmetricKey::import_raw(&[2u8; 32]).unwrap())
    );

    let outcome = orch.receive(&link).await;
    assert!(matches!(
        outcome.error(),
        Some(OnetapError::Timeout { stage: "fetch" })
    ));
}

#[tokio::test]
async fn cancelled_receive_stops() {
    let backend = ScriptedBackend {
        available: u64::MAX,
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let orch = TransferOrchestrator::new(
        backend,
        TransferSettings {
            fetch_timeout: Duration::from_secs(60),
            ..settings()
        },
    );
    let link = format!(
        "https://onetap.app/view/abc#key={}",
        encode_key(&SymmetricKey::import_raw(&[1u8; 32]).unwrap())
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = orch.receive_with_cancel(&link, &cancel).await;
    assert!(matches!(outcome.error(), Some(OnetapError::Cancelled)));
}

#[tokio::test]
async fn observer_sees_ordered_stages() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let orch = TransferOrchestrator::new(memory_backend(1 << 20), settings())
        .with_observer(Box::new(move |stage| sink.lock().unwrap().push(stage)));

    let link = uploaded_link(orch.send("n.md", b"# hi", one_day()).await);
    assert!(orch.receive(&link).await.is_success());

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            Stage::Send(SendState::Idle),
            Stage::Send(SendState::QuotaChecking),
            Stage::Send(SendState::Encrypting),
            Stage::Send(SendState::Uploading),
            Stage::Send(SendState::LinkReady),
            Stage::Receive(ReceiveState::Idle),
            Stage::Receive(ReceiveState::Fetching),
            Stage::Receive(ReceiveState::Decrypting),
            Stage::Receive(ReceiveState::Ready),
        ]
    );
}

#[tokio::test]
async fn send_file_uses_file_name() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("notes.txt");
    std::fs::write(&path, b"from disk").unwrap();

    let orch = TransferOrchestrator::new(memory_backend(1 << 20), settings());
    let link = uploaded_link(
        orch.send_file(&path, one_day(), &CancellationToken::new())
            .await,
    );
    assert!(link.ends_with("&filename=notes.txt"));

    let dir = tmp.path().join("inbox");
    match orch.receive(&link).await {
        TransferOutcome::Downloaded {
            plaintext,
            filename,
            ..
        } => {
            let written = onetap_transfer::materialize(&dir, &filename, &plaintext)
                .await
                .unwrap();
            assert_eq!(std::fs::read(written).unwrap(), b"from disk");
        }
        other => panic!("expected download, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_transfers_share_one_orchestrator() {
    let orch = Arc::new(TransferOrchestrator::new(
        memory_backend(1 << 20),
        settings(),
    ));

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let orch = orch.clone();
        handles.push(tokio::spawn(async move {
            let body = vec![i; 100];
            let link = uploaded_link(orch.send(&format!("f{i}.bin"), &body, one_day()).await);
            match orch.receive(&link).await {
                TransferOutcome::Downloaded { plaintext, .. } => assert_eq!(plaintext, body),
                other => panic!("expected download, got {other:?}"),
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}
