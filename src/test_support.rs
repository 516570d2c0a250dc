//! Shared fixtures for unit tests: a throwaway database and storage root,
//! a notifier that records instead of delivering, and a local HTTP endpoint
//! that captures webhook deliveries.

use crate::{
    db,
    models::{
        bucket::Bucket,
        resource::Resource,
        webhook::{ExtraHeaders, NotificationEvent, WebhookEventKind},
    },
    services::{
        bucket_repository::BucketRepository,
        content_store::ContentStore,
        dispatcher::{Notifier, WebhookDispatcher},
        resource_repository::ResourceRepository,
        resource_service::ResourceService,
        webhook_repository::WebhookRepository,
    },
};
use axum::{Router, body::Bytes, extract::State, http::HeaderMap, routing::post};
use chrono::Utc;
use futures::Stream;
use sqlx::SqlitePool;
use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::mpsc};
use uuid::Uuid;

pub struct TestEnv {
    _dir: TempDir,
    pub db: Arc<SqlitePool>,
    pub buckets: BucketRepository,
    pub resources: ResourceRepository,
    pub webhooks: WebhookRepository,
    pub store: ContentStore,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let pool = db::connect(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let db = Arc::new(pool);
        let store = ContentStore::new(dir.path().join("storage")).await.unwrap();

        Self {
            buckets: BucketRepository::new(db.clone()),
            resources: ResourceRepository::new(db.clone()),
            webhooks: WebhookRepository::new(db.clone()),
            store,
            db,
            _dir: dir,
        }
    }

    pub async fn bucket(&self, client_id: &str, name: &str, is_public: bool) -> Bucket {
        self.buckets.create(client_id, name, is_public).await.unwrap()
    }

    pub fn dispatcher(&self) -> WebhookDispatcher {
        WebhookDispatcher::new(self.webhooks.clone(), 4).unwrap()
    }

    pub fn service(&self, notifier: Arc<dyn Notifier>) -> ResourceService {
        ResourceService::new(
            self.buckets.clone(),
            self.resources.clone(),
            self.store.clone(),
            notifier,
            "",
        )
    }
}

/// Collects dispatched events in order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(NotificationEvent, ExtraHeaders)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(NotificationEvent, ExtraHeaders)> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn dispatch(&self, event: NotificationEvent, extra_headers: ExtraHeaders) {
        self.events.lock().unwrap().push((event, extra_headers));
    }
}

/// Owned byte stream split into small chunks, shaped like a request body.
pub fn bytes_stream(bytes: &[u8]) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let chunks: Vec<io::Result<Bytes>> = bytes
        .chunks(7 * 1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    futures::stream::iter(chunks)
}

pub fn sample_event(bucket: &Bucket, kind: WebhookEventKind) -> NotificationEvent {
    let resource = Resource {
        id: Uuid::new_v4(),
        bucket_id: bucket.id,
        hash: "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".into(),
        size_bytes: 4,
        content_type: "image/png".into(),
        extension: ".png".into(),
        created_at: Utc::now(),
    };
    let url = format!("/buckets/{}/resources/{}", bucket.id, resource.filename());
    NotificationEvent::new(kind, bucket, &resource, url)
}

pub struct Delivery {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Delivery {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Local HTTP endpoint that accepts any POST and hands it to the test.
pub struct WebhookReceiver {
    addr: std::net::SocketAddr,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
}

impl WebhookReceiver {
    pub async fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/hook", post(capture))
            .with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    pub async fn next(&self) -> Delivery {
        tokio::time::timeout(Duration::from_secs(5), self.rx.lock().await.recv())
            .await
            .expect("no webhook delivery within 5s")
            .expect("receiver closed")
    }

    /// A URL on a port nothing listens on.
    pub async fn unreachable_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/hook", addr)
    }
}

async fn capture(
    State(tx): State<mpsc::UnboundedSender<Delivery>>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    let _ = tx.send(Delivery { headers, body });
    "ok"
}
