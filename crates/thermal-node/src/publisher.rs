//! Outbound path: a bounded hand-off queue drained by a zenoh publisher.
//!
//! The capture loop never waits on delivery. It pushes into a queue of
//! [`QUEUE_DEPTH`] messages with `try_send`; a separate task encodes each
//! message as CDR and puts it on the `thermal/image_raw` key expression.

use crate::msg::Image;
use thiserror::Error;
use tokio::sync::mpsc;

/// Key expression the images are published on.
pub const TOPIC: &str = "thermal/image_raw";

/// Delivery queue depth between the capture loop and the publisher task.
pub const QUEUE_DEPTH: usize = 10;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish queue full, dropping image")]
    QueueFull,
    #[error("publisher closed")]
    Closed,
    #[error("CDR encoding failed: {0}")]
    Encode(#[from] cdr::Error),
    #[error("zenoh: {0}")]
    Zenoh(String),
}

/// Destination for outgoing images. Must not block.
pub trait ImageSink {
    fn publish(&self, image: Image) -> Result<(), PublishError>;
}

/// Sending half of the bounded publish queue.
#[derive(Clone)]
pub struct QueueSink {
    tx: mpsc::Sender<Image>,
}

/// Create a publish queue holding at most `depth` undelivered images.
pub fn queue(depth: usize) -> (QueueSink, mpsc::Receiver<Image>) {
    let (tx, rx) = mpsc::channel(depth);
    (QueueSink { tx }, rx)
}

impl ImageSink for QueueSink {
    fn publish(&self, image: Image) -> Result<(), PublishError> {
        self.tx.try_send(image).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

/// Open a zenoh session with the default configuration.
pub async fn connect() -> Result<zenoh::Session, PublishError> {
    zenoh::open(zenoh::Config::default())
        .await
        .map_err(|e| PublishError::Zenoh(e.to_string()))
}

/// Drain `queue` onto `topic` until every sender is dropped.
///
/// Per-message failures are logged and skipped; only failing to declare the
/// publisher ends the task early.
pub async fn run(
    session: zenoh::Session,
    topic: &'static str,
    mut queue: mpsc::Receiver<Image>,
) -> Result<u64, PublishError> {
    let publisher = session
        .declare_publisher(topic)
        .await
        .map_err(|e| PublishError::Zenoh(e.to_string()))?;
    tracing::info!(topic, depth = QUEUE_DEPTH, "publisher declared");

    let mut delivered = 0u64;
    while let Some(image) = queue.recv().await {
        let payload = match image.encode_cdr().map_err(PublishError::from) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode image");
                continue;
            }
        };
        match publisher.put(payload).await {
            Ok(()) => {
                delivered += 1;
                tracing::trace!(delivered, "image published");
            }
            Err(e) => tracing::warn!(error = %e, topic, "zenoh put failed"),
        }
    }

    drop(publisher);
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "failed to close zenoh session");
    }
    tracing::info!(delivered, "publisher stopped");
    Ok(delivered)
}
