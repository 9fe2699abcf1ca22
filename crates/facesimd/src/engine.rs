use facesim_core::image_io;
use facesim_core::{Comparison, ComparisonError, ComparisonPipeline, FaceExtractor, ImageRole};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Compare {
        first: PathBuf,
        second: PathBuf,
        reply: oneshot::Sender<Result<Comparison, ComparisonError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    threshold: f32,
}

impl EngineHandle {
    /// Compare the faces in two image files.
    pub async fn compare(&self, first: PathBuf, second: PathBuf) -> Result<Comparison, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Compare {
                first,
                second,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The extractor (and the models behind it) is owned by that thread for the
/// life of the process; requests are served one at a time in arrival order.
pub fn spawn_engine<E>(extractor: E, threshold: f32, queue_depth: usize) -> Result<EngineHandle, EngineError>
where
    E: FaceExtractor + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth);
    let mut pipeline = ComparisonPipeline::new(extractor, threshold);

    std::thread::Builder::new()
        .name("facesim-engine".into())
        .spawn(move || {
            tracing::info!(threshold, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Compare { first, second, reply } => {
                        let result = run_compare(&mut pipeline, &first, &second);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, threshold })
}

fn run_compare<E: FaceExtractor>(
    pipeline: &mut ComparisonPipeline<E>,
    first: &Path,
    second: &Path,
) -> Result<Comparison, ComparisonError> {
    let load = |role: ImageRole, path: &Path| {
        image_io::open_image(path).map_err(|e| ComparisonError::from_image(role, e))
    };
    let first_image = load(ImageRole::First, first)?;
    let second_image = load(ImageRole::Second, second)?;

    tracing::debug!(
        first = ?first_image.dimensions(),
        second = ?second_image.dimensions(),
        "compare: images decoded"
    );

    pipeline.compare(&first_image, &second_image)
}
