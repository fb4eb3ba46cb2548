use restora_core::{
    Artifact, DetectedFace, Detection, FaceIndex, FaceService, MergedResult, Mode, RestoredFace,
    ServiceError, SourceImage, Ticket, WorkflowError, WorkflowState,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("engine task exited")]
    ChannelClosed,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// User intents sent from the rendering surface to the engine task.
enum EngineRequest {
    ChooseImage {
        bytes: Vec<u8>,
        file_name: Option<String>,
        reply: Reply<Uuid>,
    },
    Detect {
        reply: Reply<Vec<DetectedFace>>,
    },
    ToggleFace {
        index: FaceIndex,
        reply: Reply<bool>,
    },
    Restore {
        mode: Mode,
        reply: Reply<Vec<RestoredFace>>,
    },
    ToggleDownload {
        position: usize,
        reply: Reply<bool>,
    },
    Download {
        mode: Mode,
        reply: Reply<String>,
    },
    Merge {
        reply: Reply<MergedResult>,
    },
}

/// Service responses reported back by the request tasks.
enum Completion {
    Detect {
        ticket: Ticket<Arc<SourceImage>>,
        result: Result<Detection, ServiceError>,
        reply: Reply<Vec<DetectedFace>>,
    },
    Restore {
        ticket: Ticket<Vec<DetectedFace>>,
        result: Result<Vec<RestoredFace>, ServiceError>,
        reply: Reply<Vec<RestoredFace>>,
    },
    Download {
        ticket: Ticket<Vec<RestoredFace>>,
        result: Result<Artifact, ServiceError>,
        reply: Reply<String>,
    },
    Merge {
        ticket: Ticket<String>,
        result: Result<MergedResult, ServiceError>,
        reply: Reply<MergedResult>,
    },
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    updates: watch::Receiver<WorkflowState>,
}

impl EngineHandle {
    /// Replace the source image; resets the whole workflow and returns the new run id.
    pub async fn choose_image(
        &self,
        bytes: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<Uuid, EngineError> {
        self.call(|reply| EngineRequest::ChooseImage {
            bytes,
            file_name,
            reply,
        })
        .await
    }

    /// Upload the source image and detect faces.
    pub async fn detect(&self) -> Result<Vec<DetectedFace>, EngineError> {
        self.call(|reply| EngineRequest::Detect { reply }).await
    }

    /// Toggle a detected face in or out of the restoration selection.
    pub async fn toggle_face(&self, index: FaceIndex) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::ToggleFace { index, reply })
            .await
    }

    /// Restore the selected faces, or all detected faces.
    pub async fn restore(&self, mode: Mode) -> Result<Vec<RestoredFace>, EngineError> {
        self.call(|reply| EngineRequest::Restore { mode, reply }).await
    }

    /// Toggle the download flag of the restored face at `position`.
    pub async fn toggle_download(&self, position: usize) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::ToggleDownload { position, reply })
            .await
    }

    /// Package restored faces; returns the service-relative archive URL.
    pub async fn download(&self, mode: Mode) -> Result<String, EngineError> {
        self.call(|reply| EngineRequest::Download { mode, reply }).await
    }

    /// Merge all restored faces back into the original image.
    pub async fn merge(&self) -> Result<MergedResult, EngineError> {
        self.call(|reply| EngineRequest::Merge { reply }).await
    }

    /// Receiver that observes every published workflow state.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.updates.clone()
    }

    /// The most recently published workflow state.
    pub fn snapshot(&self) -> WorkflowState {
        self.updates.borrow().clone()
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(request(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on the current Tokio runtime.
///
/// The engine owns the workflow record and processes one intent at a time.
/// Each service call runs on its own task and reports back through a
/// completion channel, so a slow request never blocks toggles or other
/// operation kinds. The task exits once every handle is dropped.
pub fn spawn_engine<S>(service: S, queue_depth: usize) -> EngineHandle
where
    S: FaceService + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));
    let (done_tx, done_rx) = mpsc::unbounded_channel::<Completion>();
    let (updates_tx, updates_rx) = watch::channel(WorkflowState::new());

    let engine = Engine {
        state: WorkflowState::new(),
        service: Arc::new(service),
        updates: updates_tx,
        done_tx,
    };
    tokio::spawn(engine.run(rx, done_rx));

    EngineHandle {
        tx,
        updates: updates_rx,
    }
}

struct Engine<S> {
    state: WorkflowState,
    service: Arc<S>,
    updates: watch::Sender<WorkflowState>,
    done_tx: mpsc::UnboundedSender<Completion>,
}

impl<S> Engine<S>
where
    S: FaceService + Send + Sync + 'static,
{
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<EngineRequest>,
        mut done_rx: mpsc::UnboundedReceiver<Completion>,
    ) {
        tracing::info!("engine started");
        loop {
            tokio::select! {
                Some(done) = done_rx.recv() => self.complete(done),
                request = rx.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
            }
        }
        tracing::info!("engine exiting");
    }

    fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::ChooseImage {
                bytes,
                file_name,
                reply,
            } => {
                let result = self.state.choose_image(bytes, file_name);
                self.respond(reply, result);
            }
            EngineRequest::Detect { reply } => match self.state.begin_detect() {
                Ok(ticket) => {
                    self.publish();
                    let service = Arc::clone(&self.service);
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = service.detect(ticket.payload()).await;
                        let _ = done.send(Completion::Detect {
                            ticket,
                            result,
                            reply,
                        });
                    });
                }
                Err(e) => self.respond(reply, Err(e)),
            },
            EngineRequest::ToggleFace { index, reply } => {
                let result = self.state.toggle_face(index);
                self.respond(reply, result);
            }
            EngineRequest::Restore { mode, reply } => match self.state.begin_restore(mode) {
                Ok(ticket) => {
                    tracing::info!(%mode, faces = ticket.payload().len(), "restoring faces");
                    self.publish();
                    let service = Arc::clone(&self.service);
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = service.restore(ticket.payload()).await;
                        let _ = done.send(Completion::Restore {
                            ticket,
                            result,
                            reply,
                        });
                    });
                }
                Err(e) => self.respond(reply, Err(e)),
            },
            EngineRequest::ToggleDownload { position, reply } => {
                let result = self.state.toggle_download(position);
                self.respond(reply, result);
            }
            EngineRequest::Download { mode, reply } => match self.state.begin_download(mode) {
                Ok(ticket) => {
                    tracing::info!(%mode, faces = ticket.payload().len(), "packaging download");
                    self.publish();
                    let service = Arc::clone(&self.service);
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = service.package(ticket.payload()).await;
                        let _ = done.send(Completion::Download {
                            ticket,
                            result,
                            reply,
                        });
                    });
                }
                Err(e) => self.respond(reply, Err(e)),
            },
            EngineRequest::Merge { reply } => match self.state.begin_merge() {
                Ok(ticket) => {
                    self.publish();
                    let service = Arc::clone(&self.service);
                    let done = self.done_tx.clone();
                    tokio::spawn(async move {
                        let result = service.merge(ticket.payload()).await;
                        let _ = done.send(Completion::Merge {
                            ticket,
                            result,
                            reply,
                        });
                    });
                }
                Err(e) => self.respond(reply, Err(e)),
            },
        }
    }

    fn complete(&mut self, done: Completion) {
        match done {
            Completion::Detect {
                ticket,
                result,
                reply,
            } => {
                let outcome = self.state.finish_detect(ticket, result).map(<[_]>::to_vec);
                self.respond(reply, outcome);
            }
            Completion::Restore {
                ticket,
                result,
                reply,
            } => {
                let outcome = self.state.finish_restore(ticket, result).map(<[_]>::to_vec);
                self.respond(reply, outcome);
            }
            Completion::Download {
                ticket,
                result,
                reply,
            } => {
                let outcome = self.state.finish_download(ticket, result);
                self.respond(reply, outcome);
            }
            Completion::Merge {
                ticket,
                result,
                reply,
            } => {
                let outcome = self.state.finish_merge(ticket, result).cloned();
                self.respond(reply, outcome);
            }
        }
    }

    /// Publish the new state, then answer the caller. Errors are notices, not
    /// failures of the engine.
    fn respond<T>(&mut self, reply: Reply<T>, outcome: Result<T, WorkflowError>) {
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "workflow operation rejected");
        }
        self.publish();
        let _ = reply.send(outcome.map_err(EngineError::from));
    }

    fn publish(&self) {
        self.updates.send_replace(self.state.clone());
    }
}
