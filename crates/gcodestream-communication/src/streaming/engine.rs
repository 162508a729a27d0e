//! Async driver for a streaming session
//!
//! The engine task owns the [`StreamSession`] outright. Control requests
//! from [`StreamerHandle`]s, inbound controller lines, and the session's
//! armed deadline are multiplexed through a single `select!`, so every
//! reaction runs to completion before the next one starts and no state is
//! shared across threads.

use super::session::StreamSession;
use super::StreamConfig;
use crate::communication::{LineSubscription, Transport};
use gcodestream_core::{ObserverHandle, PauseReason, StreamError, StreamObserver, StreamStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Reply<T> = oneshot::Sender<T>;

enum Request {
    Load {
        raw: String,
        reply: Reply<Result<usize, StreamError>>,
    },
    SetCapacity {
        bytes: usize,
        reply: Reply<Result<(), StreamError>>,
    },
    Register {
        observer: Arc<dyn StreamObserver>,
        reply: Reply<ObserverHandle>,
    },
    Unregister {
        handle: ObserverHandle,
        reply: Reply<bool>,
    },
    Start {
        transport: Box<dyn Transport>,
        check_mode: bool,
        reply: Reply<Result<(), StreamError>>,
    },
    Pause {
        reason: PauseReason,
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Status {
        reply: Reply<StreamStatus>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

enum Event {
    Request(Request),
    RequestsClosed,
    Line(Option<String>),
    Deadline,
}

/// Streaming engine task
pub struct StreamingEngine {
    session: StreamSession,
    requests: mpsc::Receiver<Request>,
}

impl StreamingEngine {
    /// Spawn an engine with a fresh session on the current tokio runtime
    pub fn spawn(config: StreamConfig) -> StreamerHandle {
        let (tx, rx) = mpsc::channel(64);
        let engine = Self {
            session: StreamSession::new(config),
            requests: rx,
        };
        let task = tokio::spawn(engine.run());

        StreamerHandle {
            requests: tx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        tracing::debug!("Streaming engine started");

        loop {
            let deadline = self.session.next_deadline();
            let event = tokio::select! {
                biased;
                request = self.requests.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => Event::RequestsClosed,
                },
                line = next_line(self.session.inbound_mut()) => Event::Line(line),
                _ = sleep_until(deadline) => Event::Deadline,
            };

            match event {
                Event::Request(Request::Shutdown { reply }) => {
                    self.session.stop().await;
                    let _ = reply.send(());
                    break;
                }
                Event::Request(request) => self.handle_request(request).await,
                Event::RequestsClosed => {
                    self.session.stop().await;
                    break;
                }
                Event::Line(Some(line)) => self.session.handle_line(&line).await,
                Event::Line(None) => self.session.handle_inbound_closed(),
                Event::Deadline => self.session.handle_timer().await,
            }
        }

        tracing::debug!("Streaming engine stopped");
    }

    async fn handle_request(&mut self, request: Request) {
        // A dropped reply receiver only means the caller stopped waiting.
        match request {
            Request::Load { raw, reply } => {
                let _ = reply.send(self.session.load_commands(&raw));
            }
            Request::SetCapacity { bytes, reply } => {
                let _ = reply.send(self.session.set_buffer_capacity(bytes));
            }
            Request::Register { observer, reply } => {
                let _ = reply.send(self.session.register_observer(observer));
            }
            Request::Unregister { handle, reply } => {
                let _ = reply.send(self.session.unregister_observer(handle));
            }
            Request::Start {
                transport,
                check_mode,
                reply,
            } => {
                let _ = reply.send(self.session.start(transport, check_mode).await);
            }
            Request::Pause { reason, reply } => {
                self.session.pause(reason);
                let _ = reply.send(());
            }
            Request::Resume { reply } => {
                self.session.resume().await;
                let _ = reply.send(());
            }
            Request::Stop { reply } => {
                self.session.stop().await;
                let _ = reply.send(());
            }
            Request::Status { reply } => {
                let _ = reply.send(self.session.status());
            }
            Request::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }
}

async fn next_line(inbound: Option<&mut LineSubscription>) -> Option<String> {
    match inbound {
        Some(subscription) => subscription.lines.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running [`StreamingEngine`]
///
/// Every method waits until the engine has processed the request. Once the
/// engine is gone they fail with [`StreamError::EngineStopped`].
#[derive(Clone)]
pub struct StreamerHandle {
    requests: mpsc::Sender<Request>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StreamerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, StreamError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| StreamError::EngineStopped)?;
        rx.await.map_err(|_| StreamError::EngineStopped)
    }

    /// Replace the job with the sanitized lines of `raw`
    pub async fn load_commands(&self, raw: impl Into<String>) -> Result<usize, StreamError> {
        let raw = raw.into();
        self.request(|reply| Request::Load { raw, reply }).await?
    }

    /// Change the controller RX buffer size; refused while a run is active
    pub async fn set_buffer_capacity(&self, bytes: usize) -> Result<(), StreamError> {
        self.request(|reply| Request::SetCapacity { bytes, reply })
            .await?
    }

    /// Register an observer
    pub async fn register_observer(
        &self,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<ObserverHandle, StreamError> {
        self.request(|reply| Request::Register { observer, reply })
            .await
    }

    /// Unregister an observer; true if it was registered
    pub async fn unregister_observer(&self, handle: ObserverHandle) -> Result<bool, StreamError> {
        self.request(|reply| Request::Unregister { handle, reply })
            .await
    }

    /// Start streaming the loaded job over `transport`
    pub async fn start(
        &self,
        transport: Box<dyn Transport>,
        check_mode: bool,
    ) -> Result<(), StreamError> {
        self.request(|reply| Request::Start {
            transport,
            check_mode,
            reply,
        })
        .await?
    }

    /// Halt the send loop
    pub async fn pause(&self, reason: PauseReason) -> Result<(), StreamError> {
        self.request(|reply| Request::Pause { reason, reply }).await
    }

    /// Resume a paused run
    pub async fn resume(&self) -> Result<(), StreamError> {
        self.request(|reply| Request::Resume { reply }).await
    }

    /// Tear the current run down
    pub async fn stop(&self) -> Result<(), StreamError> {
        self.request(|reply| Request::Stop { reply }).await
    }

    /// Session status snapshot
    pub async fn status(&self) -> Result<StreamStatus, StreamError> {
        self.request(|reply| Request::Status { reply }).await
    }

    /// Whether the engine task is still accepting requests
    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }

    /// Stop the run, end the engine task, and wait for it to exit
    pub async fn shutdown(&self) -> Result<(), StreamError> {
        let result = self.request(|reply| Request::Shutdown { reply }).await;

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Streaming engine task failed: {}", e);
            }
        }
        result
    }
}

impl std::fmt::Debug for StreamerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamerHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
