//! Streaming session state machine
//!
//! A [`StreamSession`] owns the job queue, the buffer accountant, the
//! in-flight FIFO and the timeout slot of one streaming run. It reacts to
//! three kinds of events, each handled to completion before the next:
//!
//! - control calls (`start`, `pause`, `resume`, `stop`, ...)
//! - inbound controller lines ([`StreamSession::handle_line`])
//! - the armed deadline passing ([`StreamSession::handle_timer`])
//!
//! The session never sleeps waiting for those events itself. The only
//! awaits inside a reaction are transport sends, the flush on start/stop,
//! and the settle pause after a soft reset. Whoever drives the session
//! (normally [`super::StreamingEngine`]) must not run two reactions
//! concurrently.
//!
//! Replies are matched to lines strictly in send order: the controller is
//! assumed never to reorder acknowledgments.

use super::buffer::BufferAccountant;
use super::queue::CommandQueue;
use super::retry::{TimeoutController, TimerKind};
use super::StreamConfig;
use crate::communication::{LineSubscription, Transport};
use crate::firmware::grbl::{GrblResponse, StatusParser};
use gcodestream_core::{
    LineError, ObserverHandle, ObserverSet, PauseReason, RecoveryReport, SessionState,
    StreamError, StreamObserver, StreamProgress, StreamStatus,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

/// Something sent and awaiting its `ok`/`error:`
#[derive(Debug, Clone, PartialEq, Eq)]
enum InFlight {
    /// A job line, by sequence index
    Job(usize),
    /// A dry-run toggle; accounted like a line but not part of job progress
    Control { text: String, byte_length: usize },
}

/// One streaming run against one transport
pub struct StreamSession {
    config: StreamConfig,
    state: SessionState,
    queue: CommandQueue,
    buffer: BufferAccountant,
    timers: TimeoutController,
    in_flight: VecDeque<InFlight>,
    acknowledged: usize,
    last_acknowledged: Option<usize>,
    /// Timeouts suffered by the current oldest entry; cleared by any reply
    retries: u32,
    check_mode: bool,
    check_mode_exit_sent: bool,
    observers: ObserverSet,
    transport: Option<Box<dyn Transport>>,
    inbound: Option<LineSubscription>,
}

impl StreamSession {
    /// Create an idle session
    pub fn new(config: StreamConfig) -> Self {
        Self {
            buffer: BufferAccountant::new(config.buffer_capacity, config.max_in_flight),
            config,
            state: SessionState::Idle,
            queue: CommandQueue::new(),
            timers: TimeoutController::new(),
            in_flight: VecDeque::new(),
            acknowledged: 0,
            last_acknowledged: None,
            retries: 0,
            check_mode: false,
            check_mode_exit_sent: false,
            observers: ObserverSet::new(),
            transport: None,
            inbound: None,
        }
    }

    /// Replace the job with the sanitized lines of `raw`
    ///
    /// Returns the number of lines loaded; zero is not an error here, but
    /// [`StreamSession::start`] refuses an empty job.
    pub fn load_commands(&mut self, raw: &str) -> Result<usize, StreamError> {
        if self.state.is_active() {
            return Err(StreamError::AlreadyStreaming);
        }

        self.reset_counters();
        let count = self.queue.load(raw);
        self.state = SessionState::Idle;
        tracing::info!("Loaded {} lines", count);
        Ok(count)
    }

    /// Change the controller RX buffer size
    ///
    /// Refused while a run is active, since lines already reserved against
    /// the old size could exceed the new one.
    pub fn set_buffer_capacity(&mut self, bytes: usize) -> Result<(), StreamError> {
        if self.state.is_active() {
            return Err(StreamError::AlreadyStreaming);
        }

        self.config.buffer_capacity = bytes;
        self.buffer.set_capacity(bytes);
        tracing::debug!("Buffer capacity set to {} bytes", bytes);
        Ok(())
    }

    /// Register an observer
    pub fn register_observer(&mut self, observer: Arc<dyn StreamObserver>) -> ObserverHandle {
        self.observers.register(observer)
    }

    /// Unregister an observer; returns true if it was registered
    pub fn unregister_observer(&mut self, handle: ObserverHandle) -> bool {
        self.observers.unregister(handle)
    }

    /// Begin streaming the loaded job over `transport`
    ///
    /// Fails fast when a run is already active, the transport is not
    /// connected, or no lines are loaded. Otherwise flushes the transport,
    /// subscribes to its inbound lines, optionally enables dry-run mode, and
    /// fills the controller buffer.
    pub async fn start(
        &mut self,
        transport: Box<dyn Transport>,
        check_mode: bool,
    ) -> Result<(), StreamError> {
        if self.state.is_active() {
            return Err(StreamError::AlreadyStreaming);
        }
        if !transport.is_connected() {
            return Err(StreamError::NotConnected);
        }
        if self.queue.is_empty() {
            return Err(StreamError::EmptyQueue);
        }

        self.detach_inbound();
        let transport = self.transport.insert(transport);
        transport.flush().await.map_err(|e| e.into_stream_error())?;
        self.inbound = Some(transport.subscribe());

        self.queue.reset_progress();
        self.reset_counters();
        self.check_mode = check_mode;
        self.state = SessionState::Sending;
        tracing::info!(
            "Streaming {} lines{}",
            self.queue.len(),
            if check_mode { " in check mode" } else { "" }
        );

        if check_mode {
            let toggle = self.config.check_mode_command.clone();
            if !self.send_control(toggle).await {
                return Ok(());
            }
        }

        self.pump().await;
        Ok(())
    }

    /// Halt the send loop
    ///
    /// No-op unless sending. Only a user pause issues a feed hold; every
    /// reason stops further sends and disarms the deadline. Outstanding
    /// lines may still be acknowledged while paused.
    pub fn pause(&mut self, reason: PauseReason) {
        if self.state != SessionState::Sending {
            tracing::debug!("Ignoring pause ({}) in state {}", reason, self.state);
            return;
        }

        self.state = SessionState::Paused;
        self.timers.clear();

        if reason.is_user() {
            if let Some(transport) = self.transport.as_mut() {
                if let Err(e) = transport.feed_hold() {
                    tracing::warn!("Feed hold failed: {}", e);
                }
            }
            tracing::info!("Paused by user");
        } else {
            tracing::warn!("Paused: {}", reason);
        }

        self.observers.notify(|o| o.on_pause(&reason));
    }

    /// Continue a paused run from the current cursor
    ///
    /// Lines already sent but not acknowledged are not sent again.
    pub async fn resume(&mut self) {
        if self.state != SessionState::Paused {
            tracing::debug!("Ignoring resume in state {}", self.state);
            return;
        }

        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.resume_from_hold() {
                tracing::warn!("Cycle start failed: {}", e);
            }
        }

        self.state = SessionState::Sending;
        tracing::info!("Resumed");
        self.observers.notify(|o| o.on_resume());

        if !self.in_flight.is_empty() {
            self.timers.arm_ack(Instant::now(), self.config.ack_timeout);
        }
        self.pump().await;
    }

    /// Tear the run down
    ///
    /// Idempotent. Disarms the deadline and drops the inbound subscription
    /// unconditionally; an active run additionally gets a feed hold and a
    /// flush. The job is discarded, so restarting needs a fresh load.
    pub async fn stop(&mut self) {
        self.timers.clear();
        self.detach_inbound();

        if self.state.is_active() {
            if let Some(transport) = self.transport.as_mut() {
                if let Err(e) = transport.feed_hold() {
                    tracing::warn!("Feed hold on stop failed: {}", e);
                }
                if let Err(e) = transport.flush().await {
                    tracing::warn!("Flush on stop failed: {}", e);
                }
            }
            tracing::info!(
                "Stopped after {}/{} lines",
                self.acknowledged,
                self.queue.len()
            );
        }

        self.state = SessionState::Stopped;
        self.queue.clear();
        self.in_flight.clear();
        self.buffer.reset();
        self.check_mode = false;
    }

    /// React to one inbound controller line
    pub async fn handle_line(&mut self, line: &str) {
        if !self.state.is_active() {
            tracing::trace!("Ignoring '{}' in state {}", line, self.state);
            return;
        }

        let Some(response) = GrblResponse::classify(line) else {
            return;
        };

        match response {
            GrblResponse::Ok => self.resolve_oldest(None).await,
            GrblResponse::Error { code, text } => self.resolve_oldest(Some((code, text))).await,
            GrblResponse::Alarm { code, .. } => {
                let description = response.to_string();
                self.on_alarm(code, description);
            }
            GrblResponse::Status(raw) => self.on_status(&raw),
            GrblResponse::Message(msg) => {
                tracing::debug!("Controller: {}", msg);
                self.pump().await;
            }
        }
    }

    /// React to the armed deadline, if it has passed
    pub async fn handle_timer(&mut self) {
        let Some(kind) = self.timers.take_expired(Instant::now()) else {
            return;
        };
        if self.state != SessionState::Sending {
            return;
        }

        match kind {
            TimerKind::Ack => self.on_ack_timeout(),
            TimerKind::Probe => self.recover().await,
        }
    }

    /// The inbound line stream ended; the transport is gone
    pub fn handle_inbound_closed(&mut self) {
        self.inbound = None;
        if !self.state.is_active() {
            return;
        }

        tracing::error!("Inbound line stream closed");
        self.observers
            .notify(|o| o.on_error(&StreamError::ConnectionLost));
        self.pause(PauseReason::ConnectionLost);
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Active configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Progress counters
    pub fn progress(&self) -> StreamProgress {
        StreamProgress {
            sent: self.queue.cursor(),
            acknowledged: self.acknowledged,
            total: self.queue.len(),
            buffer_used: self.buffer.used(),
        }
    }

    /// Status snapshot
    pub fn status(&self) -> StreamStatus {
        let current_line = self
            .in_flight
            .iter()
            .find_map(|entry| match entry {
                InFlight::Job(index) => self.queue.get(*index),
                InFlight::Control { .. } => None,
            })
            .or_else(|| self.queue.next_unsent())
            .map(|cmd| cmd.text().to_string());

        StreamStatus {
            state: self.state,
            check_mode: self.check_mode,
            sent: self.queue.cursor(),
            acknowledged: self.acknowledged,
            total: self.queue.len(),
            buffer_used: self.buffer.used(),
            buffer_capacity: self.buffer.capacity(),
            current_line,
            last_acknowledged: self.last_acknowledged,
        }
    }

    /// The loaded job
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// When [`StreamSession::handle_timer`] next needs to run
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.deadline()
    }

    /// The live inbound subscription, if any
    pub fn inbound_mut(&mut self) -> Option<&mut LineSubscription> {
        self.inbound.as_mut()
    }

    fn reset_counters(&mut self) {
        self.in_flight.clear();
        self.buffer.reset();
        self.timers.clear();
        self.acknowledged = 0;
        self.last_acknowledged = None;
        self.retries = 0;
        self.check_mode = false;
        self.check_mode_exit_sent = false;
    }

    fn detach_inbound(&mut self) {
        if let Some(subscription) = self.inbound.take() {
            if let Some(transport) = self.transport.as_mut() {
                transport.unsubscribe(subscription.id);
            }
        }
    }

    fn emit_progress(&self) {
        let progress = self.progress();
        self.observers.notify(|o| o.on_progress(&progress));
    }

    /// Send loop: fill the controller buffer in queue order
    async fn pump(&mut self) {
        while self.state == SessionState::Sending {
            let next = self
                .queue
                .next_unsent()
                .map(|cmd| (cmd.sequence_index, cmd.byte_length, cmd.text().to_string()));
            let Some((index, length, text)) = next else {
                if self.in_flight.is_empty() {
                    self.finish().await;
                }
                break;
            };

            if !self.buffer.fits_empty(length) {
                self.reject_oversized(index, text, length);
                break;
            }
            if !self.buffer.can_send(length) {
                tracing::trace!(
                    "Line {} ({} bytes) waits for buffer space, {}/{} used",
                    index,
                    length,
                    self.buffer.used(),
                    self.buffer.capacity()
                );
                break;
            }

            if let Err(e) = self.send_line(&text).await {
                self.on_send_failed(e);
                break;
            }

            let now = Instant::now();
            if let Some(cmd) = self.queue.get_mut(index) {
                cmd.mark_sent(now);
            }
            self.buffer.reserve(length);
            self.queue.advance();
            self.push_in_flight(InFlight::Job(index), now);
            self.emit_progress();
        }
    }

    /// Queue exhausted and nothing outstanding
    async fn finish(&mut self) {
        if self.check_mode && !self.check_mode_exit_sent {
            self.check_mode_exit_sent = true;
            let toggle = self.config.check_mode_command.clone();
            self.send_control(toggle).await;
            return;
        }

        self.state = SessionState::Completed;
        self.timers.clear();
        self.detach_inbound();

        let progress = self.progress();
        tracing::info!("Job complete: {} lines", progress.total);
        self.observers.notify(|o| o.on_complete(&progress));
    }

    /// Send a non-job line through the same FIFO; false if the send failed
    async fn send_control(&mut self, text: String) -> bool {
        if let Err(e) = self.send_line(&text).await {
            self.on_send_failed(e);
            return false;
        }

        let byte_length = text.len() + 1;
        self.buffer.reserve(byte_length);
        self.push_in_flight(InFlight::Control { text, byte_length }, Instant::now());
        true
    }

    async fn send_line(&mut self, text: &str) -> Result<(), StreamError> {
        let attempts = self.config.transport_retries + 1;
        let delay = self.config.transport_retry_delay;
        let Some(transport) = self.transport.as_mut() else {
            return Err(StreamError::NotConnected);
        };

        let mut attempt = 1;
        loop {
            match transport.send(text).await {
                Ok(()) => {
                    tracing::debug!("> {}", text);
                    return Ok(());
                }
                Err(e) if attempt < attempts
                    && !e.is_connection_error()
                    && transport.is_connected() =>
                {
                    tracing::warn!(
                        "Send of '{}' failed (attempt {}/{}): {}",
                        text,
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into_stream_error()),
            }
        }
    }

    fn on_send_failed(&mut self, error: StreamError) {
        let reason = match error {
            StreamError::NotConnected | StreamError::ConnectionLost => {
                tracing::error!("Transport disconnected while sending");
                self.observers
                    .notify(|o| o.on_error(&StreamError::ConnectionLost));
                PauseReason::ConnectionLost
            }
            other => {
                tracing::error!("Send failed: {}", other);
                self.observers.notify(|o| o.on_error(&other));
                PauseReason::TransportError(other.to_string())
            }
        };
        self.pause(reason);
    }

    fn reject_oversized(&mut self, index: usize, text: String, length: usize) {
        let capacity = self.buffer.capacity();
        let error = StreamError::LineTooLong {
            index,
            length,
            capacity,
        };
        tracing::error!("{}", error);

        let line_error = LineError {
            index,
            text,
            code: None,
            message: error.to_string(),
            fatal: true,
        };
        self.observers.notify(|o| o.on_line_error(&line_error));
        self.observers.notify(|o| o.on_error(&error));
        self.pause(PauseReason::LineTooLong { index });
    }

    fn push_in_flight(&mut self, entry: InFlight, now: Instant) {
        if self.in_flight.is_empty() {
            self.timers.arm_ack(now, self.config.ack_timeout);
        }
        self.in_flight.push_back(entry);
    }

    /// Sequence index an entry stands for; control entries report the
    /// job line that follows them
    fn entry_index(&self, entry: &InFlight) -> usize {
        match entry {
            InFlight::Job(index) => *index,
            InFlight::Control { .. } => self.queue.cursor(),
        }
    }

    /// Acknowledgment matcher: `ok` (`None`) or `error:` resolves the oldest entry
    async fn resolve_oldest(&mut self, error: Option<(Option<u16>, String)>) {
        let Some(entry) = self.in_flight.pop_front() else {
            tracing::warn!("Acknowledgment with nothing in flight, ignoring");
            return;
        };
        self.retries = 0;

        match entry {
            InFlight::Control { text, byte_length } => {
                self.buffer.release(byte_length);
                match &error {
                    Some((_, message)) => {
                        tracing::warn!("Control line '{}' rejected: {}", text, message)
                    }
                    None => tracing::debug!("Control line '{}' acknowledged", text),
                }
            }
            InFlight::Job(index) => self.acknowledge_job(index, error),
        }

        if self.state == SessionState::Sending && !self.in_flight.is_empty() {
            self.timers.arm_ack(Instant::now(), self.config.ack_timeout);
        } else {
            self.timers.clear();
        }

        self.emit_progress();
        self.pump().await;
    }

    fn acknowledge_job(&mut self, index: usize, error: Option<(Option<u16>, String)>) {
        let Some(cmd) = self.queue.get_mut(index) else {
            tracing::warn!("Acknowledged line {} is not in the queue", index);
            return;
        };
        cmd.mark_acknowledged(error.as_ref().and_then(|(code, _)| *code));
        let length = cmd.byte_length;
        let text = cmd.text().to_string();

        self.buffer.release(length);
        self.acknowledged += 1;
        self.last_acknowledged = Some(self.last_acknowledged.map_or(index, |last| last.max(index)));

        let Some((code, message)) = error else {
            tracing::debug!("ok {} '{}'", index, text);
            self.observers.notify(|o| o.on_line_success(index, &text));
            return;
        };

        let fatal_code = code.filter(|c| self.config.fatal_error_codes.contains(c));
        let line_error = LineError {
            index,
            text,
            code,
            message,
            fatal: fatal_code.is_some(),
        };

        if let Some(code) = fatal_code {
            tracing::error!("Fatal {}", line_error);
            self.observers.notify(|o| o.on_line_error(&line_error));
            self.pause(PauseReason::FatalLineError { index, code });
        } else {
            tracing::warn!("{}", line_error);
            self.observers.notify(|o| o.on_line_error(&line_error));
        }
    }

    /// Alarms never resolve a line; the controller refused to go on
    fn on_alarm(&mut self, code: Option<u16>, description: String) {
        tracing::error!("Controller alarm: {}", description);
        let error = StreamError::Alarm {
            code,
            message: description.clone(),
        };
        self.observers.notify(|o| o.on_error(&error));
        self.pause(PauseReason::Alarm(description));
    }

    fn on_status(&mut self, raw: &str) {
        let Some(snapshot) = StatusParser::parse(raw) else {
            tracing::warn!("Dropping malformed status report '{}'", raw);
            return;
        };

        tracing::trace!("Status {} {}", snapshot.state, snapshot.machine_position);
        self.observers.notify(|o| o.on_status_update(&snapshot));

        if self.timers.kind() == Some(TimerKind::Probe) {
            tracing::debug!("Controller answered status probe, waiting again");
            self.timers.arm_ack(Instant::now(), self.config.ack_timeout);
        }
    }

    fn on_ack_timeout(&mut self) {
        let Some(head) = self.in_flight.front().cloned() else {
            return;
        };
        let index = self.entry_index(&head);

        if self.retries >= self.config.max_retries {
            self.fail_unacknowledged(head, index);
            return;
        }

        self.retries += 1;
        if let InFlight::Job(i) = head {
            if let Some(cmd) = self.queue.get_mut(i) {
                cmd.retry_count += 1;
            }
        }
        tracing::warn!(
            "Line {} not acknowledged within {:?}, probing controller (retry {}/{})",
            index,
            self.config.ack_timeout,
            self.retries,
            self.config.max_retries
        );

        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.request_status() {
                tracing::warn!("Status probe failed: {}", e);
            }
        }
        self.timers
            .arm_probe(Instant::now(), self.config.probe_timeout);
    }

    fn fail_unacknowledged(&mut self, head: InFlight, index: usize) {
        let retries = self.retries;
        tracing::error!("Line {} exhausted {} retries, giving up", index, retries);

        if let InFlight::Job(i) = head {
            if let Some(cmd) = self.queue.get(i) {
                let line_error = LineError {
                    index,
                    text: cmd.text().to_string(),
                    code: None,
                    message: format!("no acknowledgment after {} retries", retries),
                    fatal: true,
                };
                self.observers.notify(|o| o.on_line_error(&line_error));
            }
        }

        let error = StreamError::Timeout { index, retries };
        self.observers.notify(|o| o.on_error(&error));
        self.pause(PauseReason::RetriesExhausted { index });

        self.state = SessionState::Failed;
        self.timers.clear();
        self.detach_inbound();
    }

    /// Soft reset, then replay everything that was never acknowledged
    async fn recover(&mut self) {
        tracing::warn!("Status probe unanswered, soft-resetting controller");

        let Some(transport) = self.transport.as_mut() else {
            self.on_send_failed(StreamError::NotConnected);
            return;
        };
        if let Err(e) = transport.soft_reset() {
            self.on_send_failed(e.into_stream_error());
            return;
        }

        tokio::time::sleep(self.config.settle_interval).await;

        let connected = self
            .transport
            .as_ref()
            .is_some_and(|transport| transport.is_connected());
        if !connected {
            tracing::error!("Transport disconnected during recovery");
            self.observers
                .notify(|o| o.on_error(&StreamError::ConnectionLost));
            self.pause(PauseReason::ConnectionLost);
            return;
        }

        // Anything read so far answers lines the reset discarded.
        if let Some(inbound) = self.inbound.as_mut() {
            while let Ok(line) = inbound.lines.try_recv() {
                tracing::debug!("Discarding '{}' received before the reset", line);
            }
        }

        self.buffer.reset();
        let requeued: Vec<usize> = self
            .in_flight
            .drain(..)
            .filter_map(|entry| match entry {
                InFlight::Job(index) => Some(index),
                InFlight::Control { .. } => None,
            })
            .collect();
        for &index in &requeued {
            if let Some(cmd) = self.queue.get_mut(index) {
                cmd.mark_unsent();
            }
        }
        if let Some(&first) = requeued.first() {
            self.queue.rewind_to(first);
        }

        let report = RecoveryReport {
            resume_from: self.queue.cursor(),
            requeued: requeued.len(),
            buffer_used: self.buffer.used(),
        };
        tracing::info!(
            "Recovered: {} lines requeued, resuming at line {}",
            report.requeued,
            report.resume_from
        );
        self.observers.notify(|o| o.on_recovery(&report));
        self.emit_progress();

        // A reset drops the controller out of dry-run mode.
        if self.check_mode && !self.check_mode_exit_sent {
            let toggle = self.config.check_mode_command.clone();
            if !self.send_control(toggle).await {
                return;
            }
        }

        self.pump().await;
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("total", &self.queue.len())
            .field("cursor", &self.queue.cursor())
            .field("in_flight", &self.in_flight.len())
            .field("buffer_used", &self.buffer.used())
            .finish()
    }
}
