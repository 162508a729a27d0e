#![allow(dead_code)]

use async_trait::async_trait;
use gcodestream_communication::firmware::grbl::realtime;
use gcodestream_communication::{LineFanout, LineSubscription, SubscriptionId, Transport};
use gcodestream_core::{
    Error, LineError, PauseReason, RecoveryReport, StatusSnapshot, StreamError, StreamEvent,
    StreamObserver, StreamProgress,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct MockState {
    sent: Vec<String>,
    realtime: Vec<u8>,
    flushes: usize,
    connected: bool,
    failing_sends: usize,
    disconnect_on_reset: bool,
    reset_replies: Vec<String>,
    link_lost_sends: usize,
    send_attempts: usize,
}

/// In-memory transport; the paired [`MockController`] plays the controller
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    fanout: Arc<LineFanout>,
}

#[derive(Clone)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
    fanout: Arc<LineFanout>,
}

pub fn mock_transport() -> (Box<dyn Transport>, MockController) {
    let state = Arc::new(Mutex::new(MockState {
        sent: Vec::new(),
        realtime: Vec::new(),
        flushes: 0,
        connected: true,
        failing_sends: 0,
        disconnect_on_reset: false,
        reset_replies: Vec::new(),
        link_lost_sends: 0,
        send_attempts: 0,
    }));
    let fanout = Arc::new(LineFanout::new());
    let transport = MockTransport {
        state: state.clone(),
        fanout: fanout.clone(),
    };
    (Box::new(transport), MockController { state, fanout })
}

impl MockController {
    /// Deliver a line as if the controller printed it
    pub fn reply(&self, line: &str) {
        self.fanout.publish(line);
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn realtime(&self) -> Vec<u8> {
        self.state.lock().realtime.clone()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().flushes
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Make the next `n` line sends fail
    pub fn fail_next_sends(&self, n: usize) {
        self.state.lock().failing_sends = n;
    }

    /// Make the next `n` sends report a lost link while the connection
    /// flag still reads true
    pub fn lose_link_on_next_sends(&self, n: usize) {
        self.state.lock().link_lost_sends = n;
    }

    /// Every call to `send`, successful or not
    pub fn send_attempts(&self) -> usize {
        self.state.lock().send_attempts
    }

    /// Drop the connection as soon as a soft reset is written
    pub fn disconnect_on_reset(&self) {
        self.state.lock().disconnect_on_reset = true;
    }

    /// Lines the controller still emits right after a soft reset is written
    pub fn reply_on_reset(&self, lines: &[&str]) {
        self.state.lock().reset_replies = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }

    /// End every inbound subscription, as a dead reader thread would
    pub fn close_inbound(&self) {
        self.fanout.close();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, line: &str) -> gcodestream_core::Result<()> {
        let mut state = self.state.lock();
        state.send_attempts += 1;
        if !state.connected {
            return Err(StreamError::NotConnected.into());
        }
        if state.link_lost_sends > 0 {
            state.link_lost_sends -= 1;
            return Err(StreamError::ConnectionLost.into());
        }
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(Error::other("simulated write failure"));
        }
        state.sent.push(line.to_string());
        Ok(())
    }

    async fn flush(&mut self) -> gcodestream_core::Result<()> {
        self.state.lock().flushes += 1;
        Ok(())
    }

    fn send_realtime(&mut self, byte: u8) -> gcodestream_core::Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(StreamError::NotConnected.into());
        }
        state.realtime.push(byte);
        if byte == realtime::SOFT_RESET {
            if state.disconnect_on_reset {
                state.connected = false;
            }
            for line in state.reset_replies.drain(..) {
                self.fanout.publish(&line);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn subscribe(&mut self) -> LineSubscription {
        self.fanout.subscribe()
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.fanout.unsubscribe(id);
    }
}

/// Observer that keeps every notification in order
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<StreamEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&StreamEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn line_errors(&self) -> Vec<LineError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::LineError(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<StreamError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Error(err) => Some(err.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pauses(&self) -> Vec<PauseReason> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Paused(reason) => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn successes(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::LineSuccess { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn recoveries(&self) -> Vec<RecoveryReport> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Recovered(report) => Some(*report),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: StreamEvent) {
        self.events.lock().push(event);
    }
}

impl StreamObserver for Recorder {
    fn on_progress(&self, progress: &StreamProgress) {
        self.push(StreamEvent::Progress(*progress));
    }

    fn on_complete(&self, progress: &StreamProgress) {
        self.push(StreamEvent::Complete(*progress));
    }

    fn on_error(&self, error: &StreamError) {
        self.push(StreamEvent::Error(error.clone()));
    }

    fn on_line_success(&self, index: usize, text: &str) {
        self.push(StreamEvent::LineSuccess {
            index,
            text: text.to_string(),
        });
    }

    fn on_line_error(&self, error: &LineError) {
        self.push(StreamEvent::LineError(error.clone()));
    }

    fn on_pause(&self, reason: &PauseReason) {
        self.push(StreamEvent::Paused(reason.clone()));
    }

    fn on_resume(&self) {
        self.push(StreamEvent::Resumed);
    }

    fn on_status_update(&self, status: &StatusSnapshot) {
        self.push(StreamEvent::Status(status.clone()));
    }

    fn on_recovery(&self, report: &RecoveryReport) {
        self.push(StreamEvent::Recovered(*report));
    }
}
