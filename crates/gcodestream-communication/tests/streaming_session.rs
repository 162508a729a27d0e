mod common;

use common::{mock_transport, MockController, Recorder};
use gcodestream_communication::firmware::grbl::realtime;
use gcodestream_communication::{StreamConfig, StreamSession};
use gcodestream_core::{PauseReason, SessionState, StreamError, StreamEvent};
use std::sync::Arc;

const THREE_EIGHT_BYTE_LINES: &str = "G1 X100\nG1 Y100\nG1 Z100";

fn config(capacity: usize) -> StreamConfig {
    StreamConfig {
        buffer_capacity: capacity,
        ..StreamConfig::default()
    }
}

async fn started(raw: &str, config: StreamConfig) -> (StreamSession, MockController, Arc<Recorder>) {
    let mut session = StreamSession::new(config);
    let recorder = Recorder::new();
    session.register_observer(recorder.clone());
    session.load_commands(raw).expect("load");

    let (transport, controller) = mock_transport();
    session.start(transport, false).await.expect("start");
    (session, controller, recorder)
}

#[tokio::test]
async fn test_load_counts_sanitized_lines() {
    let mut session = StreamSession::new(StreamConfig::default());
    let count = session
        .load_commands("G1 X10 F1000\nG1 Y10\n; comment only\nG1 Z5")
        .expect("load");
    assert_eq!(count, 3);

    let lengths: Vec<usize> = session.queue().iter().map(|c| c.byte_length).collect();
    assert_eq!(lengths, vec![13, 7, 6]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_buffer_budget_blocks_third_line() {
    let (mut session, controller, recorder) = started(THREE_EIGHT_BYTE_LINES, config(20)).await;

    assert_eq!(controller.sent(), vec!["G1 X100", "G1 Y100"]);
    assert_eq!(session.status().buffer_used, 16);
    assert_eq!(controller.flushes(), 1);

    session.handle_line("ok").await;
    assert_eq!(controller.sent().len(), 3);
    assert_eq!(session.status().buffer_used, 16);

    session.handle_line("ok").await;
    session.handle_line("ok").await;
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.status().buffer_used, 0);
    assert_eq!(recorder.successes(), vec![0, 1, 2]);
    assert_eq!(
        recorder.count(|e| matches!(e, StreamEvent::Complete(p) if p.acknowledged == 3)),
        1
    );
    assert_eq!(controller.subscriber_count(), 0);
}

#[tokio::test]
async fn test_capacity_change_refused_while_streaming() {
    let (mut session, controller, _recorder) =
        started(THREE_EIGHT_BYTE_LINES, config(127)).await;
    assert_eq!(session.status().buffer_used, 24);

    assert_eq!(
        session.set_buffer_capacity(10),
        Err(StreamError::AlreadyStreaming)
    );
    let status = session.status();
    assert_eq!(status.buffer_capacity, 127);
    assert!(status.buffer_used <= status.buffer_capacity);

    session.pause(PauseReason::User);
    assert_eq!(
        session.set_buffer_capacity(10),
        Err(StreamError::AlreadyStreaming)
    );

    session.stop().await;
    assert_eq!(session.set_buffer_capacity(16), Ok(()));
    assert_eq!(session.status().buffer_capacity, 16);

    // The new size governs the next run.
    session.load_commands(THREE_EIGHT_BYTE_LINES).expect("load");
    let (transport, next) = mock_transport();
    session.start(transport, false).await.expect("start");
    assert_eq!(next.sent(), vec!["G1 X100", "G1 Y100"]);
    assert_eq!(controller.sent().len(), 3);
}

#[tokio::test]
async fn test_error_response_is_acknowledgment() {
    let (mut session, controller, recorder) = started(THREE_EIGHT_BYTE_LINES, config(8)).await;
    assert_eq!(controller.sent().len(), 1);

    session.handle_line("error:9").await;

    let errors = recorder.line_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, Some(9));
    assert_eq!(errors[0].text, "G1 X100");
    assert!(!errors[0].fatal);

    let status = session.status();
    assert_eq!(status.state, SessionState::Sending);
    assert_eq!(status.acknowledged, 1);
    assert_eq!(status.last_acknowledged, Some(0));
    assert_eq!(controller.sent().len(), 2);
    assert_eq!(
        session.queue().get(0).and_then(|c| c.error_code),
        Some(9)
    );
}

#[tokio::test]
async fn test_fatal_error_code_pauses() {
    let mut cfg = config(127);
    cfg.fatal_error_codes.insert(20);
    let (mut session, _controller, recorder) = started(THREE_EIGHT_BYTE_LINES, cfg).await;

    session.handle_line("error:20").await;

    assert_eq!(session.state(), SessionState::Paused);
    assert!(recorder.line_errors()[0].fatal);
    assert_eq!(
        recorder.pauses(),
        vec![PauseReason::FatalLineError { index: 0, code: 20 }]
    );
}

#[tokio::test]
async fn test_alarm_pauses_without_resolving() {
    let (mut session, controller, recorder) = started(THREE_EIGHT_BYTE_LINES, config(127)).await;
    let before = session.status();

    session.handle_line("ALARM:1").await;

    let after = session.status();
    assert_eq!(after.state, SessionState::Paused);
    assert_eq!(after.acknowledged, before.acknowledged);
    assert_eq!(after.buffer_used, before.buffer_used);
    assert!(matches!(
        recorder.errors().as_slice(),
        [StreamError::Alarm { code: Some(1), .. }]
    ));
    // Only a user pause holds the machine.
    assert!(controller.realtime().is_empty());
    assert_eq!(session.next_deadline(), None);
}

#[tokio::test]
async fn test_pause_is_idempotent() {
    let (mut session, controller, recorder) = started(THREE_EIGHT_BYTE_LINES, config(8)).await;

    session.pause(PauseReason::User);
    session.pause(PauseReason::User);

    assert_eq!(recorder.pauses(), vec![PauseReason::User]);
    assert_eq!(controller.realtime(), vec![realtime::FEED_HOLD]);

    // Acknowledgments still resolve while paused, but nothing new is sent.
    session.handle_line("ok").await;
    assert_eq!(controller.sent().len(), 1);
    assert_eq!(session.status().acknowledged, 1);

    session.resume().await;
    session.resume().await;
    assert_eq!(recorder.count(|e| matches!(e, StreamEvent::Resumed)), 1);
    assert_eq!(
        controller.realtime(),
        vec![realtime::FEED_HOLD, realtime::CYCLE_START]
    );
    assert_eq!(controller.sent().len(), 2);
}

#[tokio::test]
async fn test_pause_when_idle_is_noop() {
    let mut session = StreamSession::new(StreamConfig::default());
    let recorder = Recorder::new();
    session.register_observer(recorder.clone());

    session.pause(PauseReason::User);
    session.resume().await;

    assert_eq!(session.state(), SessionState::Idle);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_start_preconditions() {
    let mut session = StreamSession::new(StreamConfig::default());

    let (transport, _controller) = mock_transport();
    assert_eq!(
        session.start(transport, false).await,
        Err(StreamError::EmptyQueue)
    );

    session.load_commands("G0 X1").expect("load");
    let (transport, controller) = mock_transport();
    controller.set_connected(false);
    assert_eq!(
        session.start(transport, false).await,
        Err(StreamError::NotConnected)
    );

    let (transport, _controller) = mock_transport();
    assert_eq!(session.start(transport, false).await, Ok(()));
    let (transport, _other) = mock_transport();
    assert_eq!(
        session.start(transport, false).await,
        Err(StreamError::AlreadyStreaming)
    );
    assert_eq!(
        session.load_commands("G0 X2"),
        Err(StreamError::AlreadyStreaming)
    );
}

#[tokio::test]
async fn test_ack_with_nothing_in_flight_is_ignored() {
    let (mut session, _controller, recorder) = started("G0 X1\nG0 X2", config(6)).await;

    session.handle_line("ALARM:1").await;
    session.handle_line("ok").await;
    session.handle_line("ok").await;

    let status = session.status();
    assert_eq!(status.state, SessionState::Paused);
    assert_eq!(status.acknowledged, 1);
    assert_eq!(status.buffer_used, 0);
    assert_eq!(recorder.successes(), vec![0]);
}

#[tokio::test]
async fn test_messages_and_status_do_not_acknowledge() {
    let (mut session, _controller, recorder) = started(THREE_EIGHT_BYTE_LINES, config(127)).await;

    session.handle_line("[MSG:Pgm End]").await;
    session.handle_line("<Run|MPos:1.000,2.000,3.000|FS:500,0>").await;
    session.handle_line("<|>").await;

    assert_eq!(session.status().acknowledged, 0);
    assert_eq!(session.state(), SessionState::Sending);
    let statuses = recorder.count(|e| matches!(e, StreamEvent::Status(_)));
    assert_eq!(statuses, 1);
}

#[tokio::test]
async fn test_oversized_line_pauses() {
    let (mut session, controller, recorder) = {
        let mut session = StreamSession::new(config(10));
        let recorder = Recorder::new();
        session.register_observer(recorder.clone());
        session.load_commands("G0 X1\nG1 X1000 Y1000").expect("load");
        let (transport, controller) = mock_transport();
        session.start(transport, false).await.expect("start");
        (session, controller, recorder)
    };

    assert_eq!(controller.sent(), vec!["G0 X1"]);
    session.handle_line("ok").await;

    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(recorder.pauses(), vec![PauseReason::LineTooLong { index: 1 }]);
    assert!(matches!(
        recorder.errors().as_slice(),
        [StreamError::LineTooLong {
            index: 1,
            length: 15,
            capacity: 10
        }]
    ));
    assert_eq!(controller.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_send_retries() {
    let mut session = StreamSession::new(config(127));
    let recorder = Recorder::new();
    session.register_observer(recorder.clone());
    session.load_commands("G0 X1\nG0 X2").expect("load");

    let (transport, controller) = mock_transport();
    controller.fail_next_sends(2);
    session.start(transport, false).await.expect("start");
    assert_eq!(controller.sent(), vec!["G0 X1", "G0 X2"]);

    session.handle_line("ok").await;
    session.handle_line("ok").await;
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_pauses() {
    let mut session = StreamSession::new(config(127));
    let recorder = Recorder::new();
    session.register_observer(recorder.clone());
    session.load_commands("G0 X1").expect("load");

    let (transport, controller) = mock_transport();
    controller.fail_next_sends(3);
    session.start(transport, false).await.expect("start");

    assert_eq!(session.state(), SessionState::Paused);
    assert!(controller.sent().is_empty());
    assert!(matches!(
        recorder.pauses().as_slice(),
        [PauseReason::TransportError(_)]
    ));
    assert!(matches!(
        recorder.errors().as_slice(),
        [StreamError::Transport { .. }]
    ));
}

#[tokio::test]
async fn test_connection_errors_are_not_retried() {
    let mut session = StreamSession::new(config(127));
    let recorder = Recorder::new();
    session.register_observer(recorder.clone());
    session.load_commands("G0 X1").expect("load");

    let (transport, controller) = mock_transport();
    controller.lose_link_on_next_sends(1);
    session.start(transport, false).await.expect("start");

    assert_eq!(controller.send_attempts(), 1);
    assert!(controller.sent().is_empty());
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(recorder.pauses(), vec![PauseReason::ConnectionLost]);
    assert_eq!(recorder.errors(), vec![StreamError::ConnectionLost]);
}

#[tokio::test]
async fn test_disconnected_transport_reports_connection_lost() {
    let (mut session, controller, recorder) = started(THREE_EIGHT_BYTE_LINES, config(8)).await;
    controller.set_connected(false);

    session.handle_line("ok").await;

    assert_eq!(recorder.pauses(), vec![PauseReason::ConnectionLost]);
    assert_eq!(recorder.errors(), vec![StreamError::ConnectionLost]);
}

#[tokio::test]
async fn test_inbound_closed_pauses() {
    let (mut session, _controller, recorder) = started(THREE_EIGHT_BYTE_LINES, config(127)).await;

    session.handle_inbound_closed();

    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(recorder.errors(), vec![StreamError::ConnectionLost]);
    assert!(session.inbound_mut().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_recovery_rewinds_to_first_unacknowledged() {
    let raw = "G0 X0\nG0 X1\nG0 X2\nG0 X3\nG0 X4";
    let cfg = config(127);
    let ack = cfg.ack_timeout;
    let probe = cfg.probe_timeout;
    let (mut session, controller, recorder) = started(raw, cfg).await;
    assert_eq!(controller.sent().len(), 5);

    for _ in 0..3 {
        session.handle_line("ok").await;
    }
    assert_eq!(session.status().last_acknowledged, Some(2));

    tokio::time::advance(ack).await;
    session.handle_timer().await;
    assert_eq!(controller.realtime(), vec![realtime::STATUS_QUERY]);
    assert_eq!(session.queue().get(3).map(|c| c.retry_count), Some(1));

    tokio::time::advance(probe).await;
    session.handle_timer().await;

    assert_eq!(
        controller.realtime(),
        vec![realtime::STATUS_QUERY, realtime::SOFT_RESET]
    );
    let reports = recorder.recoveries();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].resume_from, 3);
    assert_eq!(reports[0].requeued, 2);
    assert_eq!(reports[0].buffer_used, 0);

    // The unacknowledged tail is replayed in order.
    let sent = controller.sent();
    assert_eq!(sent.len(), 7);
    assert_eq!(&sent[5..], &["G0 X3", "G0 X4"]);
    assert_eq!(session.status().buffer_used, 12);
    assert_eq!(session.state(), SessionState::Sending);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_settle_pauses_without_replay() {
    let raw = "G0 X0\nG0 X1";
    let cfg = config(127);
    let ack = cfg.ack_timeout;
    let probe = cfg.probe_timeout;
    let (mut session, controller, recorder) = started(raw, cfg).await;
    controller.disconnect_on_reset();

    tokio::time::advance(ack).await;
    session.handle_timer().await;
    tokio::time::advance(probe).await;
    session.handle_timer().await;

    // The reset itself went out; the link dropped while settling.
    assert_eq!(
        controller.realtime(),
        vec![realtime::STATUS_QUERY, realtime::SOFT_RESET]
    );
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(recorder.pauses(), vec![PauseReason::ConnectionLost]);
    assert_eq!(recorder.errors(), vec![StreamError::ConnectionLost]);
    assert!(recorder.recoveries().is_empty());
    assert_eq!(controller.sent(), vec!["G0 X0", "G0 X1"]);
    assert_eq!(session.next_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn test_replies_read_before_reset_are_discarded() {
    let raw = "G0 X0\nG0 X1\nG0 X2";
    let cfg = config(127);
    let ack = cfg.ack_timeout;
    let probe = cfg.probe_timeout;
    let (mut session, controller, recorder) = started(raw, cfg).await;
    controller.reply_on_reset(&["ok", "ok"]);

    tokio::time::advance(ack).await;
    session.handle_timer().await;
    tokio::time::advance(probe).await;
    session.handle_timer().await;

    assert_eq!(recorder.recoveries().len(), 1);
    assert_eq!(controller.sent().len(), 6);

    // Nothing is left to be matched against the replayed lines.
    let inbound = session.inbound_mut().expect("subscribed");
    assert!(inbound.lines.try_recv().is_err());
    let status = session.status();
    assert_eq!(status.acknowledged, 0);
    assert_eq!(status.buffer_used, 18);

    session.handle_line("ok").await;
    assert_eq!(recorder.successes(), vec![0]);
    assert_eq!(session.status().buffer_used, 12);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_reenables_check_mode() {
    let cfg = config(127);
    let ack = cfg.ack_timeout;
    let probe = cfg.probe_timeout;
    let mut session = StreamSession::new(cfg);
    let recorder = Recorder::new();
    session.register_observer(recorder.clone());
    session.load_commands("G0 X1\nG0 X2").expect("load");

    let (transport, controller) = mock_transport();
    session.start(transport, true).await.expect("start");
    session.handle_line("ok").await;
    assert_eq!(controller.sent(), vec!["$C", "G0 X1", "G0 X2"]);

    tokio::time::advance(ack).await;
    session.handle_timer().await;
    tokio::time::advance(probe).await;
    session.handle_timer().await;

    assert_eq!(recorder.recoveries().len(), 1);
    assert_eq!(
        controller.sent(),
        vec!["$C", "G0 X1", "G0 X2", "$C", "G0 X1", "G0 X2"]
    );
    let status = session.status();
    assert!(status.check_mode);
    assert_eq!(status.buffer_used, 3 + 6 + 6);

    for _ in 0..3 {
        session.handle_line("ok").await;
    }
    assert_eq!(controller.sent().last().map(String::as_str), Some("$C"));
    session.handle_line("ok").await;
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(recorder.successes(), vec![0, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_status_during_probe_rearms_primary_timer() {
    let cfg = config(127);
    let ack = cfg.ack_timeout;
    let (mut session, controller, _recorder) = started("G0 X0", cfg).await;

    tokio::time::advance(ack).await;
    session.handle_timer().await;
    session.handle_line("<Run|MPos:0,0,0|FS:100,0>").await;

    let deadline = session.next_deadline().expect("armed");
    assert_eq!(deadline, tokio::time::Instant::now() + ack);

    tokio::time::advance(ack).await;
    session.handle_timer().await;
    // Second probe, no reset yet.
    assert_eq!(
        controller.realtime(),
        vec![realtime::STATUS_QUERY, realtime::STATUS_QUERY]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_fails_session() {
    let cfg = StreamConfig {
        max_retries: 1,
        ..config(127)
    };
    let ack = cfg.ack_timeout;
    let probe = cfg.probe_timeout;
    let (mut session, controller, recorder) = started("G0 X0", cfg).await;

    tokio::time::advance(ack).await;
    session.handle_timer().await;
    tokio::time::advance(probe).await;
    session.handle_timer().await;
    assert_eq!(controller.sent(), vec!["G0 X0", "G0 X0"]);

    tokio::time::advance(ack).await;
    session.handle_timer().await;

    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(
        recorder.errors(),
        vec![StreamError::Timeout {
            index: 0,
            retries: 1
        }]
    );
    assert_eq!(
        recorder.pauses(),
        vec![PauseReason::RetriesExhausted { index: 0 }]
    );
    assert!(recorder.line_errors()[0].fatal);
    assert_eq!(session.next_deadline(), None);
    assert_eq!(controller.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_activity_after_stop() {
    let cfg = config(127);
    let ack = cfg.ack_timeout;
    let (mut session, controller, recorder) = started(THREE_EIGHT_BYTE_LINES, cfg).await;
    assert_eq!(controller.subscriber_count(), 1);

    session.stop().await;
    session.stop().await;

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.next_deadline(), None);
    assert_eq!(controller.subscriber_count(), 0);
    assert_eq!(controller.realtime(), vec![realtime::FEED_HOLD]);
    assert_eq!(controller.flushes(), 2);

    let events_before = recorder.events().len();
    tokio::time::advance(ack * 4).await;
    session.handle_timer().await;
    session.handle_line("ok").await;
    session.handle_line("ALARM:1").await;

    assert_eq!(recorder.events().len(), events_before);
    assert_eq!(controller.realtime(), vec![realtime::FEED_HOLD]);

    let (transport, _controller) = mock_transport();
    assert_eq!(
        session.start(transport, false).await,
        Err(StreamError::EmptyQueue)
    );
}

#[tokio::test]
async fn test_check_mode_wraps_job() {
    let mut session = StreamSession::new(config(127));
    let recorder = Recorder::new();
    session.register_observer(recorder.clone());
    session.load_commands("G0 X1\nG0 X2").expect("load");

    let (transport, controller) = mock_transport();
    session.start(transport, true).await.expect("start");

    assert_eq!(controller.sent(), vec!["$C", "G0 X1", "G0 X2"]);
    let status = session.status();
    assert!(status.check_mode);
    assert_eq!(status.sent, 2);
    assert_eq!(status.buffer_used, 3 + 6 + 6);

    for _ in 0..3 {
        session.handle_line("ok").await;
    }
    assert_eq!(controller.sent().last().map(String::as_str), Some("$C"));
    assert_eq!(session.state(), SessionState::Sending);

    session.handle_line("ok").await;
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(recorder.successes(), vec![0, 1]);
}

#[tokio::test]
async fn test_restart_after_completion_reruns_job() {
    let (mut session, _controller, _recorder) = started("G0 X1", config(127)).await;
    session.handle_line("ok").await;
    assert_eq!(session.state(), SessionState::Completed);

    let (transport, controller) = mock_transport();
    session.start(transport, false).await.expect("restart");
    assert_eq!(controller.sent(), vec!["G0 X1"]);
    assert_eq!(session.status().acknowledged, 0);
}

#[tokio::test]
async fn test_status_reports_current_line() {
    let (mut session, _controller, _recorder) = started(THREE_EIGHT_BYTE_LINES, config(8)).await;

    let status = session.status();
    assert_eq!(status.current_line.as_deref(), Some("G1 X100"));
    assert_eq!(status.buffer_capacity, 8);
    assert_eq!(status.total, 3);

    session.handle_line("ok").await;
    let status = session.status();
    assert_eq!(status.current_line.as_deref(), Some("G1 Y100"));
    assert_eq!(status.sent, 2);
    assert_eq!(status.buffer_capacity, 8);
}

#[tokio::test]
async fn test_unregistered_observer_is_silent() {
    let mut session = StreamSession::new(StreamConfig::default());
    let recorder = Recorder::new();
    let handle = session.register_observer(recorder.clone());
    assert!(session.unregister_observer(handle));

    session.load_commands("G0 X1").expect("load");
    let (transport, _controller) = mock_transport();
    session.start(transport, false).await.expect("start");

    assert!(recorder.events().is_empty());
}
