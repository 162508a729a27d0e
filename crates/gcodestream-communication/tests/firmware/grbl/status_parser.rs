use gcodestream_communication::firmware::grbl::StatusParser;
use gcodestream_core::{BufferReport, Position};

#[test]
fn test_grbl_1_1_report() {
    let status =
        StatusParser::parse("<Run|MPos:12.500,-3.250,0.000|Bf:15,120|FS:1500,12000|WCO:2,3,4>")
            .expect("status");

    assert_eq!(status.state, "Run");
    assert_eq!(status.machine_position, Position::new(12.5, -3.25, 0.0));
    assert_eq!(status.work_position(), Position::new(10.5, -6.25, -4.0));
    assert_eq!(status.feed_rate, 1500.0);
    assert_eq!(status.spindle_speed, 12000.0);
    assert_eq!(
        status.buffer,
        Some(BufferReport {
            planner_blocks: 15,
            rx_bytes: 120
        })
    );
}

#[test]
fn test_legacy_buf_field() {
    let status = StatusParser::parse("<Idle|MPos:0,0,0|Buf:0,128>").expect("status");
    assert_eq!(status.buffer.map(|b| b.rx_bytes), Some(128));
}

#[test]
fn test_alarm_state() {
    let status = StatusParser::parse("<Alarm|MPos:0.000,0.000,0.000>").expect("status");
    assert!(status.is_alarm());
    assert_eq!(status.feed_rate, 0.0);
    assert_eq!(status.work_offset, Position::default());
}

#[test]
fn test_unterminated_report_is_tolerated() {
    let status = StatusParser::parse("<Jog|MPos:1,2,3").expect("status");
    assert_eq!(status.state, "Jog");
    assert_eq!(status.machine_position, Position::new(1.0, 2.0, 3.0));
}

#[test]
fn test_missing_state_defaults_to_unknown() {
    let status = StatusParser::parse("<MPos:1,1,1|FS:10,0>").expect("status");
    assert_eq!(status.state, "Unknown");
}
