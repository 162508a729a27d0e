use gcodestream_communication::firmware::grbl::response_parser::GrblResponse;

#[test]
fn test_parse_ok() {
    assert_eq!(GrblResponse::classify("ok"), Some(GrblResponse::Ok));
    assert_eq!(GrblResponse::classify("OK\r\n"), Some(GrblResponse::Ok));
    assert!(GrblResponse::Ok.is_acknowledgment());
}

#[test]
fn test_parse_error() {
    let response = GrblResponse::classify("error:23");
    assert!(matches!(
        response,
        Some(GrblResponse::Error { code: Some(23), .. })
    ));
    assert!(response.is_some_and(|r| r.is_acknowledgment()));
}

#[test]
fn test_parse_textual_error() {
    assert_eq!(
        GrblResponse::classify("error:Bad number format"),
        Some(GrblResponse::Error {
            code: None,
            text: "Bad number format".into()
        })
    );
}

#[test]
fn test_parse_alarm() {
    let response = GrblResponse::classify("ALARM:6");
    match response {
        Some(GrblResponse::Alarm { code, text }) => {
            assert_eq!(code, Some(6));
            assert!(text.contains("Homing fail"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!GrblResponse::classify("alarm:6").is_some_and(|r| r.is_acknowledgment()));
}

#[test]
fn test_parse_status_report() {
    let line = "<Idle|MPos:0.000,0.000,0.000|FS:0,0>";
    assert_eq!(
        GrblResponse::classify(line),
        Some(GrblResponse::Status(line.to_string()))
    );
}

#[test]
fn test_parse_other_lines_are_messages() {
    for line in ["Grbl 1.1h ['$' for help]", "[MSG:'$H'|'$X' to unlock]", "$130=200.000"] {
        assert_eq!(
            GrblResponse::classify(line),
            Some(GrblResponse::Message(line.to_string()))
        );
    }
}

#[test]
fn test_display() {
    assert_eq!(
        GrblResponse::classify("error:9").map(|r| r.to_string()),
        Some("error:9 - G-code locked out during alarm or jog".to_string())
    );
}
