//! GRBL error and alarm code decoder
//!
//! Maps numeric `error:N` and `ALARM:N` codes to short descriptions for
//! line-error and alarm notifications.

/// Describe a GRBL `error:N` code
pub fn decode_error(code: u16) -> String {
    let text = match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing cycle not enabled",
        6 => "Step pulse time below 3us",
        7 => "EEPROM read failed, defaults restored",
        8 => "'$' command requires Idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line length exceeded",
        12 => "Step rate too high",
        13 => "Safety door open",
        14 => "Startup line too long for EEPROM",
        15 => "Jog target exceeds travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported G-code command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires an integer value",
        24 => "Conflicting axis words",
        25 => "Repeated G-code word",
        26 => "Missing axis words",
        27 => "Invalid line number",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words with G80",
        32 => "Arc has no axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing IJK offset",
        36 => "Unused G-code words",
        37 => "G43.1 offset on wrong axis",
        38 => "Tool number too large",
        39 => "Canned cycle not active",
        40 => "Missing value word",
        43 => "Spindle speed not set",
        45 => "Max step rate exceeded",
        60 => "Value out of range",
        69 => "Homing required",
        72 => "Not allowed in current state",
        74 => "Controller busy",
        _ => return format!("Unknown error code: {}", code),
    };
    text.to_string()
}

/// Describe a GRBL `ALARM:N` code
pub fn decode_alarm(code: u16) -> String {
    let text = match code {
        1 => "Hard limit triggered, re-home the machine",
        2 => "Soft limit, motion target exceeds travel",
        3 => "Reset while in motion, position may be lost",
        4 => "Probe fail, probe not in expected initial state",
        5 => "Probe fail, no contact within travel",
        6 => "Homing fail, reset during cycle",
        7 => "Homing fail, safety door opened",
        8 => "Homing fail, could not clear limit switch",
        9 => "Homing fail, limit switch not found",
        10 => "Limit switch already engaged",
        11 => "Homing required",
        12 => "E-stop asserted",
        13 => "Motor fault",
        _ => return format!("Unknown alarm code: {}", code),
    };
    text.to_string()
}
