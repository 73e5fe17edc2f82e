use serde_json::json;

use vmprov::session::{Classified, ResultRecord, StatusUpdate, classify, record_message};

#[test]
fn status_update_is_decoded() {
    let c = classify(json!({
        "Type": "StatusUpdate",
        "PercentComplete": 40,
        "StatusMessage": "Copying image"
    }));
    assert_eq!(c, Classified::Status(StatusUpdate::new(40, "Copying image")));
}

#[test]
fn result_is_decoded_and_echo_fields_ignored() {
    let c = classify(json!({
        "Type": "Result",
        "Success": true,
        "Message": "done",
        "VMName": "X",
        "CPUCount": 2
    }));
    assert_eq!(
        c,
        Classified::Result(ResultRecord {
            success: true,
            message: "done".to_string()
        })
    );
}

#[test]
fn field_names_and_tag_ignore_case() {
    let c = classify(json!({
        "type": "statusupdate",
        "percentcomplete": "75",
        "statusmessage": "Almost"
    }));
    assert_eq!(c, Classified::Status(StatusUpdate::new(75, "Almost")));

    let r = classify(json!({ "TYPE": "RESULT", "success": "False", "message": "nope" }));
    assert_eq!(
        r,
        Classified::Result(ResultRecord {
            success: false,
            message: "nope".to_string()
        })
    );
}

#[test]
fn percent_is_clamped_and_defaults_to_zero() {
    let over = classify(json!({ "Type": "StatusUpdate", "PercentComplete": 250 }));
    let under = classify(json!({ "Type": "StatusUpdate", "PercentComplete": -5 }));
    let fractional = classify(json!({ "Type": "StatusUpdate", "PercentComplete": 33.9 }));
    let missing = classify(json!({ "Type": "StatusUpdate", "StatusMessage": "m" }));

    let percent = |c: Classified| match c {
        Classified::Status(u) => u.percent_complete,
        other => panic!("expected status, got {other:?}"),
    };
    assert_eq!(percent(over), 100);
    assert_eq!(percent(under), 0);
    assert_eq!(percent(fractional), 33);
    assert_eq!(percent(missing), 0);
}

#[test]
fn untagged_or_unknown_records_are_plain() {
    for value in [
        json!("hello"),
        json!(42),
        json!([1, 2, 3]),
        json!({ "Name": "disk0" }),
        json!({ "Type": "Telemetry", "Value": 1 }),
        json!({ "Type": 7 }),
    ] {
        assert_eq!(classify(value.clone()), Classified::Plain(value));
    }
}

#[test]
fn result_without_success_is_a_failure() {
    let c = classify(json!({ "Type": "Result", "Message": "?" }));
    assert_eq!(
        c,
        Classified::Result(ResultRecord {
            success: false,
            message: "?".to_string()
        })
    );
}

#[test]
fn record_message_prefers_message_field() {
    assert_eq!(record_message(&json!("disk full")), "disk full");
    assert_eq!(
        record_message(&json!({ "message": "switch missing", "code": 3 })),
        "switch missing"
    );
    assert_eq!(record_message(&json!({ "code": 3 })), r#"{"code":3}"#);
}
