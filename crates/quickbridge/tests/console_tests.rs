//! Console binding tests: level routing, message capture, positional fields

use std::rc::Rc;

use quickbridge::{Console, ConsoleLevel, MemorySink, RunContext, Runtime};

fn console_runtime() -> (Runtime, MemorySink) {
    let rt = Runtime::new().unwrap();
    let sink = MemorySink::new();
    let console = Console::with_sink(Rc::new(sink.clone()));
    rt.bind("console", &console.host_object()).unwrap();
    (rt, sink)
}

#[test]
fn test_console_log_captures_message() {
    let (rt, sink) = console_runtime();

    let ctx = RunContext::background();
    rt.run_string::<()>(&ctx, r#"console.log("a")"#).unwrap();

    let entry = sink.last().expect("nothing logged");
    assert_eq!(entry.message, "a");
    assert_eq!(entry.level, ConsoleLevel::Info);
    assert!(entry.fields.is_empty());
}

#[test]
fn test_console_levels() {
    let cases = [
        ("log", ConsoleLevel::Info),
        ("debug", ConsoleLevel::Debug),
        ("info", ConsoleLevel::Info),
        ("warn", ConsoleLevel::Warn),
        ("error", ConsoleLevel::Error),
    ];

    for (method, level) in cases {
        let (rt, sink) = console_runtime();
        let ctx = RunContext::background();
        rt.run_string::<()>(&ctx, &format!(r#"console.{method}("string")"#))
            .unwrap();

        let entry = sink.last().expect("nothing logged");
        assert_eq!(entry.level, level, "console.{method}");
        assert_eq!(entry.message, "string", "console.{method}");
    }
}

#[test]
fn test_console_positional_fields() {
    let cases: [(&str, &str, Vec<(&str, &str)>); 4] = [
        (r#""string""#, "string", vec![]),
        (r#""string","a","b""#, "string", vec![("0", "a"), ("1", "b")]),
        // Numbers coerce to their string form.
        (r#""string",1,2"#, "string", vec![("0", "1"), ("1", "2")]),
        // A lone object coerces through the engine's toString.
        (r#"{}"#, "[object Object]", vec![]),
    ];

    for (args, message, fields) in cases {
        let (rt, sink) = console_runtime();
        let ctx = RunContext::background();
        rt.run_string::<()>(&ctx, &format!("console.log({args})"))
            .unwrap();

        let entry = sink.last().expect("nothing logged");
        assert_eq!(entry.message, message, "console.log({args})");
        let expected: Vec<(String, String)> = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(entry.fields, expected, "console.log({args})");
    }
}

#[test]
fn test_console_entries_accumulate_in_order() {
    let (rt, sink) = console_runtime();
    let ctx = RunContext::background();
    rt.run_string::<()>(&ctx, r#"console.info("one"); console.warn("two"); console.error("three")"#)
        .unwrap();

    let entries = sink.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].message, "one");
    assert_eq!(entries[1].message, "two");
    assert_eq!(entries[2].message, "three");
    assert_eq!(entries[1].level, ConsoleLevel::Warn);
}
