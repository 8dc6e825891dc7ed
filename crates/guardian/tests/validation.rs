use guardian_core::{Guardian, LogLevel, Schema, ValidateOptions};
use guardian_testing::RecordingLogger;
use serde::Deserialize;
use serde_json::{json, Value};

fn guardian(logger: &RecordingLogger) -> Guardian {
    Guardian::builder().logger(logger.handle()).build().unwrap()
}

fn order_schema() -> Schema {
    Schema::object()
        .field("sku", Schema::string().min_length(1))
        .field("qty", Schema::number().min(0.0).max(10.0))
        .field("status", Schema::enumeration(["a", "b", "c"]))
        .field("gift", Schema::boolean())
        .optional_field("tags", Schema::sequence(Schema::string()))
        .into()
}

#[test]
fn test_numeric_bounds_clamp() {
    let guardian = guardian(&RecordingLogger::new());
    let schema: Schema = Schema::number().min(0.0).max(10.0).into();

    for (input, expected, warns) in [(json!(15), json!(10), true), (json!(-3), json!(0), true), (json!(5), json!(5), false)] {
        let result = guardian.validate(&input, &schema, ValidateOptions::default()).unwrap();
        assert!(result.success);
        assert_eq!(result.data, Some(expected));
        assert_eq!(!result.warnings.is_empty(), warns, "input {}", input);
    }
}

#[test]
fn test_enum_normalization_and_fallback() {
    let guardian = guardian(&RecordingLogger::new());
    let schema = Schema::enumeration(["a", "b", "c"]);

    let normalized = guardian.validate(&json!("B"), &schema, ValidateOptions::default()).unwrap();
    assert_eq!(normalized.data, Some(json!("b")));
    assert_eq!(normalized.warnings.len(), 1);

    let fallback = guardian.validate(&json!("z"), &schema, ValidateOptions::default()).unwrap();
    assert_eq!(fallback.data, Some(json!("a")));
    assert_eq!(fallback.warnings.len(), 1);
}

#[test]
fn test_messy_record_is_sanitized() {
    let logger = RecordingLogger::new();
    let guardian = guardian(&logger);

    let result = guardian
        .validate(
            &json!({
                "sku": "  A-100 ",
                "qty": " 12 ",
                "status": "C",
                "gift": "TRUE",
                "tags": [" blue "],
                "internal_note": "drop me"
            }),
            &order_schema(),
            ValidateOptions::default(),
        )
        .unwrap();

    assert!(result.success);
    assert_eq!(
        result.data,
        Some(json!({ "sku": "A-100", "qty": 10, "status": "c", "gift": true, "tags": ["blue"] }))
    );
    assert_eq!(result.warnings.len(), 4);
    assert_eq!(logger.count(LogLevel::Warn), 1);

    #[derive(Debug, Deserialize)]
    struct Order {
        sku: String,
        qty: u32,
        gift: bool,
    }
    let order: Order = result.data_as().unwrap();
    assert_eq!(order.sku, "A-100");
    assert_eq!(order.qty, 10);
    assert!(order.gift);
}

#[test]
fn test_failure_carries_structured_context() {
    let logger = RecordingLogger::new();
    let guardian = guardian(&logger);
    let input = json!({ "sku": "", "qty": "lots", "status": "a" });

    let result = guardian.validate(&input, &order_schema(), ValidateOptions::default()).unwrap();

    assert!(!result.success);
    assert!(result.data.is_none());
    let error = result.error.unwrap();
    assert_eq!(error.code(), "VALIDATION_ERROR");
    let context = error.context().unwrap();
    assert_eq!(context.input.as_ref(), Some(&input));
    assert_eq!(context.expected.as_ref().unwrap()["kind"], "object");
    assert_eq!(context.actual.as_ref().unwrap()["qty"], "lots");

    let paths: Vec<&str> = context.metadata.as_ref().unwrap()["issues"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|issue| issue["path"].as_str())
        .collect();
    assert_eq!(paths, vec!["/sku", "/qty", "/gift"]);
    assert_eq!(logger.count(LogLevel::Error), 1);
}

#[test]
fn test_strict_mode_rejects_instead_of_coercing() {
    let guardian = guardian(&RecordingLogger::new());
    let input = json!({ "sku": "A-1", "qty": "3", "status": "a", "gift": false });

    let err = guardian
        .validate(&input, &order_schema(), ValidateOptions::strict().throwing())
        .unwrap_err();

    assert!(err.message().contains("/qty"));
}

#[test]
fn test_quiet_failures_are_not_logged() {
    let logger = RecordingLogger::new();
    let guardian = guardian(&logger);

    let result = guardian
        .validate(&json!(42), &Schema::string().into(), ValidateOptions::default().quiet())
        .unwrap();

    assert!(!result.success);
    assert!(logger.entries().is_empty());
}

#[test]
fn test_batch_partitions_without_aborting() {
    let guardian = guardian(&RecordingLogger::new());
    let items = vec![
        json!({ "sku": "A", "qty": 1, "status": "a", "gift": false }),
        json!({ "sku": "B", "status": "b", "gift": true }),
        json!({ "sku": "C", "qty": "20", "status": "x", "gift": "false" }),
    ];

    let batch = guardian.validate_batch(&items, &order_schema(), ValidateOptions::default().throwing());

    assert_eq!(batch.successful.len(), 2);
    assert_eq!(batch.failed.len(), 1);
    assert_eq!(batch.failed[0].item, items[1]);
    assert_eq!(batch.successful[1]["qty"], 10);
    // "20" parsed and clamped, "x" defaulted, "false" coerced.
    assert_eq!(batch.warnings.len(), 4);
}

#[test]
fn test_schema_from_json_matches_builder() {
    let schema: Schema = serde_json::from_value(json!({
        "kind": "object",
        "fields": [
            { "name": "sku", "schema": { "kind": "string", "min_length": 1 } },
            { "name": "qty", "schema": { "kind": "number", "min": 0.0, "max": 10.0 } },
            { "name": "status", "schema": { "kind": "enumeration", "values": ["a", "b", "c"] } },
            { "name": "gift", "schema": { "kind": "boolean" } },
            { "name": "tags", "schema": { "kind": "sequence", "items": { "kind": "string" } }, "optional": true }
        ]
    }))
    .unwrap();

    assert_eq!(schema, order_schema());
}

fn random_record(rng: &mut fastrand::Rng) -> Value {
    let sku: String = (0..rng.usize(1..8)).map(|_| rng.alphanumeric()).collect();
    let padded_sku = format!("{}{}{}", " ".repeat(rng.usize(0..3)), sku, " ".repeat(rng.usize(0..3)));
    let qty = match rng.u8(0..3) {
        0 => json!(rng.i64(-20..30)),
        1 => json!(format!(" {} ", rng.i64(-20..30))),
        _ => json!(rng.f64() * 40.0 - 10.0),
    };
    let status = ["a", "B", "c", "zz", "A"][rng.usize(0..5)];
    let gift = match rng.u8(0..3) {
        0 => json!(rng.bool()),
        1 => json!("True"),
        _ => json!(" false"),
    };
    json!({ "sku": padded_sku, "qty": qty, "status": status, "gift": gift, "extra": rng.u32(..) })
}

#[test]
fn test_sanitizing_valid_output_is_idempotent() {
    let guardian = guardian(&RecordingLogger::new());
    let schema = order_schema();
    let mut rng = fastrand::Rng::with_seed(0x5a17);

    for _ in 0..200 {
        let record = random_record(&mut rng);
        let first = guardian.validate(&record, &schema, ValidateOptions::default().quiet()).unwrap();
        assert!(first.success, "record {} failed: {:?}", record, first.error);

        let data = first.data.unwrap();
        let second = guardian.validate(&data, &schema, ValidateOptions::default().quiet()).unwrap();
        assert_eq!(second.data.as_ref(), Some(&data));
        assert!(second.warnings.is_empty(), "second pass warned: {:?}", second.warnings);
    }
}
