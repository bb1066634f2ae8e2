mod common;

use common::{context, converter, flat};
use flatehr_core::{ErrorKind, FlatComposition};
use flatehr_types::Scalar;
use openehr::{ContentItem, DataValue, Item};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const TEMPERATURE: &str = "vital_signs/body_temperature:0/any_event:0/temperature";
const FEBRILE: &str = "vital_signs/body_temperature:0/any_event:0/febrile";

fn round_trip(input: &FlatComposition) -> FlatComposition {
    let (converter, source) = converter("vital_signs.v1");
    let raw = converter
        .flat_to_raw(&source, "en", input, &context())
        .expect("flat should build");
    converter
        .raw_to_flat(&source, "en", &raw, &context())
        .expect("raw should extract")
}

fn key_position(object: &Value, key: &str) -> usize {
    object
        .as_object()
        .and_then(|object| object.keys().position(|candidate| candidate == key))
        .unwrap_or_else(|| panic!("missing key '{key}' in {object}"))
}

#[test]
fn flat_round_trip_keeps_every_input_key() {
    let input = flat(&[
        (
            "vital_signs/body_temperature:0/any_event:0/temperature|magnitude",
            Scalar::text("37.7"),
        ),
        (
            "vital_signs/body_temperature:0/any_event:0/temperature|unit",
            Scalar::text("°C"),
        ),
        (FEBRILE, Scalar::Bool(false)),
        ("vital_signs/body_temperature:0/site|code", Scalar::text("at0022")),
        ("vital_signs/body_temperature:0/comment", Scalar::text("after exercise")),
    ]);
    let output = round_trip(&input);

    assert_eq!(
        output.get(&format!("{TEMPERATURE}|magnitude")),
        Some(&Scalar::Decimal(37.7))
    );
    assert_eq!(
        output.get(&format!("{TEMPERATURE}|unit")),
        Some(&Scalar::text("°C"))
    );
    assert_eq!(output.get(FEBRILE), Some(&Scalar::Bool(false)));
    assert_eq!(
        output.get("vital_signs/body_temperature:0/site|code"),
        Some(&Scalar::text("at0022"))
    );
    assert_eq!(
        output.get("vital_signs/body_temperature:0/site|value"),
        Some(&Scalar::text("Oral"))
    );
    assert_eq!(
        output.get("vital_signs/body_temperature:0/comment"),
        Some(&Scalar::text("after exercise"))
    );
}

#[test]
fn boolean_literals_extract_as_booleans() {
    let output = round_trip(&flat(&[(FEBRILE, Scalar::text("true"))]));
    assert_eq!(output.get(FEBRILE), Some(&Scalar::Bool(true)));
}

#[test]
fn null_flavour_replaces_the_value() {
    let (converter, source) = converter("vital_signs.v1");
    let input = flat(&[(
        "vital_signs/body_temperature:0/any_event:0/temperature/_null_flavour|code",
        Scalar::text("253"),
    )]);
    let raw = converter
        .flat_to_raw(&source, "en", &input, &context())
        .expect("flat should build");

    let Some(ContentItem::Observation(observation)) = raw.content.first() else {
        panic!("expected an observation");
    };
    let Some(Item::Element(element)) = observation.data.events[0].data().items().first() else {
        panic!("expected an element");
    };
    assert!(element.value.is_none());
    let null_flavour = element.null_flavour.as_ref().expect("null flavour");
    assert_eq!(null_flavour.value, "unknown");

    let output = converter
        .raw_to_flat(&source, "en", &raw, &context())
        .expect("raw should extract");
    let prefix = format!("{TEMPERATURE}/_null_flavour");
    assert_eq!(output.get(&format!("{prefix}|code")), Some(&Scalar::text("253")));
    assert_eq!(output.get(&format!("{prefix}|value")), Some(&Scalar::text("unknown")));
    assert_eq!(output.get(&format!("{prefix}|terminology")), Some(&Scalar::text("openehr")));
    assert!(output.get(&format!("{TEMPERATURE}|magnitude")).is_none());
}

#[test]
fn blank_instances_leave_no_trace() {
    let (converter, source) = converter("vital_signs.v1");
    let input = flat(&[
        (
            "vital_signs/body_temperature:0/any_event:0/temperature|magnitude",
            Scalar::text(" "),
        ),
        ("vital_signs/body_temperature:0/comment", Scalar::text("")),
        (
            "vital_signs/body_temperature:1/any_event:0/temperature|magnitude",
            Scalar::Decimal(38.4),
        ),
        (
            "vital_signs/body_temperature:1/any_event:0/temperature|unit",
            Scalar::text("°C"),
        ),
    ]);
    let raw = converter
        .flat_to_raw(&source, "en", &input, &context())
        .expect("flat should build");
    assert_eq!(raw.content.len(), 1);

    let output = converter
        .raw_to_flat(&source, "en", &raw, &context())
        .expect("raw should extract");
    assert_eq!(
        output.get("vital_signs/body_temperature:0/any_event:0/temperature|magnitude"),
        Some(&Scalar::Decimal(38.4))
    );
    assert!(output.keys().all(|key| !key.contains("body_temperature:1")));
}

#[test]
fn repeated_instances_are_renumbered_without_gaps() {
    let input = flat(&[
        ("vital_signs/body_temperature:0/comment", Scalar::text("first")),
        (
            "vital_signs/body_temperature:2/any_event:0/temperature|magnitude",
            Scalar::Decimal(36.9),
        ),
        (
            "vital_signs/body_temperature:2/any_event:0/temperature|unit",
            Scalar::text("°C"),
        ),
        ("vital_signs/body_temperature:5/any_event:3/febrile", Scalar::Bool(true)),
    ]);
    let output = round_trip(&input);

    let indices: Vec<&str> = output
        .keys()
        .filter_map(|key| key.strip_prefix("vital_signs/body_temperature:"))
        .filter_map(|rest| rest.split('/').next())
        .fold(Vec::new(), |mut seen, index| {
            if !seen.contains(&index) {
                seen.push(index);
            }
            seen
        });
    assert_eq!(indices, vec!["0", "1", "2"]);
    assert_eq!(
        output.get("vital_signs/body_temperature:2/any_event:0/febrile"),
        Some(&Scalar::Bool(true))
    );
}

#[test]
fn structured_output_follows_schema_order() {
    let (converter, source) = converter("vital_signs.v1");
    let structured = json!({
        "vital_signs": {
            "body_temperature": [{
                "comment": "shuffled",
                "site": { "|code": "at0023" },
                "any_event": [{
                    "febrile": true,
                    "temperature": { "|magnitude": 37.2, "|unit": "°C" }
                }]
            }]
        }
    });
    let raw = converter
        .structured_to_raw(&source, "en", &structured, &context())
        .expect("structured should build");
    let output = converter
        .raw_to_structured(&source, "en", &raw, &context())
        .expect("raw should extract");

    let observation = &output["vital_signs"]["body_temperature"][0];
    assert!(key_position(observation, "any_event") < key_position(observation, "site"));
    assert!(key_position(observation, "site") < key_position(observation, "comment"));
    let event = &observation["any_event"][0];
    assert!(key_position(event, "temperature") < key_position(event, "febrile"));
    assert_eq!(event["febrile"], json!([true]));
    assert_eq!(event["temperature"][0]["|magnitude"], json!(37.2));
    assert_eq!(observation["site"][0]["|value"], json!("Axillary"));
}

#[test]
fn shuffled_raw_json_extracts_in_schema_order() {
    let (converter, source) = converter("vital_signs.v1");
    let input = flat(&[
        (
            "vital_signs/body_temperature:0/any_event:0/temperature|magnitude",
            Scalar::Decimal(36.8),
        ),
        (
            "vital_signs/body_temperature:0/any_event:0/temperature|unit",
            Scalar::text("°C"),
        ),
        (FEBRILE, Scalar::Bool(false)),
    ]);
    let raw = converter
        .flat_to_raw(&source, "en", &input, &context())
        .expect("flat should build");

    let text = openehr::write_composition_json(&raw).expect("raw should serialize");
    let mut document: Value = serde_json::from_str(&text).expect("canonical JSON");
    let items = document["content"][0]["data"]["events"][0]["data"]["items"]
        .as_array_mut()
        .expect("event items");
    assert_eq!(items.len(), 2);
    items.reverse();
    let shuffled = openehr::composition_from_value(document).expect("shuffled raw should parse");

    let output = converter
        .raw_to_structured(&source, "en", &shuffled, &context())
        .expect("raw should extract");
    let event = &output["vital_signs"]["body_temperature"][0]["any_event"][0];
    assert!(key_position(event, "temperature") < key_position(event, "febrile"));
    assert_eq!(event["temperature"][0]["|magnitude"], json!(36.8));
}

#[test]
fn structured_and_flat_inputs_build_the_same_values() {
    let (converter, source) = converter("vital_signs.v1");
    let structured = json!({
        "vital_signs": {
            "body_temperature": [{
                "any_event": [{ "temperature": { "|magnitude": 39.0, "|unit": "°C" } }]
            }]
        }
    });
    let via_structured = converter
        .structured_to_flat(&source, "en", &structured, &context())
        .expect("structured should convert");
    assert_eq!(
        via_structured.get(&format!("{TEMPERATURE}|magnitude")),
        Some(&Scalar::Decimal(39.0))
    );
}

#[test]
fn each_failure_reports_its_kind_and_path() {
    let (converter, source) = converter("vital_signs.v1");
    let cases = [
        (
            "vital_signs/body_temperature:0/pulse",
            Scalar::text("72"),
            ErrorKind::PathResolution,
        ),
        (
            "vital_signs/body_temperature:0/any_event:0/temperature|magnitude",
            Scalar::text("warm"),
            ErrorKind::TypeCoercion,
        ),
        (
            "vital_signs/body_temperature:0/site|code",
            Scalar::text("at0099"),
            ErrorKind::Vocabulary,
        ),
        (
            "vital_signs/body_temperature:0/any_event:0/febrile",
            Scalar::text("maybe"),
            ErrorKind::TypeCoercion,
        ),
    ];
    for (path, literal, kind) in cases {
        let err = converter
            .flat_to_raw(&source, "en", &flat(&[(path, literal)]), &context())
            .expect_err("conversion should fail");
        assert_eq!(err.kind(), kind, "unexpected error for {path}: {err}");
        assert!(
            err.path().is_some_and(|reported| reported.starts_with("vital_signs/")),
            "error for {path} reported {:?}",
            err.path()
        );
    }
}

#[test]
fn call_context_fills_composition_defaults() {
    let (converter, source) = converter("vital_signs.v1");
    let input = flat(&[
        (FEBRILE, Scalar::Bool(true)),
        ("ctx/language", Scalar::text("de")),
        ("ctx/territory", Scalar::text("AT")),
        ("ctx/composer_name", Scalar::text("Dr. Ines Huber")),
    ]);
    let raw = converter
        .flat_to_raw(&source, "en", &input, &context())
        .expect("flat should build");
    assert_eq!(raw.language.code_string, "de");
    assert_eq!(raw.territory.code_string, "AT");

    let output = converter
        .raw_to_flat(&source, "en", &raw, &context())
        .expect("raw should extract");
    assert_eq!(output.get("vital_signs/composer|name"), Some(&Scalar::text("Dr. Ines Huber")));
    assert!(matches!(
        raw.content.first(),
        Some(ContentItem::Observation(observation))
            if observation.data.events.len() == 1
                && matches!(
                    observation.data.events[0].data().items().first(),
                    Some(Item::Element(element))
                        if matches!(element.value, Some(DataValue::Boolean(_)))
                )
    ));
}

#[test]
fn other_reference_ranges_keep_their_indices_and_meanings() {
    let ranges = format!("{TEMPERATURE}/_other_reference_ranges");
    let input: Vec<(String, Scalar)> = vec![
        (format!("{TEMPERATURE}|magnitude"), Scalar::Decimal(38.2)),
        (format!("{TEMPERATURE}|unit"), Scalar::text("°C")),
        (format!("{ranges}:0/meaning"), Scalar::text("hypothermia")),
        (format!("{ranges}:0|unit"), Scalar::text("°C")),
        (format!("{ranges}:0/lower|magnitude"), Scalar::Decimal(35.0)),
        (format!("{ranges}:1/meaning|code"), Scalar::text("at0050")),
        (format!("{ranges}:1/meaning|value"), Scalar::text("Fever")),
        (format!("{ranges}:1/meaning|terminology"), Scalar::text("local")),
        (format!("{ranges}:1|unit"), Scalar::text("°C")),
        (format!("{ranges}:1/upper|magnitude"), Scalar::Decimal(38.0)),
    ];
    let input: FlatComposition = input.into_iter().collect();
    let output = round_trip(&input);

    assert_eq!(
        output.get(&format!("{ranges}:0/meaning")),
        Some(&Scalar::text("hypothermia"))
    );
    assert_eq!(
        output.get(&format!("{ranges}:0/lower|magnitude")),
        Some(&Scalar::Decimal(35.0))
    );
    assert!(output.get(&format!("{ranges}:0/upper|magnitude")).is_none());
    assert_eq!(
        output.get(&format!("{ranges}:1/meaning|code")),
        Some(&Scalar::text("at0050"))
    );
    assert_eq!(
        output.get(&format!("{ranges}:1/meaning|value")),
        Some(&Scalar::text("Fever"))
    );
    assert_eq!(
        output.get(&format!("{ranges}:1/meaning|terminology")),
        Some(&Scalar::text("local"))
    );
    assert_eq!(
        output.get(&format!("{ranges}:1/upper|magnitude")),
        Some(&Scalar::Decimal(38.0))
    );
}

#[test]
fn reference_ranges_need_both_meaning_and_bound() {
    let (converter, source) = converter("vital_signs.v1");
    let ranges = format!("{TEMPERATURE}/_other_reference_ranges:0");
    let value = [
        (format!("{TEMPERATURE}|magnitude"), Scalar::Decimal(37.0)),
        (format!("{TEMPERATURE}|unit"), Scalar::text("°C")),
    ];
    let cases = [
        (
            vec![(format!("{ranges}/meaning"), Scalar::text("normal"))],
            format!("{ranges}/lower"),
        ),
        (
            vec![
                (format!("{ranges}|unit"), Scalar::text("°C")),
                (format!("{ranges}/lower|magnitude"), Scalar::Decimal(36.0)),
            ],
            format!("{ranges}/meaning"),
        ),
    ];
    for (entries, expected_path) in cases {
        let input: FlatComposition = value.iter().cloned().chain(entries).collect();
        let err = converter
            .flat_to_raw(&source, "en", &input, &context())
            .expect_err("incomplete reference range");
        assert_eq!(err.kind(), ErrorKind::Vocabulary, "unexpected error: {err}");
        assert_eq!(err.path(), Some(expected_path.as_str()));
    }
}

#[test]
fn mapping_purpose_codes_need_a_display_value() {
    let (converter, source) = converter("vital_signs.v1");
    let mapping = "vital_signs/body_temperature:0/comment/_mapping:0";
    let input = flat(&[
        ("vital_signs/body_temperature:0/comment", Scalar::text("after exercise")),
        (
            "vital_signs/body_temperature:0/comment/_mapping:0/target|terminology",
            Scalar::text("SNOMED-CT"),
        ),
        (
            "vital_signs/body_temperature:0/comment/_mapping:0/target|code",
            Scalar::text("386661006"),
        ),
        (
            "vital_signs/body_temperature:0/comment/_mapping:0/purpose|code",
            Scalar::text("999"),
        ),
        (
            "vital_signs/body_temperature:0/comment/_mapping:0/purpose|terminology",
            Scalar::text("local"),
        ),
    ]);
    let err = converter
        .flat_to_raw(&source, "en", &input, &context())
        .expect_err("purpose without display value");
    assert_eq!(err.kind(), ErrorKind::Vocabulary);
    assert_eq!(err.path(), Some(format!("{mapping}/purpose|value").as_str()));
    assert_eq!(err.literal(), Some("999"));
}
