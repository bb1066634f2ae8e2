mod common;

use common::{context, converter, flat};
use flatehr_core::{ContextKey, ConversionContext, ErrorKind};
use flatehr_types::Scalar;
use openehr::{Action, Composition, ContentItem};
use pretty_assertions::assert_eq;

const SECTION: &str = "medication/medication_list";
const INSTRUCTION_PREFIX: &str = "/content[openEHR-EHR-SECTION.medication_list.v0]/items";

fn actions(composition: &Composition) -> Vec<&Action> {
    let mut found = Vec::new();
    composition.walk_content(&mut |item| {
        if let ContentItem::Action(action) = item {
            found.push(action);
        }
    });
    found
}

fn build(entries: &[(&str, Scalar)]) -> Composition {
    let (converter, source) = converter("medication.v1");
    converter
        .flat_to_raw(&source, "en", &flat(entries), &context())
        .expect("flat should build")
}

#[test]
fn instruction_uid_becomes_a_uid_predicate() {
    let composition = build(&[
        (
            "medication/medication_list/medication_instruction:0/order:0/medicine",
            Scalar::text("Aspirin 75 mg"),
        ),
        (
            "medication/medication_list/medication_management:0/comment",
            Scalar::text("Administered"),
        ),
        (
            "medication/medication_list/medication_management:0/_instruction_details|instruction_uid",
            Scalar::text("insuid"),
        ),
    ]);
    let actions = actions(&composition);
    let details = actions[0]
        .instruction_details
        .as_ref()
        .expect("instruction details");
    let path = details.instruction_id.path.as_deref().expect("path");
    assert!(
        path.ends_with("items[openEHR-EHR-INSTRUCTION.medication.v1 and uid/value='insuid']"),
        "unexpected path {path}"
    );
    assert_eq!(details.instruction_id.namespace, "local");
    assert_eq!(details.instruction_id.type_, "INSTRUCTION");
    assert_eq!(details.instruction_id.id.value, "self");
}

#[test]
fn instruction_index_becomes_an_ordinal_name() {
    let composition = build(&[
        (
            "medication/medication_list/medication_instruction:0/order:0/medicine",
            Scalar::text("Aspirin 75 mg"),
        ),
        (
            "medication/medication_list/medication_management:0/comment",
            Scalar::text("Administered"),
        ),
        (
            "medication/medication_list/medication_management:0/_instruction_details|instruction_index",
            Scalar::text("2"),
        ),
    ]);
    let details = actions(&composition)[0]
        .instruction_details
        .clone()
        .expect("instruction details");
    assert_eq!(
        details.instruction_id.path,
        Some(format!(
            "{INSTRUCTION_PREFIX}[openEHR-EHR-INSTRUCTION.medication.v1,'Medication instruction #3']"
        ))
    );
}

#[test]
fn activity_indices_name_the_order_entries() {
    let composition = build(&[
        (
            "medication/medication_list/medication_instruction:0/order:0/medicine",
            Scalar::text("Aspirin 75 mg"),
        ),
        (
            "medication/medication_list/medication_instruction:0/order:1/medicine",
            Scalar::text("Paracetamol 1 g"),
        ),
        (
            "medication/medication_list/medication_management:0/comment",
            Scalar::text("First order given"),
        ),
        (
            "medication/medication_list/medication_management:0/_instruction_details|instruction_index",
            Scalar::Integer(0),
        ),
        (
            "medication/medication_list/medication_management:0/_instruction_details|activity_index",
            Scalar::Integer(0),
        ),
        (
            "medication/medication_list/medication_management:1/comment",
            Scalar::text("Second order given"),
        ),
        (
            "medication/medication_list/medication_management:1/_instruction_details|instruction_index",
            Scalar::Integer(0),
        ),
        (
            "medication/medication_list/medication_management:1/_instruction_details|activity_index",
            Scalar::Integer(1),
        ),
    ]);
    let activity_ids: Vec<&str> = actions(&composition)
        .iter()
        .filter_map(|action| action.instruction_details.as_ref())
        .map(|details| details.activity_id.as_str())
        .collect();
    assert_eq!(
        activity_ids,
        vec!["activities[at0001]", "activities[at0001,'Order #2']"]
    );
}

#[test]
fn handler_flag_derives_hints_on_extraction() {
    let (converter, source) = converter("medication.v1");
    let input = flat(&[
        (
            "medication/medication_list/medication_instruction:0/order:0/medicine",
            Scalar::text("Aspirin 75 mg"),
        ),
        (
            "medication/medication_list/medication_instruction:1/order:0/medicine",
            Scalar::text("Paracetamol 1 g"),
        ),
        (
            "medication/medication_list/medication_management:0/comment",
            Scalar::text("Given"),
        ),
        (
            "medication/medication_list/medication_management:0/_instruction_details|instruction_index",
            Scalar::Integer(1),
        ),
    ]);
    let handler = ConversionContext::new().with(ContextKey::ActionToInstructionHandler, true);
    let raw = converter
        .flat_to_raw(&source, "en", &input, &handler)
        .expect("flat should build");

    let details = format!("{SECTION}/medication_management:0/_instruction_details");
    let plain = converter
        .raw_to_flat(&source, "en", &raw, &context())
        .expect("raw should extract");
    assert!(plain.get(&format!("{details}|path")).is_some());
    assert!(plain.get(&format!("{details}|instruction_index")).is_none());

    let derived = converter
        .raw_to_flat(&source, "en", &raw, &handler)
        .expect("raw should extract");
    assert_eq!(
        derived.get(&format!("{details}|instruction_index")),
        Some(&Scalar::Integer(1))
    );
    assert_eq!(
        derived.get(&format!("{details}|activity_index")),
        Some(&Scalar::Integer(0))
    );
}

#[test]
fn unresolvable_links_fail_the_whole_call() {
    let (converter, source) = converter("medication.v1");
    let foreign = flat(&[
        (
            "medication/medication_list/medication_management:0/comment",
            Scalar::text("Given"),
        ),
        (
            "medication/medication_list/medication_management:0/_instruction_details|composition_uid",
            Scalar::text("8f1c2d3e::example.org::1"),
        ),
        (
            "medication/medication_list/medication_management:0/_instruction_details|instruction_index",
            Scalar::Integer(0),
        ),
    ]);
    let err = converter
        .flat_to_raw(&source, "en", &foreign, &context())
        .expect_err("foreign index should fail");
    assert_eq!(err.kind(), ErrorKind::LinkResolution);
    assert_eq!(
        err.path(),
        Some("medication/medication_list/medication_management:0/_instruction_details")
    );
}
