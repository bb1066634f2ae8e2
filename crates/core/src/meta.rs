//! Underscore-prefixed meta structures on locatables, entries and the event context.

use crate::codec::{
    check_attributes, decode_party, decode_value, encode_party, encode_value, CodecContext,
    LeafInput, PartyDefaults,
};
use crate::constants::{LINK_NAMESPACE, WORKFLOW_REF_TYPE};
use crate::fragment::Fragment;
use crate::path::MetaKind;
use crate::payload::PayloadNode;
use crate::schema::{SchemaNode, ValueConstraint};
use crate::{ConversionError, ConversionResult};
use openehr::rm_1_1_0::constants::TERMINOLOGY_LOCAL;
use openehr::{
    DataValue, DvEhrUri, DvIdentifier, DvParsable, DvText, EntryCore, FeederAudit,
    FeederAuditDetails, GenericId, HierObjectId, Link, Locatable, ObjectId, ObjectRef,
    ObjectVersionId, PartyIdentified, PartyProxy, RmType, TextValue, UidBasedId,
};

const LOCATABLE_METAS: &[MetaKind] = &[
    MetaKind::Uid,
    MetaKind::Name,
    MetaKind::FeederAudit,
    MetaKind::Link,
];

const ENTRY_METAS: &[MetaKind] = &[
    MetaKind::Uid,
    MetaKind::Name,
    MetaKind::FeederAudit,
    MetaKind::Link,
    MetaKind::Provider,
    MetaKind::WorkFlowId,
];

const INSTRUCTION_METAS: &[MetaKind] = &[
    MetaKind::Uid,
    MetaKind::Name,
    MetaKind::FeederAudit,
    MetaKind::Link,
    MetaKind::Provider,
    MetaKind::WorkFlowId,
    MetaKind::WfDefinition,
];

const ACTION_METAS: &[MetaKind] = &[
    MetaKind::Uid,
    MetaKind::Name,
    MetaKind::FeederAudit,
    MetaKind::Link,
    MetaKind::Provider,
    MetaKind::WorkFlowId,
    MetaKind::InstructionDetails,
];

const ELEMENT_METAS: &[MetaKind] = &[
    MetaKind::Uid,
    MetaKind::Name,
    MetaKind::FeederAudit,
    MetaKind::Link,
    MetaKind::NullFlavour,
    MetaKind::NullReason,
    MetaKind::Mapping,
    MetaKind::NormalRange,
    MetaKind::OtherReferenceRanges,
];

/// Meta structures a node of `rm_type` accepts.
pub(crate) fn allowed_metas(rm_type: RmType) -> &'static [MetaKind] {
    match rm_type {
        RmType::Instruction => INSTRUCTION_METAS,
        RmType::Action => ACTION_METAS,
        RmType::Observation | RmType::Evaluation | RmType::AdminEntry => ENTRY_METAS,
        RmType::Element => ELEMENT_METAS,
        RmType::EventContext => &[MetaKind::HealthCareFacility],
        RmType::Composition
        | RmType::Section
        | RmType::History
        | RmType::Event
        | RmType::PointEvent
        | RmType::IntervalEvent
        | RmType::Activity
        | RmType::Cluster => LOCATABLE_METAS,
        _ => &[],
    }
}

/// Rejects `_` children a node of `rm_type` does not accept.
///
/// # Errors
///
/// [`ConversionError::PathResolution`] naming the offending segment.
pub(crate) fn check_metas(path: &str, node: &PayloadNode, rm_type: RmType) -> ConversionResult<()> {
    let allowed = allowed_metas(rm_type);
    for name in node.children.keys().filter(|name| name.starts_with('_')) {
        match MetaKind::from_name(name) {
            Some(kind) if allowed.contains(&kind) => {}
            Some(_) => {
                return Err(ConversionError::path_resolution(
                    format!("{path}/{name}"),
                    format!("{name} is not allowed on {rm_type}"),
                ));
            }
            None => {
                return Err(ConversionError::path_resolution(
                    format!("{path}/{name}"),
                    "unknown meta segment",
                ));
            }
        }
    }
    Ok(())
}

fn meta_path(path: &str, kind: MetaKind, index: Option<usize>) -> String {
    match index {
        Some(index) => format!("{path}/{}:{index}", kind.name()),
        None => format!("{path}/{}", kind.name()),
    }
}

fn uid_from(value: String) -> UidBasedId {
    if value.contains("::") {
        UidBasedId::ObjectVersionId(ObjectVersionId::new(value))
    } else {
        UidBasedId::HierObjectId(HierObjectId::new(value))
    }
}

fn decode_text(path: &str, node: &PayloadNode, attribute: &str) -> Option<String> {
    LeafInput::new(path, node, Some("value")).text(attribute)
}

fn decode_date_time(
    path: &str,
    node: &PayloadNode,
    attribute: &str,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<openehr::DvDateTime>> {
    let Some(literal) = node.attr(attribute) else {
        return Ok(None);
    };
    let mut leaf = PayloadNode::default();
    leaf.attrs.insert("value".to_string(), literal.clone());
    let path = format!("{path}|{attribute}");
    match decode_value(RmType::DvDateTime, &path, &leaf, &ValueConstraint::default(), ctx)? {
        Some(DataValue::DateTime(value)) => Ok(Some(value)),
        _ => Ok(None),
    }
}

fn decode_audit_details(
    path: &str,
    node: &PayloadNode,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<FeederAuditDetails>> {
    check_attributes(path, node, RmType::String, &["system_id", "version_id", "time"], None)?;
    let time = decode_date_time(path, node, "time", ctx)?;
    let version_id = decode_text(path, node, "version_id");
    match decode_text(path, node, "system_id") {
        Some(system_id) => Ok(Some(FeederAuditDetails {
            class: Default::default(),
            system_id,
            version_id,
            time,
        })),
        None if time.is_some() || version_id.is_some() => Err(ConversionError::vocabulary(
            format!("{path}|system_id"),
            "",
            "audit details need a system id",
        )),
        None => Ok(None),
    }
}

fn decode_identifiers(
    path: &str,
    node: &PayloadNode,
    name: &str,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Vec<DvIdentifier>> {
    let mut identifiers = Vec::new();
    for (index, child) in node.child(name).into_iter().flatten() {
        let path = format!("{path}/{name}:{index}");
        if let Some(DataValue::Identifier(identifier)) =
            decode_value(RmType::DvIdentifier, &path, child, &ValueConstraint::default(), ctx)?
        {
            identifiers.push(identifier);
        }
    }
    Ok(identifiers)
}

const FEEDER_AUDIT_CHILDREN: &[&str] = &[
    "originating_system_audit",
    "feeder_system_audit",
    "originating_system_item_ids",
    "feeder_system_item_ids",
];

fn decode_feeder_audit(
    path: &str,
    node: &PayloadNode,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<FeederAudit>> {
    check_attributes(path, node, RmType::String, &[], None)?;
    if let Some(name) = node
        .children
        .keys()
        .find(|name| !FEEDER_AUDIT_CHILDREN.contains(&name.as_str()))
    {
        return Err(ConversionError::path_resolution(
            format!("{path}/{name}"),
            "unknown feeder audit child",
        ));
    }

    let originating = match node.first_child("originating_system_audit") {
        Some(child) => {
            decode_audit_details(&format!("{path}/originating_system_audit"), child, ctx)?
        }
        None => None,
    };
    let feeder = match node.first_child("feeder_system_audit") {
        Some(child) => decode_audit_details(&format!("{path}/feeder_system_audit"), child, ctx)?,
        None => None,
    };
    let originating_ids = decode_identifiers(path, node, "originating_system_item_ids", ctx)?;
    let feeder_ids = decode_identifiers(path, node, "feeder_system_item_ids", ctx)?;

    let Some(originating_system_audit) = originating else {
        if feeder.is_some() || !originating_ids.is_empty() || !feeder_ids.is_empty() {
            return Err(ConversionError::vocabulary(
                format!("{path}/originating_system_audit|system_id"),
                "",
                "a feeder audit needs an originating system audit",
            ));
        }
        return Ok(None);
    };
    Ok(Some(FeederAudit {
        class: Default::default(),
        originating_system_audit,
        feeder_system_audit: feeder,
        originating_system_item_ids: originating_ids,
        feeder_system_item_ids: feeder_ids,
    }))
}

fn decode_link(path: &str, node: &PayloadNode) -> ConversionResult<Option<Link>> {
    check_attributes(path, node, RmType::String, &["meaning", "type", "target"], None)?;
    let input = LeafInput::new(path, node, None);
    let Some(target) = input.text("target") else {
        if node.has_values() {
            return Err(ConversionError::vocabulary(
                format!("{path}|target"),
                "",
                "a link needs a target",
            ));
        }
        return Ok(None);
    };
    Ok(Some(Link {
        class: Default::default(),
        meaning: DvText::new(input.text("meaning").unwrap_or_default()),
        type_: DvText::new(input.text("type").unwrap_or_default()),
        target: DvEhrUri {
            value: target,
            ..DvEhrUri::default()
        },
    }))
}

fn decode_name(
    path: &str,
    node: &PayloadNode,
    schema: &SchemaNode,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<TextValue>> {
    let constraint = ValueConstraint {
        terminology: Some(TERMINOLOGY_LOCAL.to_string()),
        codes: schema.name_constraint.clone(),
        ..ValueConstraint::default()
    };
    Ok(decode_value(RmType::DvText, path, node, &constraint, ctx)?
        .and_then(|value| value.as_text()))
}

/// Applies `_uid`, `_name`, `_feeder_audit` and `_link` of `node` to `locatable`.
pub(crate) fn apply_locatable(
    path: &str,
    node: &PayloadNode,
    schema: &SchemaNode,
    locatable: &mut Locatable,
    ctx: &CodecContext<'_>,
) -> ConversionResult<()> {
    if let Some(uid) = node.first_child(MetaKind::Uid.name()) {
        let path = meta_path(path, MetaKind::Uid, None);
        check_attributes(&path, uid, RmType::String, &["value"], Some("value"))?;
        if let Some(value) = decode_text(&path, uid, "value") {
            locatable.uid = Some(uid_from(value));
        }
    }
    if let Some(name) = node.first_child(MetaKind::Name.name()) {
        let path = meta_path(path, MetaKind::Name, None);
        if let Some(name) = decode_name(&path, name, schema, ctx)? {
            locatable.name = name;
        }
    }
    if let Some(audit) = node.first_child(MetaKind::FeederAudit.name()) {
        let path = meta_path(path, MetaKind::FeederAudit, None);
        locatable.feeder_audit = decode_feeder_audit(&path, audit, ctx)?;
    }
    for (index, link) in node.child(MetaKind::Link.name()).into_iter().flatten() {
        let path = meta_path(path, MetaKind::Link, Some(*index));
        locatable.links.extend(decode_link(&path, link)?);
    }
    Ok(())
}

/// Applies `_provider` and `_work_flow_id` of `node` to `entry`.
pub(crate) fn apply_entry(
    path: &str,
    node: &PayloadNode,
    entry: &mut EntryCore,
    defaults: PartyDefaults<'_>,
) -> ConversionResult<()> {
    if let Some(provider) = node.first_child(MetaKind::Provider.name()) {
        let path = meta_path(path, MetaKind::Provider, None);
        if let Some(party) = decode_party(&path, provider, defaults)? {
            entry.provider = Some(party);
        }
    }
    if let Some(work_flow) = node.first_child(MetaKind::WorkFlowId.name()) {
        let path = meta_path(path, MetaKind::WorkFlowId, None);
        check_attributes(
            &path,
            work_flow,
            RmType::String,
            &["id", "id_scheme", "namespace", "type"],
            Some("id"),
        )?;
        let input = LeafInput::new(&path, work_flow, Some("id"));
        if let Some(id) = input.text("id") {
            entry.workflow_id = Some(ObjectRef {
                class: Default::default(),
                id: ObjectId::Generic(GenericId {
                    value: id,
                    scheme: input.text("id_scheme"),
                    ..GenericId::default()
                }),
                namespace: input
                    .text("namespace")
                    .unwrap_or_else(|| LINK_NAMESPACE.to_string()),
                type_: input
                    .text("type")
                    .unwrap_or_else(|| WORKFLOW_REF_TYPE.to_string()),
            });
        }
    }
    Ok(())
}

/// Decodes `_wf_definition` of an instruction node.
pub(crate) fn decode_wf_definition(
    path: &str,
    node: &PayloadNode,
    ctx: &CodecContext<'_>,
) -> ConversionResult<Option<DvParsable>> {
    let Some(definition) = node.first_child(MetaKind::WfDefinition.name()) else {
        return Ok(None);
    };
    let path = meta_path(path, MetaKind::WfDefinition, None);
    match decode_value(RmType::DvParsable, &path, definition, &ValueConstraint::default(), ctx)? {
        Some(DataValue::Parsable(parsable)) => Ok(Some(parsable)),
        _ => Ok(None),
    }
}

/// Decodes `_health_care_facility` of a context node.
pub(crate) fn decode_health_care_facility(
    path: &str,
    node: &PayloadNode,
    defaults: PartyDefaults<'_>,
) -> ConversionResult<Option<PartyIdentified>> {
    let Some(facility) = node.first_child(MetaKind::HealthCareFacility.name()) else {
        return Ok(None);
    };
    let path = meta_path(path, MetaKind::HealthCareFacility, None);
    Ok(decode_party(&path, facility, defaults)?.map(into_identified))
}

/// A party as `PARTY_IDENTIFIED`, keeping its reference.
pub(crate) fn into_identified(party: PartyProxy) -> PartyIdentified {
    match party {
        PartyProxy::Identified(identified) => identified,
        PartyProxy::Self_(self_) => PartyIdentified {
            external_ref: self_.external_ref,
            ..PartyIdentified::default()
        },
    }
}

fn encode_audit_details(details: &FeederAuditDetails) -> Fragment {
    let mut out = Fragment::new();
    out.set("system_id", details.system_id.as_str());
    out.set_opt("version_id", details.version_id.as_deref());
    out.set_opt("time", details.time.as_ref().map(|time| time.value.as_str()));
    out
}

fn encode_feeder_audit(audit: &FeederAudit) -> Fragment {
    let mut out = Fragment::new();
    out.push_child(
        "originating_system_audit",
        false,
        encode_audit_details(&audit.originating_system_audit),
    );
    if let Some(feeder) = &audit.feeder_system_audit {
        out.push_child("feeder_system_audit", false, encode_audit_details(feeder));
    }
    for (name, identifiers) in [
        ("originating_system_item_ids", &audit.originating_system_item_ids),
        ("feeder_system_item_ids", &audit.feeder_system_item_ids),
    ] {
        for identifier in identifiers {
            let mut child = Fragment::new();
            encode_value(
                &DataValue::Identifier(identifier.clone()),
                &ValueConstraint::default(),
                &mut child,
            );
            out.push_child(name, true, child);
        }
    }
    out
}

/// Writes `_uid`, `_name` (when it differs from the schema name), `_feeder_audit` and
/// `_link` of `locatable`.
pub(crate) fn encode_locatable(
    locatable: &Locatable,
    schema: &SchemaNode,
    out: &mut Fragment,
) {
    if let Some(uid) = &locatable.uid {
        let mut fragment = Fragment::with_bare_name(Some("value"));
        fragment.bare(uid.value());
        out.push_child(MetaKind::Uid.name(), false, fragment);
    }
    let renamed = match &locatable.name {
        TextValue::Plain(text) => text.value != schema.name,
        TextValue::Coded(_) => true,
    };
    if renamed {
        let mut fragment = Fragment::new();
        let constraint = ValueConstraint {
            codes: schema.name_constraint.clone(),
            ..ValueConstraint::default()
        };
        encode_value(&DataValue::from(locatable.name.clone()), &constraint, &mut fragment);
        out.push_child(MetaKind::Name.name(), false, fragment);
    }
    if let Some(audit) = &locatable.feeder_audit {
        out.push_child(MetaKind::FeederAudit.name(), false, encode_feeder_audit(audit));
    }
    for link in &locatable.links {
        let mut fragment = Fragment::new();
        fragment.set("meaning", link.meaning.value.as_str());
        fragment.set("type", link.type_.value.as_str());
        fragment.set("target", link.target.value.as_str());
        out.push_child(MetaKind::Link.name(), true, fragment);
    }
}

/// Writes `_provider` and `_work_flow_id` of `entry`.
pub(crate) fn encode_entry(entry: &EntryCore, out: &mut Fragment) {
    if let Some(provider) = &entry.provider {
        let mut fragment = Fragment::new();
        encode_party(provider, &mut fragment);
        if !fragment.is_empty() {
            out.push_child(MetaKind::Provider.name(), false, fragment);
        }
    }
    if let Some(work_flow) = &entry.workflow_id {
        let mut fragment = Fragment::with_bare_name(Some("id"));
        fragment.set("id", work_flow.id.value());
        fragment.set_opt("id_scheme", work_flow.id.scheme());
        fragment.set("namespace", work_flow.namespace.as_str());
        fragment.set("type", work_flow.type_.as_str());
        out.push_child(MetaKind::WorkFlowId.name(), false, fragment);
    }
}

pub(crate) fn encode_wf_definition(definition: &DvParsable, out: &mut Fragment) {
    let mut fragment = Fragment::new();
    encode_value(
        &DataValue::Parsable(definition.clone()),
        &ValueConstraint::default(),
        &mut fragment,
    );
    out.push_child(MetaKind::WfDefinition.name(), false, fragment);
}

pub(crate) fn encode_health_care_facility(facility: &PartyIdentified, out: &mut Fragment) {
    let mut fragment = Fragment::new();
    encode_party(&PartyProxy::Identified(facility.clone()), &mut fragment);
    out.push_child(MetaKind::HealthCareFacility.name(), false, fragment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_support::node;
    use crate::locale::StandardLocale;
    use chrono::{Offset, Utc};
    use flatehr_types::Scalar;
    use indexmap::IndexMap;
    use std::collections::BTreeMap;

    fn with_children(children: &[(&str, usize, PayloadNode)]) -> PayloadNode {
        let mut map: IndexMap<String, BTreeMap<usize, PayloadNode>> = IndexMap::new();
        for (name, index, child) in children {
            map.entry(name.to_string())
                .or_default()
                .insert(*index, child.clone());
        }
        PayloadNode {
            attrs: IndexMap::new(),
            children: map,
        }
    }

    fn apply(node: &PayloadNode, schema: &SchemaNode) -> ConversionResult<Locatable> {
        let locale = StandardLocale::for_tag("en");
        let ctx = CodecContext {
            locale: &locale,
            zone: Utc.fix(),
        };
        let mut locatable = Locatable::new("at0001", schema.name.as_str());
        apply_locatable("root/node", node, schema, &mut locatable, &ctx)?;
        Ok(locatable)
    }

    #[test]
    fn metas_are_checked_per_class() {
        let input = with_children(&[("_null_flavour", 0, node(&[("code", Scalar::text("253"))]))]);
        assert!(check_metas("root/node", &input, RmType::Element).is_ok());
        let err = check_metas("root/node", &input, RmType::Observation).expect_err("not allowed");
        assert!(matches!(
            err,
            ConversionError::PathResolution { ref path, .. } if path == "root/node/_null_flavour"
        ));

        let input = with_children(&[("_colour", 0, node(&[]))]);
        assert!(check_metas("root/node", &input, RmType::Element).is_err());
    }

    #[test]
    fn uid_name_and_links() {
        let schema = SchemaNode::new("node", "Blood pressure", RmType::Observation);
        let input = with_children(&[
            ("_uid", 0, node(&[("", Scalar::text("8f6a::local.ehrbase.org::1"))])),
            ("_name", 0, node(&[("", Scalar::text("Sitting blood pressure"))])),
            (
                "_link",
                0,
                node(&[
                    ("meaning", Scalar::text("follow up")),
                    ("type", Scalar::text("problem")),
                    ("target", Scalar::text("ehr://problem/1")),
                ]),
            ),
        ]);
        let locatable = apply(&input, &schema).expect("applied");
        assert!(matches!(locatable.uid, Some(UidBasedId::ObjectVersionId(_))));
        assert_eq!(locatable.name_value(), "Sitting blood pressure");
        assert_eq!(locatable.links.len(), 1);

        let mut out = Fragment::new();
        encode_locatable(&locatable, &schema, &mut out);
        assert!(out.children.contains_key("_name"));
        assert!(out.children["_link"].multiple);
    }

    #[test]
    fn feeder_audit_needs_originating_system() {
        let schema = SchemaNode::new("node", "Node", RmType::Cluster);
        let details = node(&[("version_id", Scalar::text("2"))]);
        let audit = with_children(&[("originating_system_audit", 0, details)]);
        let input = with_children(&[("_feeder_audit", 0, audit)]);
        let err = apply(&input, &schema).expect_err("system id missing");
        assert!(matches!(err, ConversionError::Vocabulary { .. }));

        let details = node(&[("system_id", Scalar::text("LAB"))]);
        let audit = with_children(&[("originating_system_audit", 0, details)]);
        let input = with_children(&[("_feeder_audit", 0, audit)]);
        let locatable = apply(&input, &schema).expect("applied");
        let audit = locatable.feeder_audit.expect("feeder audit");
        assert_eq!(audit.originating_system_audit.system_id, "LAB");
    }
}
