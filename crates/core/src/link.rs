//! Links between an `ACTION` and the instruction activity it carries out.
//!
//! On build, the `_instruction_details` attributes of an action name the instruction by uid,
//! by ordinal among the composition's instructions, or by an already resolved path. The
//! resolver turns that into an `INSTRUCTION_DETAILS` whose locatable reference points at the
//! instruction and whose `activity_id` names the activity. On extraction the reference is
//! written back as attributes.

use crate::codec::{check_attributes, LeafInput};
use crate::constants::{ANY_ACTION_ARCHETYPE, LINK_NAMESPACE, LINK_TYPE, SELF_REFERENCE};
use crate::fragment::Fragment;
use crate::path::MetaKind;
use crate::payload::PayloadNode;
use crate::schema::{parse_rm_path, split_steps, SchemaNode, SchemaTree};
use crate::{ConversionError, ConversionResult};
use flatehr_types::Scalar;
use openehr::{
    Composition, ContentItem, Instruction, InstructionDetails, LocatableRef, ObjectVersionId,
    RmType,
};
use regex::Regex;

const DETAIL_ATTRIBUTES: &[&str] = &[
    "composition_uid",
    "instruction_uid",
    "instruction_index",
    "activity_id",
    "activity_index",
    "path",
];

/// Instruction and activity hints given on one action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkRequest {
    pub composition_uid: Option<String>,
    pub instruction_uid: Option<String>,
    pub instruction_index: Option<usize>,
    pub activity_id: Option<String>,
    pub activity_index: Option<usize>,
    pub path: Option<String>,
}

fn index(input: &LeafInput<'_>, attribute: &str) -> ConversionResult<Option<usize>> {
    match input.integer(attribute, RmType::String)? {
        Some(value) => usize::try_from(value).map(Some).map_err(|_| {
            input.coercion(
                attribute,
                &Scalar::Integer(value),
                RmType::String,
                "index must not be negative",
            )
        }),
        None => Ok(None),
    }
}

impl LinkRequest {
    /// Reads the `_instruction_details` node of an action.
    pub(crate) fn decode(path: &str, node: &PayloadNode) -> ConversionResult<Option<Self>> {
        check_attributes(path, node, RmType::String, DETAIL_ATTRIBUTES, None)?;
        if let Some(name) = node.children.keys().next() {
            return Err(ConversionError::path_resolution(
                format!("{path}/{name}"),
                "instruction details have attributes only",
            ));
        }
        let input = LeafInput::new(path, node, None);
        let request = LinkRequest {
            composition_uid: input.text("composition_uid"),
            instruction_uid: input.text("instruction_uid"),
            instruction_index: index(&input, "instruction_index")?,
            activity_id: input.text("activity_id"),
            activity_index: index(&input, "activity_index")?,
            path: input.text("path"),
        };
        Ok((request != LinkRequest::default()).then_some(request))
    }

    fn same_composition(&self) -> bool {
        self.composition_uid
            .as_deref()
            .map_or(true, |uid| uid == SELF_REFERENCE)
    }
}

/// Instruction schema node an action links to, with its activity.
#[derive(Clone, Copy, Debug)]
struct LinkTarget<'s> {
    instruction: &'s SchemaNode,
    activity: Option<&'s SchemaNode>,
}

fn action_pattern(activity: &SchemaNode) -> String {
    activity
        .child("action_archetype_id")
        .and_then(|node| node.fixed.as_ref())
        .and_then(|fixed| fixed.get("").or_else(|| fixed.get("value")))
        .and_then(Scalar::trimmed)
        .map(|pattern| pattern.into_owned())
        .unwrap_or_else(|| ANY_ACTION_ARCHETYPE.to_string())
}

fn pattern_matches(pattern: &str, archetype_id: &str) -> bool {
    match pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
    {
        Some(expression) => Regex::new(&format!("^(?:{expression})$"))
            .map(|regex| regex.is_match(archetype_id))
            .unwrap_or(false),
        None => pattern == archetype_id,
    }
}

fn activity_of(instruction: &SchemaNode) -> Option<&SchemaNode> {
    instruction
        .children
        .iter()
        .find(|child| child.rm_type == RmType::Activity)
}

/// The instruction whose activity accepts `action_archetype`, preferring explicit patterns
/// over the match-all default. An explicit pattern that rejects the action rules its
/// instruction out.
fn find_target<'s>(tree: &'s SchemaTree, action_archetype: &str) -> Option<LinkTarget<'s>> {
    let instructions = tree.find_all(RmType::Instruction);
    let mut wildcard = None;
    for instruction in &instructions {
        let activity = activity_of(instruction);
        let pattern = activity
            .map(action_pattern)
            .unwrap_or_else(|| ANY_ACTION_ARCHETYPE.to_string());
        if !pattern_matches(&pattern, action_archetype) {
            continue;
        }
        let target = LinkTarget {
            instruction,
            activity,
        };
        if pattern != ANY_ACTION_ARCHETYPE {
            return Some(target);
        }
        wildcard.get_or_insert(target);
    }
    wildcard
}

/// `Name` for the first occurrence, `Name #N` (N = index + 1) after it.
fn ordinal_name(name: &str, index: usize) -> String {
    if index == 0 {
        name.to_string()
    } else {
        format!("{name} #{}", index + 1)
    }
}

/// Splits an absolute path into its parent steps and the attribute of its last step.
fn split_last(aql_path: &str) -> ConversionResult<(String, String)> {
    let steps = split_steps(aql_path);
    let (last, parents) = steps
        .split_last()
        .ok_or_else(|| ConversionError::Schema(format!("instruction path '{aql_path}' is empty")))?;
    let step = parse_rm_path(last)?
        .into_iter()
        .next()
        .ok_or_else(|| ConversionError::Schema(format!("instruction path '{aql_path}' is empty")))?;
    let prefix = parents
        .iter()
        .map(|step| format!("/{step}"))
        .collect::<String>();
    Ok((prefix, step.attribute))
}

fn uid_path(instruction: &SchemaNode, archetype_id: &str, uid: &str) -> ConversionResult<String> {
    let (prefix, attribute) = split_last(&instruction.aql_path)?;
    Ok(format!("{prefix}/{attribute}[{archetype_id} and uid/value='{uid}']"))
}

fn ordinal_path(
    instruction: &SchemaNode,
    archetype_id: &str,
    index: usize,
) -> ConversionResult<String> {
    let (prefix, attribute) = split_last(&instruction.aql_path)?;
    Ok(format!(
        "{prefix}/{attribute}[{archetype_id},'{}']",
        ordinal_name(&instruction.name, index)
    ))
}

fn instructions_of<'c>(composition: &'c Composition, archetype_id: &str) -> Vec<&'c Instruction> {
    let mut found = Vec::new();
    composition.walk_content(&mut |item| {
        if let ContentItem::Instruction(instruction) = item {
            if instruction.locatable.archetype_node_id == archetype_id {
                found.push(instruction);
            }
        }
    });
    found
}

/// Resolves instruction links after the composition is built.
pub(crate) struct LinkResolver<'a> {
    tree: &'a SchemaTree,
    composition: &'a Composition,
    handler: bool,
}

impl<'a> LinkResolver<'a> {
    pub(crate) fn new(tree: &'a SchemaTree, composition: &'a Composition, handler: bool) -> Self {
        Self {
            tree,
            composition,
            handler,
        }
    }

    /// Instruction details for an action of archetype `action_archetype`; `path` is the flat
    /// path of its `_instruction_details`, for errors.
    ///
    /// # Errors
    ///
    /// [`ConversionError::LinkResolution`] when no instruction or activity can be named.
    pub(crate) fn resolve(
        &self,
        path: &str,
        action_archetype: &str,
        request: &LinkRequest,
    ) -> ConversionResult<InstructionDetails> {
        let target = find_target(self.tree, action_archetype);
        let same_composition = request.same_composition();

        let by_index = request
            .instruction_index
            .filter(|_| same_composition && request.instruction_uid.is_none());
        let (instruction_path, built) = match (by_index, &request.instruction_uid) {
            (Some(index), _) => {
                let target = target.ok_or_else(|| no_target(path, action_archetype))?;
                let archetype_id = archetype_of(path, target.instruction)?;
                let built = instructions_of(self.composition, archetype_id)
                    .get(index)
                    .copied();
                (ordinal_path(target.instruction, archetype_id, index)?, built)
            }
            (None, Some(uid)) => {
                let target = target.ok_or_else(|| no_target(path, action_archetype))?;
                let archetype_id = archetype_of(path, target.instruction)?;
                let built = instructions_of(self.composition, archetype_id)
                    .into_iter()
                    .find(|instruction| {
                        instruction
                            .locatable
                            .uid
                            .as_ref()
                            .is_some_and(|id| id.value() == uid)
                    });
                (uid_path(target.instruction, archetype_id, uid)?, built)
            }
            (None, None) => match &request.path {
                Some(literal) => (literal.clone(), None),
                None if request.instruction_index.is_some() => {
                    return Err(ConversionError::link_resolution(
                        path,
                        "an instruction index only resolves within the same composition",
                    ));
                }
                None => {
                    return Err(ConversionError::link_resolution(
                        path,
                        "no instruction uid, index or path given",
                    ));
                }
            },
        };

        let activity_id = match &request.activity_id {
            Some(activity_id) => activity_id.clone(),
            None => {
                let activity = target.and_then(|target| target.activity).ok_or_else(|| {
                    ConversionError::link_resolution(path, "instruction has no activity to link")
                })?;
                self.activity_path(path, activity, request.activity_index, built)?
            }
        };

        let composition_id = request
            .composition_uid
            .clone()
            .unwrap_or_else(|| SELF_REFERENCE.to_string());
        Ok(InstructionDetails {
            class: Default::default(),
            instruction_id: LocatableRef {
                class: Default::default(),
                id: ObjectVersionId::new(composition_id),
                namespace: LINK_NAMESPACE.to_string(),
                type_: LINK_TYPE.to_string(),
                path: Some(instruction_path),
            },
            activity_id,
            wf_details: None,
        })
    }

    fn activity_path(
        &self,
        path: &str,
        activity: &SchemaNode,
        hint: Option<usize>,
        built: Option<&Instruction>,
    ) -> ConversionResult<String> {
        let node_id = activity.node_id.as_deref().ok_or_else(|| {
            ConversionError::link_resolution(path, "activity has no archetype node id")
        })?;
        let count = built.map(|instruction| {
            instruction
                .activities
                .iter()
                .filter(|built| built.locatable.archetype_node_id == node_id)
                .count()
        });
        let index = match (hint, count) {
            (Some(hint), _) if self.handler => hint,
            (_, Some(1)) => 0,
            (Some(hint), Some(count)) if hint >= count && count > 0 => {
                return Err(ConversionError::link_resolution(
                    path,
                    format!("activity index {hint} but the instruction has {count} activities"),
                ));
            }
            (hint, _) => hint.unwrap_or(0),
        };
        Ok(activity_step(node_id, &activity.name, index))
    }
}

fn activity_step(node_id: &str, name: &str, index: usize) -> String {
    if index == 0 {
        format!("activities[{node_id}]")
    } else {
        format!("activities[{node_id},'{}']", ordinal_name(name, index))
    }
}

fn archetype_of<'s>(path: &str, instruction: &'s SchemaNode) -> ConversionResult<&'s str> {
    instruction.node_id.as_deref().ok_or_else(|| {
        ConversionError::link_resolution(path, "instruction has no archetype id")
    })
}

fn no_target(path: &str, action_archetype: &str) -> ConversionError {
    ConversionError::link_resolution(
        path,
        format!("no instruction in the template accepts action '{action_archetype}'"),
    )
}

/// Reads the quoted name and the uid of the last predicate of `path`.
fn last_predicate(path: &str) -> (Option<String>, Option<String>) {
    let Some(last) = split_steps(path).last().copied() else {
        return (None, None);
    };
    let uid = last
        .find("uid/value='")
        .map(|start| &last[start + "uid/value='".len()..])
        .and_then(|rest| rest.split_once('\''))
        .map(|(uid, _)| uid.to_string());
    if uid.is_some() {
        return (None, uid);
    }
    let name = parse_rm_path(last)
        .ok()
        .and_then(|steps| steps.into_iter().next())
        .and_then(|step| step.name);
    (name, None)
}

/// Index encoded by `Name #N`; 0 without a suffix.
fn ordinal_of(name: Option<&str>) -> usize {
    name.and_then(|name| name.rsplit_once(" #"))
        .and_then(|(_, n)| n.parse::<usize>().ok())
        .map_or(0, |n| n.saturating_sub(1))
}

/// Writes `details` as `_instruction_details` attributes of an action fragment. With `derive`
/// the uid and index hints are recovered from the paths.
pub(crate) fn encode_details(
    details: &InstructionDetails,
    derive: bool,
    out: &mut Fragment,
) {
    let mut fragment = Fragment::new();
    let composition_uid = details.instruction_id.id.value.as_str();
    if composition_uid != SELF_REFERENCE {
        fragment.set("composition_uid", composition_uid);
    }
    fragment.set_opt("path", details.instruction_id.path.as_deref());
    fragment.set("activity_id", details.activity_id.as_str());

    if derive {
        if let Some(path) = &details.instruction_id.path {
            match last_predicate(path) {
                (_, Some(uid)) => fragment.set("instruction_uid", uid),
                (name, None) => fragment.set(
                    "instruction_index",
                    Scalar::Integer(ordinal_of(name.as_deref()) as i64),
                ),
            }
        }
        let (name, _) = last_predicate(&details.activity_id);
        fragment.set(
            "activity_index",
            Scalar::Integer(ordinal_of(name.as_deref()) as i64),
        );
    }
    out.push_child(MetaKind::InstructionDetails.name(), false, fragment);
}
