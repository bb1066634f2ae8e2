//! Class tags for every RM class the converter reads or writes.

rm_class_tag! {
    Composition => "COMPOSITION",
    EventContext => "EVENT_CONTEXT",
    Section => "SECTION",
    Observation => "OBSERVATION",
    Evaluation => "EVALUATION",
    Instruction => "INSTRUCTION",
    Activity => "ACTIVITY",
    Action => "ACTION",
    IsmTransition => "ISM_TRANSITION",
    InstructionDetails => "INSTRUCTION_DETAILS",
    AdminEntry => "ADMIN_ENTRY",
    History => "HISTORY",
    PointEvent => "POINT_EVENT",
    IntervalEvent => "INTERVAL_EVENT",
    ItemTree => "ITEM_TREE",
    ItemList => "ITEM_LIST",
    ItemSingle => "ITEM_SINGLE",
    Cluster => "CLUSTER",
    Element => "ELEMENT",
    DvText => "DV_TEXT",
    DvCodedText => "DV_CODED_TEXT",
    TermMapping => "TERM_MAPPING",
    DvOrdinal => "DV_ORDINAL",
    DvQuantity => "DV_QUANTITY",
    DvCount => "DV_COUNT",
    DvProportion => "DV_PROPORTION",
    DvDuration => "DV_DURATION",
    DvDate => "DV_DATE",
    DvTime => "DV_TIME",
    DvDateTime => "DV_DATE_TIME",
    DvBoolean => "DV_BOOLEAN",
    DvIdentifier => "DV_IDENTIFIER",
    DvUri => "DV_URI",
    DvEhrUri => "DV_EHR_URI",
    DvMultimedia => "DV_MULTIMEDIA",
    DvParsable => "DV_PARSABLE",
    DvInterval => "DV_INTERVAL",
    ReferenceRange => "REFERENCE_RANGE",
    CodePhrase => "CODE_PHRASE",
    TerminologyId => "TERMINOLOGY_ID",
    ArchetypeId => "ARCHETYPE_ID",
    TemplateId => "TEMPLATE_ID",
    HierObjectId => "HIER_OBJECT_ID",
    ObjectVersionId => "OBJECT_VERSION_ID",
    GenericId => "GENERIC_ID",
    Archetyped => "ARCHETYPED",
    PartyRef => "PARTY_REF",
    ObjectRef => "OBJECT_REF",
    LocatableRef => "LOCATABLE_REF",
    PartySelf => "PARTY_SELF",
    PartyIdentified => "PARTY_IDENTIFIED",
    FeederAudit => "FEEDER_AUDIT",
    FeederAuditDetails => "FEEDER_AUDIT_DETAILS",
    Link => "LINK",
}
