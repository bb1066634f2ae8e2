//! The subset of the openEHR support terminology the converter needs to fill coded attributes.
//!
//! openEHR terminology codes are unique across groups, so a single table serves forward
//! (code to rubric) and reverse (rubric to code) lookups.

const OPENEHR_TERMS: &[(&str, &str)] = &[
    // null flavours
    ("253", "unknown"),
    ("271", "no information"),
    ("272", "masked"),
    ("273", "not applicable"),
    // composition categories
    ("431", "persistent"),
    ("433", "event"),
    ("451", "episodic"),
    // settings
    ("225", "home"),
    ("227", "emergency care"),
    ("228", "primary medical care"),
    ("229", "primary nursing care"),
    ("230", "primary allied health care"),
    ("231", "midwifery care"),
    ("232", "secondary medical care"),
    ("233", "secondary nursing care"),
    ("234", "secondary allied health care"),
    ("235", "complementary health care"),
    ("236", "dental care"),
    ("237", "nursing home care"),
    ("238", "other care"),
    // instruction states
    ("524", "initial"),
    ("526", "planned"),
    ("527", "postponed"),
    ("528", "cancelled"),
    ("529", "scheduled"),
    ("530", "suspended"),
    ("531", "aborted"),
    ("532", "completed"),
    ("533", "expired"),
    ("245", "active"),
    // instruction transitions
    ("535", "initiate"),
    ("536", "plan step"),
    ("537", "postpone"),
    ("538", "restore"),
    ("539", "cancel"),
    ("540", "postponed step"),
    ("541", "start"),
    ("542", "do"),
    ("543", "active step"),
    ("544", "suspend"),
    ("545", "suspended step"),
    ("546", "resume"),
    ("547", "abort"),
    ("548", "finish"),
    ("549", "time out"),
    ("550", "notify aborted"),
    ("551", "notify completed"),
    ("552", "notify cancelled"),
    ("553", "scheduled step"),
    // event math functions
    ("144", "maximum"),
    ("145", "minimum"),
    ("146", "mean"),
    ("147", "change"),
    ("148", "total"),
    ("149", "variation"),
    ("267", "mode"),
    ("268", "median"),
    ("640", "actual"),
    ("521", "decrease"),
    ("522", "increase"),
];

/// Codes of the null flavour group.
pub const NULL_FLAVOURS: &[&str] = &["271", "272", "273", "253"];

/// Rubric of an openEHR terminology code.
pub fn openehr_rubric(code: &str) -> Option<&'static str> {
    OPENEHR_TERMS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, rubric)| *rubric)
}

/// Code of an openEHR terminology rubric, matched case-insensitively.
pub fn openehr_code(rubric: &str) -> Option<&'static str> {
    let rubric = rubric.trim();
    OPENEHR_TERMS
        .iter()
        .find(|(_, r)| r.eq_ignore_ascii_case(rubric))
        .map(|(code, _)| *code)
}

/// Rubric of a null flavour code; `None` for codes outside the null flavour group.
pub fn null_flavour_rubric(code: &str) -> Option<&'static str> {
    if NULL_FLAVOURS.contains(&code) {
        openehr_rubric(code)
    } else {
        None
    }
}

/// Code of a null flavour rubric; `None` for rubrics outside the null flavour group.
pub fn null_flavour_code(rubric: &str) -> Option<&'static str> {
    openehr_code(rubric).filter(|code| NULL_FLAVOURS.contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_flavour_table_is_bidirectional() {
        for code in NULL_FLAVOURS {
            let rubric = null_flavour_rubric(code).expect("null flavour rubric");
            assert_eq!(null_flavour_code(rubric), Some(*code));
        }
        assert_eq!(null_flavour_rubric("253"), Some("unknown"));
        assert_eq!(null_flavour_code("Masked"), Some("272"));
    }

    #[test]
    fn null_flavour_lookups_reject_other_groups() {
        assert_eq!(null_flavour_rubric("433"), None);
        assert_eq!(null_flavour_code("event"), None);
    }

    #[test]
    fn general_lookups() {
        assert_eq!(openehr_rubric("532"), Some("completed"));
        assert_eq!(openehr_code("other care"), Some("238"));
        assert_eq!(openehr_rubric("999"), None);
    }
}
