//! Ballot selection validation

use regex::Regex;
use uuid::Uuid;

use super::VoteBallot;

/// Reserved candidate selection for "none of the above"
pub const NONE_OF_THE_ABOVE: &str = "NOTA";

/// Check that a selection is something the voting contract can encode.
///
/// Contract ids are `uint256`, so a selection must be a plain unsigned
/// integer or a UUID (hyphenated 128-bit value).
///
/// # Examples
///
/// ```
/// use votequeue_core::models::is_encodable_selection;
///
/// assert!(is_encodable_selection("42"));
/// assert!(is_encodable_selection("0190b1a0-7c1e-7d3a-9c55-0b7e2f9c1a44"));
/// assert!(!is_encodable_selection("forty-two"));
/// ```
#[must_use]
pub fn is_encodable_selection(value: &str) -> bool {
    let re = Regex::new(r"^[0-9]+$").expect("Invalid regex");
    let value = value.trim();
    re.is_match(value) || (value.len() == 36 && Uuid::parse_str(value).is_ok())
}

/// Why a ballot cannot be submitted, if it cannot
#[must_use]
pub fn ballot_problem(ballot: &VoteBallot) -> Option<String> {
    let candidate = ballot.candidate_selection.trim();
    if candidate.is_empty() {
        return Some("Candidate selection is empty".to_string());
    }
    if !candidate.eq_ignore_ascii_case(NONE_OF_THE_ABOVE) && !is_encodable_selection(candidate) {
        return Some(format!(
            "Invalid candidate id \"{candidate}\": not a uint or UUID"
        ));
    }

    let ward = ballot.ward_selection.trim();
    if ward.is_empty() {
        return Some("Ward selection is empty".to_string());
    }
    if !is_encodable_selection(ward) {
        return Some(format!("Invalid ward id \"{ward}\": not a uint or UUID"));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VoterKey;

    fn ballot(candidate: &str, ward: &str) -> VoteBallot {
        VoteBallot {
            voter_key: VoterKey::parse("ABC1234567").unwrap(),
            candidate_selection: candidate.to_string(),
            ward_selection: ward.to_string(),
        }
    }

    #[test]
    fn accepts_numeric_uuid_and_nota() {
        assert_eq!(ballot_problem(&ballot("42", "9")), None);
        assert_eq!(
            ballot_problem(&ballot("0190b1a0-7c1e-7d3a-9c55-0b7e2f9c1a44", "9")),
            None
        );
        assert_eq!(ballot_problem(&ballot("nota", "9")), None);
    }

    #[test]
    fn rejects_non_ascii_digits() {
        assert!(!is_encodable_selection("٤٢"));
        assert!(ballot_problem(&ballot("42", "٩")).is_some());
    }

    #[test]
    fn rejects_malformed_selections() {
        assert!(ballot_problem(&ballot("", "9")).is_some());
        assert!(ballot_problem(&ballot("-1", "9")).is_some());
        assert!(ballot_problem(&ballot("42", "ward nine")).is_some());
        // NOTA is a candidate sentinel only
        assert!(ballot_problem(&ballot("42", "NOTA")).is_some());
    }
}
