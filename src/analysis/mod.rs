//! Code Analysis Layer
//!
//! Turns raw recognizer text into validated codes and votes them into a
//! stable estimate:
//! - candidate extraction by shape
//! - glyph confusion correction for rejected candidates
//! - grammar and vocabulary validation
//! - confidence-weighted voting over recent frames

pub mod code;
pub mod confusion;
pub mod extract;
pub mod voting;

pub use code::{Code, GrammarValidator, Rejection, Vocabulary};
pub use confusion::correct;
pub use extract::extract_candidates;
pub use voting::{Observation, VotingAggregator};

use tracing::trace;

/// How to pick one code when a frame yields several candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStrategy {
    /// Left to right, first candidate that validates directly or after correction
    #[default]
    FirstMatch,
    /// Any directly valid candidate first, then the first corrected one
    PreferDirect,
}

/// A code accepted from one frame's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// The validated code
    pub code: Code,
    /// Candidate string as extracted, before correction
    pub candidate: String,
    /// Whether the confusion map was needed
    pub corrected: bool,
}

/// Diagnostic verdict for one extracted candidate
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CandidateReport {
    pub candidate: String,
    /// Why the candidate failed as extracted
    pub rejection: Option<Rejection>,
    /// Candidate after the confusion map
    pub corrected: String,
    pub corrected_valid: bool,
    /// Closest known prefix and its edit distance
    pub nearest_prefix: Option<(String, usize)>,
    /// Closest known suffix and its edit distance
    pub nearest_suffix: Option<(String, usize)>,
}

/// Extract, validate and correct in one pass over recognizer text
#[derive(Debug, Clone, Default)]
pub struct CodeReader {
    validator: GrammarValidator,
    strategy: CandidateStrategy,
}

impl CodeReader {
    pub fn new(validator: GrammarValidator, strategy: CandidateStrategy) -> Self {
        Self { validator, strategy }
    }

    /// Pick the code for this frame, if any candidate validates
    pub fn read(&self, raw_text: &str) -> Option<Reading> {
        let candidates = extract_candidates(raw_text);
        trace!("{} candidate(s) in {:?}", candidates.len(), raw_text);

        match self.strategy {
            CandidateStrategy::FirstMatch => candidates
                .into_iter()
                .find_map(|candidate| self.direct(&candidate).or_else(|| self.corrected(&candidate))),
            CandidateStrategy::PreferDirect => candidates
                .iter()
                .find_map(|candidate| self.direct(candidate))
                .or_else(|| candidates.iter().find_map(|candidate| self.corrected(candidate))),
        }
    }

    /// Explain every candidate in `raw_text`, valid or not
    pub fn inspect(&self, raw_text: &str) -> Vec<CandidateReport> {
        extract_candidates(raw_text)
            .into_iter()
            .map(|candidate| {
                let corrected = correct(&candidate);
                let (prefix, suffix) = (&candidate[..code::PREFIX_LEN], &candidate[code::CODE_LEN - code::SUFFIX_LEN..]);
                let owned = |hit: Option<(&str, usize)>| hit.map(|(entry, distance)| (entry.to_string(), distance));
                CandidateReport {
                    rejection: self.validator.check(&candidate).err(),
                    corrected_valid: self.validator.is_valid(&corrected),
                    nearest_prefix: owned(self.validator.nearest_prefix(prefix)),
                    nearest_suffix: owned(self.validator.nearest_suffix(suffix)),
                    corrected,
                    candidate,
                }
            })
            .collect()
    }

    fn direct(&self, candidate: &str) -> Option<Reading> {
        self.validator.validate(candidate).map(|code| Reading {
            code,
            candidate: candidate.to_string(),
            corrected: false,
        })
    }

    fn corrected(&self, candidate: &str) -> Option<Reading> {
        let fixed = correct(candidate);
        let reading = self.validator.validate(&fixed).map(|code| Reading {
            code,
            candidate: candidate.to_string(),
            corrected: true,
        });
        if reading.is_none() {
            trace!("rejected {} (corrected {})", candidate, fixed);
        }
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(strategy: CandidateStrategy) -> CodeReader {
        let vocab = Vocabulary::new(["AKE", "PMC", "RKN"], ["CI", "BR", "CX", "JL", "NH"]);
        CodeReader::new(GrammarValidator::new(vocab), strategy)
    }

    #[test]
    fn test_end_to_end_text() {
        let reading = reader(CandidateStrategy::FirstMatch)
            .read(" ak e1 2 3 4 5 c i ")
            .unwrap();
        assert_eq!(reading.code.as_str(), "AKE12345CI");
        assert!(!reading.corrected);
    }

    #[test]
    fn test_no_candidates() {
        assert!(reader(CandidateStrategy::FirstMatch).read("").is_none());
        assert!(reader(CandidateStrategy::FirstMatch).read("HELLO WORLD").is_none());
    }

    #[test]
    fn test_skips_invalid_candidates() {
        let reading = reader(CandidateStrategy::FirstMatch)
            .read("XYZ11111CI PMC67890BR")
            .unwrap();
        assert_eq!(reading.code.as_str(), "PMC67890BR");
    }

    #[test]
    fn test_first_match_stops_at_first_valid() {
        let reading = reader(CandidateStrategy::FirstMatch)
            .read("RKN00001CX AKE12345CI")
            .unwrap();
        assert_eq!(reading.code.as_str(), "RKN00001CX");
    }

    #[test]
    fn test_shape_valid_but_unknown_stays_rejected_after_correction() {
        // Correction swaps character classes, so a shaped reject never validates
        assert!(reader(CandidateStrategy::FirstMatch).read("AKB12345CI").is_none());
        assert!(reader(CandidateStrategy::PreferDirect).read("PMC12345ZZ").is_none());
    }

    #[test]
    fn test_inspect_reports_each_candidate() {
        let reports = reader(CandidateStrategy::FirstMatch).inspect("AKB12345CI / PMC67890BR");
        assert_eq!(reports.len(), 2);

        assert_eq!(reports[0].rejection, Some(Rejection::UnknownPrefix));
        assert_eq!(reports[0].nearest_prefix, Some(("AKE".to_string(), 1)));
        assert!(!reports[0].corrected_valid);

        assert_eq!(reports[1].rejection, None);
        assert_eq!(reports[1].nearest_suffix, Some(("BR".to_string(), 0)));
    }

    #[test]
    fn test_prefer_direct_scans_all_candidates() {
        let reading = reader(CandidateStrategy::PreferDirect)
            .read("QQQ00000QQ PMC67890BR")
            .unwrap();
        assert_eq!(reading.code.as_str(), "PMC67890BR");
        assert_eq!(reading.candidate, "PMC67890BR");
    }
}
