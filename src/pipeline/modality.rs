//! Modality resolution: which file fills a requested slot.
//!
//! A request string is `"<imager> <type>[ [select]][ (Nth)]"`, for example
//! `"cSLO BAF"`, `"cSLO BAF (2nd)"` or `"OCT vertical [select]"`. It is parsed
//! once into a [`ModalitySpec`]; [`resolve`] then picks a file out of one
//! subject/eye/imager bucket for every subject.
//!
//! ## Suffix order
//!
//! The ordinal suffix is matched (anchored at the end) and stripped first,
//! then the literal ` [select]` suffix, then the remainder is trimmed. So
//! `"BAF [select] (2nd)"` is a fixed-index request for `BAF`, while
//! `"BAF (2nd) [select]"` is a select request for a type literally named
//! `BAF (2nd)`.

use crate::config::{Imager, ModalityRequest};
use crate::error::{AssetError, CompileError};
use crate::pipeline::discover::ImageAsset;
use crate::selection::ImageSelector;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, warn};

static RE_ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r" \((\d+)(st|nd|rd|th)\)$").unwrap());

const SELECT_SUFFIX: &str = " [select]";

/// How a slot picks among several files of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Exactly one file is expected.
    Unique,
    /// The n-th file (0-based) in sequence order.
    FixedIndex(usize),
    /// Ask the [`ImageSelector`].
    UserSelect,
}

/// A parsed modality slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalitySpec {
    pub imager: Imager,
    pub type_name: String,
    pub policy: SelectionPolicy,
    /// Label shown in the document's left label column.
    pub display_name: String,
}

impl ModalitySpec {
    /// Parse one `(request, display_name)` pair.
    ///
    /// An empty display name falls back to the type name.
    pub fn parse(request: &str, display_name: &str) -> Result<ModalitySpec, CompileError> {
        let invalid = |reason: &str| CompileError::InvalidModality {
            request: request.to_string(),
            reason: reason.to_string(),
        };

        let (imager_token, remainder) = request
            .split_once(' ')
            .ok_or_else(|| invalid("expected '<imager> <type>'"))?;
        let imager: Imager = imager_token.parse().map_err(|e: String| invalid(&e))?;

        let mut remainder = remainder.to_string();
        let mut policy = SelectionPolicy::Unique;

        let ordinal = RE_ORDINAL
            .captures(&remainder)
            .map(|caps| (caps[0].len(), caps[1].to_string()));
        if let Some((suffix_len, digits)) = ordinal {
            let n: usize = digits
                .parse()
                .map_err(|_| invalid("ordinal is out of range"))?;
            if n == 0 {
                return Err(invalid("ordinals start at 1st"));
            }
            policy = SelectionPolicy::FixedIndex(n - 1);
            remainder.truncate(remainder.len() - suffix_len);
        }

        if let Some(stripped) = remainder.strip_suffix(SELECT_SUFFIX) {
            // An explicit ordinal already decided the slot.
            if policy == SelectionPolicy::Unique {
                policy = SelectionPolicy::UserSelect;
            }
            remainder = stripped.to_string();
        }

        let type_name = remainder.trim().to_string();
        if type_name.is_empty() {
            return Err(invalid("missing modality type"));
        }

        let display_name = if display_name.trim().is_empty() {
            type_name.clone()
        } else {
            display_name.to_string()
        };

        Ok(ModalitySpec {
            imager,
            type_name,
            policy,
            display_name,
        })
    }

    /// Parse every request, skipping (and logging) the invalid ones.
    ///
    /// Returns [`CompileError::NoModalities`] when nothing survives.
    pub fn parse_all(requests: &[ModalityRequest]) -> Result<Vec<ModalitySpec>, CompileError> {
        let mut specs = Vec::with_capacity(requests.len());
        for r in requests {
            match ModalitySpec::parse(&r.request, &r.display_name) {
                Ok(spec) => specs.push(spec),
                Err(e) => warn!("Ignoring modality request: {}", e),
            }
        }
        if specs.is_empty() {
            return Err(CompileError::NoModalities);
        }
        Ok(specs)
    }

    pub fn is_user_select(&self) -> bool {
        self.policy == SelectionPolicy::UserSelect
    }
}

impl fmt::Display for ModalitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.imager, self.type_name)?;
        match self.policy {
            SelectionPolicy::Unique => Ok(()),
            SelectionPolicy::FixedIndex(i) => write!(f, " (#{})", i + 1),
            SelectionPolicy::UserSelect => f.write_str(SELECT_SUFFIX),
        }
    }
}

/// Pick the asset for one slot out of a subject/eye bucket.
///
/// `bucket` may hold assets of any type; only those matching the spec's
/// imager and type are candidates. Candidates keep their incoming order
/// (lexicographic path order from discovery) and are then sorted stably by
/// sequence number.
///
/// Returns `Ok(None)` when no file fits, which is a normal outcome. The only
/// error is a selector answer that is not one of the offered candidates.
pub fn resolve<'a>(
    bucket: &'a [ImageAsset],
    spec: &ModalitySpec,
    selector: &dyn ImageSelector,
    title: &str,
) -> Result<Option<&'a ImageAsset>, AssetError> {
    let mut matches: Vec<&ImageAsset> = bucket
        .iter()
        .filter(|a| a.imager == spec.imager && a.type_name == spec.type_name)
        .collect();

    if matches.is_empty() {
        return Ok(None);
    }
    if matches.len() == 1 && spec.policy == SelectionPolicy::Unique {
        return Ok(Some(matches[0]));
    }

    matches.sort_by_key(|a| a.sequence_number);

    match spec.policy {
        SelectionPolicy::FixedIndex(i) => {
            let picked = matches.get(i).copied();
            if picked.is_none() {
                debug!(
                    "{}: index {} out of range ({} candidates)",
                    title,
                    i + 1,
                    matches.len()
                );
            }
            Ok(picked)
        }
        SelectionPolicy::UserSelect => {
            let candidates: Vec<ImageAsset> = matches.iter().map(|a| (*a).clone()).collect();
            match selector.request_disambiguation(&candidates, title) {
                None => Ok(None),
                Some(path) => matches
                    .iter()
                    .find(|a| a.path == path)
                    .copied()
                    .map(Some)
                    .ok_or(AssetError::UnknownSelection { path }),
            }
        }
        SelectionPolicy::Unique => {
            warn!(
                "{}: {} files match a single-image slot, using {}",
                title,
                matches.len(),
                matches[0].path.display()
            );
            Ok(Some(matches[0]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::discover::Eye;
    use crate::selection::{FirstCandidate, NoSelection, NthCandidate};
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn planar(seq: u32, type_name: &str) -> ImageAsset {
        ImageAsset {
            path: PathBuf::from(format!("/d/7/OD/{seq:02}_7_OD_{type_name}.png")),
            subject_id: "7".into(),
            eye: Eye::Right,
            imager: Imager::Planar,
            type_name: type_name.into(),
            sequence_number: seq,
        }
    }

    fn spec(request: &str) -> ModalitySpec {
        ModalitySpec::parse(request, "").expect("valid request")
    }

    #[test]
    fn parses_ordinal_request() {
        let s = ModalitySpec::parse("cSLO BAF (2nd)", "BAF").unwrap();
        assert_eq!(s.imager, Imager::Planar);
        assert_eq!(s.type_name, "BAF");
        assert_eq!(s.policy, SelectionPolicy::FixedIndex(1));
        assert_eq!(s.display_name, "BAF");
    }

    #[test]
    fn parses_select_request() {
        let s = ModalitySpec::parse("OCT vertical [select]", "Vertical").unwrap();
        assert_eq!(s.imager, Imager::CrossSectional);
        assert_eq!(s.type_name, "vertical");
        assert_eq!(s.policy, SelectionPolicy::UserSelect);
        assert!(s.is_user_select());
    }

    #[test]
    fn ordinal_is_stripped_before_select() {
        let s = spec("cSLO BAF [select] (3rd)");
        assert_eq!(s.type_name, "BAF");
        assert_eq!(s.policy, SelectionPolicy::FixedIndex(2));

        // Ordinal not at the end: only [select] is recognised.
        let s = spec("cSLO BAF (2nd) [select]");
        assert_eq!(s.type_name, "BAF (2nd)");
        assert_eq!(s.policy, SelectionPolicy::UserSelect);
    }

    #[test]
    fn remainder_is_trimmed_and_display_defaults() {
        let s = spec("cSLO  IR 820 ");
        assert_eq!(s.type_name, "IR 820");
        assert_eq!(s.display_name, "IR 820");
        assert_eq!(s.policy, SelectionPolicy::Unique);
    }

    #[test]
    fn parse_errors() {
        assert!(ModalitySpec::parse("BAF", "").is_err());
        assert!(ModalitySpec::parse("fundus BAF", "").is_err());
        assert!(ModalitySpec::parse("cSLO BAF (0th)", "").is_err());
        assert!(ModalitySpec::parse("cSLO  ", "").is_err());
    }

    #[test]
    fn parse_all_skips_invalid_and_fails_when_empty() {
        let reqs = vec![
            ModalityRequest {
                request: "nonsense".into(),
                display_name: "x".into(),
            },
            ModalityRequest {
                request: "OCT horizontal".into(),
                display_name: "H".into(),
            },
        ];
        let specs = ModalitySpec::parse_all(&reqs).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].display_name, "H");

        let err = ModalitySpec::parse_all(&reqs[..1]).unwrap_err();
        assert!(matches!(err, CompileError::NoModalities));
    }

    #[test]
    fn single_match_returned_regardless_of_sequence() {
        let bucket = [planar(9, "BAF"), planar(1, "IRAF")];
        let got = resolve(&bucket, &spec("cSLO BAF"), &NoSelection, "t").unwrap();
        assert_eq!(got.map(|a| a.sequence_number), Some(9));
    }

    #[test]
    fn missing_type_is_none() {
        let bucket = [planar(1, "IRAF")];
        assert_eq!(resolve(&bucket, &spec("cSLO BAF"), &NoSelection, "t"), Ok(None));
    }

    #[test]
    fn imager_must_match() {
        let bucket = [planar(1, "BAF")];
        assert_eq!(resolve(&bucket, &spec("OCT BAF"), &NoSelection, "t"), Ok(None));
    }

    #[test]
    fn fixed_index_uses_sequence_order() {
        let bucket = [planar(5, "BAF"), planar(2, "BAF"), planar(3, "BAF")];
        let got = resolve(&bucket, &spec("cSLO BAF (2nd)"), &NoSelection, "t").unwrap();
        assert_eq!(got.map(|a| a.sequence_number), Some(3));
    }

    #[test]
    fn fixed_index_out_of_range_is_none() {
        let bucket = [planar(1, "BAF"), planar(2, "BAF"), planar(3, "BAF")];
        assert_eq!(
            resolve(&bucket, &spec("cSLO BAF (6th)"), &FirstCandidate, "t"),
            Ok(None)
        );
    }

    #[test]
    fn fixed_index_applies_to_single_match() {
        let bucket = [planar(4, "BAF")];
        assert!(resolve(&bucket, &spec("cSLO BAF (1st)"), &NoSelection, "t")
            .unwrap()
            .is_some());
        assert_eq!(
            resolve(&bucket, &spec("cSLO BAF (2nd)"), &NoSelection, "t"),
            Ok(None)
        );
    }

    #[test]
    fn unique_with_several_matches_takes_first_in_sequence() {
        let bucket = [planar(8, "BAF"), planar(3, "BAF")];
        let got = resolve(&bucket, &spec("cSLO BAF"), &NoSelection, "t").unwrap();
        assert_eq!(got.map(|a| a.sequence_number), Some(3));
    }

    struct RecordingSelector {
        seen: Mutex<Vec<(Vec<u32>, String)>>,
    }

    impl ImageSelector for RecordingSelector {
        fn request_disambiguation(&self, candidates: &[ImageAsset], title: &str) -> Option<PathBuf> {
            self.seen.lock().unwrap().push((
                candidates.iter().map(|c| c.sequence_number).collect(),
                title.to_string(),
            ));
            candidates.last().map(|c| c.path.clone())
        }
    }

    #[test]
    fn user_select_passes_sorted_candidates_and_title() {
        let bucket = [planar(6, "BAF"), planar(2, "BAF"), planar(1, "IRAF")];
        let selector = RecordingSelector {
            seen: Mutex::new(Vec::new()),
        };
        let got = resolve(&bucket, &spec("cSLO BAF [select]"), &selector, "7 OD - BAF").unwrap();
        assert_eq!(got.map(|a| a.sequence_number), Some(6));
        let seen = selector.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), [(vec![2, 6], "7 OD - BAF".to_string())]);
    }

    #[test]
    fn user_select_none_and_nth() {
        let bucket = [planar(2, "BAF"), planar(1, "BAF")];
        let s = spec("cSLO BAF [select]");
        assert_eq!(resolve(&bucket, &s, &NoSelection, "t"), Ok(None));
        let got = resolve(&bucket, &s, &NthCandidate(0), "t").unwrap();
        assert_eq!(got.map(|a| a.sequence_number), Some(1));
    }

    struct Stranger;

    impl ImageSelector for Stranger {
        fn request_disambiguation(&self, _c: &[ImageAsset], _t: &str) -> Option<PathBuf> {
            Some(PathBuf::from("/elsewhere.png"))
        }
    }

    #[test]
    fn unknown_selection_is_reported() {
        let bucket = [planar(1, "BAF"), planar(2, "BAF")];
        let err = resolve(&bucket, &spec("cSLO BAF [select]"), &Stranger, "t").unwrap_err();
        assert!(matches!(err, AssetError::UnknownSelection { .. }));
    }
}
