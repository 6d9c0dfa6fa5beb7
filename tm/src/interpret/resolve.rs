//! Resolving "which alternative" from free text
//!
//! Rules, first match wins:
//! 1. a stop title together with an ordinal ("경포호 두 번째 대안")
//! 2. a candidate title, exact then by token overlap
//! 3. an ordinal into the focused stop's list
//!
//! A stop named without a usable ordinal comes back as an ambiguous reference
//! carrying that stop, so the caller can focus it for the next turn.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use super::{TargetRef, Unrecognized};
use crate::session::{PendingProposal, ProposalGroup, Session};

static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<ko>첫|두|둘|세|셋|네|넷|다섯|여섯|일곱|여덟|아홉|열)\s*(?:번\s*)?째|(?P<kn>\d+)\s*번(?:\s*째)?|\b(?P<en>\d+)\s*(?:st|nd|rd|th)\b|\b(?P<ew>first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth)\b|(?P<last>마지막|\blast\b)",
    )
    .expect("valid ordinal regex")
});

/// Trailing particles dropped from tokens before fuzzy matching, longest first
const PARTICLES: &[&str] = &[
    "으로요", "이랑", "에서", "으로", "하고", "로요", "로", "을", "를", "이", "가", "은", "는", "에", "의", "랑", "와",
    "과",
];

/// Filler words that never identify a place
const STOPWORDS: &[&str] = &[
    "대안", "해줘", "해주세요", "그걸", "바꿔줘", "바꿔", "변경", "변경해줘", "그걸로", "이걸로", "저걸로", "선택", "선택할게",
    "할게", "주세요", "그거", "이거", "걸로", "대신", "please", "change", "use", "pick", "the", "option", "alternative",
];

/// A position in a candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordinal {
    /// 0-based position
    Nth(usize),
    Last,
}

impl Ordinal {
    pub fn index_in(self, len: usize) -> Option<usize> {
        match self {
            Ordinal::Nth(i) if i < len => Some(i),
            Ordinal::Last if len > 0 => Some(len - 1),
            _ => None,
        }
    }
}

fn ordinal_from(caps: &Captures<'_>) -> Option<Ordinal> {
    let nth = |n: usize| n.checked_sub(1).map(Ordinal::Nth);
    if let Some(m) = caps.name("ko") {
        let n = match m.as_str() {
            "첫" => 1,
            "두" | "둘" => 2,
            "세" | "셋" => 3,
            "네" | "넷" => 4,
            "다섯" => 5,
            "여섯" => 6,
            "일곱" => 7,
            "여덟" => 8,
            "아홉" => 9,
            "열" => 10,
            _ => return None,
        };
        return nth(n);
    }
    if let Some(m) = caps.name("kn").or_else(|| caps.name("en")) {
        return m.as_str().parse().ok().and_then(nth);
    }
    if let Some(m) = caps.name("ew") {
        let n = match m.as_str().to_lowercase().as_str() {
            "first" => 1,
            "second" => 2,
            "third" => 3,
            "fourth" => 4,
            "fifth" => 5,
            "sixth" => 6,
            "seventh" => 7,
            "eighth" => 8,
            "ninth" => 9,
            "tenth" => 10,
            _ => return None,
        };
        return nth(n);
    }
    caps.name("last").map(|_| Ordinal::Last)
}

/// First ordinal expression in the text
pub fn parse_ordinal(text: &str) -> Option<Ordinal> {
    ORDINAL_RE.captures_iter(text).find_map(|caps| ordinal_from(&caps))
}

/// Lowercase with whitespace and punctuation removed
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn strip_particle(token: &str) -> &str {
    for particle in PARTICLES {
        if let Some(stem) = token.strip_suffix(particle) {
            if stem.chars().count() >= 2 {
                return stem;
            }
        }
    }
    token
}

/// Content tokens of a message, ordinals removed
fn content_tokens(text: &str) -> Vec<String> {
    let without_ordinals = ORDINAL_RE.replace_all(text, " ");
    without_ordinals
        .split_whitespace()
        .map(|t| normalize(strip_particle(t)))
        .map(|t| strip_particle(&t).to_string())
        .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn ambiguous(prompt: impl Into<String>) -> Unrecognized {
    Unrecognized::AmbiguousReference {
        prompt: prompt.into(),
        focus: None,
    }
}

fn ambiguous_at(group: &ProposalGroup, prompt: impl Into<String>) -> Unrecognized {
    Unrecognized::AmbiguousReference {
        prompt: prompt.into(),
        focus: Some(group.stop_index),
    }
}

fn pick(group: &ProposalGroup, ordinal: Ordinal) -> Result<TargetRef, Unrecognized> {
    match ordinal.index_in(group.candidates.len()) {
        Some(alternative_index) => Ok(TargetRef {
            stop_index: group.stop_index,
            alternative_index,
        }),
        None => Err(ambiguous_at(
            group,
            format!(
                "'{}' 대안은 {}개뿐이에요. 1~{} 중에서 골라 주세요.",
                group.stop_title,
                group.candidates.len(),
                group.candidates.len()
            ),
        )),
    }
}

/// Groups whose stop title appears in the text
fn mentioned_stops<'a>(pending: &'a PendingProposal, text: &str) -> Vec<&'a ProposalGroup> {
    let haystack = normalize(text);
    pending
        .groups
        .iter()
        .filter(|g| {
            let title = normalize(&g.stop_title);
            !title.is_empty() && haystack.contains(&title)
        })
        .collect()
}

fn list_titles<'a>(titles: impl Iterator<Item = &'a str>) -> String {
    titles.map(|t| format!("'{}'", t)).collect::<Vec<_>>().join(", ")
}

/// Candidates whose full title appears in the text; the longest titles win
fn exact_matches<'a>(pending: &'a PendingProposal, text: &str) -> Vec<(&'a ProposalGroup, usize)> {
    let haystack = normalize(text);
    let mut best_len = 0usize;
    let mut matches = Vec::new();
    for group in &pending.groups {
        for (i, cand) in group.candidates.iter().enumerate() {
            let needle = normalize(&cand.title);
            if needle.chars().count() < 2 || !haystack.contains(&needle) {
                continue;
            }
            let len = needle.chars().count();
            if len > best_len {
                best_len = len;
                matches.clear();
            }
            if len == best_len {
                matches.push((group, i));
            }
        }
    }
    matches
}

/// Candidates sharing the most content tokens with the text
fn fuzzy_matches<'a>(pending: &'a PendingProposal, text: &str) -> Vec<(&'a ProposalGroup, usize)> {
    let tokens = content_tokens(text);
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut best = 0usize;
    let mut matches = Vec::new();
    for group in &pending.groups {
        for (i, cand) in group.candidates.iter().enumerate() {
            let title = normalize(&cand.title);
            let score = tokens.iter().filter(|t| title.contains(t.as_str())).count();
            if score == 0 {
                continue;
            }
            if score > best {
                best = score;
                matches.clear();
            }
            if score == best {
                matches.push((group, i));
            }
        }
    }
    matches
}

fn single_match(matches: Vec<(&ProposalGroup, usize)>) -> Option<Result<TargetRef, Unrecognized>> {
    match matches.as_slice() {
        [] => None,
        [(group, i)] => Some(Ok(TargetRef {
            stop_index: group.stop_index,
            alternative_index: *i,
        })),
        many => Some(Err(ambiguous(format!(
            "여러 후보와 일치해요: {}. 어느 것으로 바꿀까요?",
            list_titles(many.iter().map(|(g, i)| g.candidates[*i].title.as_str()))
        )))),
    }
}

/// Resolve which pending alternative the text refers to
pub fn resolve_target(session: &Session, text: &str) -> Result<TargetRef, Unrecognized> {
    debug!(key = %session.key, %text, "resolve_target: called");
    let Some(pending) = session.pending_proposal.as_ref().filter(|p| !p.groups.is_empty()) else {
        return Err(Unrecognized::NoPendingProposal);
    };
    let ordinal = parse_ordinal(text);
    let mentioned = mentioned_stops(pending, text);

    // combined form: stop title plus ordinal
    if let Some(ordinal) = ordinal {
        match mentioned.as_slice() {
            [group] => {
                debug!(stop_index = group.stop_index, ?ordinal, "resolve_target: combined form");
                return pick(group, ordinal);
            }
            [] => {}
            many => {
                return Err(ambiguous(format!(
                    "{} 중 어느 장소의 대안인지 하나만 골라 주세요.",
                    list_titles(many.iter().map(|g| g.stop_title.as_str()))
                )));
            }
        }
    }

    // candidate title
    if let Some(result) = single_match(exact_matches(pending, text)) {
        debug!(?result, "resolve_target: exact title");
        return result;
    }
    if let Some(result) = single_match(fuzzy_matches(pending, text)) {
        debug!(?result, "resolve_target: fuzzy title");
        return result;
    }

    // ordinal into the focused list
    if let Some(ordinal) = ordinal {
        let focus = match pending.groups.as_slice() {
            [only] => Some(only),
            _ => session.focus_stop.and_then(|index| pending.group(index)),
        };
        return match focus {
            Some(group) => {
                debug!(stop_index = group.stop_index, ?ordinal, "resolve_target: ordinal in focus");
                pick(group, ordinal)
            }
            None => Err(ambiguous(format!(
                "어느 장소의 대안인지 알려 주세요. 예: \"{} 두 번째 대안\" (대상: {})",
                pending.groups[0].stop_title,
                list_titles(pending.groups.iter().map(|g| g.stop_title.as_str()))
            ))),
        };
    }

    // a stop named on its own becomes the focus for the next ordinal
    if let [group] = mentioned.as_slice() {
        debug!(stop_index = group.stop_index, "resolve_target: stop named without ordinal");
        return Err(ambiguous_at(
            group,
            format!(
                "'{}' 대안 중 몇 번째로 바꿀까요? 1~{} 중에서 골라 주세요.",
                group.stop_title,
                group.candidates.len()
            ),
        ));
    }

    Err(ambiguous("어떤 대안으로 바꿀지 알려 주세요. 예: \"두 번째 대안으로 해줘\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItineraryStop, Plan};
    use crate::proposal::AlternativeCandidate;

    fn cand(title: &str) -> AlternativeCandidate {
        AlternativeCandidate {
            title: title.to_string(),
            rating: None,
            distance_km: 1.0,
            address: String::new(),
            place_id: None,
            lat: 0.0,
            lng: 0.0,
        }
    }

    fn session_with(groups: &[(usize, &str, &[&str])], focus: Option<usize>) -> Session {
        let plan = Plan::new(vec![
            ItineraryStop::new(1, "강릉 단오제"),
            ItineraryStop::new(2, "경포호"),
            ItineraryStop::new(3, "안목해변"),
        ]);
        let mut session = Session::new("s", plan);
        session.pending_proposal = Some(PendingProposal {
            id: "p".to_string(),
            groups: groups
                .iter()
                .map(|(index, stop, titles)| ProposalGroup {
                    stop_index: *index,
                    stop_title: stop.to_string(),
                    candidates: titles.iter().map(|t| cand(t)).collect(),
                })
                .collect(),
            degraded: false,
            plan_version: 0,
            created_at: chrono::Utc::now(),
        });
        session.focus_stop = focus;
        session
    }

    fn lake_only() -> Session {
        session_with(
            &[(2, "경포호", &["강릉시립미술관", "참소리축음기박물관", "카페 툇마루"])],
            Some(2),
        )
    }

    fn two_groups(focus: Option<usize>) -> Session {
        session_with(
            &[
                (2, "경포호", &["강릉시립미술관", "참소리축음기박물관"]),
                (3, "안목해변", &["안목 커피거리 갤러리", "강릉 아쿠아리움", "카페 툇마루"]),
            ],
            focus,
        )
    }

    fn target(stop_index: usize, alternative_index: usize) -> TargetRef {
        TargetRef {
            stop_index,
            alternative_index,
        }
    }

    #[test]
    fn test_parse_ordinal_korean() {
        assert_eq!(parse_ordinal("첫 번째로 해줘"), Some(Ordinal::Nth(0)));
        assert_eq!(parse_ordinal("두 번째 대안으로 해줘"), Some(Ordinal::Nth(1)));
        assert_eq!(parse_ordinal("두번째"), Some(Ordinal::Nth(1)));
        assert_eq!(parse_ordinal("셋째 거"), Some(Ordinal::Nth(2)));
        assert_eq!(parse_ordinal("2번으로"), Some(Ordinal::Nth(1)));
        assert_eq!(parse_ordinal("3 번째"), Some(Ordinal::Nth(2)));
        assert_eq!(parse_ordinal("마지막 걸로"), Some(Ordinal::Last));
    }

    #[test]
    fn test_parse_ordinal_english() {
        assert_eq!(parse_ordinal("the second one"), Some(Ordinal::Nth(1)));
        assert_eq!(parse_ordinal("Third please"), Some(Ordinal::Nth(2)));
        assert_eq!(parse_ordinal("use the 2nd"), Some(Ordinal::Nth(1)));
        assert_eq!(parse_ordinal("pick the last"), Some(Ordinal::Last));
        assert_eq!(parse_ordinal("0th"), None);
        assert_eq!(parse_ordinal("미술관으로 바꿔줘"), None);
    }

    #[test]
    fn test_ordinal_index_in() {
        assert_eq!(Ordinal::Nth(1).index_in(3), Some(1));
        assert_eq!(Ordinal::Nth(3).index_in(3), None);
        assert_eq!(Ordinal::Last.index_in(3), Some(2));
        assert_eq!(Ordinal::Last.index_in(0), None);
    }

    #[test]
    fn test_ordinal_in_focus() {
        assert_eq!(resolve_target(&lake_only(), "두 번째 대안으로 해줘"), Ok(target(2, 1)));
        assert_eq!(resolve_target(&lake_only(), "마지막"), Ok(target(2, 2)));
        assert_eq!(resolve_target(&two_groups(Some(3)), "세 번째"), Ok(target(3, 2)));
    }

    #[test]
    fn test_ordinal_out_of_range_is_ambiguous() {
        let err = resolve_target(&lake_only(), "다섯 번째").unwrap_err();
        assert!(matches!(err, Unrecognized::AmbiguousReference { .. }));
    }

    #[test]
    fn test_ordinal_without_focus_is_ambiguous() {
        let err = resolve_target(&two_groups(None), "두 번째").unwrap_err();
        match err {
            Unrecognized::AmbiguousReference { prompt, focus } => {
                assert!(prompt.contains("안목해변"));
                assert_eq!(focus, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_combined_form_overrides_focus() {
        assert_eq!(
            resolve_target(&two_groups(Some(3)), "경포호 두 번째 대안으로 해줘"),
            Ok(target(2, 1))
        );
        assert_eq!(resolve_target(&two_groups(None), "안목해변 첫 번째 대안"), Ok(target(3, 0)));
    }

    #[test]
    fn test_stop_named_without_ordinal_reports_focus() {
        match resolve_target(&two_groups(None), "경포호 대안으로 할게").unwrap_err() {
            Unrecognized::AmbiguousReference { prompt, focus } => {
                assert_eq!(focus, Some(2));
                assert!(prompt.contains("'경포호'"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            resolve_target(&two_groups(None), "그걸로 해줘"),
            Err(Unrecognized::AmbiguousReference { focus: None, .. })
        ));
    }

    #[test]
    fn test_out_of_range_keeps_named_stop() {
        assert!(matches!(
            resolve_target(&two_groups(None), "경포호 다섯 번째"),
            Err(Unrecognized::AmbiguousReference { focus: Some(2), .. })
        ));
    }

    #[test]
    fn test_exact_title() {
        assert_eq!(
            resolve_target(&two_groups(None), "참소리축음기박물관으로 바꿔줘"),
            Ok(target(2, 1))
        );
        assert_eq!(resolve_target(&two_groups(None), "강릉 아쿠아리움"), Ok(target(3, 1)));
    }

    #[test]
    fn test_fuzzy_title() {
        assert_eq!(resolve_target(&two_groups(None), "축음기 박물관으로 해줘"), Ok(target(2, 1)));
        assert_eq!(resolve_target(&two_groups(None), "아쿠아리움으로"), Ok(target(3, 1)));
    }

    #[test]
    fn test_fuzzy_tie_is_ambiguous() {
        // "강릉" appears in two candidate titles
        let err = resolve_target(&two_groups(None), "강릉으로 해줘").unwrap_err();
        match err {
            Unrecognized::AmbiguousReference { prompt, .. } => {
                assert!(prompt.contains("강릉시립미술관"));
                assert!(prompt.contains("강릉 아쿠아리움"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_no_pending_proposal() {
        let mut session = lake_only();
        session.pending_proposal = None;
        assert_eq!(
            resolve_target(&session, "두 번째"),
            Err(Unrecognized::NoPendingProposal)
        );
    }

    #[test]
    fn test_nothing_resolvable() {
        assert!(matches!(
            resolve_target(&lake_only(), "그걸로 해줘"),
            Err(Unrecognized::AmbiguousReference { .. })
        ));
    }
}
