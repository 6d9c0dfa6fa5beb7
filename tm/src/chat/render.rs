//! Korean reply templates

use chrono::{DateTime, NaiveDateTime};

use crate::domain::{ItineraryStop, Plan, kst};
use crate::error::{AssistantError, ErrorKind};
use crate::interpret::Unrecognized;
use crate::proposal::KeptStop;
use crate::session::{ChangeRecord, PendingProposal};

pub const HELP_TEXT: &str = "이런 요청을 할 수 있어요.\n\
- \"비 오면 갈 만한 실내 대안 찾아줘\": 비 예보가 있는 일정의 실내 대안을 찾아요\n\
- \"두 번째 대안으로 해줘\", \"경포호 첫 번째 대안\": 제안된 대안으로 바꿔요\n\
- \"되돌려줘\": 마지막 변경을 취소해요\n\
- \"처음 일정으로\": 원래 일정으로 초기화해요\n\
- \"일정 보여줘\", \"변경 내역\": 현재 일정과 변경 내역을 보여줘요";

/// "08/20 13:00" for an itinerary timestamp, the raw text when unparseable
fn short_time(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&kst()).format("%m/%d %H:%M").to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return naive.format("%m/%d %H:%M").to_string();
    }
    raw.to_string()
}

fn stop_line(stop: &ItineraryStop) -> String {
    let mut line = format!("{}. [{}] {}", stop.index, stop.kind, stop.title);
    match (stop.start_time.as_deref(), stop.end_time.as_deref()) {
        (Some(start), Some(end)) => line.push_str(&format!(" ({} ~ {})", short_time(start), short_time(end))),
        (Some(start), None) => line.push_str(&format!(" ({})", short_time(start))),
        _ => {}
    }
    if let Some(rating) = stop.rating {
        line.push_str(&format!(" ★{:.1}", rating));
    }
    if !stop.parking.is_empty() {
        let lots: Vec<String> = stop
            .parking
            .iter()
            .map(|p| format!("{}({:.2}km)", p.name, p.distance_km))
            .collect();
        line.push_str(&format!("\n   주차: {}", lots.join(", ")));
    }
    line
}

pub fn plan(plan: &Plan) -> String {
    if plan.is_empty() {
        return "일정이 비어 있어요.".to_string();
    }
    let mut out = String::from("현재 일정이에요.\n");
    out.push_str(&plan.itinerary.iter().map(stop_line).collect::<Vec<_>>().join("\n"));
    if plan.totals.estimated_cost_krw > 0 || plan.totals.estimated_travel_time_minutes > 0 {
        out.push_str(&format!(
            "\n예상 비용 {}원 · 이동 {}분",
            plan.totals.estimated_cost_krw, plan.totals.estimated_travel_time_minutes
        ));
    }
    out
}

pub fn proposal(pending: &PendingProposal) -> String {
    let mut out = if pending.degraded {
        String::from("날씨 정보를 가져오지 못해서 비가 온다고 가정하고 실내 대안을 찾아봤어요.\n")
    } else {
        String::from("비 예보가 있는 일정의 실내 대안이에요.\n")
    };
    for group in &pending.groups {
        out.push_str(&format!("\n[{}] {}\n", group.stop_index, group.stop_title));
        for (i, cand) in group.candidates.iter().enumerate() {
            let rating = cand
                .rating
                .map(|r| format!("★{:.1}", r))
                .unwrap_or_else(|| "평점 없음".to_string());
            out.push_str(&format!(
                "  {}. {} · {} · {:.2}km · {}\n",
                i + 1,
                cand.title,
                rating,
                cand.distance_km,
                cand.address
            ));
        }
    }
    out.push_str("\n\"두 번째 대안으로 해줘\"처럼 골라 주세요.");
    if pending.groups.len() > 1 {
        out.push_str(" 장소가 여러 곳이면 \"경포호 두 번째 대안\"처럼 장소 이름도 함께 말해 주세요.");
    }
    out
}

pub fn nothing_to_propose(degraded: bool, kept: &[KeptStop]) -> String {
    let head = if degraded {
        "날씨 정보를 가져오지 못했지만, 바꿀 만한 야외 일정이 없어요."
    } else {
        "비 예보와 겹치는 야외 일정이 없어서 바꿀 필요가 없어요."
    };
    if kept.is_empty() {
        head.to_string()
    } else {
        format!("{} (검토한 일정 {}곳)", head, kept.len())
    }
}

pub fn applied(record: &ChangeRecord) -> String {
    format!(
        "{}번 일정 '{}'을(를) '{}'(으)로 바꿨어요. 되돌리려면 \"되돌려줘\"라고 말해 주세요.",
        record.stop_index, record.before.title, record.after.title
    )
}

pub fn rolled_back(record: &ChangeRecord) -> String {
    format!(
        "{}번 일정을 '{}'에서 '{}'(으)로 되돌렸어요.",
        record.stop_index, record.after.title, record.before.title
    )
}

pub fn reset() -> String {
    "처음 일정으로 되돌렸어요. 변경 내역도 모두 지웠어요.".to_string()
}

pub fn history(records: &[ChangeRecord]) -> String {
    if records.is_empty() {
        return "아직 변경한 내역이 없어요.".to_string();
    }
    let lines: Vec<String> = records
        .iter()
        .map(|r| {
            format!(
                "#{} {}번 일정: {} → {} ({})",
                r.seq,
                r.stop_index,
                r.before.title,
                r.after.title,
                r.applied_at.with_timezone(&kst()).format("%H:%M:%S")
            )
        })
        .collect();
    format!("변경 내역이에요.\n{}", lines.join("\n"))
}

const AMBIGUOUS_PREFIX: &str = "죄송해요, 어떤 대안인지 확실하지 않아요.";

const NO_PENDING: &str = "죄송해요, 지금은 고를 수 있는 대안이 없어요. 먼저 \"실내 대안 찾아줘\"라고 말해 주세요.";

/// Apologetic reply plus the clarification the user needs next
pub fn unrecognized(reason: &Unrecognized) -> String {
    match reason {
        Unrecognized::Intent => format!("죄송해요, 무엇을 원하시는지 이해하지 못했어요.\n{}", HELP_TEXT),
        Unrecognized::AmbiguousReference { prompt, .. } => format!("{} {}", AMBIGUOUS_PREFIX, prompt),
        Unrecognized::NoPendingProposal => NO_PENDING.to_string(),
    }
}

/// Apologetic reply for an error; never echoes the raw error text
pub fn error(err: &AssistantError) -> String {
    match err.kind() {
        ErrorKind::SessionNotFound => "죄송해요, 세션을 찾을 수 없어요. 일정을 먼저 등록해 주세요.".to_string(),
        ErrorKind::AlreadyInitialized => "죄송해요, 이 세션에는 이미 일정이 등록되어 있어요.".to_string(),
        ErrorKind::IndexOutOfRange => "죄송해요, 해당 번호의 일정이나 대안을 찾을 수 없어요.".to_string(),
        ErrorKind::NothingToRollback => "죄송해요, 되돌릴 변경 내역이 없어요.".to_string(),
        ErrorKind::AdapterUnavailable => {
            "죄송해요, 외부 서비스에 연결하지 못했어요. 잠시 후 다시 시도해 주세요.".to_string()
        }
        ErrorKind::AmbiguousReference => match err {
            AssistantError::AmbiguousReference(prompt) => format!("{} {}", AMBIGUOUS_PREFIX, prompt),
            _ => AMBIGUOUS_PREFIX.to_string(),
        },
        ErrorKind::Unrecognized => "죄송해요, 요청을 이해하지 못했어요.".to_string(),
        ErrorKind::NoPendingProposal => NO_PENDING.to_string(),
        ErrorKind::InvalidArgument => "죄송해요, 요청 값이 올바르지 않아요.".to_string(),
        ErrorKind::Conflict => {
            "죄송해요, 그사이 일정이 바뀌어서 이 대안은 더 이상 맞지 않아요. 대안을 다시 찾아 드릴까요?".to_string()
        }
    }
}
