//! Announcement embeds for running and finished giveaways, plus the lossy
//! reverse mapping used when a drawing's stored record is gone.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{DrawingRecord, Participant, Presentation, PresentationField, Snowflake};

const RUNNING_COLOR: u32 = 0x00FFFF;
const ENDED_COLOR: u32 = 0x36393F;

pub const FIELD_ENDS: &str = "Ends";
pub const FIELD_WINNER_COUNT: &str = "Winner Count";
pub const FIELD_REQUIREMENT: &str = "Requirement";
pub const FIELD_WINNERS: &str = "Winners";
pub const FIELD_PARTICIPANTS: &str = "Participants";

static PRIZE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*\*\*prize:\*\*\s*`([^`]*)`").unwrap());
static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());
static ROLE_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@&(\d+)>").unwrap());
static HOSTED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Hosted by (.+?)\s*\|").unwrap());

/// Drawing parameters recovered from a posted embed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveredDrawing {
    pub prize: Option<String>,
    pub winners: Option<u32>,
    pub required_role_id: Option<Snowflake>,
    pub creator_name: Option<String>,
}

/// How a drawing reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    Drawn,
    Rerolled,
    ManuallyPicked,
}

/// Parameters shared by every terminal embed
#[derive(Debug, Clone)]
pub struct EndedView<'a> {
    pub prize: &'a str,
    pub winner_count: u32,
    pub required_role_id: Option<Snowflake>,
    pub creator_name: &'a str,
}

fn display_prize(prize: &str) -> String {
    prize.replace('`', "'")
}

fn requirement_value(required_role_id: Option<Snowflake>) -> String {
    match required_role_id {
        Some(role) => format!("Requires the <@&{role}> role."),
        None => "`None`".to_string(),
    }
}

pub fn mention_list(winners: &[Participant]) -> String {
    winners
        .iter()
        .map(Participant::mention)
        .collect::<Vec<_>>()
        .join(", ")
}

/// 进行中的抽奖 Embed
pub fn running(record: &DrawingRecord, entry_emoji: &str) -> Presentation {
    Presentation {
        title: "🎉 Giveaway in progress 🎉".to_string(),
        description: format!(
            "React with {entry_emoji} to enter!\n\n**Prize:** `{}`",
            display_prize(&record.prize)
        ),
        color: RUNNING_COLOR,
        fields: vec![
            PresentationField {
                name: FIELD_ENDS.to_string(),
                value: format!("<t:{}:R>", record.end_time.timestamp()),
                inline: true,
            },
            PresentationField {
                name: FIELD_WINNER_COUNT.to_string(),
                value: format!("`{}`", record.winners),
                inline: true,
            },
            PresentationField {
                name: FIELD_REQUIREMENT.to_string(),
                value: requirement_value(record.required_role_id),
                inline: false,
            },
        ],
        footer: Some(format!("Hosted by {} | Status: RUNNING", record.creator_name)),
    }
}

/// 已结束的抽奖 Embed；保留奖品/人数/条件以便之后重抽
pub fn ended(
    view: &EndedView<'_>,
    winners: &[Participant],
    participant_count: usize,
    kind: EndKind,
) -> Presentation {
    let title = match kind {
        EndKind::ManuallyPicked => "👑 Giveaway ended (manually decided) 👑",
        EndKind::Drawn | EndKind::Rerolled => "✅ Giveaway ended ✅",
    };
    let prize = display_prize(view.prize);
    let (description, winners_value) = if winners.is_empty() {
        (
            format!("**Prize:** `{prize}`\n\nNo eligible participants this time."),
            "`None`".to_string(),
        )
    } else {
        (
            format!("**Prize:** `{prize}`\n\nCongratulations to the winners!"),
            mention_list(winners),
        )
    };

    Presentation {
        title: title.to_string(),
        description,
        color: ENDED_COLOR,
        fields: vec![
            PresentationField {
                name: FIELD_WINNERS.to_string(),
                value: winners_value,
                inline: false,
            },
            PresentationField {
                name: FIELD_PARTICIPANTS.to_string(),
                value: format!("`{participant_count}`"),
                inline: true,
            },
            PresentationField {
                name: FIELD_WINNER_COUNT.to_string(),
                value: format!("`{}`", view.winner_count),
                inline: true,
            },
            PresentationField {
                name: FIELD_REQUIREMENT.to_string(),
                value: requirement_value(view.required_role_id),
                inline: false,
            },
        ],
        footer: Some(format!("Hosted by {} | Status: ENDED", view.creator_name)),
    }
}

/// 频道中的开奖公告文本
pub fn result_text(prize: &str, winners: &[Participant], kind: EndKind) -> String {
    let prize = display_prize(prize);
    match (kind, winners.is_empty()) {
        (EndKind::Drawn, false) => format!(
            "🎉 **Giveaway ended!**\nPrize: `{prize}`\n\nCongratulations {}!",
            mention_list(winners)
        ),
        (EndKind::Drawn, true) => format!(
            "🎉 **Giveaway ended!**\nPrize: `{prize}`\n\nUnfortunately there were no eligible participants."
        ),
        (EndKind::Rerolled, false) => format!(
            "🔄 **Reroll!**\nCongratulations to the new winners of `{prize}`: {}",
            mention_list(winners)
        ),
        (EndKind::Rerolled, true) => {
            format!("🔄 Tried to reroll `{prize}`, but there are no eligible participants.")
        }
        (EndKind::ManuallyPicked, _) => format!(
            "👑 **Giveaway result decided!** 👑\nPrize: `{prize}`\n\nAn administrator picked the winners: {}",
            mention_list(winners)
        ),
    }
}

/// 从 Embed 尽力还原抽奖参数（有损）
pub fn recover(presentation: &Presentation) -> RecoveredDrawing {
    let prize = PRIZE_LINE
        .captures(&presentation.description)
        .map(|c| c[1].to_string());
    let winners = presentation
        .field(FIELD_WINNER_COUNT)
        .and_then(|f| FIRST_NUMBER.captures(&f.value))
        .and_then(|c| c[1].parse().ok());
    let required_role_id = presentation
        .field(FIELD_REQUIREMENT)
        .and_then(|f| ROLE_MENTION.captures(&f.value))
        .and_then(|c| c[1].parse().ok());
    let creator_name = presentation
        .footer
        .as_deref()
        .and_then(|f| HOSTED_BY.captures(f))
        .map(|c| c[1].to_string());

    RecoveredDrawing {
        prize,
        winners,
        required_role_id,
        creator_name,
    }
}
