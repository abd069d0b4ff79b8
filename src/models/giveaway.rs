use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Discord-style 64-bit identifier
pub type Snowflake = u64;

/// Where a drawing's announcement lives (server + channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct HostContext {
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
}

/// Fully resolved reference to an announcement message.
/// The message id doubles as the drawing id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AnnouncementRef {
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
}

impl AnnouncementRef {
    pub fn new(host: HostContext, message_id: Snowflake) -> Self {
        Self {
            guild_id: host.guild_id,
            channel_id: host.channel_id,
            message_id,
        }
    }

    pub fn host(&self) -> HostContext {
        HostContext {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
        }
    }
}

/// 持久化的抽奖记录
///
/// Stored as flat JSON under `giveaway:<messageId>`. Records written by the
/// legacy bot used snake_case keys; those are still accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingRecord {
    #[serde(alias = "guild_id")]
    pub guild_id: Snowflake,
    #[serde(alias = "channel_id")]
    pub channel_id: Snowflake,
    #[serde(alias = "message_id")]
    pub message_id: Snowflake,
    #[serde(alias = "end_time", with = "end_time_format")]
    pub end_time: DateTime<Utc>,
    /// 获奖人数
    pub winners: u32,
    pub prize: String,
    #[serde(default, alias = "required_role_id")]
    pub required_role_id: Option<Snowflake>,
    #[serde(alias = "creator_id")]
    pub creator_id: Snowflake,
    #[serde(default, alias = "creator_name")]
    pub creator_name: String,
}

impl DrawingRecord {
    pub fn host(&self) -> HostContext {
        HostContext {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
        }
    }

    pub fn announcement(&self) -> AnnouncementRef {
        AnnouncementRef::new(self.host(), self.message_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

/// Parse a stored end time. Offsets are honoured; a naive timestamp is UTC.
pub fn parse_end_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
}

mod end_time_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_end_time(&raw)
            .map_err(|e| de::Error::custom(format!("invalid endTime {raw:?}: {e}")))
    }
}

/// 参与者（反应用户 + 身份组）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Participant {
    pub user_id: Snowflake,
    pub display_name: String,
    /// Capability tokens (role ids) held in the drawing's guild
    #[serde(default)]
    pub roles: Vec<Snowflake>,
}

impl Participant {
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.roles.contains(&role_id)
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

/// Embed-like visual state of an announcement
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presentation {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<PresentationField>,
    pub footer: Option<String>,
}

impl Presentation {
    pub fn field(&self, name: &str) -> Option<&PresentationField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// 发起抽奖请求
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CreateGiveawayRequest {
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    /// Magnitude + unit, e.g. `30m`, `1.5h`, `2d`
    pub duration: String,
    pub winners: i64,
    pub prize: String,
    pub required_role_id: Option<Snowflake>,
    pub creator_id: Snowflake,
    pub creator_name: String,
}

/// 管理员指定的中奖者
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ExplicitWinner {
    pub user_id: Snowflake,
    pub display_name: String,
}

impl From<ExplicitWinner> for Participant {
    fn from(w: ExplicitWinner) -> Self {
        Participant {
            user_id: w.user_id,
            display_name: w.display_name,
            roles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PickWinnersRequest {
    pub winners: Vec<ExplicitWinner>,
}

/// 抽奖信息响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GiveawayResponse {
    pub message_id: Snowflake,
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    pub end_time: DateTime<Utc>,
    pub winners: u32,
    pub prize: String,
    pub required_role_id: Option<Snowflake>,
    pub creator_id: Snowflake,
    pub creator_name: String,
}

impl From<DrawingRecord> for GiveawayResponse {
    fn from(r: DrawingRecord) -> Self {
        GiveawayResponse {
            message_id: r.message_id,
            guild_id: r.guild_id,
            channel_id: r.channel_id,
            end_time: r.end_time,
            winners: r.winners,
            prize: r.prize,
            required_role_id: r.required_role_id,
            creator_id: r.creator_id,
            creator_name: r.creator_name,
        }
    }
}

/// Result of end / reroll / pick
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DrawOutcome {
    pub message_id: Snowflake,
    pub prize: String,
    pub winners: Vec<Participant>,
    /// Eligible participants at draw time (explicit winners for a manual pick)
    pub eligible_count: usize,
    /// Parameters were rebuilt from the posted embed instead of the store
    pub from_presentation: bool,
    /// The stored record was deleted by this call
    pub removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_end_time_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_end_time("2025-03-01T12:00:00+00:00").unwrap(), expected);
        assert_eq!(parse_end_time("2025-03-01T20:00:00+08:00").unwrap(), expected);
        assert_eq!(parse_end_time("2025-03-01T12:00:00Z").unwrap(), expected);
        // 无时区信息按 UTC 处理
        assert_eq!(parse_end_time("2025-03-01T12:00:00").unwrap(), expected);
        assert_eq!(parse_end_time(" 2025-03-01 12:00:00 ").unwrap(), expected);
        assert!(parse_end_time("yesterday").is_err());
    }

    #[test]
    fn test_record_is_expired_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let record = DrawingRecord {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
            end_time: now,
            winners: 1,
            prize: "X".into(),
            required_role_id: None,
            creator_id: 4,
            creator_name: "host".into(),
        };
        assert!(record.is_expired(now));
        assert!(!record.is_expired(now - chrono::Duration::seconds(1)));
        assert_eq!(
            record.announcement(),
            AnnouncementRef {
                guild_id: 1,
                channel_id: 2,
                message_id: 3
            }
        );
    }

    #[test]
    fn test_participant_mention_and_roles() {
        let p = Participant {
            user_id: 42,
            display_name: "alice".into(),
            roles: vec![7, 9],
        };
        assert_eq!(p.mention(), "<@42>");
        assert!(p.has_role(9));
        assert!(!p.has_role(8));
    }
}
