use async_trait::async_trait;
use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::DiscordConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    AnnouncementRef, HostContext, Participant, Presentation, PresentationField, Snowflake,
};

use super::Announcer;

const REACTION_PAGE_LIMIT: usize = 100;
const MEMBER_FETCH_CONCURRENCY: usize = 8;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

#[derive(Debug, Serialize, Deserialize)]
struct DiscordEmbed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(default)]
    fields: Vec<DiscordEmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordEmbedFooter>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiscordEmbedField {
    name: String,
    value: String,
    #[serde(default)]
    inline: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiscordEmbedFooter {
    text: String,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

#[derive(Debug, Deserialize)]
struct DiscordMember {
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

impl From<&Presentation> for DiscordEmbed {
    fn from(p: &Presentation) -> Self {
        DiscordEmbed {
            title: Some(p.title.clone()),
            description: Some(p.description.clone()),
            color: Some(p.color),
            fields: p
                .fields
                .iter()
                .map(|f| DiscordEmbedField {
                    name: f.name.clone(),
                    value: f.value.clone(),
                    inline: f.inline,
                })
                .collect(),
            footer: p
                .footer
                .as_ref()
                .map(|text| DiscordEmbedFooter { text: text.clone() }),
        }
    }
}

impl From<DiscordEmbed> for Presentation {
    fn from(e: DiscordEmbed) -> Self {
        Presentation {
            title: e.title.unwrap_or_default(),
            description: e.description.unwrap_or_default(),
            color: e.color.unwrap_or_default(),
            fields: e
                .fields
                .into_iter()
                .map(|f| PresentationField {
                    name: f.name,
                    value: f.value,
                    inline: f.inline,
                })
                .collect(),
            footer: e.footer.map(|f| f.text),
        }
    }
}

/// Discord REST (v10) implementation of [`Announcer`]
#[derive(Clone)]
pub struct DiscordAnnouncer {
    client: Client,
    config: DiscordConfig,
}

impl DiscordAnnouncer {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = Url::parse(&self.config.api_base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid Discord API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AppError::ConfigError("Discord API base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bot {}", self.config.bot_token))
    }

    async fn send(&self, builder: RequestBuilder, action: &str) -> AppResult<Response> {
        self.authorized(builder)
            .send()
            .await
            .map_err(|e| AppError::AnnouncementError(format!("{action} failed: {e}")))
    }

    async fn ensure_success(response: Response, action: &str) -> AppResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        log::error!("Discord {action} failed: {status}, Error: {error_text}");
        Err(AppError::AnnouncementError(format!(
            "{action} failed ({status}): {error_text}"
        )))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: Response,
        action: &str,
    ) -> AppResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::AnnouncementError(format!("{action}: bad response: {e}")))
    }

    /// How long Discord asked us to wait, from the header or the JSON body
    async fn retry_after(response: Response) -> Duration {
        let from_header = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());
        let secs = match from_header {
            Some(secs) => secs,
            None => response
                .json::<RateLimited>()
                .await
                .map(|r| r.retry_after)
                .unwrap_or(1.0),
        };
        Duration::from_secs_f64(secs.clamp(0.0, MAX_RETRY_AFTER_SECS))
    }

    /// GET that waits out 429 responses before giving up
    async fn get_with_retry(&self, url: Url, action: &str) -> AppResult<Response> {
        let mut attempts = 0;
        loop {
            let response = self.send(self.client.get(url.clone()), action).await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            attempts += 1;
            if attempts > MAX_RATE_LIMIT_RETRIES {
                log::error!("Discord {action} still rate limited after {MAX_RATE_LIMIT_RETRIES} retries");
                return Err(AppError::AnnouncementError(format!(
                    "{action} failed: rate limited"
                )));
            }
            let wait = Self::retry_after(response).await;
            log::warn!("Discord {action} rate limited, retrying in {wait:?}");
            tokio::time::sleep(wait).await;
        }
    }

    async fn fetch_reaction_users(
        &self,
        target: &AnnouncementRef,
        emoji: &str,
    ) -> AppResult<Vec<DiscordUser>> {
        let channel = target.channel_id.to_string();
        let message = target.message_id.to_string();
        let mut users = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut url = self.url(&[
                "channels",
                &channel,
                "messages",
                &message,
                "reactions",
                emoji,
            ])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &REACTION_PAGE_LIMIT.to_string());
                if let Some(after) = &after {
                    query.append_pair("after", after);
                }
            }

            let response = self.get_with_retry(url, "fetch reactions").await?;
            if response.status() == StatusCode::NOT_FOUND {
                // 消息或表情已不存在
                return Ok(users);
            }
            let response = Self::ensure_success(response, "fetch reactions").await?;
            let page: Vec<DiscordUser> = Self::read_json(response, "fetch reactions").await?;

            let page_len = page.len();
            after = page.last().map(|u| u.id.clone());
            users.extend(page);
            if page_len < REACTION_PAGE_LIMIT {
                break;
            }
        }
        Ok(users)
    }

    /// `Ok(None)` when the user is no longer a guild member; any other failure
    /// is an error so that no reactor is silently left out of the draw
    async fn fetch_member(
        &self,
        guild_id: Snowflake,
        user: DiscordUser,
    ) -> AppResult<Option<Participant>> {
        let user_id: Snowflake = user.id.parse().map_err(|_| {
            AppError::AnnouncementError(format!("fetch reactions: bad user id {}", user.id))
        })?;
        let url = self.url(&["guilds", &guild_id.to_string(), "members", &user.id])?;
        let response = self.get_with_retry(url, "fetch member").await?;
        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("Reactor {user_id} is no longer in guild {guild_id}");
            return Ok(None);
        }
        let response = Self::ensure_success(response, "fetch member").await?;
        let member: DiscordMember = Self::read_json(response, "fetch member").await?;

        Ok(Some(Participant {
            user_id,
            display_name: member
                .nick
                .or(user.global_name)
                .unwrap_or(user.username),
            roles: member
                .roles
                .iter()
                .filter_map(|r| r.parse().ok())
                .collect(),
        }))
    }
}

#[async_trait]
impl Announcer for DiscordAnnouncer {
    async fn post_announcement(
        &self,
        host: &HostContext,
        presentation: &Presentation,
    ) -> AppResult<Snowflake> {
        let url = self.url(&["channels", &host.channel_id.to_string(), "messages"])?;
        let body = json!({ "embeds": [DiscordEmbed::from(presentation)] });
        let response = self
            .send(self.client.post(url).json(&body), "post announcement")
            .await?;
        let response = Self::ensure_success(response, "post announcement").await?;
        let message: DiscordMessage = Self::read_json(response, "post announcement").await?;
        message.id.parse().map_err(|_| {
            AppError::AnnouncementError(format!("post announcement: bad message id {}", message.id))
        })
    }

    async fn add_reaction(&self, target: &AnnouncementRef, emoji: &str) -> AppResult<()> {
        let url = self.url(&[
            "channels",
            &target.channel_id.to_string(),
            "messages",
            &target.message_id.to_string(),
            "reactions",
            emoji,
            "@me",
        ])?;
        let response = self.send(self.client.put(url), "add reaction").await?;
        Self::ensure_success(response, "add reaction").await?;
        Ok(())
    }

    async fn post_result(&self, host: &HostContext, text: &str) -> AppResult<()> {
        let url = self.url(&["channels", &host.channel_id.to_string(), "messages"])?;
        let body = json!({
            "content": text,
            "allowed_mentions": { "parse": ["users"] }
        });
        let response = self
            .send(self.client.post(url).json(&body), "post result")
            .await?;
        Self::ensure_success(response, "post result").await?;
        Ok(())
    }

    async fn update_presentation(
        &self,
        target: &AnnouncementRef,
        presentation: &Presentation,
    ) -> AppResult<()> {
        let url = self.url(&[
            "channels",
            &target.channel_id.to_string(),
            "messages",
            &target.message_id.to_string(),
        ])?;
        let body = json!({
            "embeds": [DiscordEmbed::from(presentation)],
            "components": []
        });
        let response = self
            .send(self.client.patch(url).json(&body), "update presentation")
            .await?;
        Self::ensure_success(response, "update presentation").await?;
        Ok(())
    }

    async fn fetch_reactors(
        &self,
        target: &AnnouncementRef,
        emoji: &str,
    ) -> AppResult<Vec<Participant>> {
        let humans: Vec<DiscordUser> = self
            .fetch_reaction_users(target, emoji)
            .await?
            .into_iter()
            .filter(|u| !u.bot)
            .collect();

        let guild_id = target.guild_id;
        let members: Vec<Option<Participant>> = stream::iter(humans)
            .map(|user| self.fetch_member(guild_id, user))
            .buffered(MEMBER_FETCH_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(members.into_iter().flatten().collect())
    }

    async fn fetch_presentation(
        &self,
        target: &AnnouncementRef,
    ) -> AppResult<Option<Presentation>> {
        let url = self.url(&[
            "channels",
            &target.channel_id.to_string(),
            "messages",
            &target.message_id.to_string(),
        ])?;
        let response = self.get_with_retry(url, "fetch message").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ensure_success(response, "fetch message").await?;
        let message: DiscordMessage = Self::read_json(response, "fetch message").await?;
        Ok(message.embeds.into_iter().next().map(Presentation::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use actix_web::{App, HttpResponse, HttpServer, dev::ServerHandle, web};

    /// Guild whose member endpoint always fails with 500
    const BROKEN_GUILD: &str = "500";

    async fn reactions() -> HttpResponse {
        HttpResponse::Ok().json(json!([
            { "id": "1", "username": "alice" },
            { "id": "2", "username": "gone" },
            { "id": "3", "username": "carol", "global_name": "Carol" },
            { "id": "9", "username": "helper", "bot": true }
        ]))
    }

    async fn member(
        path: web::Path<(String, String)>,
        throttled: web::Data<AtomicUsize>,
    ) -> HttpResponse {
        let (guild, user) = path.into_inner();
        if guild == BROKEN_GUILD {
            return HttpResponse::InternalServerError().body("upstream down");
        }
        match user.as_str() {
            "1" => HttpResponse::Ok().json(json!({ "nick": "Alice", "roles": ["77"] })),
            "2" => HttpResponse::NotFound().json(json!({ "message": "Unknown Member" })),
            // 第一次请求被限流，之后正常返回
            _ if throttled.fetch_add(1, Ordering::SeqCst) == 0 => HttpResponse::TooManyRequests()
                .json(json!({ "retry_after": 0.01, "global": false })),
            _ => HttpResponse::Ok().json(json!({ "roles": [] })),
        }
    }

    async fn fake_discord() -> (String, ServerHandle, Arc<AtomicUsize>) {
        let throttled = web::Data::new(AtomicUsize::new(0));
        let counter = throttled.clone().into_inner();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(throttled.clone())
                .route(
                    "/api/v10/channels/{channel}/messages/{message}/reactions/{emoji}",
                    web::get().to(reactions),
                )
                .route(
                    "/api/v10/guilds/{guild}/members/{user}",
                    web::get().to(member),
                )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (format!("http://{addr}/api/v10"), handle, counter)
    }

    fn target(guild_id: u64) -> AnnouncementRef {
        AnnouncementRef {
            guild_id,
            channel_id: 20,
            message_id: 30,
        }
    }

    #[actix_web::test]
    async fn test_fetch_reactors_skips_bots_and_departed_members_and_waits_out_rate_limit() {
        let (base, handle, throttled) = fake_discord().await;
        let participants = announcer(&base)
            .fetch_reactors(&target(10), "🎉")
            .await
            .unwrap();
        handle.stop(true).await;

        assert_eq!(
            participants,
            vec![
                Participant {
                    user_id: 1,
                    display_name: "Alice".into(),
                    roles: vec![77],
                },
                Participant {
                    user_id: 3,
                    display_name: "Carol".into(),
                    roles: Vec::new(),
                },
            ]
        );
        assert_eq!(throttled.load(Ordering::SeqCst), 2);
    }

    #[actix_web::test]
    async fn test_member_lookup_failure_fails_the_whole_fetch() {
        let (base, handle, _) = fake_discord().await;
        let result = announcer(&base)
            .fetch_reactors(&target(BROKEN_GUILD.parse().unwrap()), "🎉")
            .await;
        handle.stop(true).await;

        assert!(matches!(result, Err(AppError::AnnouncementError(_))));
    }

    fn announcer(base: &str) -> DiscordAnnouncer {
        DiscordAnnouncer::new(DiscordConfig {
            bot_token: "token".into(),
            api_base_url: base.into(),
        })
    }

    #[test]
    fn test_url_encodes_emoji_segment() {
        let a = announcer("https://discord.com/api/v10/");
        let url = a
            .url(&["channels", "1", "messages", "2", "reactions", "🎉", "@me"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://discord.com/api/v10/channels/1/messages/2/reactions/%F0%9F%8E%89/@me"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let a = announcer("not a url");
        assert!(matches!(a.url(&["channels"]), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_embed_conversion_round_trip() {
        let p = Presentation {
            title: "t".into(),
            description: "d".into(),
            color: 0x00FFFF,
            fields: vec![PresentationField {
                name: "Winner Count".into(),
                value: "`2`".into(),
                inline: true,
            }],
            footer: Some("Hosted by x | Status: RUNNING".into()),
        };
        let embed = DiscordEmbed::from(&p);
        let wire = serde_json::to_value(&embed).unwrap();
        assert_eq!(wire["fields"][0]["name"], "Winner Count");
        assert_eq!(wire["footer"]["text"], "Hosted by x | Status: RUNNING");

        let back: DiscordEmbed = serde_json::from_value(wire).unwrap();
        assert_eq!(Presentation::from(back), p);
    }
}
