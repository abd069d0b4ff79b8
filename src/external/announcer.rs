use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{AnnouncementRef, HostContext, Participant, Presentation, Snowflake};

/// Chat-platform boundary used by the giveaway lifecycle.
///
/// Failures are reported as `AppError::AnnouncementError`.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Post the initial embed; the returned message id becomes the drawing id
    async fn post_announcement(
        &self,
        host: &HostContext,
        presentation: &Presentation,
    ) -> AppResult<Snowflake>;

    async fn add_reaction(&self, target: &AnnouncementRef, emoji: &str) -> AppResult<()>;

    async fn post_result(&self, host: &HostContext, text: &str) -> AppResult<()>;

    async fn update_presentation(
        &self,
        target: &AnnouncementRef,
        presentation: &Presentation,
    ) -> AppResult<()>;

    /// Users who reacted with `emoji`, with their roles in the target guild.
    /// Bots and users no longer in the guild are excluded.
    async fn fetch_reactors(
        &self,
        target: &AnnouncementRef,
        emoji: &str,
    ) -> AppResult<Vec<Participant>>;

    /// Current embed of the announcement, `None` if the message or embed is gone
    async fn fetch_presentation(&self, target: &AnnouncementRef)
    -> AppResult<Option<Presentation>>;
}
