//! Scripted collaborators shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::external::Announcer;
use crate::models::{AnnouncementRef, HostContext, Participant, Presentation, Snowflake};

#[derive(Debug, Default)]
pub struct AnnouncerState {
    pub next_message_id: Snowflake,
    pub reactors: HashMap<Snowflake, Vec<Participant>>,
    pub presentations: HashMap<Snowflake, Presentation>,
    pub results: Vec<(HostContext, String)>,
    pub reactions: Vec<(Snowflake, String)>,
    pub fetch_reactor_calls: usize,
    pub reactor_delay: Option<Duration>,
    pub fail_post_announcement: bool,
    pub fail_add_reaction: bool,
    pub fail_post_result: bool,
    pub fail_update_presentation: bool,
    pub fail_fetch_reactors: bool,
}

/// In-memory [`Announcer`] that records every call
#[derive(Debug)]
pub struct RecordingAnnouncer {
    state: Mutex<AnnouncerState>,
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AnnouncerState {
                next_message_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut AnnouncerState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_reactors(&self, message_id: Snowflake, reactors: Vec<Participant>) {
        self.with_state(|s| {
            s.reactors.insert(message_id, reactors);
        });
    }

    pub fn results(&self) -> Vec<String> {
        self.with_state(|s| s.results.iter().map(|(_, text)| text.clone()).collect())
    }

    pub fn presentation(&self, message_id: Snowflake) -> Option<Presentation> {
        self.with_state(|s| s.presentations.get(&message_id).cloned())
    }

    fn fail(action: &str) -> AppError {
        AppError::AnnouncementError(format!("{action} failed (scripted)"))
    }
}

pub fn participant(user_id: Snowflake, roles: &[Snowflake]) -> Participant {
    Participant {
        user_id,
        display_name: format!("user{user_id}"),
        roles: roles.to_vec(),
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn post_announcement(
        &self,
        _host: &HostContext,
        presentation: &Presentation,
    ) -> AppResult<Snowflake> {
        self.with_state(|s| {
            if s.fail_post_announcement {
                return Err(Self::fail("post announcement"));
            }
            s.next_message_id += 1;
            let id = s.next_message_id;
            s.presentations.insert(id, presentation.clone());
            Ok(id)
        })
    }

    async fn add_reaction(&self, target: &AnnouncementRef, emoji: &str) -> AppResult<()> {
        self.with_state(|s| {
            if s.fail_add_reaction {
                return Err(Self::fail("add reaction"));
            }
            s.reactions.push((target.message_id, emoji.to_string()));
            Ok(())
        })
    }

    async fn post_result(&self, host: &HostContext, text: &str) -> AppResult<()> {
        self.with_state(|s| {
            if s.fail_post_result {
                return Err(Self::fail("post result"));
            }
            s.results.push((*host, text.to_string()));
            Ok(())
        })
    }

    async fn update_presentation(
        &self,
        target: &AnnouncementRef,
        presentation: &Presentation,
    ) -> AppResult<()> {
        self.with_state(|s| {
            if s.fail_update_presentation {
                return Err(Self::fail("update presentation"));
            }
            s.presentations
                .insert(target.message_id, presentation.clone());
            Ok(())
        })
    }

    async fn fetch_reactors(
        &self,
        target: &AnnouncementRef,
        _emoji: &str,
    ) -> AppResult<Vec<Participant>> {
        let delay = self.with_state(|s| {
            s.fetch_reactor_calls += 1;
            s.reactor_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| {
            if s.fail_fetch_reactors {
                return Err(Self::fail("fetch reactors"));
            }
            Ok(s.reactors.get(&target.message_id).cloned().unwrap_or_default())
        })
    }

    async fn fetch_presentation(
        &self,
        target: &AnnouncementRef,
    ) -> AppResult<Option<Presentation>> {
        Ok(self.presentation(target.message_id))
    }
}
