use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::config::GiveawayConfig;
use crate::database::{DrawingStore, StoreError};
use crate::error::{AppError, AppResult};
use crate::external::Announcer;
use crate::models::{
    AnnouncementRef, CreateGiveawayRequest, DrawOutcome, DrawingRecord, HostContext, Participant,
    Snowflake,
};
use crate::utils::presentation::{self, EndKind, EndedView};
use crate::utils::{filter_eligible, parse_duration, select_winners};

/// 管理员手动指定中奖者的上限
pub const MAX_EXPLICIT_WINNERS: usize = 3;

const UNKNOWN_PRIZE: &str = "Unknown prize";

/// Counters for one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub resolved: usize,
    /// Still running
    pub pending: usize,
    /// Unreadable records deleted
    pub purged: usize,
    /// Claimed elsewhere or removed between listing and loading
    pub skipped: usize,
    pub failed: usize,
}

/// Parameters needed to (re)draw, from the store or rebuilt from the embed
#[derive(Debug, Clone)]
struct DrawParameters {
    prize: String,
    winners: u32,
    required_role_id: Option<Snowflake>,
    creator_name: String,
    from_presentation: bool,
    /// Stored record exists and has not reached its end time
    running: bool,
}

impl From<&DrawingRecord> for DrawParameters {
    fn from(r: &DrawingRecord) -> Self {
        DrawParameters {
            prize: r.prize.clone(),
            winners: r.winners,
            required_role_id: r.required_role_id,
            creator_name: r.creator_name.clone(),
            from_presentation: false,
            running: false,
        }
    }
}

impl DrawParameters {
    fn view(&self) -> EndedView<'_> {
        EndedView {
            prize: &self.prize,
            winner_count: self.winners,
            required_role_id: self.required_role_id,
            creator_name: &self.creator_name,
        }
    }
}

type ClaimSet = Arc<Mutex<HashSet<Snowflake>>>;

/// In-process exclusive right to resolve one drawing; released on drop
struct ResolutionClaim {
    claims: ClaimSet,
    message_id: Snowflake,
}

impl Drop for ResolutionClaim {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.message_id);
    }
}

/// 抽奖生命周期：创建、到期开奖、手动结束、重抽、手动指定
///
/// The stored record is the authoritative "still active" marker: a drawing is
/// resolved by announcing its result and then deleting the record. Resolving
/// operations take a per-id claim before re-reading the record, so within one
/// process at most one of them draws winners for a given id.
#[derive(Clone)]
pub struct GiveawayService {
    store: DrawingStore,
    announcer: Arc<dyn Announcer>,
    config: GiveawayConfig,
    claims: ClaimSet,
}

impl GiveawayService {
    pub fn new(store: DrawingStore, announcer: Arc<dyn Announcer>, config: GiveawayConfig) -> Self {
        Self {
            store,
            announcer,
            config,
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 发起抽奖
    ///
    /// 逻辑:
    /// 1. 校验时长（需大于最小提前量）、获奖人数、奖品
    /// 2. 发布抽奖公告（消息 ID 即抽奖 ID）并添加参与表情
    /// 3. 写入存储
    ///
    /// Nothing is persisted unless the announcement was posted.
    pub async fn create(&self, req: CreateGiveawayRequest) -> AppResult<DrawingRecord> {
        let duration = parse_duration(&req.duration).ok_or_else(|| {
            AppError::ValidationError(format!(
                "Invalid duration '{}': use a number followed by s, m, h or d",
                req.duration
            ))
        })?;
        if duration <= Duration::seconds(self.config.min_lead_secs) {
            return Err(AppError::ValidationError(format!(
                "Duration must be longer than {} seconds",
                self.config.min_lead_secs
            )));
        }
        if req.winners < 1 {
            return Err(AppError::ValidationError(
                "Winner count must be at least 1".into(),
            ));
        }
        let winners = u32::try_from(req.winners)
            .map_err(|_| AppError::ValidationError("Winner count is too large".into()))?;
        let prize = req.prize.trim();
        if prize.is_empty() {
            return Err(AppError::ValidationError("Prize must not be empty".into()));
        }
        let end_time = Utc::now()
            .checked_add_signed(duration)
            .ok_or_else(|| AppError::ValidationError("Duration is too long".into()))?;

        let host = HostContext {
            guild_id: req.guild_id,
            channel_id: req.channel_id,
        };
        let mut record = DrawingRecord {
            guild_id: host.guild_id,
            channel_id: host.channel_id,
            message_id: 0,
            end_time,
            winners,
            prize: prize.to_string(),
            required_role_id: req.required_role_id,
            creator_id: req.creator_id,
            creator_name: req.creator_name,
        };

        let running = presentation::running(&record, &self.config.entry_emoji);
        record.message_id = self
            .announcer
            .post_announcement(&host, &running)
            .await
            .inspect_err(|e| log::error!("Failed to post giveaway announcement: {e}"))?;

        // 添加表情失败不致命，用户仍可自行添加
        if let Err(e) = self
            .announcer
            .add_reaction(&record.announcement(), &self.config.entry_emoji)
            .await
        {
            log::warn!(
                "Failed to add entry reaction to giveaway {}: {e}",
                record.message_id
            );
        }

        if let Err(e) = self.store.put(&record).await {
            log::error!(
                "Failed to persist giveaway {}; it will not be drawn automatically: {e}",
                record.message_id
            );
            return Err(e.into());
        }

        log::info!(
            "Giveaway {} created in {}/{} (prize: {}, winners: {}, ends: {})",
            record.message_id,
            record.guild_id,
            record.channel_id,
            record.prize,
            record.winners,
            record.end_time
        );
        Ok(record)
    }

    /// 开奖：取参与者 → 按身份组过滤 → 随机抽取 → 公告 → 删除记录
    ///
    /// Announcement failures are logged and do not stop the record from being
    /// deleted. A failed delete leaves the record for the next sweep.
    pub async fn resolve(&self, record: &DrawingRecord) -> DrawOutcome {
        let target = record.announcement();
        let participants = match self
            .announcer
            .fetch_reactors(&target, &self.config.entry_emoji)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                log::warn!(
                    "Could not fetch participants of giveaway {}, treating as none: {e}",
                    record.message_id
                );
                Vec::new()
            }
        };

        let eligible = filter_eligible(participants, record.required_role_id);
        let winners = select_winners(&eligible, i64::from(record.winners));
        log::info!(
            "Giveaway {} drawn: {} of {} eligible participants won",
            record.message_id,
            winners.len(),
            eligible.len()
        );

        let params = DrawParameters::from(record);
        self.announce(&target, &params, &winners, eligible.len(), EndKind::Drawn)
            .await;

        let removed = self.retire(record.message_id).await;
        DrawOutcome {
            message_id: record.message_id,
            prize: record.prize.clone(),
            winners,
            eligible_count: eligible.len(),
            from_presentation: false,
            removed,
        }
    }

    /// 立即结束抽奖（无论是否到期）
    pub async fn manual_end(&self, target: AnnouncementRef) -> AppResult<DrawOutcome> {
        let _claim = self.claim_for_admin(target.message_id)?;
        let record = self
            .store
            .get(target.message_id)
            .await?
            .ok_or_else(|| already_resolved(target.message_id))?;
        ensure_same_guild(&record, &target)?;

        log::info!("Giveaway {} ended manually", record.message_id);
        Ok(self.resolve(&record).await)
    }

    /// 重新抽取获胜者；不修改存储
    pub async fn reroll(&self, target: AnnouncementRef) -> AppResult<DrawOutcome> {
        let params = self.load_parameters(&target).await?;
        let participants = self
            .announcer
            .fetch_reactors(&target, &self.config.entry_emoji)
            .await?;
        let eligible = filter_eligible(participants, params.required_role_id);
        let winners = select_winners(&eligible, i64::from(params.winners));

        if winners.is_empty() || params.running {
            // 进行中的抽奖保留 RUNNING 公告，到期后仍会正常开奖
            let text = presentation::result_text(&params.prize, &winners, EndKind::Rerolled);
            if let Err(e) = self.announcer.post_result(&target.host(), &text).await {
                log::error!(
                    "Failed to post reroll result for giveaway {}: {e}",
                    target.message_id
                );
            }
        } else {
            self.announce(
                &target,
                &params,
                &winners,
                eligible.len(),
                EndKind::Rerolled,
            )
            .await;
        }

        log::info!(
            "Giveaway {} rerolled: {} new winner(s) from {} eligible",
            target.message_id,
            winners.len(),
            eligible.len()
        );
        Ok(DrawOutcome {
            message_id: target.message_id,
            prize: params.prize,
            winners,
            eligible_count: eligible.len(),
            from_presentation: params.from_presentation,
            removed: false,
        })
    }

    /// 管理员手动指定中奖者并结束抽奖
    pub async fn manual_pick(
        &self,
        target: AnnouncementRef,
        explicit_winners: Vec<Participant>,
    ) -> AppResult<DrawOutcome> {
        let mut seen = HashSet::new();
        let winners: Vec<Participant> = explicit_winners
            .into_iter()
            .filter(|w| seen.insert(w.user_id))
            .collect();
        if winners.is_empty() {
            return Err(AppError::ValidationError(
                "At least one winner must be specified".into(),
            ));
        }
        if winners.len() > MAX_EXPLICIT_WINNERS {
            return Err(AppError::ValidationError(format!(
                "At most {MAX_EXPLICIT_WINNERS} winners can be picked manually"
            )));
        }

        let _claim = self.claim_for_admin(target.message_id)?;
        let params = self.load_parameters(&target).await?;
        self.announce(
            &target,
            &params,
            &winners,
            winners.len(),
            EndKind::ManuallyPicked,
        )
        .await;
        let removed = self.retire(target.message_id).await;

        log::info!(
            "Giveaway {} ended with {} manually picked winner(s)",
            target.message_id,
            winners.len()
        );
        Ok(DrawOutcome {
            message_id: target.message_id,
            prize: params.prize,
            eligible_count: winners.len(),
            winners,
            from_presentation: params.from_presentation,
            removed,
        })
    }

    /// 扫描到期的抽奖并开奖；存储不可用时本轮跳过
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let ids = match self.store.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("Giveaway sweep skipped, store unavailable: {e}");
                return report;
            }
        };

        for id in ids {
            report.scanned += 1;

            // 先读记录，只对已到期的抽奖加锁
            match self.store.get(id).await {
                Ok(Some(record)) if record.is_expired(now) => {}
                Ok(Some(_)) => {
                    report.pending += 1;
                    continue;
                }
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(StoreError::Corrupt { key, reason }) => {
                    log::warn!("Purging unreadable giveaway record {key}: {reason}");
                    match self.store.delete(id).await {
                        Ok(_) => report.purged += 1,
                        Err(e) => {
                            log::error!("Failed to purge giveaway {id}: {e}");
                            report.failed += 1;
                        }
                    }
                    continue;
                }
                Err(e) => {
                    log::error!("Failed to load giveaway {id}: {e}");
                    report.failed += 1;
                    continue;
                }
            }

            let Some(_claim) = self.try_claim(id) else {
                log::debug!("Giveaway {id} is being resolved elsewhere, skipping");
                report.skipped += 1;
                continue;
            };

            // 持有 claim 后重新读取：期间可能已被手动结束
            match self.store.get(id).await {
                Ok(Some(record)) => {
                    log::info!("Giveaway {id} expired at {}, resolving", record.end_time);
                    self.resolve(&record).await;
                    report.resolved += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    log::error!("Failed to reload giveaway {id}: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// 当前存储中的抽奖（按结束时间排序）
    pub async fn list_active(&self) -> AppResult<Vec<DrawingRecord>> {
        let mut records = Vec::new();
        for id in self.store.list_ids().await? {
            match self.store.get(id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(StoreError::Corrupt { key, reason }) => {
                    log::warn!("Skipping unreadable giveaway record {key}: {reason}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        records.sort_by_key(|r| r.end_time);
        Ok(records)
    }

    pub async fn get(&self, message_id: Snowflake) -> AppResult<DrawingRecord> {
        self.store
            .get(message_id)
            .await?
            .ok_or_else(|| already_resolved(message_id))
    }

    // -----------------------------
    // 内部辅助方法
    // -----------------------------

    fn try_claim(&self, message_id: Snowflake) -> Option<ResolutionClaim> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if !claims.insert(message_id) {
            return None;
        }
        Some(ResolutionClaim {
            claims: self.claims.clone(),
            message_id,
        })
    }

    fn claim_for_admin(&self, message_id: Snowflake) -> AppResult<ResolutionClaim> {
        self.try_claim(message_id).ok_or_else(|| {
            AppError::NotFound(format!("Giveaway {message_id} is already being resolved"))
        })
    }

    /// Post the result text and switch the embed to its terminal state
    async fn announce(
        &self,
        target: &AnnouncementRef,
        params: &DrawParameters,
        winners: &[Participant],
        participant_count: usize,
        kind: EndKind,
    ) {
        let text = presentation::result_text(&params.prize, winners, kind);
        if let Err(e) = self.announcer.post_result(&target.host(), &text).await {
            log::error!(
                "Failed to post result of giveaway {}: {e}",
                target.message_id
            );
        }

        let ended = presentation::ended(&params.view(), winners, participant_count, kind);
        if let Err(e) = self.announcer.update_presentation(target, &ended).await {
            log::error!(
                "Failed to update announcement of giveaway {}: {e}",
                target.message_id
            );
        }
    }

    /// Delete the record; returns whether this call removed it
    async fn retire(&self, message_id: Snowflake) -> bool {
        match self.store.delete(message_id).await {
            Ok(true) => true,
            Ok(false) => {
                log::warn!("Giveaway {message_id} was already removed from the store");
                false
            }
            Err(e) => {
                log::error!(
                    "Failed to remove giveaway {message_id}; it will be retried by the next sweep: {e}"
                );
                false
            }
        }
    }

    async fn load_parameters(&self, target: &AnnouncementRef) -> AppResult<DrawParameters> {
        let store_error = match self.store.get(target.message_id).await {
            Ok(Some(record)) => {
                ensure_same_guild(&record, target)?;
                return Ok(DrawParameters {
                    running: !record.is_expired(Utc::now()),
                    ..DrawParameters::from(&record)
                });
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!(
                    "Could not load giveaway {} from store: {e}",
                    target.message_id
                );
                Some(e)
            }
        };

        if !self.config.allow_presentation_recovery {
            return Err(match store_error {
                Some(e) => e.into(),
                None => already_resolved(target.message_id),
            });
        }

        let shown = self
            .announcer
            .fetch_presentation(target)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Giveaway message {} has no embed to recover from",
                    target.message_id
                ))
            })?;
        let recovered = presentation::recover(&shown);
        if recovered.prize.is_none() && recovered.winners.is_none() {
            return Err(AppError::NotFound(format!(
                "Message {} does not look like a giveaway",
                target.message_id
            )));
        }

        log::warn!(
            "Giveaway {} has no stored record; using parameters recovered from its embed",
            target.message_id
        );
        Ok(DrawParameters {
            prize: recovered.prize.unwrap_or_else(|| UNKNOWN_PRIZE.to_string()),
            winners: recovered.winners.unwrap_or(1),
            required_role_id: recovered.required_role_id,
            creator_name: recovered.creator_name.unwrap_or_default(),
            from_presentation: true,
            running: false,
        })
    }
}

fn already_resolved(message_id: Snowflake) -> AppError {
    AppError::NotFound(format!(
        "Giveaway {message_id} has already ended or does not exist"
    ))
}

fn ensure_same_guild(record: &DrawingRecord, target: &AnnouncementRef) -> AppResult<()> {
    if record.guild_id != target.guild_id {
        return Err(AppError::ValidationError(format!(
            "Giveaway {} belongs to another server",
            record.message_id
        )));
    }
    Ok(())
}
