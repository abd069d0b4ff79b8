use crate::models::*;
use crate::services::GiveawayService;
use actix_web::{HttpResponse, ResponseError, Result, web};
use serde_json::json;

/// Path of the announcement a drawing is bound to
type AnnouncementPath = web::Path<(Snowflake, Snowflake, Snowflake)>;

fn announcement_from_path(path: AnnouncementPath) -> AnnouncementRef {
    let (guild_id, channel_id, message_id) = path.into_inner();
    AnnouncementRef {
        guild_id,
        channel_id,
        message_id,
    }
}

#[utoipa::path(
    post,
    path = "/giveaways",
    tag = "giveaway",
    request_body = CreateGiveawayRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "抽奖已发布", body = GiveawayApiResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权"),
        (status = 502, description = "公告发布失败"),
        (status = 503, description = "存储不可用")
    )
)]
pub async fn create_giveaway(
    giveaway_service: web::Data<GiveawayService>,
    request: web::Json<CreateGiveawayRequest>,
) -> Result<HttpResponse> {
    match giveaway_service.create(request.into_inner()).await {
        Ok(record) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            GiveawayResponse::from(record),
            "Giveaway started".to_string(),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/giveaways",
    tag = "giveaway",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "进行中的抽奖列表", body = GiveawayListApiResponse),
        (status = 401, description = "未授权"),
        (status = 503, description = "存储不可用")
    )
)]
pub async fn list_giveaways(giveaway_service: web::Data<GiveawayService>) -> Result<HttpResponse> {
    match giveaway_service.list_active().await {
        Ok(records) => {
            let data: Vec<GiveawayResponse> = records.into_iter().map(Into::into).collect();
            Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/giveaways/{message_id}",
    tag = "giveaway",
    params(
        ("message_id" = u64, Path, description = "抽奖公告消息 ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "抽奖详情", body = GiveawayApiResponse),
        (status = 401, description = "未授权"),
        (status = 404, description = "抽奖不存在或已结束")
    )
)]
pub async fn get_giveaway(
    giveaway_service: web::Data<GiveawayService>,
    path: web::Path<Snowflake>,
) -> Result<HttpResponse> {
    match giveaway_service.get(path.into_inner()).await {
        Ok(record) => Ok(HttpResponse::Ok().json(ApiResponse::success(GiveawayResponse::from(
            record,
        )))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/giveaways/{guild_id}/{channel_id}/{message_id}/end",
    tag = "giveaway",
    params(
        ("guild_id" = u64, Path, description = "服务器 ID"),
        ("channel_id" = u64, Path, description = "频道 ID"),
        ("message_id" = u64, Path, description = "抽奖公告消息 ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "抽奖已结束", body = DrawOutcomeApiResponse),
        (status = 400, description = "抽奖属于其他服务器"),
        (status = 401, description = "未授权"),
        (status = 404, description = "抽奖不存在或已结束")
    )
)]
pub async fn end_giveaway(
    giveaway_service: web::Data<GiveawayService>,
    path: AnnouncementPath,
) -> Result<HttpResponse> {
    match giveaway_service
        .manual_end(announcement_from_path(path))
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/giveaways/{guild_id}/{channel_id}/{message_id}/reroll",
    tag = "giveaway",
    params(
        ("guild_id" = u64, Path, description = "服务器 ID"),
        ("channel_id" = u64, Path, description = "频道 ID"),
        ("message_id" = u64, Path, description = "抽奖公告消息 ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "重新抽取完成", body = DrawOutcomeApiResponse),
        (status = 401, description = "未授权"),
        (status = 404, description = "无法确定抽奖参数"),
        (status = 502, description = "无法读取参与者")
    )
)]
pub async fn reroll_giveaway(
    giveaway_service: web::Data<GiveawayService>,
    path: AnnouncementPath,
) -> Result<HttpResponse> {
    match giveaway_service.reroll(announcement_from_path(path)).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(ApiResponse::success(outcome))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/giveaways/{guild_id}/{channel_id}/{message_id}/pick",
    tag = "giveaway",
    request_body = PickWinnersRequest,
    params(
        ("guild_id" = u64, Path, description = "服务器 ID"),
        ("channel_id" = u64, Path, description = "频道 ID"),
        ("message_id" = u64, Path, description = "抽奖公告消息 ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已按指定中奖者结束", body = DrawOutcomeApiResponse),
        (status = 400, description = "中奖者数量不合法"),
        (status = 401, description = "未授权"),
        (status = 404, description = "无法确定抽奖参数")
    )
)]
pub async fn pick_winners(
    giveaway_service: web::Data<GiveawayService>,
    path: AnnouncementPath,
    request: web::Json<PickWinnersRequest>,
) -> Result<HttpResponse> {
    let winners = request
        .into_inner()
        .winners
        .into_iter()
        .map(Participant::from)
        .collect();

    match giveaway_service
        .manual_pick(announcement_from_path(path), winners)
        .await
    {
        Ok(outcome) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": outcome,
            "message": "Winners announced"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn giveaway_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/giveaways")
            .route("", web::post().to(create_giveaway))
            .route("", web::get().to(list_giveaways))
            .route("/{message_id}", web::get().to(get_giveaway))
            .route(
                "/{guild_id}/{channel_id}/{message_id}/end",
                web::post().to(end_giveaway),
            )
            .route(
                "/{guild_id}/{channel_id}/{message_id}/reroll",
                web::post().to(reroll_giveaway),
            )
            .route(
                "/{guild_id}/{channel_id}/{message_id}/pick",
                web::post().to(pick_winners),
            ),
    );
}
