use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::giveaway::create_giveaway,
        handlers::giveaway::list_giveaways,
        handlers::giveaway::get_giveaway,
        handlers::giveaway::end_giveaway,
        handlers::giveaway::reroll_giveaway,
        handlers::giveaway::pick_winners,
    ),
    components(
        schemas(
            HostContext,
            AnnouncementRef,
            Participant,
            CreateGiveawayRequest,
            ExplicitWinner,
            PickWinnersRequest,
            GiveawayResponse,
            DrawOutcome,
            ApiError,
            GiveawayApiResponse,
            GiveawayListApiResponse,
            DrawOutcomeApiResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "giveaway", description = "Giveaway administration API"),
    ),
    info(
        title = "Giveaway Backend API",
        version = "1.0.0",
        description = "Reaction giveaway lifecycle: start, end, reroll and manual winner selection"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_giveaway_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/giveaways"));
        assert!(
            paths
                .iter()
                .any(|p| p.as_str() == "/giveaways/{guild_id}/{channel_id}/{message_id}/pick")
        );
    }
}
