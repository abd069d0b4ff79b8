use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use chrono::Local;  // timestamp in log lines
use std::sync::Arc;
use std::time::Duration;

use giveaway_backend::{
    config::Config,
    database::{DrawingStore, open_store},
    external::DiscordAnnouncer,
    handlers,
    middlewares::{AdminAuthMiddleware, create_cors},
    services::GiveawayService,
    swagger::swagger_config,
    tasks,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;

    // 打开存储；不可用时直接退出
    let kv = open_store(&config.database)
        .await
        .context("Giveaway store is unavailable")?;
    let store = DrawingStore::new(kv);

    // 创建外部服务
    let announcer = Arc::new(DiscordAnnouncer::new(config.discord.clone()));

    // 创建服务
    let giveaway_service = GiveawayService::new(store, announcer, config.giveaway.clone());

    // 启动后台到期开奖任务
    tasks::spawn_all(
        giveaway_service.clone(),
        Duration::from_secs(config.giveaway.sweep_interval_secs),
    );

    if config.admin.api_token.is_empty() {
        log::warn!("ADMIN_API_TOKEN is not set; every /api/v1 request will be rejected");
    }
    let admin_token: Arc<str> = Arc::from(config.admin.api_token.as_str());

    // 启动HTTP服务器
    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(AdminAuthMiddleware::new(admin_token.clone()))
            .wrap(create_cors())
            .app_data(web::Data::new(giveaway_service.clone()))
            .configure(swagger_config)
            .service(web::scope("/api/v1").configure(handlers::giveaway_config))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
