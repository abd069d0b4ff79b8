use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub giveaway: GiveawayConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL, or `memory://` for the non-durable development store
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    #[serde(default = "default_discord_api_base_url")]
    pub api_base_url: String,
}

fn default_discord_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiveawayConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// A new drawing must end strictly later than now + min_lead_secs
    #[serde(default = "default_min_lead_secs")]
    pub min_lead_secs: i64,
    #[serde(default = "default_entry_emoji")]
    pub entry_emoji: String,
    /// Reroll / pick may rebuild drawing parameters from the posted embed
    /// when the stored record is gone
    #[serde(default = "default_true")]
    pub allow_presentation_recovery: bool,
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_min_lead_secs() -> i64 {
    5
}

fn default_entry_emoji() -> String {
    "🎉".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GiveawayConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            min_lead_secs: default_min_lead_secs(),
            entry_emoji: default_entry_emoji(),
            allow_presentation_recovery: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    /// Bearer token required on /api/v1; an empty token rejects every call
    #[serde(default)]
    pub api_token: String,
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                // 没有持久化存储无法运行
                let database_url = get_env("DATABASE_URL")
                    .ok_or("缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    discord: DiscordConfig {
                        bot_token: get_env("DISCORD_BOT_TOKEN")
                            .or_else(|| get_env("BOT_TOKEN"))
                            .unwrap_or_default(),
                        api_base_url: get_env("DISCORD_API_BASE_URL")
                            .unwrap_or_else(default_discord_api_base_url),
                    },
                    giveaway: GiveawayConfig::default(),
                    admin: AdminConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("DISCORD_BOT_TOKEN").or_else(|_| env::var("BOT_TOKEN")) {
            config.discord.bot_token = v;
        }
        if let Ok(v) = env::var("DISCORD_API_BASE_URL") {
            config.discord.api_base_url = v;
        }
        if let Ok(v) = env::var("GIVEAWAY_SWEEP_INTERVAL_SECS")
            && let Ok(n) = v.parse()
        {
            config.giveaway.sweep_interval_secs = n;
        }
        if let Ok(v) = env::var("GIVEAWAY_MIN_LEAD_SECS")
            && let Ok(n) = v.parse()
        {
            config.giveaway.min_lead_secs = n;
        }
        if let Ok(v) = env::var("GIVEAWAY_ENTRY_EMOJI") {
            config.giveaway.entry_emoji = v;
        }
        if let Ok(v) = env::var("GIVEAWAY_ALLOW_PRESENTATION_RECOVERY")
            && let Some(b) = parse_bool(&v)
        {
            config.giveaway.allow_presentation_recovery = b;
        }
        if let Ok(v) = env::var("ADMIN_API_TOKEN") {
            config.admin.api_token = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.discord.bot_token.trim().is_empty() {
            return Err("缺少 Discord bot token (DISCORD_BOT_TOKEN / BOT_TOKEN)".into());
        }
        if self.giveaway.sweep_interval_secs == 0 {
            return Err("giveaway.sweep_interval_secs 必须大于 0".into());
        }
        if self.giveaway.entry_emoji.is_empty() {
            return Err("giveaway.entry_emoji 不能为空".into());
        }
        Ok(())
    }
}
