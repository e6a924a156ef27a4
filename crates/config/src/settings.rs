use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub media: MediaSettings,
    pub hls: HlsSettings,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Development,
    Production,
    Test,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub env: AppEnv,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaSettings {
    /// 0 means auto: one worker per CPU core in production, one total otherwise.
    pub num_workers: u32,
    pub listen_ip: String,
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    /// Disable UDP ICE candidates for restrictive networks.
    pub force_tcp: bool,
}

impl MediaSettings {
    pub fn worker_count(&self, env: AppEnv) -> usize {
        if self.num_workers > 0 {
            self.num_workers as usize
        } else if env == AppEnv::Production {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            1
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HlsSettings {
    /// Root for `<room_id>.sdp` files and per-room segment directories.
    pub storage_path: String,
    pub ffmpeg_path: String,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("STAGECAST")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("app.cors_origins"),
            )
            .set_default("app.env", "development")?
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3001)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "stagecast")?
            .set_default("database.max_pool_size", None::<u32>)?
            .set_default("database.min_pool_size", None::<u32>)?
            .set_default("cache.url", None::<String>)?
            .set_default("media.num_workers", 0)?
            .set_default("media.listen_ip", "0.0.0.0")?
            .set_default("media.announced_ip", "127.0.0.1")?
            .set_default("media.rtc_min_port", 40000)?
            .set_default("media.rtc_max_port", 49999)?
            .set_default("media.force_tcp", false)?
            .set_default("hls.storage_path", "./hls")?
            .set_default("hls.ffmpeg_path", "ffmpeg")?;

        // NODE_ENV and PORT are honored for parity with the deployment scripts.
        if let Ok(env) = std::env::var("NODE_ENV") {
            builder = builder.set_override("app.env", env)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("app.port", port)?;
        }

        builder.build()?.try_deserialize()
    }
}
