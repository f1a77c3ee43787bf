use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use lookbook_engine::config::non_empty_env;
use lookbook_engine::EngineConfig;

pub const DEFAULT_PORT: u16 = 5003;
pub const DEFAULT_IMAGES_DIR: &str = "frontend/public/images";
pub const DEFAULT_HEADSWAP_URL: &str = "http://34.122.243.90:8090/headswap";
pub const DEFAULT_HEADSWAP_OWNER_ID: &str = "gazman_tryon";
/// Request bodies above this are cut off by the framework. Kept well above
/// the upload limit so oversized images still get a descriptive answer.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub const DEFAULT_CORS_ORIGINS: [&str; 10] = [
    "https://gazmanclone.vercel.app",
    "https://66north-jade.vercel.app",
    "https://jd-sports.vercel.app",
    "http://localhost:3000",
    "http://localhost:5173",
    "http://localhost:5174",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:5174",
    "http://10.50.8.142:5173",
    "http://10.50.8.142:5174",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub production: bool,
    pub images_dir: PathBuf,
    pub headswap_url: String,
    pub headswap_owner_id: String,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Development defaults around an explicit engine config and image root.
    pub fn new(engine: EngineConfig, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            production: false,
            images_dir: images_dir.into(),
            headswap_url: DEFAULT_HEADSWAP_URL.to_string(),
            headswap_owner_id: DEFAULT_HEADSWAP_OWNER_ID.to_string(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|origin| origin.to_string()).collect(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            engine,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let engine = EngineConfig::from_env()?;

        let images_dir = PathBuf::from(
            non_empty_env("IMAGES_DIR").unwrap_or_else(|| DEFAULT_IMAGES_DIR.to_string()),
        );
        let images_dir = if images_dir.is_absolute() {
            images_dir
        } else {
            env::current_dir()
                .context("failed to resolve the working directory")?
                .join(images_dir)
        };

        let mut config = Self::new(engine, images_dir);
        config.production = is_production(|key| non_empty_env(key));
        let host = if config.production {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let port = match non_empty_env("PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{port}'"))?,
            None => DEFAULT_PORT,
        };
        config.listen_addr = SocketAddr::new(host, port);

        if let Some(url) = non_empty_env("HEADSWAP_URL") {
            config.headswap_url = url;
        }
        if let Some(owner) = non_empty_env("HEADSWAP_OWNER_ID") {
            config.headswap_owner_id = owner;
        }
        if let Some(extra) = non_empty_env("CORS_ORIGINS") {
            config.cors_origins.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(config)
    }
}

fn is_production(lookup: impl Fn(&str) -> Option<String>) -> bool {
    let equals = |key: &str, expected: &str| lookup(key).as_deref() == Some(expected);
    equals("APP_ENV", "production") || equals("FLASK_ENV", "production") || equals("VERCEL", "1")
}
