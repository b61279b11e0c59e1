use std::net::SocketAddr;
use std::path::PathBuf;

use color_eyre::eyre::WrapErr;

pub const DEFAULT_CARD_API_URL: &str = "https://api.scryfall.com";
pub const DEFAULT_CHAT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_CHAT_MODEL: &str = "claude-sonnet-4-20250514";

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub card_api_url: String,
    pub chat_api_url: String,
    pub chat_model: String,
    pub anthropic_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> color_eyre::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| String::from("127.0.0.1"));
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| String::from("3000"))
            .parse()
            .wrap_err("PORT must be a valid port number")?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .wrap_err("HOST/PORT do not form a valid socket address")?;

        let data_dir =
            PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| String::from("data")));

        let card_api_url = std::env::var("CARD_API_URL")
            .unwrap_or_else(|_| String::from(DEFAULT_CARD_API_URL));
        let chat_api_url = std::env::var("CHAT_API_URL")
            .unwrap_or_else(|_| String::from(DEFAULT_CHAT_API_URL));
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| String::from(DEFAULT_CHAT_MODEL));

        // Absent key just disables the chat responder.
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        Ok(Self {
            bind_addr,
            data_dir,
            card_api_url,
            chat_api_url,
            chat_model,
            anthropic_api_key,
        })
    }
}
