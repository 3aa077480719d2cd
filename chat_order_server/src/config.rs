use std::{env, str::FromStr};

use chat_order_engine::{settings::parse_keyword_list, BotSettings};
use chrono::Weekday;
use cog_common::{helpers::parse_boolean_flag, Secret};
use log::*;

const DEFAULT_COG_HOST: &str = "127.0.0.1";
const DEFAULT_COG_PORT: u16 = 8360;
const DEFAULT_SIGNATURE_HEADER: &str = "X-Line-Signature";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Chat platform (messaging channel) configuration.
    pub channel: ChannelConfig,
    /// ERP backend configuration.
    pub erp: ErpConfig,
    /// Engine-level bot behaviour, resolved once at startup.
    pub bot: BotSettings,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelConfig {
    /// Base url of the chat platform's messaging API, e.g. "https://api.line.me/v2/bot".
    pub api_base_url: String,
    /// Shared secret used to verify webhook signatures.
    pub secret: Secret<String>,
    /// Bearer token for the reply/push endpoints.
    pub access_token: Secret<String>,
    /// The request header carrying the webhook signature.
    pub signature_header: String,
    /// If false, webhook signatures are not checked. For local development only.
    pub signature_checks: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ErpConfig {
    /// Base url of the ERP instance, e.g. "https://erp.example.com".
    pub base_url: String,
    pub api_key: String,
    pub api_secret: Secret<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_COG_HOST.to_string(),
            port: DEFAULT_COG_PORT,
            channel: ChannelConfig {
                signature_header: DEFAULT_SIGNATURE_HEADER.into(),
                signature_checks: true,
                ..ChannelConfig::default()
            },
            erp: ErpConfig::default(),
            bot: BotSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("COG_HOST").ok().unwrap_or_else(|| DEFAULT_COG_HOST.into());
        let port = env::var("COG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for COG_PORT. {e} Using the default, {DEFAULT_COG_PORT}, instead."
                    );
                    DEFAULT_COG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_COG_PORT);
        let channel = ChannelConfig::from_env_or_default();
        let erp = ErpConfig::from_env_or_default();
        let bot = bot_settings_from_env();
        Self { host, port, channel, erp, bot }
    }
}

impl ChannelConfig {
    pub fn from_env_or_default() -> Self {
        let api_base_url = env::var("COG_CHANNEL_API_URL").ok().unwrap_or_else(|| {
            error!("🪛️ COG_CHANNEL_API_URL is not set. Please set it to your chat platform's messaging API url.");
            String::default()
        });
        let secret = env::var("COG_CHANNEL_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ COG_CHANNEL_SECRET is not set. Webhook signature checks will reject every request.");
            String::default()
        });
        let access_token = env::var("COG_CHANNEL_ACCESS_TOKEN").ok().unwrap_or_else(|| {
            error!("🪛️ COG_CHANNEL_ACCESS_TOKEN is not set. The bot will not be able to send messages.");
            String::default()
        });
        let signature_header =
            env::var("COG_SIGNATURE_HEADER").ok().unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.into());
        let signature_checks = parse_boolean_flag(env::var("COG_SIGNATURE_CHECKS").ok(), true);
        if !signature_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Do not run like this in production.");
        }
        Self {
            api_base_url,
            secret: Secret::new(secret),
            access_token: Secret::new(access_token),
            signature_header,
            signature_checks,
        }
    }
}

impl ErpConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("COG_ERP_BASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ COG_ERP_BASE_URL is not set. Please set it to the url of your ERP instance.");
            String::default()
        });
        let api_key = env::var("COG_ERP_API_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ COG_ERP_API_KEY is not set. ERP requests will not be authorized.");
            String::default()
        });
        let api_secret = env::var("COG_ERP_API_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ COG_ERP_API_SECRET is not set. ERP requests will not be authorized.");
            String::default()
        });
        Self { base_url, api_key, api_secret: Secret::new(api_secret) }
    }
}

/// Resolve the bot's behaviour settings from the environment, falling back to the engine defaults field by field.
/// Prompt texts keep their defaults; deployments that want different wording set them via the keyword variables'
/// sibling mechanism in a config service, which is out of scope here.
fn bot_settings_from_env() -> BotSettings {
    let defaults = BotSettings::default();
    let enabled = parse_boolean_flag(env::var("COG_ENABLED").ok(), defaults.enabled);
    if !enabled {
        warn!("🚨️ The bot is disabled (COG_ENABLED). Webhook events will be acknowledged but not processed.");
    }
    let require_confirmation =
        parse_boolean_flag(env::var("COG_REQUIRE_CONFIRMATION").ok(), defaults.require_confirmation);
    let loyalty_program = env::var("COG_LOYALTY_PROGRAM").ok().unwrap_or(defaults.loyalty_program);
    let delivery_weekday = env::var("COG_DELIVERY_WEEKDAY")
        .ok()
        .and_then(|s| {
            Weekday::from_str(&s)
                .map_err(|_| {
                    warn!("🪛️ '{s}' is not a valid weekday for COG_DELIVERY_WEEKDAY. Using the default.");
                })
                .ok()
        })
        .unwrap_or(defaults.delivery_weekday);
    let menu_limit = env::var("COG_MENU_LIMIT")
        .ok()
        .and_then(|s| {
            s.parse::<usize>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for COG_MENU_LIMIT. {e}"))
                .ok()
        })
        .unwrap_or(defaults.menu_limit);
    BotSettings {
        enabled,
        require_confirmation,
        loyalty_program,
        delivery_weekday,
        menu_limit,
        order_keywords: keyword_list_from_env("COG_ORDER_KEYWORDS", defaults.order_keywords),
        register_keywords: keyword_list_from_env("COG_REGISTER_KEYWORDS", defaults.register_keywords),
        menu_keywords: keyword_list_from_env("COG_MENU_KEYWORDS", defaults.menu_keywords),
        points_keywords: keyword_list_from_env("COG_POINTS_KEYWORDS", defaults.points_keywords),
        confirm_keywords: keyword_list_from_env("COG_CONFIRM_KEYWORDS", defaults.confirm_keywords),
        cancel_keywords: keyword_list_from_env("COG_CANCEL_KEYWORDS", defaults.cancel_keywords),
        quantity_markers: keyword_list_from_env("COG_QUANTITY_MARKERS", defaults.quantity_markers),
        note_markers: keyword_list_from_env("COG_NOTE_MARKERS", defaults.note_markers),
        prompts: defaults.prompts,
    }
}

fn keyword_list_from_env(var: &str, default: Vec<String>) -> Vec<String> {
    match env::var(var) {
        Ok(raw) => {
            let list = parse_keyword_list(&raw);
            if list.is_empty() {
                warn!("🪛️ {var} is set but contains no keywords. Using the default list.");
                default
            } else {
                list
            }
        },
        Err(_) => default,
    }
}
