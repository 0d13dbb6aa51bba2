use std::env;

use cfp_common::helpers::parse_boolean_flag;
use crossflow_server::{config::ServerConfig, server::run_server};
use dotenvy::dotenv;
use log::{error, info};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚀️ Preflight check failed. Exiting. Check the logs for details.");
        return;
    }
    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

fn preflight_check(config: &ServerConfig) -> bool {
    if parse_boolean_flag(env::var("CFP_SKIP_PREFLIGHT").ok(), false) {
        info!("🚦️ Skipping preflight checks. I hope you know what you're doing!");
        return true;
    }
    let mut result = true;
    info!("🚦️ Running preflight checks...");
    if config.database_url.is_empty() {
        error!("🚦️ CFP_DATABASE_URL is not set. Please set it to the URL for the CrossFlow database.");
        result = false;
    }
    if config.webhooks_enabled {
        if config.webhook_url.is_empty() {
            error!("🚦️ Webhooks are enabled but CFP_WEBHOOK_URL is not set. Set it to the sink that should receive signed events.");
            result = false;
        }
        if config.webhook_secret.is_empty() {
            error!("🚦️ Webhooks are enabled but CFP_WEBHOOK_SECRET is not set. Consumers cannot verify unsigned payloads.");
            result = false;
        }
    }
    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
        info!("🚦️ If you really know what you're doing and want to skip the preflight check, set `CFP_SKIP_PREFLIGHT` to `true` in your environment variables");
    }
    result
}
