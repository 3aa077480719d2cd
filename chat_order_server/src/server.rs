use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use chat_order_engine::{EventDispatcher, InMemoryStateStore};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{ChatApi, ErpApi},
    middleware::SignatureMiddlewareFactory,
    routes::{health, ChatWebhookRoute},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let backend = ErpApi::new(config.erp.clone())?;
    let sender = ChatApi::new(config.channel.clone())?;
    let state = InMemoryStateStore::new();
    let srv = create_server_instance(config, backend, state, sender)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    backend: ErpApi,
    state: InMemoryStateStore,
    sender: ChatApi,
) -> Result<Server, ServerError> {
    if config.channel.secret.reveal().is_empty() && config.channel.signature_checks {
        warn!("🚨️ No channel secret is configured. Every webhook delivery will be rejected.");
    }
    let srv = HttpServer::new(move || {
        let dispatcher = EventDispatcher::new(backend.clone(), state.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cog::access_log"))
            .app_data(web::Data::new(dispatcher))
            .app_data(web::Data::new(sender.clone()))
            .app_data(web::Data::new(config.bot.clone()));
        let webhook_scope = web::scope("/chat")
            .wrap(SignatureMiddlewareFactory::new(
                &config.channel.signature_header,
                config.channel.secret.clone(),
                config.channel.signature_checks,
            ))
            .service(ChatWebhookRoute::<ErpApi, InMemoryStateStore, ChatApi>::new());
        app.service(health).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
