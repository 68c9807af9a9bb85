//! Routes chat turns from bot front-ends to completion backend nodes.
//!
//! Each conversation is pinned to the backend node and backend session that
//! hold its context. Pinnings live in an external affinity store so they
//! survive restarts. New conversations go through priority-ordered failover
//! across the bot's nodes.

pub mod affinity;
pub mod backend;
pub mod chat_handler;
pub mod config;
pub mod conversation;
pub mod delivery;
pub mod errors;
pub mod event;
pub mod executor;
pub mod metrics_defs;
pub mod nodes;
pub mod service;

#[cfg(test)]
mod testutils;

use crate::backend::HttpBackendConnector;
use crate::chat_handler::ChatService;
use crate::config::{Config, parse_store_document};
use crate::delivery::BotApiClient;
use crate::errors::ChatRouterError;
use crate::service::ChatRouterService;
use affinity_store::AffinityStore;
use shared::admin_service::AdminService;
use shared::http::{bind, run_http_service};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;

pub async fn run(mut config: Config) -> Result<(), ChatRouterError> {
    config.validate()?;

    let store = affinity_store::get_store(config.store.clone());
    apply_store_document(&mut config, store.as_ref()).await?;
    config.validate()?;

    let http = reqwest::Client::new();
    let connector = Arc::new(HttpBackendConnector::new(http.clone()));
    let delivery = Arc::new(BotApiClient::new(http, config.delivery.api_base.clone()));
    let chat = ChatService::from_config(
        &config.bots,
        store,
        connector,
        delivery,
        &config.session_key_prefix,
        &config.fail_msg,
    );
    let router_service = ChatRouterService::new(&config.base_path, Arc::new(chat));

    let router_listener = bind(&config.listener.host, config.listener.port).await?;
    let admin_listener = bind(&config.admin_listener.host, config.admin_listener.port).await?;
    tracing::info!(bots = config.bots.len(), "Chat router started");

    serve(router_listener, admin_listener, router_service).await
}

/// Serves the webhook and admin listeners until either fails.
///
/// `/ready` reports OK from the start: both listeners are already bound, so
/// probes queue until the accept loops pick them up.
async fn serve(
    router_listener: TcpListener,
    admin_listener: TcpListener,
    router_service: ChatRouterService,
) -> Result<(), ChatRouterError> {
    let ready = Arc::new(AtomicBool::new(false));
    let ready_probe = ready.clone();
    let admin_service: AdminService<_, ChatRouterError> =
        AdminService::new(move || ready_probe.load(Ordering::Relaxed));

    let router_task = run_http_service(router_listener, router_service);
    let admin_task = run_http_service(admin_listener, admin_service);
    ready.store(true, Ordering::Relaxed);

    tokio::try_join!(router_task, admin_task)?;
    Ok(())
}

/// Merges the application document under `bots_key` into `config`.
///
/// Its bots override file bots with the same id; its delivery address and
/// fail message, when present, replace the file's.
async fn apply_store_document(
    config: &mut Config,
    store: &dyn AffinityStore,
) -> Result<(), ChatRouterError> {
    let Some(key) = config.bots_key.clone() else {
        return Ok(());
    };

    let raw = store
        .get(&key)
        .await
        .ok_or_else(|| ChatRouterError::BotsNotFound { key: key.clone() })?;
    let section = parse_store_document(&raw)
        .map_err(|source| ChatRouterError::InvalidBotsDocument {
            key: key.clone(),
            source,
        })?
        .wechat_bot;

    if let Some(api_base) = section.api_base {
        config.delivery.api_base = api_base;
    }
    if let Some(fail_msg) = section.fail_msg {
        config.fail_msg = fail_msg;
    }

    for (bot_id, bot) in section.bots {
        bot.validate(&bot_id)?;
        if config.bots.insert(bot_id.clone(), bot).is_some() {
            tracing::info!(bot_id = %bot_id, key = %key, "Store configuration overrides bot");
        }
    }

    Ok(())
}
