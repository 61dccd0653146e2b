//! The `run` command: wires the collaborators together and drives the bot
//! until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use calnotify_core::{AUTHORIZED_TEXT, INITIALIZING_TEXT};
use calnotify_providers::google::{GoogleCalendarSource, GoogleIdentity};
use calnotify_providers::slack::SlackClient;
use calnotify_providers::{ChannelDirectory, FileCredentialStore, NotificationSink};
use calnotify_server::{
    AuthBroker, ChannelPrompter, EventGrouper, NotificationScheduler, RefreshDriver,
    ReminderDelivery, ReminderEngine, ServerConfig, SignalHandler, callback,
};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::{BotConfig, PORT_ENV};
use crate::error::{BotError, BotResult};

/// How long the refresh driver gets to finish its current cycle on shutdown.
const DRIVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the bot in the foreground.
pub async fn run(config: &BotConfig) -> BotResult<()> {
    let port = std::env::var(PORT_ENV).ok();
    let server_config = config.server_config(port.as_deref())?;
    let callback_url = config.http.callback_url()?;

    let slack = Arc::new(SlackClient::new(config.slack.resolve_token()?)?);
    let directory = Arc::new(slack.load_directory().await?);
    info!(channels = directory.len(), "channel directory loaded");

    let admin_id = admin_channel_id(&server_config, &directory)?;
    warn_unknown_channels(&server_config, &directory);

    let sink: Arc<dyn NotificationSink> = slack;
    if let Err(e) = sink.post_text(&admin_id, INITIALIZING_TEXT).await {
        warn!(error = %e, "failed to post initializing message");
    }

    let google = config.google.provider_config(&callback_url)?;
    let identity = Arc::new(GoogleIdentity::new(google.clone())?);
    let source = Arc::new(GoogleCalendarSource::new(&google)?);
    let store = Arc::new(FileCredentialStore::new(config.google.token_path()?));
    let prompter = Arc::new(ChannelPrompter::new(sink.clone(), admin_id.clone()));
    let broker = Arc::new(AuthBroker::new(store, identity, prompter));

    let signals = SignalHandler::new();
    signals.spawn_listener();

    let listener = TcpListener::bind(server_config.bind).await?;
    let server = tokio::spawn(callback::serve(
        listener,
        broker.clone(),
        signals.shutdown().wait(),
    ));

    info!(callback = %callback_url, "waiting for calendar authorization");
    tokio::select! {
        result = broker.ensure_credential() => {
            result?;
        }
        _ = signals.shutdown().wait() => {
            broker.abandon_pending().await;
            join_server(server).await;
            return Ok(());
        }
    }
    if let Err(e) = sink.post_text(&admin_id, AUTHORIZED_TEXT).await {
        warn!(error = %e, "failed to post authorized message");
    }

    let delivery = Arc::new(ReminderDelivery::new(
        sink,
        directory,
        server_config.emphasize_channels.clone(),
    ));
    let engine = Arc::new(ReminderEngine::new(
        broker.clone(),
        EventGrouper::new(source, server_config.grouper_config()),
        NotificationScheduler::new(delivery),
        server_config.pairings.clone(),
    ));

    let driver = RefreshDriver::new(server_config.refresh_config());
    let refresh = driver.handle();
    let cycle_engine = engine.clone();
    let mut driver_task = tokio::spawn(driver.run(move || {
        let engine = cycle_engine.clone();
        async move { engine.run_cycle().await.map(|_| ()) }
    }));

    signals.shutdown().wait().await;
    info!("shutting down");

    broker.abandon_pending().await;
    if refresh.stop().await.is_err() {
        debug!("refresh driver already stopped");
    }
    match tokio::time::timeout(DRIVER_STOP_TIMEOUT, &mut driver_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "refresh driver task failed"),
        Err(_) => {
            warn!("refresh driver did not stop in time");
            driver_task.abort();
        }
    }
    engine.shutdown().await;
    join_server(server).await;

    info!("stopped");
    Ok(())
}

/// Resolves the admin channel; the bot cannot operate without it.
fn admin_channel_id(config: &ServerConfig, directory: &ChannelDirectory) -> BotResult<String> {
    directory
        .resolve(&config.admin_channel)
        .map(str::to_string)
        .ok_or_else(|| {
            BotError::config(format!(
                "admin channel `{}` is not visible to the bot",
                config.admin_channel
            ))
        })
}

/// Paired channels that are missing get skipped at delivery time.
fn warn_unknown_channels(config: &ServerConfig, directory: &ChannelDirectory) {
    for pairing in &config.pairings {
        if !directory.contains(&pairing.channel) {
            warn!(
                channel = %pairing.channel,
                calendar = %pairing.calendar,
                "paired channel not found; its reminders will be dropped"
            );
        }
    }
}

async fn join_server(server: tokio::task::JoinHandle<calnotify_server::ServerResult<()>>) {
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "callback listener failed"),
        Err(e) => error!(error = %e, "callback listener task failed"),
    }
}

#[cfg(test)]
mod tests {
    use calnotify_core::ChannelCalendarPairing;

    use super::*;

    fn config() -> ServerConfig {
        ServerConfig::new(
            vec![
                ChannelCalendarPairing::new("general", "team@example.com"),
                ChannelCalendarPairing::new("eng", "eng@example.com"),
            ],
            "bot-admin",
        )
    }

    #[test]
    fn admin_channel_resolves() {
        let directory: ChannelDirectory =
            [("bot-admin", "C0ADMIN"), ("general", "C0GEN")].into_iter().collect();
        assert_eq!(admin_channel_id(&config(), &directory).unwrap(), "C0ADMIN");
    }

    #[test]
    fn missing_admin_channel_is_fatal() {
        let directory: ChannelDirectory = [("general", "C0GEN")].into_iter().collect();
        let err = admin_channel_id(&config(), &directory).unwrap_err();
        assert!(err.to_string().contains("bot-admin"));
    }
}
