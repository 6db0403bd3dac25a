//! Core bot infrastructure: startup, gateway bridge, and async event loop.
//!
//! [`Bot::start`] validates the token, opens the gateway, and returns a
//! running bot. [`Bot::run`] pumps gateway events, handing each inbound
//! message to the [`Dispatcher`] on its own task so a slow handler never
//! holds up the others.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::config::{Config, ConfigError};
use crate::events::GatewayEvent;
use crate::gateway::{self, GatewayConfig, GatewayError, GatewayHandle, Intents};
use crate::handlers::Dispatcher;
use crate::http::{DiscordHttpClient, HttpError};
use crate::weather::{WeatherClient, WeatherError};

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not authenticate with Discord: {0}")]
    Http(#[from] HttpError),
    #[error("could not build weather client: {0}")]
    Weather(#[from] WeatherError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Gateway intents the bot identifies with.
pub fn gateway_intents() -> Intents {
    Intents::GUILDS
        | Intents::GUILD_MEMBERS
        | Intents::GUILD_PRESENCES
        | Intents::GUILD_MESSAGES
        | Intents::MESSAGE_CONTENT
}

/// A connected bot: the session handle plus the dispatcher built around it.
pub struct Bot {
    gateway: GatewayHandle,
    dispatcher: Arc<Dispatcher>,
}

impl Bot {
    /// Authenticate, build the clients, and connect to the gateway.
    pub async fn start(config: Config) -> Result<Self, BotError> {
        let http = DiscordHttpClient::new(&config.discord_token, config.http_timeout)?;

        // Fails fast on a bad token, and tells us who "self" is.
        let me = http.current_user().await?;
        info!(user = %me.tag(), user_id = %me.id, "authenticated with Discord");

        let weather = WeatherClient::new(
            config.weather_url.clone(),
            config.weather_api_key.clone(),
            config.http_timeout,
        )?;

        let dispatcher = Arc::new(Dispatcher::new(me.id, Arc::new(http), Arc::new(weather)));

        let gateway = gateway::connect(GatewayConfig {
            token: config.discord_token,
            intents: gateway_intents(),
        });

        info!("gateway connecting, entering event loop");
        Ok(Self {
            gateway,
            dispatcher,
        })
    }

    /// Process events until the gateway driver stops on its own.
    pub async fn run(&self) {
        while let Ok(event) = self.gateway.events.recv().await {
            match event {
                GatewayEvent::Ready(ready) => {
                    info!(
                        user = %ready.user.tag(),
                        guilds = ready.guilds.len(),
                        "bot is ready!"
                    );
                }

                GatewayEvent::MessageCreate(msg) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    tokio::spawn(async move {
                        if let Some(kind) = dispatcher.on_message(&msg).await {
                            debug!(command = ?kind, message_id = %msg.id, "command finished");
                        }
                    });
                }

                // Session plumbing is handled inside the gateway driver.
                GatewayEvent::HeartbeatAck
                | GatewayEvent::HeartbeatRequest
                | GatewayEvent::Reconnect
                | GatewayEvent::InvalidSession(_) => {}

                GatewayEvent::Unknown { event_name, op } => {
                    trace!(event = ?event_name, op = ?op, "unhandled gateway event");
                }
            }
        }
    }

    /// Close the gateway cleanly (used on SIGINT/SIGTERM).
    pub async fn shutdown(self) -> Result<(), BotError> {
        info!("closing gateway");
        self.gateway.close().await.map_err(BotError::from)
    }

    /// Wait for the gateway driver after [`run`](Self::run) returned, surfacing
    /// why it stopped.
    pub async fn finish(self) -> Result<(), BotError> {
        let result = self.gateway.join().await;
        if let Err(ref e) = result {
            error!(error = %e, "gateway stopped");
        }
        result.map_err(BotError::from)
    }
}
