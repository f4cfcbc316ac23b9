use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    game_loop::{LoopController, LoopRuntime},
    models::LoopStatus,
    settings::{ConfigPatch, ConfigStore, MaskedConfig},
    AppState,
};

pub const ALREADY_RUNNING: &str = "already running";
pub const NO_API_KEY: &str = "no Gemini API key configured";

/// Client to server message.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "lowercase")]
pub enum ClientCommand {
    Start,
    Stop,
    Config(ConfigPatch),
}

/// Server to client message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerMessage {
    Ack(Value),
    Error(String),
    Status(LoopStatus),
}

pub async fn start_loop(
    controller: &LoopController,
    config: &ConfigStore,
) -> Result<LoopRuntime, String> {
    if !config.snapshot().has_api_key() {
        return Err(NO_API_KEY.to_string());
    }
    match controller.start().await {
        Ok(true) => Ok(controller.snapshot().await),
        Ok(false) => Err(ALREADY_RUNNING.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

pub async fn stop_loop(controller: &LoopController) -> Result<LoopRuntime, String> {
    controller.stop().await.map_err(|e| e.to_string())?;
    Ok(controller.snapshot().await)
}

pub fn get_config(config: &ConfigStore) -> MaskedConfig {
    config.snapshot().masked()
}

pub async fn update_config(
    config: &ConfigStore,
    patch: ConfigPatch,
) -> Result<MaskedConfig, String> {
    config
        .update(patch)
        .await
        .map(|updated| updated.masked())
        .map_err(|e| e.to_string())
}

/// Run one command and build the reply for the sender.
pub async fn handle_command(state: &AppState, command: ClientCommand) -> ServerMessage {
    let reply = match command {
        ClientCommand::Start => start_loop(&state.controller, &state.config)
            .await
            .and_then(to_value),
        ClientCommand::Stop => stop_loop(&state.controller).await.and_then(to_value),
        ClientCommand::Config(patch) => {
            update_config(&state.config, patch).await.and_then(to_value)
        }
    };
    match reply {
        Ok(data) => ServerMessage::Ack(data),
        Err(message) => ServerMessage::Error(message),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}
