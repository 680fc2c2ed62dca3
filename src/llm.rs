//! Request/response mapping for the language-model API.
//!
//! Pure data transformation: chat requests carry an ordered list of
//! role-tagged messages, completion requests carry a bare prompt, and both
//! response shapes are deserialized field-for-field.  No state lives here.

use crate::{context::Context, helper::UserHelper, log_internal};
use anyhow::{anyhow, Result};
use serenity::all::ChannelId;

/// LLM generation settings
pub struct LlmSettings<'a> {
    pub model_name: &'a str,
    pub system: &'a str,
    pub context_size: usize,
    pub temperature: f32,
}

#[derive(serde::Serialize)]
pub struct LlmChatRequest {
    /// LLM model name
    model: String,
    /// Whether to stream one token at a time, or return entire response in one go
    stream: bool,
    /// Chat conversation to continue.
    messages: Vec<ChatMessage>,
    /// Upper bound on generated tokens
    max_tokens: usize,
    /// LLM temperature
    temperature: f32,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ChatMessage {
    role: ChatMessageRole,
    content: String,
}

#[allow(non_camel_case_types)] // Serialized literally; case matters
#[derive(serde::Serialize, serde::Deserialize)]
enum ChatMessageRole {
    system,
    user,
    assistant,
}

#[derive(serde::Deserialize)]
struct LlmChatResponse {
    id: String,
    created: u64,
    model: String,
    choices: Vec<LlmChatChoice>,
    usage: LlmUsage,
}

#[derive(serde::Deserialize)]
struct LlmChatChoice {
    finish_reason: Option<String>,
    message: ChatMessage,
}

#[derive(serde::Serialize)]
pub struct LlmCompletionRequest {
    model: String,
    stream: bool,
    /// Start of text for which the model should generate further text.
    prompt: String,
    max_tokens: usize,
    temperature: f32,
}

#[derive(serde::Deserialize)]
struct LlmCompletionResponse {
    id: String,
    created: u64,
    model: String,
    choices: Vec<LlmCompletionChoice>,
    usage: LlmUsage,
}

#[derive(serde::Deserialize)]
struct LlmCompletionChoice {
    finish_reason: Option<String>,
    text: String,
}

#[derive(serde::Deserialize)]
struct LlmUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl LlmChatRequest {
    pub async fn from_recent_history(
        ctx: &Context<'_>,
        channel_id: ChannelId,
        settings: &LlmSettings<'_>,
    ) -> Result<Self> {
        let guild_id = channel_id
            .to_channel(ctx.cache_http)
            .await?
            .guild()
            .map(|g| g.guild_id);

        let mut vstate = ctx.vstate.write().await;
        let history = vstate.history.get(ctx, channel_id).await?;

        let bot = ctx.cache.current_user().clone(); // clone to avoid async/send safety
        let bot_id = bot.id;
        let bot_name = bot.nick_in_guild(ctx, guild_id).await;

        let interlocutor_name = &history
            .last()
            .ok_or(anyhow!(
                "LlmChatRequest::from_recent_history() called without any history"
            ))?
            .author_name;

        let system = settings
            .system
            .replace("{{bot}}", bot_name.as_str())
            .replace("{{user}}", interlocutor_name);

        // Build in reverse order so that we can stop adding if the accumulated content gets too
        // long.
        let mut total_bytes = system.len(); // include not yet added system message size
        let mut messages = Vec::new();
        for entry in history.iter().rev() {
            let (role, content) = if entry.author_id == bot_id {
                let content = entry.human_format_content.clone();
                (ChatMessageRole::assistant, content)
            } else {
                let content = format!("{}: {}", entry.author_name, &entry.human_format_content);
                (ChatMessageRole::user, content)
            };
            total_bytes += content.len();
            // Use byte count as a crude estimate of tokens.
            if total_bytes / 3 > settings.context_size {
                break;
            }
            messages.push(ChatMessage { role, content });
        }

        // Add system message at the end of about-to-be-reversed message history so it's at the
        // start
        messages.push(ChatMessage {
            role: ChatMessageRole::system,
            content: system,
        });

        // Reverse back to chronological order.
        messages.reverse();

        Ok(Self {
            model: settings.model_name.to_owned(),
            messages,
            stream: false,
            temperature: settings.temperature,
            max_tokens: settings.context_size,
        })
    }

    pub async fn post(&self, ctx: &Context<'_>) -> Result<String> {
        let cfg = ctx.cfg.read().await;
        let url = cfg.llm_general.chat_url.as_str();

        log_internal!("Sending request to chat endpoint {}... ", url);
        let client = reqwest::Client::new();
        let response = client
            .post(url)
            .json(self)
            .send()
            .await?
            .json::<LlmChatResponse>()
            .await?;
        log_internal!(
            "Chat response {} from {} (created {}): {} tokens",
            response.id,
            response.model,
            response.created,
            response.usage.total_tokens,
        );

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(anyhow!("Chat endpoint returned no choices"))?;
        if let Some(reason) = &choice.finish_reason {
            if reason != "stop" {
                log_internal!("Chat generation finished early: {}", reason);
            }
        }

        Ok(clamp_to_discord_limit(choice.message.content))
    }
}

impl LlmCompletionRequest {
    pub fn new(prompt: String, settings: &LlmSettings<'_>) -> Self {
        Self {
            model: settings.model_name.to_owned(),
            stream: false,
            prompt,
            max_tokens: settings.context_size,
            temperature: settings.temperature,
        }
    }

    pub async fn post(&self, ctx: &Context<'_>) -> Result<String> {
        let cfg = ctx.cfg.read().await;
        let url = cfg.llm_general.completion_url.as_str();

        log_internal!("Sending request to completion endpoint {}... ", url);
        let client = reqwest::Client::new();
        let response = client
            .post(url)
            .json(self)
            .send()
            .await?
            .json::<LlmCompletionResponse>()
            .await?;
        log_internal!(
            "Completion response {} from {} (created {}): {} prompt + {} completion tokens",
            response.id,
            response.model,
            response.created,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
        );

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(anyhow!("Completion endpoint returned no choices"))?;
        if let Some(reason) = &choice.finish_reason {
            if reason != "stop" {
                log_internal!("Completion finished early: {}", reason);
            }
        }

        Ok(clamp_to_discord_limit(choice.text))
    }
}

// TODO: split messages longer than the discord max of 2000 characters into multiple
// messages.  Put some time between them to avoid Discord thinking of it as spam.
fn clamp_to_discord_limit(content: String) -> String {
    if content.len() >= 1900 {
        return "I blabbed too long and my message was longer than the discord post limit"
            .to_string();
    }

    content
}
