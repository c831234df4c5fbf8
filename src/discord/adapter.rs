//! Discord platform adapter.
//!
//! Outbound calls go through a dedicated serenity [`Http`] client; inbound
//! events arrive through a gateway client built in [`BotAdapter::run`] and
//! are translated by [`DiscordHandler`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backon::BackoffBuilder;
use serenity::builder::{CreateAttachment, CreateEmbed, CreateMessage, EditMessage};
use serenity::gateway::ShardManager;
use serenity::http::{Http, HttpBuilder};
use serenity::model::channel::Embed;
use serenity::model::id::{ChannelId, MessageId, UserId};
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::adapter::{edit_with_caption_fallback, BotAdapter, SharedAdapter};
use crate::bridge::BridgeController;
use crate::common::error::{AdapterError, AdapterResult};
use crate::common::{DocumentMessage, MediaKind, TextMessage};
use crate::config::types::BotConfig;
use crate::discord::handler::DiscordHandler;

/// Discord rejects message content longer than this many characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// A gateway session that lasted this long starts the next reconnect from
/// the shortest delay again.
const STABLE_SESSION: Duration = Duration::from_secs(60);

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

/// State shared between the adapter and its gateway event handler.
#[derive(Debug, Default)]
pub struct DiscordState {
    /// Channel id -> display name.
    channel_names: RwLock<HashMap<ChannelId, String>>,
    /// Channel id -> authors seen there.
    known_users: RwLock<HashMap<ChannelId, BTreeSet<String>>>,
    /// Last display name seen per author, for edit envelopes.
    nicknames: RwLock<HashMap<UserId, String>>,
}

impl DiscordState {
    pub async fn remember_author(&self, channel_id: ChannelId, user_id: UserId, nickname: &str) {
        self.known_users
            .write()
            .await
            .entry(channel_id)
            .or_default()
            .insert(nickname.to_string());
        self.nicknames
            .write()
            .await
            .insert(user_id, nickname.to_string());
    }

    pub async fn nickname(&self, user_id: UserId) -> Option<String> {
        self.nicknames.read().await.get(&user_id).cloned()
    }

    pub async fn remember_channel_name(&self, channel_id: ChannelId, name: String) {
        self.channel_names.write().await.insert(channel_id, name);
    }

    async fn channel_name(&self, channel_id: ChannelId) -> Option<String> {
        self.channel_names.read().await.get(&channel_id).cloned()
    }

    async fn users_of(&self, channel_id: ChannelId) -> Vec<String> {
        self.known_users
            .read()
            .await
            .get(&channel_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Bridge adapter for one Discord bot account.
pub struct DiscordAdapter {
    id: String,
    token: String,
    http: Arc<Http>,
    state: Arc<DiscordState>,
    shard_manager: RwLock<Option<Arc<ShardManager>>>,
}

impl DiscordAdapter {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> AdapterResult<Self> {
        let id = id.into();
        let token = token.into();
        let http = build_http(&token).map_err(|e| AdapterError::InitFailed {
            adapter: id.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            id,
            token,
            http: Arc::new(http),
            state: Arc::new(DiscordState::default()),
            shard_manager: RwLock::new(None),
        })
    }

    /// Registry factory.
    pub fn from_config(id: &str, bot: &BotConfig) -> AdapterResult<SharedAdapter> {
        let token = bot
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AdapterError::MissingSetting {
                bot: id.to_string(),
                setting: "token".to_string(),
            })?;

        Ok(Arc::new(Self::new(id, token)?))
    }

    async fn fetch_channel_name(&self, channel_id: ChannelId) -> Option<String> {
        match self.http.get_channel(channel_id).await {
            Ok(channel) => channel.guild().map(|guild_channel| guild_channel.name),
            Err(e) => {
                debug!("Could not look up Discord channel {}: {}", channel_id, e);
                None
            }
        }
    }

    async fn build_client(&self, controller: Arc<BridgeController>) -> AdapterResult<Client> {
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILDS;

        let http = build_http(&self.token).map_err(|e| AdapterError::InitFailed {
            adapter: self.id.clone(),
            message: e.to_string(),
        })?;

        let handler = DiscordHandler::new(self.id.clone(), self.state.clone(), controller);
        let client = serenity::client::ClientBuilder::new_with_http(http, intents)
            .event_handler(handler)
            .await?;
        Ok(client)
    }
}

/// Serenity HTTP client with bounded request times.
fn build_http(token: &str) -> reqwest::Result<Http> {
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    Ok(HttpBuilder::new(token).client(reqwest_client).build())
}

/// Exponential backoff for gateway reconnects.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn gateway_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(300))
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Delay before the next gateway reconnect.
///
/// Restarts the schedule from `fresh` when the session that just ended was
/// stable, so a bot that ran for days does not wait the maximum delay.
fn reconnect_delay<I, F>(backoff: &mut I, fresh: F, session: Duration) -> Duration
where
    I: Iterator<Item = Duration>,
    F: FnOnce() -> I,
{
    if session >= STABLE_SESSION {
        *backoff = fresh();
    }
    backoff.next().unwrap_or(MAX_RECONNECT_DELAY)
}

/// How a relayed document appears in the Discord channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLayout {
    /// Image shown inside an embed whose description is the caption.
    InlineImage,
    /// Plain file with the caption as content. Discord renders its own
    /// player for audio and video files.
    Attachment,
}

pub fn document_layout(kind: MediaKind) -> DocumentLayout {
    match kind {
        MediaKind::Image => DocumentLayout::InlineImage,
        MediaKind::Audio | MediaKind::Video | MediaKind::Other => DocumentLayout::Attachment,
    }
}

/// Message carrying a document, without the file itself.
fn document_message(kind: MediaKind, caption: &str, filename: &str) -> CreateMessage {
    match document_layout(kind) {
        DocumentLayout::InlineImage => CreateMessage::new().embed(
            CreateEmbed::new()
                .description(fit_message_limit(caption))
                .image(format!("attachment://{}", filename)),
        ),
        DocumentLayout::Attachment => CreateMessage::new().content(fit_message_limit(caption)),
    }
}

/// Embed for a caption edit: the existing embed with a new description.
fn caption_embed(existing: Option<&Embed>, caption: &str) -> CreateEmbed {
    match existing {
        Some(embed) => CreateEmbed::from(embed.clone()).description(caption),
        None => CreateEmbed::new().description(caption),
    }
}

/// Parse a Discord snowflake (channel or message id).
pub fn parse_snowflake(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|id| *id != 0)
}

fn parse_channel(raw: &str) -> AdapterResult<ChannelId> {
    parse_snowflake(raw)
        .map(ChannelId::new)
        .ok_or_else(|| AdapterError::InvalidChannel {
            channel: raw.to_string(),
        })
}

fn parse_message_id(raw: &str) -> AdapterResult<MessageId> {
    parse_snowflake(raw)
        .map(MessageId::new)
        .ok_or_else(|| AdapterError::InvalidMessageId {
            message_id: raw.to_string(),
        })
}

/// Cut content down to Discord's message limit on a character boundary.
pub fn fit_message_limit(content: &str) -> String {
    match content.char_indices().nth(MESSAGE_LIMIT) {
        Some((cut, _)) => content[..cut].to_string(),
        None => content.to_string(),
    }
}

#[async_trait]
impl BotAdapter for DiscordAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn init(&self, channels: &[String]) -> AdapterResult<()> {
        let me = self
            .http
            .get_current_user()
            .await
            .map_err(|e| AdapterError::InitFailed {
                adapter: self.id.clone(),
                message: e.to_string(),
            })?;
        info!("Discord adapter '{}' authenticated as {}", self.id, me.name);

        for raw in channels {
            let channel_id = parse_channel(raw)?;
            match self.fetch_channel_name(channel_id).await {
                Some(name) => {
                    debug!("Discord channel {} is #{}", channel_id, name);
                    self.state.remember_channel_name(channel_id, name).await;
                }
                None => warn!(
                    "Discord adapter '{}' cannot see channel {}, is the bot a member?",
                    self.id, channel_id
                ),
            }
        }

        Ok(())
    }

    async fn send_text(&self, _message: &TextMessage, envelope: &str, channel: &str) -> AdapterResult<Option<String>> {
        let channel_id = parse_channel(channel)?;
        let builder = CreateMessage::new().content(fit_message_limit(envelope));
        let sent = channel_id.send_message(&self.http, builder).await?;
        Ok(Some(sent.id.to_string()))
    }

    async fn send_document(
        &self,
        message: &DocumentMessage,
        caption: &str,
        channel: &str,
    ) -> AdapterResult<Option<String>> {
        let channel_id = parse_channel(channel)?;
        let filename = message.filename();
        let attachment = CreateAttachment::bytes(message.payload().to_vec(), filename.clone());

        let builder = document_message(message.media_kind(), caption, &filename).add_file(attachment);

        let sent = channel_id.send_message(&self.http, builder).await?;
        Ok(Some(sent.id.to_string()))
    }

    async fn edit_text(
        &self,
        _message: &TextMessage,
        envelope: &str,
        channel: &str,
        message_id: &str,
    ) -> AdapterResult<()> {
        let channel_id = parse_channel(channel)?;
        let message_id = parse_message_id(message_id)?;
        let content = fit_message_limit(envelope);
        let current = self.http.get_message(channel_id, message_id).await?;

        edit_with_caption_fallback(
            || async {
                // Captioned images keep their text in the embed.
                if !current.embeds.is_empty() {
                    return Err(AdapterError::NotEditableAsText {
                        message_id: message_id.to_string(),
                    });
                }
                channel_id
                    .edit_message(&self.http, message_id, EditMessage::new().content(&content))
                    .await?;
                Ok(())
            },
            || async {
                let embed = caption_embed(current.embeds.first(), &content);
                channel_id
                    .edit_message(&self.http, message_id, EditMessage::new().embed(embed))
                    .await?;
                Ok::<(), AdapterError>(())
            },
        )
        .await
    }

    async fn list_known_users(&self, channel: &str) -> AdapterResult<Vec<String>> {
        let channel_id = parse_channel(channel)?;
        Ok(self.state.users_of(channel_id).await)
    }

    async fn resolve_channel_name(&self, channel_id: &str) -> String {
        let Some(id) = parse_snowflake(channel_id).map(ChannelId::new) else {
            return channel_id.to_string();
        };

        if let Some(name) = self.state.channel_name(id).await {
            return name;
        }

        match self.fetch_channel_name(id).await {
            Some(name) => {
                self.state.remember_channel_name(id, name.clone()).await;
                name
            }
            None => channel_id.to_string(),
        }
    }

    async fn run(&self, controller: Arc<BridgeController>) -> AdapterResult<()> {
        let mut backoff = gateway_backoff();

        loop {
            info!("Connecting Discord adapter '{}' to the gateway...", self.id);

            let mut client = match self.build_client(controller.clone()).await {
                Ok(client) => client,
                Err(e) => {
                    error!("Failed to build Discord client for '{}': {}", self.id, e);
                    let delay = backoff.next().unwrap_or(MAX_RECONNECT_DELAY);
                    warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                    sleep(delay).await;
                    continue;
                }
            };
            *self.shard_manager.write().await = Some(client.shard_manager.clone());

            let started = Instant::now();
            match client.start().await {
                Ok(()) => {
                    info!("Discord adapter '{}' disconnected normally", self.id);
                    return Ok(());
                }
                Err(e) => {
                    error!("Discord adapter '{}' gateway error: {}", self.id, e);
                    let delay = reconnect_delay(&mut backoff, gateway_backoff, started.elapsed());
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn close(&self) {
        let manager = self.shard_manager.write().await.take();
        if let Some(manager) = manager {
            info!("Initiating graceful Discord shutdown for '{}'...", self.id);
            manager.shutdown_all().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snowflake() {
        assert_eq!(parse_snowflake("1234567890"), Some(1234567890));
        assert_eq!(parse_snowflake(" 42 "), Some(42));
        assert_eq!(parse_snowflake("0"), None);
        assert_eq!(parse_snowflake("general"), None);
        assert_eq!(parse_snowflake("-5"), None);
    }

    #[test]
    fn test_invalid_channel_error() {
        let err = parse_channel("lobby").unwrap_err();
        assert!(matches!(err, AdapterError::InvalidChannel { channel } if channel == "lobby"));
    }

    #[test]
    fn test_fit_message_limit() {
        let short = "A/general/u: hi";
        assert_eq!(fit_message_limit(short), short);

        let long = "é".repeat(MESSAGE_LIMIT + 10);
        let cut = fit_message_limit(&long);
        assert_eq!(cut.chars().count(), MESSAGE_LIMIT);
    }

    #[test]
    fn test_document_layout_by_media_kind() {
        assert_eq!(document_layout(MediaKind::Image), DocumentLayout::InlineImage);
        assert_eq!(document_layout(MediaKind::Video), DocumentLayout::Attachment);
        assert_eq!(document_layout(MediaKind::Audio), DocumentLayout::Attachment);
        assert_eq!(document_layout(MediaKind::Other), DocumentLayout::Attachment);
    }

    #[test]
    fn test_video_sent_as_plain_attachment() {
        let value = serde_json::to_value(document_message(MediaKind::Video, "A/general/amy: clip", "clip.mp4")).unwrap();

        assert_eq!(value["content"], "A/general/amy: clip");
        assert!(value["embeds"].as_array().map_or(true, |embeds| embeds.is_empty()));
    }

    #[test]
    fn test_image_sent_inside_embed() {
        let value = serde_json::to_value(document_message(MediaKind::Image, "A/general/amy: cat", "cat.png")).unwrap();

        let embed = &value["embeds"][0];
        assert_eq!(embed["description"], "A/general/amy: cat");
        assert_eq!(embed["image"]["url"], "attachment://cat.png");
        assert!(value["content"].is_null());
    }

    #[test]
    fn test_caption_edit_keeps_image() {
        let existing: Embed = serde_json::from_value(serde_json::json!({
            "type": "rich",
            "description": "A/general/amy: cat",
            "image": { "url": "https://cdn.discordapp.com/attachments/1/2/cat.png" }
        }))
        .unwrap();

        let value = serde_json::to_value(caption_embed(Some(&existing), "A/general/amy: a cat")).unwrap();
        assert_eq!(value["description"], "A/general/amy: a cat");
        assert_eq!(value["image"]["url"], "https://cdn.discordapp.com/attachments/1/2/cat.png");

        let bare = serde_json::to_value(caption_embed(None, "text")).unwrap();
        assert_eq!(bare["description"], "text");
        assert!(bare["image"].is_null());
    }

    #[test]
    fn test_reconnect_delay_grows_during_unstable_sessions() {
        let schedule = || (1..).map(Duration::from_secs);
        let mut backoff = schedule();

        let short = Duration::from_secs(1);
        assert_eq!(reconnect_delay(&mut backoff, schedule, short), Duration::from_secs(1));
        assert_eq!(reconnect_delay(&mut backoff, schedule, short), Duration::from_secs(2));
        assert_eq!(reconnect_delay(&mut backoff, schedule, short), Duration::from_secs(3));
    }

    #[test]
    fn test_reconnect_delay_resets_after_stable_session() {
        let schedule = || (1..).map(Duration::from_secs);
        let mut backoff = schedule();
        backoff.nth(10);

        assert_eq!(
            reconnect_delay(&mut backoff, schedule, STABLE_SESSION),
            Duration::from_secs(1)
        );
        assert_eq!(
            reconnect_delay(&mut backoff, schedule, Duration::ZERO),
            Duration::from_secs(2)
        );
    }

    #[tokio::test]
    async fn test_known_users_are_sorted_and_unique() {
        let state = DiscordState::default();
        let channel = ChannelId::new(10);
        state.remember_author(channel, UserId::new(2), "zed").await;
        state.remember_author(channel, UserId::new(1), "amy").await;
        state.remember_author(channel, UserId::new(1), "amy").await;

        assert_eq!(state.users_of(channel).await, vec!["amy".to_string(), "zed".to_string()]);
        assert!(state.users_of(ChannelId::new(11)).await.is_empty());
        assert_eq!(state.nickname(UserId::new(2)).await, Some("zed".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_channel_name_keeps_non_snowflake() {
        let adapter = DiscordAdapter::new("A", "token").unwrap();
        assert_eq!(adapter.resolve_channel_name("general").await, "general");
    }

    #[tokio::test]
    async fn test_resolve_channel_name_uses_cache() {
        let adapter = DiscordAdapter::new("A", "token").unwrap();
        adapter
            .state
            .remember_channel_name(ChannelId::new(55), "lounge".to_string())
            .await;
        assert_eq!(adapter.resolve_channel_name("55").await, "lounge");
    }
}
