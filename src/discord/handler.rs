//! Discord gateway event handling.
//!
//! Translates Discord messages and edits into bridge messages and hands
//! them to the controller. Also answers the `!users` and `!help` commands.

use std::path::Path;
use std::sync::Arc;

use serenity::async_trait;
use serenity::model::channel::{Attachment, Message};
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::model::user::User;
use serenity::prelude::*;
use tracing::{debug, error, info, warn};

use crate::adapter::envelope::{describe_sticker, join_body};
use crate::bridge::BridgeController;
use crate::common::{ChatMessage, DocumentMessage, MediaKind, RelayMessage, TextMessage};
use crate::discord::adapter::{fit_message_limit, DiscordState};
use crate::discord::resolver::MarkupResolver;

/// Discord event handler for one adapter.
pub struct DiscordHandler {
    adapter_id: String,
    state: Arc<DiscordState>,
    controller: Arc<BridgeController>,
    resolver: MarkupResolver,
}

impl DiscordHandler {
    pub fn new(adapter_id: String, state: Arc<DiscordState>, controller: Arc<BridgeController>) -> Self {
        Self {
            adapter_id,
            state,
            controller,
            resolver: MarkupResolver::new(),
        }
    }

    /// Parse and execute a bridge command.
    ///
    /// Returns `true` if the message was a command, `false` otherwise.
    async fn handle_command(&self, ctx: &Context, msg: &Message, content: &str) -> anyhow::Result<bool> {
        if content.len() > 100 || !content.starts_with('!') {
            return Ok(false);
        }

        let command = content[1..]
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();

        match command.as_str() {
            "users" => {
                info!("!users command from {}", msg.author.name);
                let listing = self
                    .controller
                    .describe_bridged_users(&self.adapter_id, &msg.channel_id.to_string())
                    .await;
                msg.channel_id
                    .say(&ctx.http, fit_message_limit(&listing))
                    .await?;
                Ok(true)
            }
            "help" => {
                let help_text = "**Available Commands:**\n\
                                 • `!users` - List users of the channels bridged here\n\
                                 • `!help` - Show this help message";
                msg.channel_id.say(&ctx.http, help_text).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Relay one attachment as a document.
    ///
    /// Falls back to relaying the attachment link as text when the download fails.
    async fn relay_attachment(
        &self,
        chat: ChatMessage,
        attachment: &Attachment,
        caption: Option<String>,
        channel: &str,
        native_id: &str,
    ) {
        let message = match attachment.download().await {
            Ok(payload) => {
                let (stem, extension) = split_filename(&attachment.filename);
                let kind = MediaKind::from_content_type(attachment.content_type.as_deref());
                let caption = TextMessage::new(chat, caption);
                RelayMessage::Document(DocumentMessage::new(caption, payload, stem, extension, kind))
            }
            Err(e) => {
                warn!(
                    "Failed to download attachment '{}', relaying its link instead: {}",
                    attachment.filename, e
                );
                let text = join_body([caption.unwrap_or_default(), attachment.url.clone()]);
                RelayMessage::Text(TextMessage::new(chat, text))
            }
        };

        self.controller.relay(&message, channel, native_id).await;
    }
}

/// Name shown for an author: server nickname, then global name, then username.
fn display_name(author: &User, nick: Option<&str>) -> String {
    nick.map(str::to_string)
        .or_else(|| author.global_name.clone())
        .unwrap_or_else(|| author.name.clone())
}

/// Split `photo.final.png` into `("photo.final", "png")`.
pub fn split_filename(filename: &str) -> (String, String) {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let extension = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (stem, extension)
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Ignore our own messages
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        // Ignore bots, which includes the bridges on the other side
        if msg.author.bot {
            return;
        }

        // Only handle guild (server) messages
        if msg.guild_id.is_none() {
            return;
        }

        let nickname = display_name(&msg.author, msg.member.as_ref().and_then(|m| m.nick.as_deref()));
        self.state
            .remember_author(msg.channel_id, msg.author.id, &nickname)
            .await;

        let content = msg.content.trim();
        if content.starts_with('!') {
            match self.handle_command(&ctx, &msg, content).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => {
                    error!("Command handler error: {}", e);
                    return;
                }
            }
        }

        let resolved = self.resolver.to_plain_text(content, &msg.mentions, &ctx.cache);
        let stickers = msg.sticker_items.iter().map(|sticker| describe_sticker(&sticker.name));
        let text = join_body(std::iter::once(resolved).chain(stickers));

        let channel = msg.channel_id.to_string();
        let native_id = msg.id.to_string();
        let chat = ChatMessage::new(nickname, channel.clone(), self.adapter_id.clone());

        if msg.attachments.is_empty() {
            if text.is_none() {
                debug!("Ignoring empty Discord message {}", native_id);
                return;
            }
            let message = RelayMessage::Text(TextMessage::new(chat, text));
            self.controller.relay(&message, &channel, &native_id).await;
            return;
        }

        // The first attachment carries the caption and the message id, so
        // edits of the caption find its copies.
        let mut caption = text;
        for (index, attachment) in msg.attachments.iter().enumerate() {
            let attachment_id = if index == 0 {
                native_id.clone()
            } else {
                format!("{}#{}", native_id, index)
            };
            self.relay_attachment(chat.clone(), attachment, caption.take(), &channel, &attachment_id)
                .await;
        }
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        // Embed unfurls also arrive as updates, without content.
        let Some(content) = event.content.as_deref() else {
            return;
        };
        if event.guild_id.is_none() {
            return;
        }

        let Some(author) = event.author.as_ref().or(new.as_ref().map(|m| &m.author)) else {
            debug!("Edit of Discord message {} has no author, skipping", event.id);
            return;
        };
        if author.bot || author.id == ctx.cache.current_user().id {
            return;
        }

        let nickname = match self.state.nickname(author.id).await {
            Some(nickname) => nickname,
            None => display_name(author, None),
        };

        let mentioned = event.mentions.as_deref().unwrap_or_default();
        let resolved = self.resolver.to_plain_text(content.trim(), mentioned, &ctx.cache);

        let channel = event.channel_id.to_string();
        let chat = ChatMessage::new(nickname, channel.clone(), self.adapter_id.clone());
        let message = TextMessage::new(chat, join_body([resolved]));

        let report = self
            .controller
            .propagate_edit(&message, &channel, &event.id.to_string())
            .await;
        debug!(
            "Edit of Discord message {} reached {}/{} copies",
            event.id, report.edited, report.attempted
        );
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord adapter '{}' connected as {}", self.adapter_id, ready.user.name);
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        info!("Received guild data for '{}' ({} channels)", guild.name, guild.channels.len());

        for (channel_id, channel) in &guild.channels {
            self.state
                .remember_channel_name(*channel_id, channel.name.clone())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filename() {
        assert_eq!(split_filename("cat.png"), ("cat".to_string(), "png".to_string()));
        assert_eq!(
            split_filename("photo.final.jpeg"),
            ("photo.final".to_string(), "jpeg".to_string())
        );
        assert_eq!(split_filename("README"), ("README".to_string(), String::new()));
    }

    #[test]
    fn test_display_name_precedence() {
        let mut author = User::default();
        author.name = "user123".to_string();
        assert_eq!(display_name(&author, None), "user123");

        author.global_name = Some("Global".to_string());
        assert_eq!(display_name(&author, None), "Global");
        assert_eq!(display_name(&author, Some("Nick")), "Nick");
    }
}
