use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineQuery, InlineQueryId, InlineQueryResult, InlineQueryResultArticle,
    InputMessageContent, InputMessageContentText, Me, MessageId, ReplyParameters,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::event::{
    Chat, ChatKind, CommandCall, InboundUpdate, InlineAnswer, InlineQueryEvent, MessageEvent,
    Reply, Sender,
};
use crate::platform::Transport;
use crate::suggest::{CommandCatalog, CommandDescriptor};

/// Telegram implementation of the outbound transport and command catalog.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_reply(&self, reply: &Reply) -> Result<()> {
        let mut request = self.bot.send_message(ChatId(reply.chat_id), reply.text.clone());
        if let Some(message_id) = reply.reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(message_id)));
        }
        if reply.silent {
            request = request.disable_notification(true);
        }
        request
            .await
            .with_context(|| format!("Failed to send message to chat {}", reply.chat_id))?;
        Ok(())
    }

    async fn answer_inline_query(&self, answer: &InlineAnswer) -> Result<()> {
        let results: Vec<InlineQueryResult> = answer
            .results
            .iter()
            .map(|result| {
                InlineQueryResult::Article(InlineQueryResultArticle::new(
                    result.id.clone(),
                    result.title.clone(),
                    InputMessageContent::Text(InputMessageContentText::new(result.text.clone())),
                ))
            })
            .collect();
        self.bot
            .answer_inline_query(InlineQueryId(answer.query_id.clone()), results)
            .await
            .with_context(|| format!("Failed to answer inline query {}", answer.query_id))?;
        Ok(())
    }
}

#[async_trait]
impl CommandCatalog for TelegramTransport {
    async fn published_commands(&self) -> Result<Vec<CommandDescriptor>> {
        let commands = self
            .bot
            .get_my_commands()
            .await
            .context("Failed to fetch published bot commands")?;
        Ok(commands
            .into_iter()
            .map(|command| CommandDescriptor {
                name: command.command,
                description: command.description,
            })
            .collect())
    }
}

/// Long-poll Telegram and feed normalized updates into the bot's channel.
///
/// Returns once polling stops; dropping the sender is what shuts down the
/// consumer side.
pub async fn run(bot: Bot, updates: UnboundedSender<InboundUpdate>) -> Result<()> {
    let me = bot.get_me().await.context("Failed to fetch bot identity")?;
    info!("Authorized on account @{} (id {})", me.username(), me.user.id);

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(forward_message))
        .branch(Update::filter_inline_query().endpoint(forward_inline_query));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![updates, me])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn forward_message(
    msg: Message,
    me: Me,
    updates: UnboundedSender<InboundUpdate>,
) -> ResponseResult<()> {
    if let Some(event) = normalize_message(&me, &msg) {
        if updates.send(InboundUpdate::Message(event)).is_err() {
            warn!("event loop is gone, dropping message {}", msg.id.0);
        }
    }
    Ok(())
}

async fn forward_inline_query(
    query: InlineQuery,
    updates: UnboundedSender<InboundUpdate>,
) -> ResponseResult<()> {
    let event = InlineQueryEvent {
        id: query.id.0,
        from: Sender {
            id: query.from.id.0,
            username: query.from.username.unwrap_or_default(),
        },
        query: query.query,
    };
    if updates.send(InboundUpdate::InlineQuery(event)).is_err() {
        warn!("event loop is gone, dropping inline query");
    }
    Ok(())
}

/// Normalize a Telegram message into the bot's event model.
///
/// Messages without a sender (channel posts, service messages) yield `None`.
fn normalize_message(me: &Me, msg: &Message) -> Option<MessageEvent> {
    let user = msg.from.as_ref()?;
    let kind = if msg.chat.is_private() {
        ChatKind::Private
    } else if msg.chat.is_group() {
        ChatKind::Group
    } else if msg.chat.is_supergroup() {
        ChatKind::Supergroup
    } else {
        ChatKind::Channel
    };
    let command = msg.text().and_then(|text| parse_command(text, me.username()));
    Some(MessageEvent {
        message_id: msg.id.0,
        from: Sender {
            id: user.id.0,
            username: user.username.clone().unwrap_or_default(),
        },
        chat: Chat {
            id: msg.chat.id.0,
            kind,
            title: msg.chat.title().unwrap_or_default().to_string(),
        },
        sent_at: msg.date,
        command,
    })
}

/// Extract `/name args` from raw text.
///
/// A `/name@bot` mention must match our own username, otherwise the message
/// is addressed to another bot and is not a command for us.
fn parse_command(text: &str, bot_username: &str) -> Option<CommandCall> {
    let rest = text.strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim_start()),
        None => (rest, ""),
    };
    let (name, mention) = match head.split_once('@') {
        Some((name, mention)) => (name, Some(mention)),
        None => (head, None),
    };
    if name.is_empty() {
        return None;
    }
    if let Some(mention) = mention {
        if !mention.eq_ignore_ascii_case(bot_username) {
            return None;
        }
    }
    Some(CommandCall {
        name: name.to_string(),
        args: args.to_string(),
    })
}
