use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::event::{
    ChatKind, InboundUpdate, InlineAnswer, InlineQueryEvent, MessageEvent, Reply,
};
use crate::platform::Transport;
use crate::router::Router;

/// Commands older than this are dropped as stale.
const STALE_AFTER_SECS: i64 = 30;

/// Boxed async handler for the recognized inline query.
pub type InlineHandler =
    Arc<dyn Fn(InlineQueryEvent) -> BoxFuture<'static, anyhow::Result<InlineAnswer>> + Send + Sync>;

/// The process-wide consumer: drains the inbound update stream sequentially
/// and drives the router. Replies for one event are fully sent before the
/// next event is taken off the queue.
pub struct EventLoop {
    router: Router,
    transport: Arc<dyn Transport>,
    inline_query_name: String,
    inline_handler: InlineHandler,
}

impl EventLoop {
    pub fn new<H, Fut>(
        router: Router,
        transport: Arc<dyn Transport>,
        inline_query_name: &str,
        inline_handler: H,
    ) -> Self
    where
        H: Fn(InlineQueryEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<InlineAnswer>> + Send + 'static,
    {
        let inline_handler: InlineHandler = Arc::new(move |query| Box::pin(inline_handler(query)));
        EventLoop {
            router,
            transport,
            inline_query_name: inline_query_name.to_string(),
            inline_handler,
        }
    }

    /// Consume updates until the channel closes.
    pub async fn run(self, mut updates: UnboundedReceiver<InboundUpdate>) {
        while let Some(update) = updates.recv().await {
            match update {
                InboundUpdate::InlineQuery(query) => self.handle_inline_query(query).await,
                InboundUpdate::Message(event) => self.handle_message(event).await,
            }
        }
        info!("Update stream closed, stopping event loop");
    }

    async fn handle_inline_query(&self, query: InlineQueryEvent) {
        if query.query != self.inline_query_name {
            return;
        }
        info!(
            "answering inline query '{}' from user {}",
            query.query, query.from.id
        );
        match (self.inline_handler)(query.clone()).await {
            Ok(answer) => {
                if let Err(e) = self.transport.answer_inline_query(&answer).await {
                    warn!("failed to answer inline query {}: {:#}", query.id, e);
                }
            }
            Err(e) => warn!("inline query handler failed: {:#}", e),
        }
    }

    async fn handle_message(&self, event: MessageEvent) {
        match event.chat.kind {
            ChatKind::Private | ChatKind::Group | ChatKind::Supergroup => {}
            _ => return,
        }
        if event.command.is_none() {
            return;
        }

        let age = Utc::now().signed_duration_since(event.sent_at);
        if age > Duration::seconds(STALE_AFTER_SECS) {
            warn!(
                "dropping stale command from chat {} ({}s old)",
                event.chat.id,
                age.num_seconds()
            );
            return;
        }

        let replies = match self.router.run(&event).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!("dispatch failed ({:?}): {:#}", e.path, e.cause);
                match e.reply_text {
                    Some(text) if !text.is_empty() => vec![Reply::to(&event, text)],
                    _ => Vec::new(),
                }
            }
        };

        for reply in replies {
            if let Err(e) = self.transport.send_reply(&reply).await {
                error!("failed to send reply to chat {}: {:#}", reply.chat_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{self, HELP_INLINE_QUERY, HELP_TEXT};
    use crate::event::{Chat, CommandCall, InlineResult, Sender};
    use crate::storage::groups::GroupStore;
    use crate::storage::Storage;
    use crate::suggest::{CommandCatalog, CommandDescriptor};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Reply>>,
        answered: Mutex<Vec<InlineAnswer>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_reply(&self, reply: &Reply) -> Result<()> {
            self.sent.lock().await.push(reply.clone());
            Ok(())
        }

        async fn answer_inline_query(&self, answer: &InlineAnswer) -> Result<()> {
            self.answered.lock().await.push(answer.clone());
            Ok(())
        }
    }

    struct FixedCatalog(Vec<CommandDescriptor>);

    #[async_trait]
    impl CommandCatalog for FixedCatalog {
        async fn published_commands(&self) -> Result<Vec<CommandDescriptor>> {
            Ok(self.0.clone())
        }
    }

    fn catalog(pairs: &[(&str, &str)]) -> Arc<FixedCatalog> {
        Arc::new(FixedCatalog(
            pairs
                .iter()
                .map(|(name, description)| CommandDescriptor {
                    name: name.to_string(),
                    description: description.to_string(),
                })
                .collect(),
        ))
    }

    fn command_event(chat: Chat, name: &str) -> MessageEvent {
        MessageEvent {
            message_id: 11,
            from: Sender {
                id: 5,
                username: "someone".to_string(),
            },
            chat,
            sent_at: Utc::now(),
            command: Some(CommandCall {
                name: name.to_string(),
                args: String::new(),
            }),
        }
    }

    fn private_chat() -> Chat {
        Chat {
            id: 5,
            kind: ChatKind::Private,
            title: String::new(),
        }
    }

    async fn ignored_inline(query: InlineQueryEvent) -> Result<InlineAnswer> {
        Ok(InlineAnswer {
            query_id: query.id,
            results: vec![InlineResult {
                id: "r".to_string(),
                title: "t".to_string(),
                text: "x".to_string(),
            }],
        })
    }

    fn event_loop(router: Router, transport: Arc<RecordingTransport>) -> EventLoop {
        EventLoop::new(router, transport, "lookup", ignored_inline)
    }

    async fn drive(event_loop: EventLoop, updates: Vec<InboundUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(event_loop.run(rx));
        for update in updates {
            tx.send(update).unwrap();
        }
        drop(tx);
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_reply_text_reaches_the_sender() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut router = Router::new(storage, catalog(&[]));
        router.handle_fn("gj", |_| async {
            Err(crate::router::HandlerError::with_reply(
                anyhow!("price table gone"),
                "could not load prices, try again later",
            ))
        });

        let transport = Arc::new(RecordingTransport::default());
        let event = command_event(private_chat(), "gj");
        drive(
            event_loop(router, transport.clone()),
            vec![InboundUpdate::Message(event)],
        )
        .await;

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "could not load prices, try again later");
        assert_eq!(sent[0].chat_id, 5);
        assert_eq!(sent[0].reply_to, Some(11));
    }

    #[tokio::test]
    async fn test_stale_command_is_skipped_but_loop_continues() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut router = Router::new(storage, catalog(&[]));
        router.handle_fn("ping", |event| async move { Ok(vec![Reply::to(&event, "pong")]) });

        let mut stale = command_event(private_chat(), "ping");
        stale.sent_at = Utc::now() - Duration::seconds(120);
        let fresh = command_event(private_chat(), "ping");

        let transport = Arc::new(RecordingTransport::default());
        drive(
            event_loop(router, transport.clone()),
            vec![
                InboundUpdate::Message(stale),
                InboundUpdate::Message(fresh),
            ],
        )
        .await;

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "pong");
    }

    #[tokio::test]
    async fn test_non_commands_and_channel_posts_are_ignored() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut router = Router::new(storage, catalog(&[]));
        router.handle_fn("ping", |event| async move { Ok(vec![Reply::to(&event, "pong")]) });

        let mut plain = command_event(private_chat(), "ping");
        plain.command = None;
        let channel_post = command_event(
            Chat {
                id: -1000,
                kind: ChatKind::Channel,
                title: "news".to_string(),
            },
            "ping",
        );

        let transport = Arc::new(RecordingTransport::default());
        drive(
            event_loop(router, transport.clone()),
            vec![
                InboundUpdate::Message(plain),
                InboundUpdate::Message(channel_post),
            ],
        )
        .await;

        assert!(transport.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_recognized_inline_query_is_answered() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let router = Router::new(storage, catalog(&[]));
        let transport = Arc::new(RecordingTransport::default());

        let query = |text: &str| {
            InboundUpdate::InlineQuery(InlineQueryEvent {
                id: text.to_string(),
                from: Sender {
                    id: 5,
                    username: "someone".to_string(),
                },
                query: text.to_string(),
            })
        };
        drive(
            event_loop(router, transport.clone()),
            vec![query("lookup"), query("something else")],
        )
        .await;

        let answered = transport.answered.lock().await;
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].query_id, "lookup");
    }

    #[tokio::test]
    async fn test_help_command_end_to_end() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let mut router = Router::new(storage.clone(), catalog(&[]));
        commands::register(&mut router);

        let transport = Arc::new(RecordingTransport::default());
        let event = command_event(private_chat(), "help");
        let event_loop = EventLoop::new(
            router,
            transport.clone() as Arc<dyn Transport>,
            HELP_INLINE_QUERY,
            commands::inline_help,
        );
        drive(event_loop, vec![InboundUpdate::Message(event)]).await;

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, HELP_TEXT);
        // Private chat: no group record was written.
        assert_eq!(storage.get_group(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_command_suggestion_end_to_end() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let router = Router::new(
            storage,
            catalog(&[
                ("fc", "look up a friend code"),
                ("addisland", "register your island"),
            ]),
        );

        let transport = Arc::new(RecordingTransport::default());
        let event = command_event(private_chat(), "fcc");
        drive(
            event_loop(router, transport.clone()),
            vec![InboundUpdate::Message(event)],
        )
        .await;

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("/fc look up a friend code"));
    }
}
