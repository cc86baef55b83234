use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;
use tracing::{error, info, warn};

use crate::event::{MessageEvent, Reply};
use crate::storage::{GroupRecord, GroupStore};
use crate::suggest::{self, CommandCatalog};

/// Boxed async handler for one registered chat command.
pub type CommandHandler =
    Arc<dyn Fn(MessageEvent) -> BoxFuture<'static, Result<Vec<Reply>, HandlerError>> + Send + Sync>;

/// Failure reported by a command handler.
///
/// Only `reply_text` may ever reach the chat; `cause` stays on the server
/// side for diagnosis.
#[derive(Debug)]
pub struct HandlerError {
    pub cause: anyhow::Error,
    pub reply_text: Option<String>,
}

impl HandlerError {
    pub fn new(cause: impl Into<anyhow::Error>) -> Self {
        HandlerError {
            cause: cause.into(),
            reply_text: None,
        }
    }

    /// Attach a user-facing reply to the failure.
    pub fn with_reply(cause: impl Into<anyhow::Error>, reply_text: impl Into<String>) -> Self {
        HandlerError {
            cause: cause.into(),
            reply_text: Some(reply_text.into()),
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(cause: anyhow::Error) -> Self {
        HandlerError::new(cause)
    }
}

/// Which dispatch path produced a [`RouterError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorPath {
    /// The named registered command failed.
    Command(String),
    /// The unknown-command fallback failed or had nothing to suggest.
    Suggestion,
}

/// Error envelope returned by [`Router::run`]: a chained diagnostic cause
/// plus the optional text a handler wants shown to the user.
#[derive(Debug)]
pub struct RouterError {
    pub path: ErrorPath,
    pub cause: anyhow::Error,
    pub reply_text: Option<String>,
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.cause)
    }
}

/// Command router: the registration table, the dispatch algorithm, and the
/// group bookkeeping that runs before each command.
pub struct Router {
    commands: HashMap<String, CommandHandler>,
    groups: Arc<dyn GroupStore>,
    catalog: Arc<dyn CommandCatalog>,
}

impl Router {
    pub fn new(groups: Arc<dyn GroupStore>, catalog: Arc<dyn CommandCatalog>) -> Self {
        Router {
            commands: HashMap::new(),
            groups,
            catalog,
        }
    }

    /// Register a handler for `name`.
    ///
    /// Panics if `name` is already registered: duplicate registration is a
    /// wiring bug and must abort startup before any event is processed.
    pub fn handle_fn<H, Fut>(&mut self, name: &str, handler: H)
    where
        H: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<Reply>, HandlerError>> + Send + 'static,
    {
        if self.commands.contains_key(name) {
            panic!("handler already registered for command /{}", name);
        }
        let handler: CommandHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.commands.insert(name.to_string(), handler);
    }

    /// Dispatch one inbound message.
    ///
    /// Non-command messages are a no-op. Group bookkeeping runs first and its
    /// failures are logged, never surfaced; only handler or suggestion
    /// failures reach the caller.
    pub async fn run(&self, event: &MessageEvent) -> Result<Vec<Reply>, RouterError> {
        let Some(call) = event.command.clone() else {
            return Ok(Vec::new());
        };

        if event.group_id() != 0 {
            self.reconcile_group(event).await;
        }

        info!(
            command = %call.name,
            args = %call.args,
            sent_at = %event.sent_at,
            user_id = event.from.id,
            username = %event.from.username,
            chat_id = event.chat.id,
            "received command"
        );

        match self.commands.get(&call.name) {
            Some(handler) => match handler(event.clone()).await {
                Ok(replies) => Ok(replies),
                Err(e) => Err(RouterError {
                    path: ErrorPath::Command(call.name.clone()),
                    cause: e.cause.context(format!("command /{} failed", call.name)),
                    reply_text: e.reply_text,
                }),
            },
            None => self.suggest(event, &call.name).await,
        }
    }

    /// Fallback for unknown commands: propose the closest published command.
    async fn suggest(&self, event: &MessageEvent, unknown: &str) -> Result<Vec<Reply>, RouterError> {
        let candidates = match self.catalog.published_commands().await {
            Ok(commands) => commands,
            Err(e) => {
                warn!("failed to fetch published commands: {:#}", e);
                Vec::new()
            }
        };
        match suggest::closest(unknown, &candidates) {
            Some(descriptor) => Ok(vec![suggest::suggestion_reply(event, descriptor)]),
            None => Err(RouterError {
                path: ErrorPath::Suggestion,
                cause: anyhow!("no handler for command /{}", unknown),
                reply_text: None,
            }),
        }
    }

    /// Bring the cached group record in line with the incoming event.
    ///
    /// Every step may fail independently; failures are logged and swallowed
    /// so a storage hiccup never blocks command execution.
    async fn reconcile_group(&self, event: &MessageEvent) {
        let chat = &event.chat;
        if let Err(e) = self.groups.add_user_to_group(event.from.id, chat.id).await {
            error!(
                "failed to record user {} in group {}: {:#}",
                event.from.id, chat.id, e
            );
        }

        match self.groups.get_group(chat.id).await {
            Ok(None) => {
                let record = GroupRecord {
                    id: chat.id,
                    kind: chat.kind,
                    title: chat.title.clone(),
                };
                if let Err(e) = self.groups.create_group(&record).await {
                    error!("failed to create group {}: {:#}", chat.id, e);
                }
            }
            Ok(Some(mut record)) => {
                if record.title != chat.title || record.kind != chat.kind {
                    record.title = chat.title.clone();
                    record.kind = chat.kind;
                    if let Err(e) = self.groups.update_group(&record).await {
                        error!("failed to update group {}: {:#}", chat.id, e);
                    }
                }
            }
            Err(e) => error!("failed to load group {}: {:#}", chat.id, e),
        }
    }
}
