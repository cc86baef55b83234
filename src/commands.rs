use anyhow::Result;

use crate::event::{InlineAnswer, InlineQueryEvent, InlineResult, MessageEvent, Reply};
use crate::router::{HandlerError, Router};

/// Inline query the bot answers; every other query is ignored.
pub const HELP_INLINE_QUERY: &str = "help";

/// Command reference shown by /help.
pub const HELP_TEXT: &str = "\
/addfc add your friend code, batch form: /addfc id1:fc1;id2:fc2
/myfc show your own friend codes
/sfc look up the friend code of the user you replied to or @-mentioned
/fc same as /sfc
/fclist list the friend codes of everyone in this group
/whois name find the user whose account or island is called name
/addisland register your island: /addisland name N/S owner notes
/sac look up the Animal Crossing info of the user you replied to or @-mentioned
/myisland show your island info
/open_island mark your island as open, same as /open_airport
/close_island mark your island as closed, same as /close_airport
/dtcj update your turnip price; without arguments, same as /gj
/gj top 10 latest turnip prices in this group, highest first
/islands web page listing every island this bot knows about
/login log in to the bot's web interface
/help show this message";

/// Register the built-in handlers.
pub fn register(router: &mut Router) {
    router.handle_fn("help", help);
}

/// `/help`: the static command reference, sent as a silent reply.
async fn help(event: MessageEvent) -> Result<Vec<Reply>, HandlerError> {
    Ok(vec![Reply::to_silent(&event, HELP_TEXT)])
}

/// Inline `help` query: the same reference as a single article.
pub async fn inline_help(query: InlineQueryEvent) -> Result<InlineAnswer> {
    Ok(InlineAnswer {
        query_id: query.id,
        results: vec![InlineResult {
            id: "help".to_string(),
            title: "Command reference".to_string(),
            text: HELP_TEXT.to_string(),
        }],
    })
}
