use crate::{event::*, plugin::*};
use anyhow::Result;

/// Swallows messages authored by bots so no later plugin answers them.
/// Runs early in the plugin list.
pub struct IgnoreBots;

#[serenity::async_trait]
impl Plugin for IgnoreBots {
    fn name(&self) -> &'static str {
        "ignore_bots"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, _ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        match msg.author.bot {
            true => Ok(EventHandled::Yes),
            false => Ok(EventHandled::No),
        }
    }
}
