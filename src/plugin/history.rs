use crate::{event::*, plugin::*};
use anyhow::Result;

/// Maintains per-channel room history for the LLM plugins
pub struct PluginHistory;

#[serenity::async_trait]
impl Plugin for PluginHistory {
    fn name(&self) -> &'static str {
        "history"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        let mut vstate = ctx.vstate.write().await;
        vstate.history.push(ctx, msg).await?;

        // Allow other plugins to consume this event
        Ok(EventHandled::No)
    }
}
