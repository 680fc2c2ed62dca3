pub use crate::context::Context;
use crate::event::EventHandled;
use anyhow::Result;

mod ask;
mod debug;
mod help;
mod history;
mod ignore_bots;
mod llm_reply;
mod presence;
mod reload;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Used for debug
    fn name(&self) -> &'static str;
    /// Help message line.  None if no help message
    async fn usage(&self, ctx: &Context) -> Option<String>;
    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    /// handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context, event: &crate::event::Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
pub fn plugins() -> Vec<Box<dyn Plugin>> {
    use crate::plugin::*;

    vec![
        // Core bot operations
        Box::new(debug::Debug),
        Box::new(ignore_bots::IgnoreBots),
        Box::new(history::PluginHistory),
        Box::new(help::Help),
        Box::new(reload::Reload),
        // Voice presence tracking and role progression
        Box::new(presence::Presence),
        // Direct prompt completion
        Box::new(ask::Ask),
        // LLM fallback, used if no other plugin handles the event.
        // Keep last.
        Box::new(llm_reply::LlmReply),
    ]
}
