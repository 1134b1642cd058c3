//! # Tavern Channels
//! Chat platform clients implementing [`tavern_core::traits::PlatformOps`].

pub mod discord;

pub use discord::DiscordOps;
