pub mod agenda_client;
pub mod error;
pub mod notifier;
