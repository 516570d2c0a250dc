pub mod caller;
pub mod resource_handlers;
pub mod webhook_handlers;
