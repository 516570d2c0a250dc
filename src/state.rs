//! Shared state handed to every handler.

use crate::services::{resource_service::ResourceService, webhook_service::WebhookService};

#[derive(Clone)]
pub struct AppState {
    pub resources: ResourceService,
    pub webhooks: WebhookService,
}
