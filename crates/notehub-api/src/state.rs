use std::sync::Arc;

use notehub_chat::ChatService;
use notehub_gateway::IdentityVerifier;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub fn new(chat: ChatService, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { chat, verifier }
    }
}
