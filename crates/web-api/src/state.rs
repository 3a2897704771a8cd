use std::sync::Arc;

use application::MessagingService;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub messaging_service: Arc<MessagingService>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(messaging_service: Arc<MessagingService>, jwt_service: Arc<JwtService>) -> Self {
        Self {
            messaging_service,
            jwt_service,
        }
    }
}
