use std::sync::Arc;

use crate::domain::auth::authenticator::Authenticator;
use crate::domain::rollout::rollout_controller::RolloutController;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub controller: Arc<RolloutController>,
}

pub fn build_app_state(authenticator: Authenticator, controller: Arc<RolloutController>) -> AppState {
    AppState {
        authenticator: Arc::new(authenticator),
        controller,
    }
}
