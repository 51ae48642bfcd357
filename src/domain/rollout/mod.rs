pub mod image_reference;
pub mod impact_resolver;
pub mod rollout_controller;
