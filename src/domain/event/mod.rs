pub mod dto;
pub mod push_event;
pub mod service;
