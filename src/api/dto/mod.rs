//! API request/response DTOs

pub mod event_dto;
