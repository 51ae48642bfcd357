pub mod registry_notification;
