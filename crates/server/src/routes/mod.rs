pub mod dashboard;
pub mod health;
pub mod reviews;
pub mod webhooks;
