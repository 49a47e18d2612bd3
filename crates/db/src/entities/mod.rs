pub mod code_review;
pub mod pull_request;
pub mod repository;
pub mod review_session;
