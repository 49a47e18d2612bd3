pub mod language;
pub mod response;
