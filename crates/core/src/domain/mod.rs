pub mod action;
pub mod request;
