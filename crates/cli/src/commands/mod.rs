pub mod auth;
pub mod issues;
pub mod meta;
pub mod projects;
