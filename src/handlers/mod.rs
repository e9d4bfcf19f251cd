pub mod auth;
pub mod dashboard;
pub mod entries;
pub mod health;
pub mod results;
pub mod view;
pub mod ws;
