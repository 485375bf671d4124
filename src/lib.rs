pub mod api;
pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod execution;
pub mod handler;
pub mod markdown;
pub mod modal;
pub mod poller;
pub mod state;
pub mod tui;
pub mod ui;
