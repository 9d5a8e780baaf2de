pub mod activities;
pub mod composer;
pub mod contracts;
pub mod error;
pub mod fanout;
pub mod fanout_tasks;
pub mod feed;
pub mod follows;
pub mod jwt;
pub mod notifications;
