pub mod activities;
pub mod feed;
pub mod follows;
pub mod middleware;
pub mod notifications;
