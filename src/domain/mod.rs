pub mod activity;
pub mod feed;
pub mod follow;
pub mod notification;
pub mod profile;
