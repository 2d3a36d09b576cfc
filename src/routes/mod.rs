/**
 * Routes Module
 * API route handlers
 */

pub mod auth;
pub mod channel;
pub mod content;
pub mod health;
pub mod play;
pub mod setting;
pub mod space;
