// REST client for the gateway's authentication endpoints
//
// Login, logout, profile and password management are plain HTTP calls
// wrapped in the `{ success, data?, error?|message? }` envelope. Everything
// else the portal does travels over the event channel.

pub mod auth;
pub mod client;
pub mod models;

pub use client::{LoginRequired, RestClient, TokenSource};
pub use models::{ApiResponse, LoginData, PasswordChange, ProfileUpdate, User};
