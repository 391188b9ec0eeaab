pub mod adapters;
pub mod config;
pub mod error;
pub mod inference;
pub mod security;
pub mod web;
