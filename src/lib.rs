pub mod abort;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod echo;
pub mod error;
pub mod histogram;
pub mod result;
pub mod runner;
pub mod uuidgen;
