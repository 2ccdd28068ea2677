//! playcheck - find and remove media files a player cannot play
//!
//! Every candidate file is handed to an external player under a hard timeout
//! on a bounded pool of workers. Results stream into a log as they complete;
//! once every file has a verdict, the corrupt ones are deleted (or only
//! reported, in a dry run).

pub mod cli;
pub mod config;
pub mod services;
