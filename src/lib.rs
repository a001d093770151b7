pub mod backend;
pub mod config;
pub mod error;
pub mod lane;
pub mod net;
pub mod packet;
pub mod payload;
pub mod rate;
pub mod seq;
pub mod ui;
pub mod utils;
