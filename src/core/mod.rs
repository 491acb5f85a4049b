pub mod config;
pub mod error;
pub mod io;
pub mod language;
pub mod layout;
pub mod state;
