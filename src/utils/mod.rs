pub mod pacing;
pub mod retry;
pub mod text;
