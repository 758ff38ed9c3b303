pub mod api;
pub mod intent;
