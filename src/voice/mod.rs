pub mod cleanup;
pub mod events;
