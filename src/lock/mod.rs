pub mod manager;
pub mod secondary;
