pub mod entry;
pub mod identity;
