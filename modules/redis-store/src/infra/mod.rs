pub mod manifest;
pub mod probe;
pub mod resp;
pub mod settings_store;
