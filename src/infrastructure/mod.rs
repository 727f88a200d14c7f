pub mod gateway;
pub mod kv_store;
pub mod logging;
pub mod providers;
