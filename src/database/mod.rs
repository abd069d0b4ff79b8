pub mod connection;
pub mod drawing_store;
pub mod kv_store;
pub mod memory;

pub use connection::*;
pub use drawing_store::*;
pub use kv_store::*;
pub use memory::*;
