pub mod kv_entries;

pub use kv_entries as kv_entry_entity;
