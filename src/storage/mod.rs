pub mod backing;
pub mod btree;
pub mod cursor;
pub mod header;
pub mod node;
pub mod pager;
pub mod schema;

const LUMBUNG_MAGIC: &[u8; 16] = b"LUMBUNG DB v0.1\0";
