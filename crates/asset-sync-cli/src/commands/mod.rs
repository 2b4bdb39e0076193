pub mod delete;
pub mod invalidate_cache;
pub mod sync;
