pub mod item_ctx;
pub mod item_flow;

pub use item_ctx::ItemCtx;
pub use item_flow::{ItemFlow, ProcessResult};
