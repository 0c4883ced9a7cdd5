//! API 模块
//!
//! 对外的 HTTP 接口，只做收发，不含业务逻辑

pub mod server;

pub use server::{router, serve};
