// src/core/mod.rs

//! 核心层：错误类型、共享常量、随机数上下文

pub mod constants;
pub mod error;
pub mod rng;

pub use error::{LdError, LdResult};
pub use rng::SimRng;
