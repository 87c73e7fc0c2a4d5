// src/io/mod.rs

//! 输出契约层
//!
//! 核心不实现任何文件格式；跟踪器在每个记录步拉取其需要的粒子
//! 字段（位置、深度、年龄、生物量值、死亡原因）。

pub mod tracker;

pub use tracker::{MemoryTracker, ParticleRecord, Tracker};
