// src/dataset/snapshot.rs

//! 时间快照双缓冲
//!
//! 每个被跟踪变量在内存中保留包夹当前模拟时间的两个时间快照
//! （tp0/tp1），时间上在二者之间线性插值。时间越过 tp1 时，
//! tp1 原地滑入 tp0 并装载下一条记录；快照全局共享，绝不按粒子复制。

use crate::core::error::{LdError, LdResult};
use ndarray::Array3;

/// 单个时间快照：时间戳 + 三维数组 [nz, ny, nx]
///
/// 二维场以 nz = 1 表达。
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// 记录时间 [s]
    pub time: f64,
    /// 场数据 [nz, ny, nx]
    pub data: Array3<f64>,
}

impl Snapshot {
    pub fn new(time: f64, data: Array3<f64>) -> Self {
        Self { time, data }
    }
}

/// tp0/tp1 时间窗
///
/// 不变式：`tp0.time <= t <= tp1.time`（逆时模拟下取反）。
#[derive(Debug, Clone)]
pub struct TimeBracket {
    tp0: Option<Snapshot>,
    tp1: Option<Snapshot>,
}

impl TimeBracket {
    /// 创建空时间窗
    pub fn new() -> Self {
        Self { tp0: None, tp1: None }
    }

    /// 当前时间是否越出时间窗（需要装载下一记录）
    pub fn needs_update(&self, time: f64) -> bool {
        match (&self.tp0, &self.tp1) {
            (Some(f0), Some(f1)) => {
                let lo = f0.time.min(f1.time);
                let hi = f0.time.max(f1.time);
                time < lo || time > hi
            }
            _ => true,
        }
    }

    /// 滑入新快照：tp1 → tp0，新记录 → tp1
    pub fn push(&mut self, snapshot: Snapshot) {
        self.tp0 = self.tp1.take();
        self.tp1 = Some(snapshot);
    }

    /// 两快照的时间戳 (t0, t1)
    pub fn times(&self) -> Option<(f64, f64)> {
        match (&self.tp0, &self.tp1) {
            (Some(f0), Some(f1)) => Some((f0.time, f1.time)),
            _ => None,
        }
    }

    /// 时间插值权重：w=0 取 tp0，w=1 取 tp1
    pub fn time_weight(&self, time: f64) -> LdResult<f64> {
        let (t0, t1) = self.times().ok_or_else(|| {
            LdError::data_load("snapshot", "时间窗未装载")
        })?;
        let span = t1 - t0;
        if span.abs() < 1e-12 {
            return Ok(0.0);
        }
        Ok((time - t0) / span)
    }

    /// 指定格点、指定时刻的时间插值
    ///
    /// 空间索引 [k, j, i] 必须在界内（调用方负责收缩模板）。
    pub fn at(&self, k: usize, j: usize, i: usize, time: f64) -> LdResult<f64> {
        let w = self.time_weight(time)?;
        let f0 = self.tp0.as_ref().expect("time_weight 已验证装载");
        let f1 = self.tp1.as_ref().expect("time_weight 已验证装载");
        let v0 = f0.data[[k, j, i]];
        let v1 = f1.data[[k, j, i]];
        Ok(v0 + w * (v1 - v0))
    }

    /// 是否已装载两个快照
    pub fn is_loaded(&self) -> bool {
        self.tp0.is_some() && self.tp1.is_some()
    }
}

impl Default for TimeBracket {
    fn default() -> Self {
        Self::new()
    }
}
