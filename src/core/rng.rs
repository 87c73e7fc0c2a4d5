// src/core/rng.rs

//! 模拟随机数上下文
//!
//! 随机扩散行为共享同一条随机数流，固定种子下逐步顺序消费，
//! 保证结果可复现。由模拟上下文显式持有并传递，不使用全局静态量。

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// 运行级随机数发生器
///
/// 固定种子 => 确定性回放；不提供种子时从系统熵初始化。
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    /// 固定种子创建
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// 系统熵创建
    pub fn from_entropy() -> Self {
        Self {
            inner: ChaCha8Rng::from_entropy(),
        }
    }

    /// [0, 1) 均匀分布
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// [-1, 1] 均匀分布（随机游走的标准抽样）
    #[inline]
    pub fn uniform_symmetric(&mut self) -> f64 {
        2.0 * self.inner.gen::<f64>() - 1.0
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SimRng { .. }")
    }
}
