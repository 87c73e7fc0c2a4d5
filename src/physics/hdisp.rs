// src/physics/hdisp.rs

//! 水平扩散行为
//!
//! Monin–Ozmidov 尺度化的随机游走：
//!
//! ```text
//! Kh  = ε^(1/3) · L^(4/3)
//! cff = sqrt(2·|dt|) · ε^(1/6) · L^(2/3)
//! dX  = R · cff / Δx,  dY = R' · cff / Δy
//! ```
//!
//! 其中 R、R' 为 [-1, 1] 均匀随机数，L 为粒子所在单元两个水平
//! 格距的平均，ε 为湍流耗散率。ε = 0 时位移严格为零。

use crate::core::error::LdResult;
use crate::dataset::{FieldDataset, GridCoord};
use crate::domain::particle::Particle;
use crate::infra::config::ParameterBlock;
use crate::physics::action::{Action, ActionPriority, StepContext};

/// 随机落点落在陆地时的最大重抽次数
const MAX_REDRAWS: usize = 5;

/// 水平扩散行为
#[derive(Debug, Clone)]
pub struct HDispAction {
    /// 湍流耗散率 ε [m2/s3]
    epsilon: f64,
    /// ε^(1/6)（预计算）
    epsilon16: f64,
}

impl HDispAction {
    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        let epsilon = block.get_f64("epsilon")?;
        Ok(Self::new(epsilon))
    }

    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            epsilon16: epsilon.powf(1.0 / 6.0),
        }
    }

    /// 在单元 (i, j) 内生成一次无量纲随机位移
    fn random_move(
        &self,
        ctx: &mut StepContext,
        i: usize,
        j: usize,
    ) -> (f64, f64) {
        let rx = ctx.rng.uniform_symmetric();
        let ry = ctx.rng.uniform_symmetric();
        let dxi = ctx.dataset.dxi(j, i);
        let deta = ctx.dataset.deta(j, i);
        let dl = 0.5 * (dxi + deta);
        // |dt|：逆时模拟下步长为负
        let cff = (2.0 * ctx.dt_abs()).sqrt() * self.epsilon16 * dl.powf(2.0 / 3.0);
        (rx * cff / dxi, ry * cff / deta)
    }

    /// 生成水平随机位移，避免把粒子推上岸
    ///
    /// 最多重抽 [`MAX_REDRAWS`] 次；全部失败时返回零位移，
    /// 以减少贴岸粒子的搁浅。
    pub fn dispersion(&self, particle: &Particle, ctx: &mut StepContext) -> (f64, f64) {
        if self.epsilon == 0.0 {
            return (0.0, 0.0);
        }
        let p = particle.grid_coord();
        let i = (p.x.round() as isize).clamp(0, ctx.dataset.nx() as isize - 1) as usize;
        let j = (p.y.round() as isize).clamp(0, ctx.dataset.ny() as isize - 1) as usize;

        for _ in 0..MAX_REDRAWS {
            let (dx, dy) = self.random_move(ctx, i, j);
            let target = GridCoord::new(p.x + dx, p.y + dy, p.z);
            if ctx.dataset.is_in_water_at(&target) {
                return (dx, dy);
            }
        }
        (0.0, 0.0)
    }
}

impl Action for HDispAction {
    fn name(&self) -> &str {
        "action.hdisp"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let (dx, dy) = self.dispersion(particle, ctx);
        particle.increment(dx, dy, 0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SimRng;
    use crate::dataset::MemoryDataset;
    use crate::domain::zone::ZoneRegistry;

    fn dataset() -> MemoryDataset {
        let mut ds = MemoryDataset::builder(20, 20, 1)
            .spacing(1000.0, 1000.0)
            .constant_variable("u", 0.0, 0.0, 1e6)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e6)
            .unwrap()
            .build();
        ds.update_time(0.0).unwrap();
        ds
    }

    #[test]
    fn test_zero_epsilon_is_deterministic() {
        let ds = dataset();
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(3);
        let mut ctx = StepContext {
            dataset: &ds,
            zones: &zones,
            time: 0.0,
            dt: 3600.0,
            transport_duration: 1e6,
            time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            rng: &mut rng,
        };
        let action = HDispAction::new(0.0);
        let mut p = Particle::at_grid(0, 10.0, 10.0, 0.0, &ds);
        action.execute(&mut p, &mut ctx).unwrap();
        assert_eq!(p.pending_move(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_displacement_magnitude() {
        // 位移分量绝对值不应超过 cff/Δ（R ∈ [-1,1]）
        let ds = dataset();
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(11);
        let mut ctx = StepContext {
            dataset: &ds,
            zones: &zones,
            time: 0.0,
            dt: 3600.0,
            transport_duration: 1e6,
            time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            rng: &mut rng,
        };
        let epsilon = 1e-9;
        let action = HDispAction::new(epsilon);
        let cff = (2.0f64 * 3600.0).sqrt() * epsilon.powf(1.0 / 6.0) * 1000.0f64.powf(2.0 / 3.0);
        let bound = cff / 1000.0;

        let p = Particle::at_grid(0, 10.0, 10.0, 0.0, &ds);
        for _ in 0..200 {
            let (dx, dy) = action.dispersion(&p, &mut ctx);
            assert!(dx.abs() <= bound + 1e-15);
            assert!(dy.abs() <= bound + 1e-15);
        }
    }

    #[test]
    fn test_reproducible_under_fixed_seed() {
        let ds = dataset();
        let zones = ZoneRegistry::new();
        let action = HDispAction::new(1e-9);
        let p = Particle::at_grid(0, 10.0, 10.0, 0.0, &ds);

        let draw = |seed: u64| {
            let mut rng = SimRng::seeded(seed);
            let mut ctx = StepContext {
                dataset: &ds,
                zones: &zones,
                time: 0.0,
                dt: 3600.0,
                transport_duration: 1e6,
                time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                rng: &mut rng,
            };
            action.dispersion(&p, &mut ctx)
        };
        assert_eq!(draw(5), draw(5));
    }

    #[test]
    fn test_backward_dt_same_amplitude() {
        // |dt| 语义：逆时与正向的振幅分布一致
        let ds = dataset();
        let zones = ZoneRegistry::new();
        let action = HDispAction::new(1e-9);
        let p = Particle::at_grid(0, 10.0, 10.0, 0.0, &ds);

        let mut rng_f = SimRng::seeded(9);
        let mut ctx_f = StepContext {
            dataset: &ds,
            zones: &zones,
            time: 0.0,
            dt: 3600.0,
            transport_duration: 1e6,
            time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            rng: &mut rng_f,
        };
        let mut rng_b = SimRng::seeded(9);
        let mut ctx_b = StepContext {
            dataset: &ds,
            zones: &zones,
            time: 0.0,
            dt: -3600.0,
            transport_duration: 1e6,
            time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            rng: &mut rng_b,
        };
        assert_eq!(action.dispersion(&p, &mut ctx_f), action.dispersion(&p, &mut ctx_b));
    }
}
