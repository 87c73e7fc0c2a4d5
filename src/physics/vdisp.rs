// src/physics/vdisp.rs

//! 垂向扩散行为
//!
//! 带漂移修正的随机位移模型（Visser 1997；North et al. 2006）。
//! 垂向扩散系数剖面若直接使用，会在 Kv 急变处产生粒子假聚集；
//! 因此对粒子近旁各水柱的逐层 Kv 剖面拟合自然三次样条，取粒子
//! 精确深度处的 Kv 与 Kv'，漂移项在半步推进后的深度上求值：
//!
//! ```text
//! dz = Kv'(z)·dt + R·sqrt(6·Kv(z_half)·|dt|)
//! ```
//!
//! R 为 [-1, 1] 均匀随机数。位移除以当地垂向格距转为网格增量，
//! 表层 (z<0) 与底层 (z>=nz-1) 作反射边界；粒子步末的网格 z
//! 必须落在 [0, nz-1] 内。

use crate::core::constants::Z_EPS;
use crate::core::error::{LdError, LdResult};
use crate::dataset::{FieldDataset, GridCoord};
use crate::domain::particle::Particle;
use crate::infra::config::ParameterBlock;
use crate::physics::action::{Action, ActionPriority, StepContext};

/// 垂向扩散行为
#[derive(Debug, Clone)]
pub struct VDispAction {
    /// 垂向扩散系数变量名
    kv_field: String,
}

/// 样条求值结果：漂移项 Kv' [m/s]、扩散项 Kv [m2/s]
#[derive(Debug, Clone, Copy, Default)]
struct KvSample {
    diff_kv: f64,
    kv: f64,
}

impl VDispAction {
    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        Ok(Self::new(block.get_str("kv_field")?))
    }

    pub fn new(kv_field: impl Into<String>) -> Self {
        Self {
            kv_field: kv_field.into(),
        }
    }

    /// 设置期检查：声明变量并要求至少三层（自然样条的最小剖面）
    pub fn setup(&self, dataset: &mut dyn FieldDataset) -> LdResult<()> {
        dataset.require_variable(&self.kv_field)?;
        if dataset.nz() < 3 {
            return Err(LdError::config(format!(
                "垂向扩散需要至少3层垂向网格, 实际 nz={}",
                dataset.nz()
            )));
        }
        Ok(())
    }

    /// 生成垂向随机位移（网格增量），含反射边界
    pub fn dispersion(&self, particle: &Particle, ctx: &mut StepContext) -> LdResult<f64> {
        let p = particle.grid_coord();
        let (drift, kv, hz) = self.weighted_kv(&p, ctx)?;
        let r = ctx.rng.uniform_symmetric();
        // 漂移项带时间箭头；扩散振幅用 |dt|
        let mut dz_m = drift * ctx.dt + r * (6.0 * kv * ctx.dt_abs()).sqrt();
        // 转为网格增量
        dz_m /= hz;
        let nz = ctx.dataset.nz() as f64;

        // 反射边界
        let newz = p.z + dz_m;
        let mut dz = dz_m;
        if newz < 0.0 {
            dz = -(2.0 * p.z + dz_m);
        }
        if newz >= nz - 1.0 {
            dz = 2.0 * (nz - 1.0 - p.z) - dz_m;
        }
        // 极端大位移下单次反射仍可能越界，最终夹紧以维持不变式
        let target = (p.z + dz).clamp(0.0, nz - 1.0 - Z_EPS);
        Ok(target - p.z)
    }

    /// 近旁水柱的双线性加权样条求值
    ///
    /// 返回 (Kv', Kv, 垂向格距)。贴岸时模板收缩为最近一列。
    fn weighted_kv(&self, p: &GridCoord, ctx: &StepContext) -> LdResult<(f64, f64, f64)> {
        let dataset = ctx.dataset;
        let nz = dataset.nz() as f64;
        let n = if dataset.is_close_to_coast(p) { 1 } else { 2 };

        let x = p.x;
        let y = p.y;
        let z = p.z.max(0.0).min(nz - 1.0 - Z_EPS);
        let depth = dataset.z2depth(x, y, z);

        let i = x.floor() as isize;
        let j = y.floor() as isize;
        let dx = x - x.floor();
        let dy = y - y.floor();

        let mut co_sum = 0.0;
        let mut drift = 0.0;
        let mut kv = 0.0;
        let mut hz = 0.0;
        for ii in 0..n {
            for jj in 0..n {
                let gi = i + ii as isize;
                let gj = j + jj as isize;
                let co = ((1.0 - ii as f64 - dx) * (1.0 - jj as f64 - dy)).abs();
                let sample = self.column_kv(gi, gj, depth, ctx)?;
                co_sum += co;
                drift += sample.diff_kv * co;
                kv += sample.kv * co;
                hz += co * self.column_cell_height(gi, gj, z, ctx);
            }
        }
        if co_sum != 0.0 {
            drift /= co_sum;
            kv /= co_sum;
            hz /= co_sum;
        }
        Ok((drift, kv, hz.max(1e-6)))
    }

    /// 单水柱的垂向格距 [m]
    fn column_cell_height(&self, i: isize, j: isize, z: f64, ctx: &StepContext) -> f64 {
        let dataset = ctx.dataset;
        let nz = dataset.nz() as f64;
        let k = z.round();
        let upper = dataset.z2depth(i as f64, j as f64, (k + 0.5).min(nz - 1.0));
        let lower = dataset.z2depth(i as f64, j as f64, (k - 0.5).max(0.0));
        (upper - lower).abs()
    }

    /// 单水柱样条：Kv 与 Kv'（按米）
    fn column_kv(&self, i: isize, j: isize, depth: f64, ctx: &StepContext) -> LdResult<KvSample> {
        let dataset = ctx.dataset;
        let nz = dataset.nz();
        let x = i as f64;
        let y = j as f64;

        // 整层剖面
        let mut profile = vec![0.0; nz];
        for (k, value) in profile.iter_mut().enumerate() {
            *value = dataset.sample(
                &self.kv_field,
                &GridCoord::new(x, y, k as f64),
                ctx.time,
            )?;
        }

        let zmax = nz as f64 - 1.0 - Z_EPS;
        let z = dataset.depth2z(x, y, depth).min(zmax);
        let k = z.floor() as usize;
        let t = z - z.floor();
        let h = self.column_cell_height(i, j, z, ctx).max(1e-6);

        // 样条一阶导（索引空间），换算到每米
        let (a, b, c, d) = spline_coefficients(&profile, k);
        let ds_dt = c + t * (2.0 * b + 3.0 * a * t);
        let diff_kv = ds_dt / h;

        // 漂移半步推进后的深度上求 Kv
        let depth_half = depth + 0.5 * diff_kv * ctx.dt;
        let zz = dataset.depth2z(x, y, depth_half).min(zmax).max(0.0);
        let k2 = zz.floor() as usize;
        let t2 = zz - zz.floor();
        let (a2, b2, c2, d2) = if k2 == k {
            (a, b, c, d)
        } else {
            spline_coefficients(&profile, k2)
        };
        let kv = (d2 + t2 * (c2 + t2 * (b2 + t2 * a2))).max(0.0);

        Ok(KvSample { diff_kv, kv })
    }
}

/// 区间 [k, k+1] 上的自然三次样条系数 (a, b, c, d)
///
/// 设 M 为二阶差分（自然边界 M(0)=M(n-1)=0 的闭式近似），则
/// S(t) = d + c·t + b·t² + a·t³，t ∈ [0, 1)：
/// a = (M(k+1) − M(k))/6，b = M(k)/2，
/// c = Kv(k+1) − Kv(k) − (M(k+1) + 2M(k))/6，d = Kv(k)。
fn spline_coefficients(profile: &[f64], k: usize) -> (f64, f64, f64, f64) {
    let k = k.min(profile.len().saturating_sub(2));
    let m0 = diff2(profile, k as isize);
    let m1 = diff2(profile, k as isize + 1);
    let a = (m1 - m0) / 6.0;
    let b = m0 / 2.0;
    let c = (profile[k + 1] - profile[k]) - (m1 + 2.0 * m0) / 6.0;
    let d = profile[k];
    (a, b, c, d)
}

/// 二阶差分：自然样条假设 M(0) = M(n-1) = 0
fn diff2(profile: &[f64], k: isize) -> f64 {
    let n = profile.len() as isize;
    if n < 3 {
        return f64::NAN;
    }
    if k <= 0 || k >= n - 1 {
        return 0.0;
    }
    let k = k as usize;
    profile[k + 1] - 2.0 * profile[k] + profile[k - 1]
}

impl Action for VDispAction {
    fn name(&self) -> &str {
        "action.vdisp"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        match self.dispersion(particle, ctx) {
            Ok(dz) => {
                particle.increment(0.0, 0.0, dz);
                Ok(())
            }
            Err(e) if e.is_out_of_domain() => {
                // 采样出域：本步不施加垂向扩散，交由移动行为判定出域
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SimRng;
    use crate::dataset::MemoryDataset;
    use crate::domain::zone::ZoneRegistry;

    fn dataset_with_profile(profile: &[f64]) -> MemoryDataset {
        let nz = profile.len();
        let mut ds = MemoryDataset::builder(10, 10, nz)
            .uniform_bathy(100.0)
            .constant_variable("u", 0.0, 0.0, 1e6)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e6)
            .unwrap()
            .profile_variable("kv", profile, 0.0, 1e6)
            .unwrap()
            .build();
        ds.update_time(0.0).unwrap();
        ds
    }

    fn ctx<'a>(
        ds: &'a MemoryDataset,
        zones: &'a ZoneRegistry,
        rng: &'a mut SimRng,
    ) -> StepContext<'a> {
        StepContext {
            dataset: ds,
            zones,
            time: 0.0,
            dt: 600.0,
            transport_duration: 1e6,
            time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            rng,
        }
    }

    #[test]
    fn test_diff2_natural_boundary() {
        let profile = [1.0, 2.0, 4.0, 7.0, 11.0];
        assert!(diff2(&profile, 0).abs() < 1e-15);
        assert!(diff2(&profile, 4).abs() < 1e-15);
        assert!((diff2(&profile, 2) - 1.0).abs() < 1e-12);
        assert!(diff2(&[1.0, 2.0], 0).is_nan());
    }

    #[test]
    fn test_spline_interpolates_knots() {
        let profile = [0.0, 0.01, 0.004, 0.002, 0.0];
        for k in 0..profile.len() - 1 {
            let (a, b, c, d) = spline_coefficients(&profile, k);
            // t=0 取 Kv[k]
            assert!((d - profile[k]).abs() < 1e-12);
            // t=1 取 Kv[k+1]
            let s1 = d + c + b + a;
            assert!((s1 - profile[k + 1]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_zero_kv_zero_displacement() {
        let ds = dataset_with_profile(&[0.0; 5]);
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(2);
        let mut c = ctx(&ds, &zones, &mut rng);
        let action = VDispAction::new("kv");
        let p = Particle::at_grid(0, 5.0, 5.0, 2.0, &ds);
        for _ in 0..50 {
            let dz = action.dispersion(&p, &mut c).unwrap();
            assert!(dz.abs() < 1e-15);
        }
    }

    #[test]
    fn test_z_stays_in_bounds() {
        // 大扩散系数 + 小水深：反复抽样后 z 始终在 [0, nz-1]
        let ds = dataset_with_profile(&[0.05, 0.08, 0.1, 0.08, 0.05]);
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(17);
        let mut c = ctx(&ds, &zones, &mut rng);
        let action = VDispAction::new("kv");
        let mut p = Particle::at_grid(0, 5.0, 5.0, 0.5, &ds);
        for _ in 0..500 {
            let dz = action.dispersion(&p, &mut c).unwrap();
            let z = p.z() + dz;
            assert!((0.0..=4.0).contains(&z), "z 越界: {}", z);
            p.set_z(z);
        }
    }

    #[test]
    fn test_uniform_profile_has_no_drift() {
        // 均匀 Kv：Kv' = 0，位移纯随机项
        let ds = dataset_with_profile(&[0.01; 5]);
        let zones = ZoneRegistry::new();
        let action = VDispAction::new("kv");
        let p = Particle::at_grid(0, 5.0, 5.0, 2.0, &ds);

        let mut rng = SimRng::seeded(5);
        let c = ctx(&ds, &zones, &mut rng);
        let (drift, kv, _) = action.weighted_kv(&p.grid_coord(), &c).unwrap();
        assert!(drift.abs() < 1e-12);
        assert!((kv - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_setup_requires_levels() {
        let mut ds = MemoryDataset::builder(8, 8, 2)
            .constant_variable("u", 0.0, 0.0, 1.0)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1.0)
            .unwrap()
            .constant_variable("kv", 0.0, 0.0, 1.0)
            .unwrap()
            .build();
        let action = VDispAction::new("kv");
        assert!(action.setup(&mut ds).is_err());
    }

    #[test]
    fn test_setup_requires_variable() {
        let mut ds = dataset_with_profile(&[0.01; 5]);
        let action = VDispAction::new("missing_kv");
        assert!(action.setup(&mut ds).is_err());
    }
}
