// src/physics/advection.rs

//! 平流行为
//!
//! 两种可互换的积分格式：显式欧拉与四阶龙格-库塔。时间箭头由运行
//! 的带符号步长决定并全程固定；逆时模拟用同一积分器做两次连续求值
//! （原位置 + 暂置位置），保持代码路径可逆。
//!
//! RK4 的中间级若落到计算域边缘，格式优雅退化：返回当前已算出的
//! 部分位移而非报错。速度采样出域则是粒子级致命状况，在本行为内
//! 转为出域死亡。

use crate::core::error::{LdError, LdResult};
use crate::dataset::{FieldDataset, GridCoord};
use crate::domain::particle::{MortalityCause, Particle};
use crate::infra::config::ParameterBlock;
use crate::physics::action::{Action, ActionPriority, StepContext};

/// 单轴网格位移超过该值时记录CFL警告
const THRESHOLD_CFL: f64 = 1.0;

/// 积分格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvectionScheme {
    /// 显式欧拉
    Euler,
    /// 四阶龙格-库塔
    #[default]
    Rk4,
}

impl AdvectionScheme {
    /// 从配置键解析
    pub fn parse(value: &str) -> LdResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "euler" => Ok(Self::Euler),
            "rk4" => Ok(Self::Rk4),
            other => Err(LdError::config(format!(
                "未知平流格式: '{}' (支持 euler / rk4)",
                other
            ))),
        }
    }
}

/// 平流位移 (dx, dy, dz)，网格单位
type Displacement = (f64, f64, f64);

/// 单次欧拉求值：velocity(x, t) × dt
pub fn advect_euler(
    dataset: &dyn FieldDataset,
    p: &GridCoord,
    time: f64,
    dt: f64,
) -> LdResult<Displacement> {
    let dx = dataset.get_dux(p, time)? * dt;
    if dx.abs() > THRESHOLD_CFL {
        log::warn!("U 方向CFL破坏: dx={:.3}", dx);
    }
    let dy = dataset.get_dvy(p, time)? * dt;
    if dy.abs() > THRESHOLD_CFL {
        log::warn!("V 方向CFL破坏: dy={:.3}", dy);
    }
    let dz = if dataset.is_3d() {
        let dz = dataset.get_dwz(p, time)? * dt;
        if dz.abs() > THRESHOLD_CFL {
            log::warn!("W 方向CFL破坏: dz={:.3}", dz);
        }
        dz
    } else {
        0.0
    };
    Ok((dx, dy, dz))
}

/// 单次RK4求值
///
/// k1..k4 分别在 t、t+dt/2（两次）、t+dt 求值，按 (k1+2k2+2k3+k4)/6
/// 组合。任一中间级落在域边缘时返回该级之前的部分位移
/// （垂向分量置零），不报错。
pub fn advect_rk4(
    dataset: &dyn FieldDataset,
    p0: &GridCoord,
    time: f64,
    dt: f64,
) -> LdResult<Displacement> {
    let k1 = advect_euler(dataset, p0, time, dt)?;

    let pk = p0.offset(0.5 * k1.0, 0.5 * k1.1, 0.5 * k1.2);
    if dataset.is_on_edge(&pk) {
        return Ok((0.5 * k1.0, 0.5 * k1.1, 0.0));
    }
    let k2 = advect_euler(dataset, &pk, time + dt / 2.0, dt)?;

    let pk = p0.offset(0.5 * k2.0, 0.5 * k2.1, 0.5 * k2.2);
    if dataset.is_on_edge(&pk) {
        return Ok((0.5 * k2.0, 0.5 * k2.1, 0.0));
    }
    let k3 = advect_euler(dataset, &pk, time + dt / 2.0, dt)?;

    let pk = p0.offset(k3.0, k3.1, k3.2);
    if dataset.is_on_edge(&pk) {
        return Ok((k3.0, k3.1, 0.0));
    }
    let k4 = advect_euler(dataset, &pk, time + dt, dt)?;

    Ok((
        (k1.0 + 2.0 * k2.0 + 2.0 * k3.0 + k4.0) / 6.0,
        (k1.1 + 2.0 * k2.1 + 2.0 * k3.1 + k4.1) / 6.0,
        (k1.2 + 2.0 * k2.2 + 2.0 * k3.2 + k4.2) / 6.0,
    ))
}

/// 平流行为
#[derive(Debug, Clone)]
pub struct AdvectionAction {
    scheme: AdvectionScheme,
    /// 水平平流开关
    horizontal: bool,
    /// 垂向平流开关
    vertical: bool,
}

impl AdvectionAction {
    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        let scheme = match block.get_str_opt("scheme") {
            Some(v) => AdvectionScheme::parse(v)?,
            None => AdvectionScheme::default(),
        };
        Ok(Self {
            scheme,
            horizontal: block.get_bool_or("horizontal", true)?,
            vertical: block.get_bool_or("vertical", true)?,
        })
    }

    /// 直接构造（测试与解析算例）
    pub fn new(scheme: AdvectionScheme) -> Self {
        Self {
            scheme,
            horizontal: true,
            vertical: true,
        }
    }

    fn evaluate(
        &self,
        dataset: &dyn FieldDataset,
        p: &GridCoord,
        time: f64,
        dt: f64,
    ) -> LdResult<Displacement> {
        match self.scheme {
            AdvectionScheme::Euler => advect_euler(dataset, p, time, dt),
            AdvectionScheme::Rk4 => advect_rk4(dataset, p, time, dt),
        }
    }

    /// 正向平流
    fn advect_forward(
        &self,
        particle: &mut Particle,
        ctx: &StepContext,
    ) -> LdResult<Displacement> {
        self.evaluate(ctx.dataset, &particle.grid_coord(), ctx.time, ctx.dt)
    }

    /// 逆向平流
    ///
    /// X(t-dt) = X(t) - Ua(t, x1, y1, z1)·dt，x1 为暂置位置：
    /// 先在原位置求值并暂置，再在暂置位置重新求值取其为位移。
    /// 暂置位置出域即出域死亡。
    fn advect_backward(
        &self,
        particle: &mut Particle,
        ctx: &StepContext,
    ) -> LdResult<Option<Displacement>> {
        let p0 = particle.grid_coord();
        let mvt = self.evaluate(ctx.dataset, &p0, ctx.time, ctx.dt)?;
        let provisional = p0.offset(mvt.0, mvt.1, mvt.2);
        if ctx.dataset.is_on_edge(&provisional) {
            particle.kill(MortalityCause::OutOfDomain);
            return Ok(None);
        }
        let mvt = self.evaluate(ctx.dataset, &provisional, ctx.time, ctx.dt)?;
        Ok(Some(mvt))
    }
}

impl Action for AdvectionAction {
    fn name(&self) -> &str {
        "action.advection"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let result = if ctx.dt >= 0.0 {
            self.advect_forward(particle, ctx).map(Some)
        } else {
            self.advect_backward(particle, ctx)
        };
        let mvt = match result {
            Ok(Some(mvt)) => mvt,
            Ok(None) => return Ok(()),
            // 速度采样出域：粒子级致命状况，不中断运行
            Err(e) if e.is_out_of_domain() => {
                particle.kill(MortalityCause::OutOfDomain);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let (mut dx, mut dy, mut dz) = mvt;
        if !self.horizontal {
            dx = 0.0;
            dy = 0.0;
        }
        if !self.vertical {
            dz = 0.0;
        }
        particle.increment(dx, dy, dz);
        Ok(())
    }
}
