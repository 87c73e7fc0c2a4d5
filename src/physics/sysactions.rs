// src/physics/sysactions.rs

//! 系统行为：位移施加与年龄监控
//!
//! 用户行为在一步之内只向粒子累加位移；系统移动行为统一施加累计
//! 位移、处理岸线行为、判定出域并同步地理坐标。锁定的粒子跳过
//! 移动。年龄监控行为按 |dt| 递增年龄并执行可选的超龄死亡。

use crate::core::error::LdResult;
use crate::dataset::{FieldDataset, GridCoord};
use crate::domain::particle::{MortalityCause, Particle};
use crate::infra::config::ParameterBlock;
use crate::physics::action::StepContext;

/// 岸线行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoastlineBehavior {
    /// 不做处理：位移可能把粒子推上岸
    None,
    /// 搁浅：上岸即死亡
    #[default]
    Beaching,
    /// 弹回：以岸线为镜面反弹
    Bouncing,
    /// 原地：取消会上岸的水平位移
    Standstill,
}

impl CoastlineBehavior {
    /// 从配置字符串解析，未知值回落为搁浅
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "bouncing" => Self::Bouncing,
            "standstill" => Self::Standstill,
            "beaching" => Self::Beaching,
            other => {
                log::warn!("未知岸线行为 '{}'，回落为 beaching", other);
                Self::Beaching
            }
        }
    }
}

/// 系统移动行为
#[derive(Debug, Clone, Default)]
pub struct MoveAction {
    behavior: CoastlineBehavior,
}

impl MoveAction {
    pub fn new(behavior: CoastlineBehavior) -> Self {
        Self { behavior }
    }

    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        let behavior = match block.get_str_opt("coastline_behavior") {
            Some(v) => CoastlineBehavior::parse(v),
            None => {
                log::warn!("配置缺少 coastline_behavior，采用默认搁浅行为");
                CoastlineBehavior::default()
            }
        };
        Ok(Self { behavior })
    }

    /// 施加累计位移
    ///
    /// 锁定粒子不动。出域即死亡；搁浅行为下落入陆格即死亡。
    pub fn execute(&self, particle: &mut Particle, ctx: &StepContext) {
        if particle.is_locked() {
            particle.cancel_move();
            return;
        }
        self.check_coastline_and_move(particle, ctx);
        if ctx.dataset.is_on_edge(&particle.grid_coord()) {
            particle.kill(MortalityCause::OutOfDomain);
            return;
        }
        particle.grid_to_geo(ctx.dataset);
    }

    fn check_coastline_and_move(&self, particle: &mut Particle, ctx: &StepContext) {
        match self.behavior {
            CoastlineBehavior::None => {
                particle.apply_move();
            }
            CoastlineBehavior::Beaching => {
                particle.apply_move();
                if !ctx.dataset.is_in_water_at(&particle.grid_coord()) {
                    particle.kill(MortalityCause::Beached);
                }
            }
            CoastlineBehavior::Bouncing => {
                let (dx, dy, _) = particle.pending_move();
                let (bx, by) =
                    bounce_coastline(ctx, particle.x(), particle.y(), dx, dy, 0);
                particle.increment(bx - dx, by - dy, 0.0);
                particle.apply_move();
            }
            CoastlineBehavior::Standstill => {
                let (dx, dy, _) = particle.pending_move();
                let target = GridCoord::new(particle.x() + dx, particle.y() + dy, particle.z());
                if !ctx.dataset.is_in_water_at(&target) {
                    particle.increment(-dx, -dy, 0.0);
                }
                particle.apply_move();
            }
        }
    }
}

/// 岸线镜面反弹
///
/// 二分逼近碰岸点，按撞击的是经向还是纬向岸壁对位移作镜像；
/// 反弹后仍上岸则递归重试（至多10层）。
fn bounce_coastline(
    ctx: &StepContext,
    x: f64,
    y: f64,
    dx: f64,
    dy: f64,
    iter: usize,
) -> (f64, f64) {
    let mut newdx = dx;
    let mut newdy = dy;
    let target = GridCoord::new(x + dx, y + dy, 0.0);
    if !ctx.dataset.is_in_water_at(&target) {
        if dx.abs() < 1e-12 {
            // 纯经向位移：必为纬向岸壁反弹
            let dy1 = y.round() + dy.signum() * 0.5 - y;
            return (dx, 2.0 * dy1 - dy);
        }
        let mut s = x;
        let mut ds = dx;
        let mut signum = 1.0;
        let mut bounce_meridional = false;
        let mut bounce_zonal = false;
        let mut n = 0;
        // 迭代逼近碰岸点
        while n < 1000 && !(bounce_meridional || bounce_zonal) {
            ds *= 0.5;
            s += signum * ds;
            let ys = dy / dx * (s - x) + y;
            signum = if ctx.dataset.is_in_water_at(&GridCoord::new(s, ys, 0.0)) {
                1.0
            } else {
                -1.0
            };
            bounce_meridional = ((s + 0.5).round() - (s + 0.5)).abs() < 1e-8;
            bounce_zonal = ((ys + 0.5).round() - (ys + 0.5)).abs() < 1e-8;
            n += 1;
        }
        let dx1 = x.round() + dx.signum() * 0.5 - x;
        let dy1 = y.round() + dy.signum() * 0.5 - y;
        if bounce_meridional && bounce_zonal {
            // 撞上岸角
            newdx = 2.0 * dx1 - dx;
            newdy = 2.0 * dy1 - dy;
        } else if bounce_meridional {
            // 撞上经向岸壁
            newdx = 2.0 * dx1 - dx;
            newdy = dy;
        } else if bounce_zonal {
            // 撞上纬向岸壁
            newdy = 2.0 * dy1 - dy;
            newdx = dx;
        }
        let rebound = GridCoord::new(x + newdx, y + newdy, 0.0);
        if !ctx.dataset.is_in_water_at(&rebound) && iter < 10 {
            return bounce_coastline(ctx, x, y, newdx, newdy, iter + 1);
        }
    }
    (newdx, newdy)
}

/// 年龄监控行为
#[derive(Debug, Clone, Default)]
pub struct AgeAction {
    /// 年龄上限 [s]；None 表示不设上限
    max_age: Option<f64>,
}

impl AgeAction {
    pub fn new(max_age: Option<f64>) -> Self {
        Self { max_age }
    }

    /// 从参数块加载（age_limit 以天计，可缺省）
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        let max_age = match block.get_str_opt("age_limit") {
            Some(_) => Some(block.get_f64("age_limit")? * crate::core::constants::ONE_DAY),
            None => None,
        };
        Ok(Self { max_age })
    }

    /// 年龄按 |dt| 递增；超过上限即超龄死亡
    pub fn execute(&self, particle: &mut Particle, ctx: &StepContext) {
        particle.increment_age(ctx.dt_abs());
        if let Some(max_age) = self.max_age {
            if particle.age() > max_age {
                particle.kill(MortalityCause::AgedOut);
            }
        }
    }
}
