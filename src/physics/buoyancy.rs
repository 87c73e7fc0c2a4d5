// src/physics/buoyancy.rs

//! 浮力行为
//!
//! 椭球形卵粒的斯托克斯式终端速度：
//!
//! ```text
//! w = g·d²/(24·µ·ρw) · ln(2l/d + ½) · (ρw − ρp) / 100   [m/s]
//! ```
//!
//! d/l 为卵粒短/长轴 [cm]，µ 为海水分子粘度，ρw 为当地海水密度
//! （UNESCO 一大气压状态方程，盐度与温度的闭式多项式），ρp 为卵
//! 密度。卵密度可取常值，也可由外部"年龄→密度"表逐段查取。
//!
//! 浮力只在卵阶段施加；生长模型未启用时退化为年龄上限判断。

use crate::core::constants::{GRAVITY_CGS, MOLECULAR_VISCOSITY, ONE_DAY};
use crate::core::error::LdResult;
use crate::dataset::FieldDataset;
use crate::domain::particle::{Particle, Stage};
use crate::infra::config::{AgeTable, ParameterBlock};
use crate::physics::action::{Action, ActionPriority, StepContext};

// UNESCO 状态方程系数
const DR350: f64 = 28.106331;
const C1: f64 = 4.8314e-4;
const C2: f64 = 6.536332e-9;
const C3: f64 = 1.120083e-6;
const C4: f64 = 1.001685e-4;
const C5: f64 = 9.095290e-3;
const C6: f64 = 6.793952e-2;
const C7: f64 = 28.263737;
const C8: f64 = 5.3875e-9;
const C9: f64 = 8.2467e-7;
const C10: f64 = 7.6438e-5;
const C11: f64 = 4.0899e-3;
const C12: f64 = 8.24493e-1;
const C13: f64 = 1.6546e-6;
const C14: f64 = 1.0227e-4;
const C15: f64 = 5.72466e-3;

/// UNESCO 一大气压海水密度 [g/cm3]
///
/// 多项式在盐度与温度上连续，无分段间断。
pub fn water_density(sal: f64, tp: f64) -> f64 {
    let r1 = ((((C2 * tp - C3) * tp + C4) * tp - C5) * tp + C6) * tp - C7;
    let r2 = (((C8 * tp - C9) * tp + C10) * tp - C11) * tp + C12;
    let r3 = (-C13 * tp + C14) * tp - C15;
    (1000.0 + (C1 * sal + r3 * sal.abs().sqrt() + r2) * sal + r1 + DR350) / 1000.0
}

/// 卵密度模型
#[derive(Debug, Clone)]
enum DensityModel {
    /// 常值密度 [g/cm3]
    Constant(f64),
    /// 年龄分段密度表
    AgeFunction(AgeTable),
}

/// 浮力行为
#[derive(Debug, Clone)]
pub struct BuoyancyAction {
    /// 短轴 d [cm]
    minor_axis: f64,
    /// ln(2l/d + 0.5)
    logn: f64,
    density_model: DensityModel,
    salinity_field: String,
    temperature_field: String,
    /// 生长模型是否启用（启用时以卵阶段为门，否则以年龄上限为门）
    growth_enabled: bool,
    /// 年龄上限 [s]（仅生长未启用时生效）
    maximum_age: f64,
}

impl BuoyancyAction {
    /// 从参数块加载
    ///
    /// `growth_enabled` 由设置器传入（是否有生长行为启用）；
    /// `transport_duration` 为 age_max 缺省值。
    pub fn from_block(
        block: &ParameterBlock,
        growth_enabled: bool,
        transport_duration: f64,
    ) -> LdResult<Self> {
        let minor_axis = block.get_f64_or("mean_minor_axis", 0.05)?;
        let major_axis = block.get_f64_or("mean_major_axis", 0.14)?;
        let particle_density = block.get_f64("particle_density")?;
        let salinity_field = block.get_str("salinity_field")?.to_string();
        let temperature_field = block.get_str("temperature_field")?.to_string();

        let density_model = match block.get_str_opt("density_file") {
            // 年龄列以小时计
            Some(path) => DensityModel::AgeFunction(AgeTable::from_file(path, 3600.0)?),
            None => DensityModel::Constant(particle_density),
        };

        let maximum_age = if growth_enabled {
            0.0
        } else {
            match block.get_str_opt("age_max") {
                Some(_) => block.get_f64("age_max")? * ONE_DAY,
                None => {
                    log::warn!(
                        "{{Buoyancy}} 配置缺少 age_max，以输运总时长作为浮力年龄上限"
                    );
                    transport_duration
                }
            }
        };

        Ok(Self {
            minor_axis,
            logn: (2.0 * major_axis / minor_axis + 0.5).ln(),
            density_model,
            salinity_field,
            temperature_field,
            growth_enabled,
            maximum_age,
        })
    }

    /// 设置期声明必需变量
    pub fn setup(&self, dataset: &mut dyn FieldDataset) -> LdResult<()> {
        dataset.require_variable(&self.temperature_field)?;
        dataset.require_variable(&self.salinity_field)?;
        Ok(())
    }

    /// 当前粒子是否施加浮力
    fn applies_to(&self, particle: &Particle) -> bool {
        if self.growth_enabled {
            matches!(
                particle.length_state.map(|s| s.stage),
                Some(Stage::Egg)
            )
        } else {
            particle.age() < self.maximum_age
        }
    }

    /// 当前卵密度 [g/cm3]
    fn particle_density(&self, age: f64) -> f64 {
        match &self.density_model {
            DensityModel::Constant(rho) => *rho,
            DensityModel::AgeFunction(table) => table.lookup(age),
        }
    }

    /// 浮力垂向位移 [m]
    fn buoyant_move(&self, sal: f64, tp: f64, rho_particle: f64, dt: f64) -> f64 {
        let rho_w = water_density(sal, tp);
        let w = GRAVITY_CGS * self.minor_axis * self.minor_axis
            / (24.0 * MOLECULAR_VISCOSITY * rho_w)
            * self.logn
            * (rho_w - rho_particle)
            / 100.0;
        w * dt
    }
}

impl Action for BuoyancyAction {
    fn name(&self) -> &str {
        "action.buoyancy"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        if !self.applies_to(particle) {
            return Ok(());
        }
        let coord = particle.grid_coord();
        let (sal, tp) = match (
            ctx.dataset.sample(&self.salinity_field, &coord, ctx.time),
            ctx.dataset.sample(&self.temperature_field, &coord, ctx.time),
        ) {
            (Ok(sal), Ok(tp)) => (sal, tp),
            // 出域采样交由移动行为判定
            (Err(e), _) | (_, Err(e)) if e.is_out_of_domain() => return Ok(()),
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };
        let rho_p = self.particle_density(particle.age());
        let move_m = self.buoyant_move(sal, tp, rho_p, ctx.dt);
        let dz = ctx
            .dataset
            .depth2z(particle.x(), particle.y(), particle.depth() + move_m)
            - particle.z();
        particle.increment(0.0, 0.0, dz);
        Ok(())
    }
}
