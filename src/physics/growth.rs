// src/physics/growth.rs

//! 生长行为（线性 / 阶段经验曲线 / 食物限制）
//!
//! 三种可互换模型，配置选择：
//! - 线性：dL = (c1 + c2·max(T, T_thr))·Q·dt_day，
//!   Q 为可选的 Holling II 食物限制因子 food/(food+ks)
//! - 阶段经验曲线：卵 / 卵黄囊仔鱼 / 摄食仔鱼各自的闭式表达，
//!   依赖年龄、当地温度与产卵时温度（Regner 型孵化延迟）
//! - 食物限制阶段曲线：摄食阶段的增长率乘以三个浮游生物场加权
//!   得到的 Michaelis–Menten 因子
//!
//! 长度驱动发育阶段（孵化长度、开口摄食长度两个阈值），阶段再
//! 反过来门控浮力、致死阈值与垂直迁移。
//!
//! 干出格点的温度可能为 NaN：该步增长为零，不是错误。

use crate::core::constants::ONE_DAY;
use crate::core::error::LdResult;
use crate::dataset::FieldDataset;
use crate::domain::particle::{LengthState, Particle, SpawnState, Stage};
use crate::infra::config::ParameterBlock;
use crate::physics::action::{Action, ActionPriority, StepContext};

/// 浮游生物场的摄食偏好权重
const FOOD_PREFERENCE: f64 = 1.0 / 3.0;

/// 生长模型
#[derive(Debug, Clone)]
pub enum GrowthModel {
    /// 线性增长，可带食物半饱和限制
    Linear {
        coeff1: f64,
        coeff2: f64,
        /// 半饱和常数；0 表示不作食物限制
        half_saturation: f64,
        food_field: Option<String>,
    },
    /// 阶段经验曲线
    StageDependent { coeff1: f64, coeff2: f64 },
    /// 食物限制的阶段曲线
    FoodLimited {
        half_saturation: f64,
        large_phyto_field: String,
        small_zoo_field: String,
        large_zoo_field: String,
    },
}

/// 生长行为
#[derive(Debug, Clone)]
pub struct GrowthAction {
    model: GrowthModel,
    temperature_field: String,
    /// 低温阈值 [°C]：增长公式的温度下限
    tp_threshold: f64,
    /// 初始体长 [mm]
    initial_length: f64,
    /// 孵化长度 [mm]（卵 → 卵黄囊仔鱼）
    hatching_length: f64,
    /// 开口摄食长度 [mm]（卵黄囊 → 摄食仔鱼）
    feeding_length: f64,
}

impl GrowthAction {
    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        let kind = block.get_str("type")?.trim().to_ascii_lowercase();
        let model = match kind.as_str() {
            "linear" => {
                let half_saturation = block.get_f64_or("half_saturation", 0.0)?;
                let food_field = if half_saturation > 0.0 {
                    Some(block.get_str("food_field")?.to_string())
                } else {
                    None
                };
                GrowthModel::Linear {
                    coeff1: block.get_f64("coeff1")?,
                    coeff2: block.get_f64("coeff2")?,
                    half_saturation,
                    food_field,
                }
            }
            "stage" | "stage_dependent" => GrowthModel::StageDependent {
                coeff1: block.get_f64_or("coeff1", 0.02)?,
                coeff2: block.get_f64_or("coeff2", 0.03)?,
            },
            "food_limited" => GrowthModel::FoodLimited {
                half_saturation: block.get_f64("half_saturation")?,
                large_phyto_field: block.get_str("large_phyto_field")?.to_string(),
                small_zoo_field: block.get_str("small_zoo_field")?.to_string(),
                large_zoo_field: block.get_str("large_zoo_field")?.to_string(),
            },
            other => {
                return Err(crate::core::error::LdError::invalid_parameter(
                    &block.name,
                    "type",
                    other,
                    "支持 linear / stage / food_limited",
                ))
            }
        };
        Ok(Self {
            model,
            temperature_field: block.get_str("temperature_field")?.to_string(),
            tp_threshold: block.get_f64("threshold_temp")?,
            initial_length: block.get_f64_or("initial_length", 2.79)?,
            hatching_length: block.get_f64_or("hatching_length", 2.8)?,
            feeding_length: block.get_f64_or("yolk2feeding_length", 4.5)?,
        })
    }

    /// 直接构造线性模型（测试与解析算例）
    pub fn linear(coeff1: f64, coeff2: f64, tp_threshold: f64, temperature_field: &str) -> Self {
        Self {
            model: GrowthModel::Linear {
                coeff1,
                coeff2,
                half_saturation: 0.0,
                food_field: None,
            },
            temperature_field: temperature_field.to_string(),
            tp_threshold,
            initial_length: 2.79,
            hatching_length: 2.8,
            feeding_length: 4.5,
        }
    }

    /// 设置期声明必需变量
    pub fn setup(&self, dataset: &mut dyn FieldDataset) -> LdResult<()> {
        dataset.require_variable(&self.temperature_field)?;
        match &self.model {
            GrowthModel::Linear {
                food_field: Some(f),
                ..
            } => dataset.require_variable(f)?,
            GrowthModel::FoodLimited {
                large_phyto_field,
                small_zoo_field,
                large_zoo_field,
                ..
            } => {
                dataset.require_variable(large_phyto_field)?;
                dataset.require_variable(small_zoo_field)?;
                dataset.require_variable(large_zoo_field)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// 长度 → 发育阶段
    pub fn stage_of(&self, length: f64) -> Stage {
        if length < self.hatching_length {
            Stage::Egg
        } else if length < self.feeding_length {
            Stage::YolkSacLarva
        } else {
            Stage::FeedingLarva
        }
    }

    /// 线性模型的单步增长 [mm]
    fn grow_linear(
        &self,
        coeff1: f64,
        coeff2: f64,
        ks: f64,
        temperature: f64,
        food: f64,
        dt_day: f64,
    ) -> f64 {
        if temperature.is_nan() || food.is_nan() {
            return 0.0;
        }
        let q = if ks == 0.0 { 1.0 } else { food / (food + ks) };
        (coeff1 + coeff2 * temperature.max(self.tp_threshold)) * q * dt_day
    }

    /// 阶段曲线的单步增长 [mm]
    ///
    /// 卵：dL = r·exp(r·age)·dt，r = 0.0016·T²
    /// 卵黄囊：Gompertz 型，Regner 孵化延迟由产卵时温度给出
    /// 摄食：线性温度响应 × 食物因子
    #[allow(clippy::too_many_arguments)]
    fn grow_staged(
        &self,
        coeff1: f64,
        coeff2: f64,
        stage: Stage,
        spawning_tp: f64,
        age_seconds: f64,
        temperature: f64,
        food_factor: f64,
        dt_day: f64,
    ) -> f64 {
        if temperature.is_nan() {
            return 0.0;
        }
        let age_days = age_seconds / ONE_DAY;
        let tp = temperature.max(self.tp_threshold);
        match stage {
            Stage::Egg => {
                let r = 0.0016 * tp * tp;
                r * (r * age_days).exp() * dt_day
            }
            Stage::YolkSacLarva => {
                let k1 = 0.20466 + 0.369659 * tp - 0.00893519 * tp * tp;
                let k2 = 0.335907 + 0.001603 * tp;
                let k3 = 7.87357 - 0.841969 * tp + 0.028809 * tp * tp;
                let zeta = -k2 * (-k3 * age_days).exp();
                let regner =
                    (1.0 / 1.012896) * (1.0 + (4.914322 - 0.257451 * spawning_tp).exp());
                k1 * k2 * k3 * (-k3 * (age_days - regner)).exp() * zeta.exp() * dt_day
            }
            Stage::FeedingLarva => food_factor * (coeff1 + coeff2 * tp) * dt_day,
        }
    }
}

impl Action for GrowthAction {
    fn name(&self) -> &str {
        "action.growth"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn init(&self, particle: &mut Particle) {
        particle.length_state = Some(LengthState {
            length: self.initial_length,
            stage: self.stage_of(self.initial_length),
        });
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let coord = particle.grid_coord();
        let temperature = match ctx.dataset.sample(&self.temperature_field, &coord, ctx.time) {
            Ok(v) => v,
            Err(e) if e.is_out_of_domain() => return Ok(()),
            Err(e) => return Err(e),
        };

        // 产卵时温度：首次执行时记忆
        if particle.spawn_state.is_none() {
            particle.spawn_state = Some(SpawnState {
                spawning_temperature: temperature,
            });
        }
        let spawning_tp = particle
            .spawn_state
            .map(|s| s.spawning_temperature)
            .unwrap_or(temperature);

        let mut state = particle.length_state.unwrap_or(LengthState {
            length: self.initial_length,
            stage: Stage::Egg,
        });

        // 发育时钟统一用 |dt|：生长不随运动学时间箭头倒退
        let dt_day = ctx.dt_abs() / ONE_DAY;
        let age = particle.age();

        let increment = match &self.model {
            GrowthModel::Linear {
                coeff1,
                coeff2,
                half_saturation,
                food_field,
            } => {
                let food = match food_field {
                    None => 1.0,
                    Some(field) => match ctx.dataset.sample(field, &coord, ctx.time) {
                        Ok(v) => v,
                        Err(e) if e.is_out_of_domain() => return Ok(()),
                        Err(e) => return Err(e),
                    },
                };
                self.grow_linear(*coeff1, *coeff2, *half_saturation, temperature, food, dt_day)
            }
            GrowthModel::StageDependent { coeff1, coeff2 } => self.grow_staged(
                *coeff1,
                *coeff2,
                state.stage,
                spawning_tp,
                age,
                temperature,
                1.0,
                dt_day,
            ),
            GrowthModel::FoodLimited {
                half_saturation,
                large_phyto_field,
                small_zoo_field,
                large_zoo_field,
            } => {
                let mut food = 0.0;
                for field in [large_phyto_field, small_zoo_field, large_zoo_field] {
                    match ctx.dataset.sample(field, &coord, ctx.time) {
                        Ok(v) => food += FOOD_PREFERENCE * v,
                        Err(e) if e.is_out_of_domain() => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
                let factor = if state.stage == Stage::FeedingLarva {
                    food / (food + half_saturation)
                } else {
                    1.0
                };
                self.grow_staged(
                    0.02,
                    0.03,
                    state.stage,
                    spawning_tp,
                    age,
                    temperature,
                    factor,
                    dt_day,
                )
            }
        };

        state.length += increment;
        state.stage = self.stage_of(state.length);
        particle.length_state = Some(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SimRng;
    use crate::dataset::MemoryDataset;
    use crate::domain::zone::ZoneRegistry;

    fn dataset(temp: f64) -> MemoryDataset {
        let mut ds = MemoryDataset::builder(10, 10, 3)
            .constant_variable("u", 0.0, 0.0, 1e7)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e7)
            .unwrap()
            .constant_variable("temp", temp, 0.0, 1e7)
            .unwrap()
            .build();
        ds.update_time(0.0).unwrap();
        ds
    }

    fn run_one_step(action: &GrowthAction, ds: &MemoryDataset, dt: f64) -> LengthState {
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(0);
        let mut ctx = StepContext {
            dataset: ds,
            zones: &zones,
            time: 0.0,
            dt,
            transport_duration: 1e7,
            time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            rng: &mut rng,
        };
        let mut p = Particle::at_grid(0, 5.0, 5.0, 1.0, ds);
        action.init(&mut p);
        action.execute(&mut p, &mut ctx).unwrap();
        p.length_state.unwrap()
    }

    #[test]
    fn test_linear_growth_reference_case() {
        // 15°C、系数 (0.02, 0.03)、阈值 10°C、一天：
        // ΔL = 0.02 + 0.03·15 = 0.47
        let action = GrowthAction::linear(0.02, 0.03, 10.0, "temp");
        let ds = dataset(15.0);
        let state = run_one_step(&action, &ds, ONE_DAY);
        assert!((state.length - (2.79 + 0.47)).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_threshold_floor() {
        // 5°C 低于阈值 10°C：按阈值温度增长
        let action = GrowthAction::linear(0.02, 0.03, 10.0, "temp");
        let ds = dataset(5.0);
        let state = run_one_step(&action, &ds, ONE_DAY);
        assert!((state.length - (2.79 + 0.02 + 0.3)).abs() < 1e-12);
    }

    #[test]
    fn test_nan_temperature_zero_growth() {
        let action = GrowthAction::linear(0.02, 0.03, 10.0, "temp");
        let ds = dataset(f64::NAN);
        let state = run_one_step(&action, &ds, ONE_DAY);
        assert!((state.length - 2.79).abs() < 1e-12);
    }

    #[test]
    fn test_backward_time_grows_forward() {
        // 发育时钟用 |dt|：逆时模拟下长度仍然增加
        let action = GrowthAction::linear(0.02, 0.03, 10.0, "temp");
        let ds = dataset(15.0);
        let state = run_one_step(&action, &ds, -ONE_DAY);
        assert!((state.length - (2.79 + 0.47)).abs() < 1e-12);
    }

    #[test]
    fn test_stage_transitions() {
        let action = GrowthAction::linear(0.02, 0.03, 10.0, "temp");
        assert_eq!(action.stage_of(2.5), Stage::Egg);
        assert_eq!(action.stage_of(3.0), Stage::YolkSacLarva);
        assert_eq!(action.stage_of(5.0), Stage::FeedingLarva);
    }

    #[test]
    fn test_staged_model_egg_growth() {
        let block = ParameterBlock::new("action.growth")
            .with("type", "stage")
            .with("temperature_field", "temp")
            .with("threshold_temp", "10.0");
        let action = GrowthAction::from_block(&block).unwrap();
        let ds = dataset(15.0);
        let state = run_one_step(&action, &ds, ONE_DAY);
        // 卵阶段：r = 0.0016·225 = 0.36，增长 r·exp(0) = 0.36
        assert!((state.length - (2.79 + 0.36)).abs() < 1e-9);
    }

    #[test]
    fn test_food_limited_requires_fields() {
        let block = ParameterBlock::new("action.growth")
            .with("type", "food_limited")
            .with("temperature_field", "temp")
            .with("threshold_temp", "10.0")
            .with("half_saturation", "0.5")
            .with("large_phyto_field", "phyto")
            .with("small_zoo_field", "szoo")
            .with("large_zoo_field", "lzoo");
        let action = GrowthAction::from_block(&block).unwrap();
        let mut ds = dataset(15.0);
        // 数据集缺少浮游生物场 → 设置期错误
        assert!(action.setup(&mut ds).is_err());
    }

    #[test]
    fn test_half_saturation_scales_linear_growth() {
        let block = ParameterBlock::new("action.growth")
            .with("type", "linear")
            .with("coeff1", "0.02")
            .with("coeff2", "0.03")
            .with("threshold_temp", "10.0")
            .with("temperature_field", "temp")
            .with("half_saturation", "1.0")
            .with("food_field", "food");
        let action = GrowthAction::from_block(&block).unwrap();
        let mut ds = MemoryDataset::builder(10, 10, 3)
            .constant_variable("u", 0.0, 0.0, 1e7)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e7)
            .unwrap()
            .constant_variable("temp", 15.0, 0.0, 1e7)
            .unwrap()
            .constant_variable("food", 1.0, 0.0, 1e7)
            .unwrap()
            .build();
        ds.update_time(0.0).unwrap();
        let state = run_one_step(&action, &ds, ONE_DAY);
        // Q = 1/(1+1) = 0.5
        assert!((state.length - (2.79 + 0.5 * 0.47)).abs() < 1e-12);
    }
}
