// src/physics/deb.rs

//! 动态能量收支（DEB）生长行为
//!
//! 对储备 E、结构 V、成熟投资 E_H 与生殖缓冲 E_R 的耦合常微分
//! 方程作逐步显式积分，生理参数经 Arrhenius 温度修正。开口摄食
//! 前（V < Vj）摄食响应为零；能量通量：
//!
//! ```text
//! pA = p_Am·Tc·f·V^(2/3)        同化
//! pM = p_M·Tc·V                 体维持
//! pC = E/(κ·E/V + E_g)·(E_g·(p_Am·Tc/E_m)·V^(-1/3) + p_M·Tc)
//! pG = max(0, κ·pC − pM)        结构生长
//! pJ = V·(1−κ)/κ·p_M·Tc         成熟维持
//! pR = (1−κ)·pC − pJ            成熟/生殖投资
//! ```
//!
//! κ·pC < pM 或 (1−κ)·pC < pJ 触发饥饿死亡。派生体长 V^(1/3)/δ
//! 更新长度与阶段。可选代谢加速（abj 模型）：出生与变态结构
//! 阈值之间 s_M = (V/Vb)^(1/3)，只作用于同化。

use crate::core::constants::{CELSIUS_TO_KELVIN, ONE_DAY};
use crate::core::error::LdResult;
use crate::dataset::FieldDataset;
use crate::domain::particle::{DebState, LengthState, MortalityCause, Particle, Stage};
use crate::infra::config::ParameterBlock;
use crate::physics::action::{Action, ActionPriority, StepContext};

/// 单步积分结果
#[derive(Debug, Clone, Copy)]
struct DebStep {
    state: DebState,
    starved: bool,
}

/// DEB 生长行为
#[derive(Debug, Clone)]
pub struct DebGrowthAction {
    temperature_field: String,
    food_field: String,
    /// 最大表面积比摄食率 [J/mm2/s]
    p_xm: f64,
    /// 同化效率
    ae: f64,
    /// 食物半饱和常数 [mg/m3]
    k_x: f64,
    /// 储备容量 [J/mm3]
    e_m: f64,
    /// 结构生长成本 [J/mm3]
    e_g: f64,
    /// 体维持成本 [J/mm3/s]
    p_m: f64,
    /// 能量分配系数 κ
    kappa: f64,
    /// Arrhenius 温度 [K]
    t_arrhenius: f64,
    /// 参考温度 [K]
    t_ref: f64,
    /// 初始体长 [mm]
    initial_length: f64,
    /// 初始储备 [J]
    initial_reserve: f64,
    /// 形状系数 δ
    shape: f64,
    /// 开口摄食结构阈值 Vj [mm3]
    v_feeding: f64,
    /// 孵化长度 [mm]（阶段划分）
    hatching_length: f64,
    /// 开口摄食长度 [mm]
    feeding_length: f64,
    /// 青春期成熟阈值 E_Hp [J]；None 表示全程计入 E_H
    maturity_at_puberty: Option<f64>,
    /// 代谢加速的出生结构阈值 Vb [mm3]；None 关闭加速
    v_birth: Option<f64>,
}

impl DebGrowthAction {
    /// 从参数块加载（含原始单位换算：天→秒、cm→mm）
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        let shape = block.get_f64("shape")?;
        let feeding_length = block.get_f64("yolk2feeding_length")?;
        let v_birth = match block.get_str_opt("birth_length") {
            Some(_) => {
                let lb = block.get_f64("birth_length")?;
                Some((shape * lb).powi(3))
            }
            None => None,
        };
        Ok(Self {
            temperature_field: block.get_str("temperature_field")?.to_string(),
            food_field: block.get_str("food_field")?.to_string(),
            // J cm-2 d-1 → J mm-2 s-1
            p_xm: block.get_f64("ingestion_rate")? / (ONE_DAY * 100.0),
            ae: block.get_f64("assimilation_efficiency")?,
            k_x: block.get_f64("half_saturation")?,
            // J cm-3 → J mm-3
            e_m: block.get_f64("reserve_capacity")? / 1000.0,
            e_g: block.get_f64("cost_growth")? / 1000.0,
            // J cm-3 d-1 → J mm-3 s-1
            p_m: block.get_f64("volume_cost_maintenance")? / (ONE_DAY * 1000.0),
            kappa: block.get_f64("allocation_rule")?,
            t_arrhenius: block.get_f64("arrhenius")?,
            t_ref: block.get_f64("ref_temp")?,
            initial_length: block.get_f64("initial_length")?,
            initial_reserve: block.get_f64("initial_reserve")?,
            shape,
            v_feeding: (shape * feeding_length).powi(3),
            hatching_length: block.get_f64_or("hatching_length", 2.8)?,
            feeding_length,
            maturity_at_puberty: match block.get_str_opt("maturity_at_puberty") {
                Some(_) => Some(block.get_f64("maturity_at_puberty")?),
                None => None,
            },
            v_birth,
        })
    }

    /// 设置期声明必需变量
    pub fn setup(&self, dataset: &mut dyn FieldDataset) -> LdResult<()> {
        dataset.require_variable(&self.temperature_field)?;
        dataset.require_variable(&self.food_field)?;
        Ok(())
    }

    /// 结构体积 → 体长 [mm]
    fn length_of(&self, v: f64) -> f64 {
        v.powf(1.0 / 3.0) / self.shape
    }

    fn stage_of(&self, length: f64) -> Stage {
        if length < self.hatching_length {
            Stage::Egg
        } else if length < self.feeding_length {
            Stage::YolkSacLarva
        } else {
            Stage::FeedingLarva
        }
    }

    /// 代谢加速因子 s_M
    fn acceleration(&self, v: f64) -> f64 {
        match self.v_birth {
            None => 1.0,
            Some(vb) => {
                if v < vb {
                    1.0
                } else if v < self.v_feeding {
                    (v / vb).powf(1.0 / 3.0)
                } else {
                    (self.v_feeding / vb).powf(1.0 / 3.0)
                }
            }
        }
    }

    /// 单步积分
    fn grow(&self, state: DebState, temperature: f64, food: f64, dt: f64) -> DebStep {
        let DebState {
            reserve: e,
            structure: v,
            maturity: e_h,
            repro_buffer: e_r,
        } = state;

        let temp_k = CELSIUS_TO_KELVIN + temperature;
        let tcorr = (self.t_arrhenius / self.t_ref - self.t_arrhenius / temp_k).exp();

        // 开口摄食前无摄食响应
        let f = if v < self.v_feeding {
            0.0
        } else {
            food / (food + self.k_x)
        };

        let p_xm_t = self.p_xm * tcorr;
        let p_m_t = self.p_m * tcorr;
        let p_am_t = p_xm_t * self.ae * self.acceleration(v);

        // 能量通量 [J/s]
        let flow_pa = p_am_t * f * v.powf(2.0 / 3.0);
        let flow_pm = p_m_t * v;
        let flow_pc = e / (self.kappa * (e / v) + self.e_g)
            * (self.e_g * (p_am_t / self.e_m) * v.powf(-1.0 / 3.0) + p_m_t);
        let flow_pg = (self.kappa * flow_pc - flow_pm).max(0.0);
        let flow_pj = v * (1.0 - self.kappa) / self.kappa * p_m_t;
        let flow_pr = (1.0 - self.kappa) * flow_pc - flow_pj;

        // 状态微分与显式积分
        let de = flow_pa - flow_pc;
        let dv = flow_pg / self.e_g;
        let (de_h, de_r) = match self.maturity_at_puberty {
            Some(e_hp) if e_h >= e_hp => (0.0, flow_pr),
            _ => (flow_pr, 0.0),
        };

        let starved =
            self.kappa * flow_pc < flow_pm || (1.0 - self.kappa) * flow_pc < flow_pj;

        DebStep {
            state: DebState {
                reserve: e + de * dt,
                structure: v + dv * dt,
                maturity: e_h + de_h * dt,
                repro_buffer: e_r + de_r * dt,
            },
            starved,
        }
    }
}

impl Action for DebGrowthAction {
    fn name(&self) -> &str {
        "action.growth_deb"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn init(&self, particle: &mut Particle) {
        particle.length_state = Some(LengthState {
            length: self.initial_length,
            stage: self.stage_of(self.initial_length),
        });
        particle.deb_state = Some(DebState {
            reserve: self.initial_reserve,
            structure: (self.shape * self.initial_length).powi(3),
            maturity: 0.0,
            repro_buffer: 0.0,
        });
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let coord = particle.grid_coord();
        let (temperature, food) = match (
            ctx.dataset.sample(&self.temperature_field, &coord, ctx.time),
            ctx.dataset.sample(&self.food_field, &coord, ctx.time),
        ) {
            (Ok(t), Ok(f)) => (t, f),
            (Err(e), _) | (_, Err(e)) if e.is_out_of_domain() => return Ok(()),
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };
        if temperature.is_nan() || food.is_nan() {
            return Ok(());
        }

        let state = particle.deb_state.unwrap_or(DebState {
            reserve: self.initial_reserve,
            structure: (self.shape * self.initial_length).powi(3),
            maturity: 0.0,
            repro_buffer: 0.0,
        });

        // 发育时钟统一用 |dt|
        let step = self.grow(state, temperature, food, ctx.dt_abs());
        particle.deb_state = Some(step.state);

        let length = self.length_of(step.state.structure);
        particle.length_state = Some(LengthState {
            length,
            stage: self.stage_of(length),
        });

        if step.starved {
            particle.kill(MortalityCause::Starved);
        }
        Ok(())
    }
}
