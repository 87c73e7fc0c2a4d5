// src/physics/recruitment.rs

//! 区域补充行为
//!
//! 粒子满足生物判据（最小年龄或最小体长）后，在同一补充区域内
//! 连续驻留达到配置时长即转入"已补充"状态。补充按区域索引独立
//! 跟踪，单调不可逆。可选配置：补充后永久锁定（停止平流）。
//!
//! 驻留时钟是粒子自身的状态：换区清零，按 |dt| 累加。

use crate::core::constants::ONE_DAY;
use crate::core::error::{LdError, LdResult};
use crate::domain::particle::{Particle, RecruitState};
use crate::domain::zone::ZoneKind;
use crate::infra::config::ParameterBlock;
use crate::physics::action::{Action, ActionPriority, StepContext};

/// 补充判据
#[derive(Debug, Clone, Copy, PartialEq)]
enum Criterion {
    /// 最小年龄 [天]
    Age(f64),
    /// 最小体长 [mm]
    Length(f64),
}

/// 区域补充行为
#[derive(Debug, Clone)]
pub struct RecruitmentZoneAction {
    criterion: Criterion,
    /// 最小驻留时长 [s]
    duration_min: f64,
    /// 补充后是否永久锁定
    stop_moving: bool,
    /// 补充区域数（初始化粒子状态用）
    n_zones: usize,
}

impl RecruitmentZoneAction {
    /// 从参数块加载
    ///
    /// `growth_enabled`：体长判据要求生长模型启用，否则为设置错误。
    pub fn from_block(
        block: &ParameterBlock,
        growth_enabled: bool,
        n_zones: usize,
    ) -> LdResult<Self> {
        let criterion = match block.get_str("criterion")?.trim() {
            "age" => Criterion::Age(block.get_f64("limit_age")?),
            "length" => {
                if !growth_enabled {
                    return Err(LdError::config(
                        "补充判据不能基于体长：生长模型未启用。请启用生长模型或改用年龄判据",
                    ));
                }
                Criterion::Length(block.get_f64("limit_length")?)
            }
            other => {
                return Err(LdError::invalid_parameter(
                    &block.name,
                    "criterion",
                    other,
                    "支持 age / length",
                ))
            }
        };
        if n_zones == 0 {
            return Err(LdError::config("未定义任何补充区域"));
        }
        Ok(Self {
            criterion,
            duration_min: block.get_f64("duration_min")? * ONE_DAY,
            stop_moving: block.get_bool_or("stop_moving", false)?,
            n_zones,
        })
    }

    /// 生物判据是否满足
    fn satisfies_criterion(&self, particle: &Particle) -> bool {
        match self.criterion {
            Criterion::Age(min_days) => particle.age() / ONE_DAY >= min_days,
            Criterion::Length(min_length) => particle
                .length_state
                .map(|s| s.length >= min_length)
                .unwrap_or(false),
        }
    }
}

impl Action for RecruitmentZoneAction {
    fn name(&self) -> &str {
        "action.recruitment"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn init(&self, particle: &mut Particle) {
        particle.recruit_state = Some(RecruitState::new(self.n_zones));
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let mut state = match particle.recruit_state.take() {
            Some(s) => s,
            None => RecruitState::new(self.n_zones),
        };

        if self.stop_moving && state.is_recruited_any() {
            particle.recruit_state = Some(state);
            particle.lock();
            return Ok(());
        }

        let zone = ctx.zones.find_zone(
            ZoneKind::Recruitment,
            particle.x(),
            particle.y(),
            particle.depth(),
            ctx.dataset,
        );

        match zone {
            Some(zone) => {
                if !state.is_recruited(zone) && self.satisfies_criterion(particle) {
                    state.dwell_seconds = if state.current_zone == Some(zone) {
                        state.dwell_seconds + ctx.dt_abs()
                    } else {
                        0.0
                    };
                    state.current_zone = Some(zone);
                    if state.dwell_seconds >= self.duration_min {
                        state.mark_recruited(zone);
                        log::debug!("粒子{} 在区域{} 完成补充", particle.index(), zone);
                    }
                }
            }
            None => {
                // 驻留必须连续：离开区域即中断
                state.current_zone = None;
            }
        }

        particle.recruit_state = Some(state);
        Ok(())
    }
}
