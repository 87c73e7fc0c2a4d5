// src/physics/lethal.rs

//! 致死阈值行为（温度 / 盐度）
//!
//! 粒子穿越致死温度或盐度阈值即设定对应死亡原因，不中断运行。
//! 温度阈值三种来源：生长启用时的卵/仔鱼阶段对、常值、或外部
//! "年龄→冷热阈值"表。盐度为低盐/高盐常值阈值对。

use crate::core::error::LdResult;
use crate::dataset::FieldDataset;
use crate::domain::particle::{MortalityCause, Particle, Stage};
use crate::infra::config::{AgeTable, ParameterBlock};
use crate::physics::action::{Action, ActionPriority, StepContext};

/// 温度阈值来源
#[derive(Debug, Clone)]
enum TempThresholds {
    /// 常值（无生长）
    Constant { cold: f64, hot: f64 },
    /// 年龄分段表（无生长），每行 [cold, hot]
    AgeFunction(AgeTable),
    /// 阶段对（生长启用）：[卵, 仔鱼]
    ByStage {
        cold_egg: f64,
        cold_larva: f64,
        hot_egg: f64,
        hot_larva: f64,
    },
}

/// 致死温度行为
#[derive(Debug, Clone)]
pub struct LethalTempAction {
    temperature_field: String,
    thresholds: TempThresholds,
}

impl LethalTempAction {
    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock, growth_enabled: bool) -> LdResult<Self> {
        let temperature_field = block.get_str("temperature_field")?.to_string();
        let thresholds = if growth_enabled {
            TempThresholds::ByStage {
                cold_egg: block.get_f64("cold_lethal_temperature_egg")?,
                cold_larva: block.get_f64("cold_lethal_temperature_larva")?,
                hot_egg: block.get_f64("hot_lethal_temperature_egg")?,
                hot_larva: block.get_f64("hot_lethal_temperature_larva")?,
            }
        } else if let Some(path) = block.get_str_opt("lethal_temp_file") {
            // 年龄列以小时计
            TempThresholds::AgeFunction(AgeTable::from_file(path, 3600.0)?)
        } else {
            TempThresholds::Constant {
                cold: block.get_f64("cold_lethal_temperature_egg")?,
                hot: block.get_f64("hot_lethal_temperature_egg")?,
            }
        };
        Ok(Self {
            temperature_field,
            thresholds,
        })
    }

    /// 设置期声明必需变量
    pub fn setup(&self, dataset: &mut dyn FieldDataset) -> LdResult<()> {
        dataset.require_variable(&self.temperature_field)
    }

    /// 当前粒子的 (冷阈值, 热阈值)
    fn thresholds_for(&self, particle: &Particle) -> (f64, f64) {
        match &self.thresholds {
            TempThresholds::Constant { cold, hot } => (*cold, *hot),
            TempThresholds::AgeFunction(table) => {
                let row = table.lookup_row(particle.age());
                (row[0], row[1])
            }
            TempThresholds::ByStage {
                cold_egg,
                cold_larva,
                hot_egg,
                hot_larva,
            } => {
                let is_egg = matches!(
                    particle.length_state.map(|s| s.stage),
                    Some(Stage::Egg) | None
                );
                if is_egg {
                    (*cold_egg, *hot_egg)
                } else {
                    (*cold_larva, *hot_larva)
                }
            }
        }
    }
}

impl Action for LethalTempAction {
    fn name(&self) -> &str {
        "action.lethal_tp"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let temperature = match ctx.dataset.sample(
            &self.temperature_field,
            &particle.grid_coord(),
            ctx.time,
        ) {
            Ok(v) => v,
            Err(e) if e.is_out_of_domain() => return Ok(()),
            Err(e) => return Err(e),
        };
        if temperature.is_nan() {
            return Ok(());
        }
        let (cold, hot) = self.thresholds_for(particle);
        if temperature <= cold {
            particle.kill(MortalityCause::DeadCold);
        } else if temperature >= hot {
            particle.kill(MortalityCause::DeadHot);
        }
        Ok(())
    }
}

/// 致死盐度行为
#[derive(Debug, Clone)]
pub struct LethalSaltAction {
    salinity_field: String,
    /// 低盐阈值 [psu]
    fresh_threshold: f64,
    /// 高盐阈值 [psu]
    saline_threshold: f64,
}

impl LethalSaltAction {
    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        Ok(Self {
            salinity_field: block.get_str("salinity_field")?.to_string(),
            fresh_threshold: block.get_f64("fresh_lethal_salinity")?,
            saline_threshold: block.get_f64("saline_lethal_salinity")?,
        })
    }

    /// 设置期声明必需变量
    pub fn setup(&self, dataset: &mut dyn FieldDataset) -> LdResult<()> {
        dataset.require_variable(&self.salinity_field)
    }
}

impl Action for LethalSaltAction {
    fn name(&self) -> &str {
        "action.lethal_salt"
    }

    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let salinity = match ctx.dataset.sample(
            &self.salinity_field,
            &particle.grid_coord(),
            ctx.time,
        ) {
            Ok(v) => v,
            Err(e) if e.is_out_of_domain() => return Ok(()),
            Err(e) => return Err(e),
        };
        if salinity.is_nan() {
            return Ok(());
        }
        if salinity <= self.fresh_threshold {
            particle.kill(MortalityCause::DeadFresh);
        } else if salinity >= self.saline_threshold {
            particle.kill(MortalityCause::DeadSaline);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SimRng;
    use crate::dataset::MemoryDataset;
    use crate::domain::particle::LengthState;
    use crate::domain::zone::ZoneRegistry;

    fn dataset(temp: f64, salt: f64) -> MemoryDataset {
        let mut ds = MemoryDataset::builder(10, 10, 3)
            .constant_variable("u", 0.0, 0.0, 1e6)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e6)
            .unwrap()
            .constant_variable("temp", temp, 0.0, 1e6)
            .unwrap()
            .constant_variable("salt", salt, 0.0, 1e6)
            .unwrap()
            .build();
        ds.update_time(0.0).unwrap();
        ds
    }

    fn exec(action: &dyn Action, ds: &MemoryDataset, p: &mut Particle) {
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(0);
        let mut ctx = StepContext {
            dataset: ds,
            zones: &zones,
            time: 0.0,
            dt: 3600.0,
            transport_duration: 1e6,
            time_of_day: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            rng: &mut rng,
        };
        action.execute(p, &mut ctx).unwrap();
    }

    fn temp_action() -> LethalTempAction {
        let block = ParameterBlock::new("action.lethal_tp")
            .with("temperature_field", "temp")
            .with("cold_lethal_temperature_egg", "8.0")
            .with("hot_lethal_temperature_egg", "24.0");
        LethalTempAction::from_block(&block, false).unwrap()
    }

    #[test]
    fn test_cold_kill() {
        let ds = dataset(5.0, 35.0);
        let mut p = Particle::at_grid(0, 5.0, 5.0, 1.0, &ds);
        exec(&temp_action(), &ds, &mut p);
        assert_eq!(p.mortality(), MortalityCause::DeadCold);
    }

    #[test]
    fn test_hot_kill() {
        let ds = dataset(30.0, 35.0);
        let mut p = Particle::at_grid(0, 5.0, 5.0, 1.0, &ds);
        exec(&temp_action(), &ds, &mut p);
        assert_eq!(p.mortality(), MortalityCause::DeadHot);
    }

    #[test]
    fn test_survives_in_band() {
        let ds = dataset(15.0, 35.0);
        let mut p = Particle::at_grid(0, 5.0, 5.0, 1.0, &ds);
        exec(&temp_action(), &ds, &mut p);
        assert!(p.is_living());
    }

    #[test]
    fn test_stage_pair_thresholds() {
        let block = ParameterBlock::new("action.lethal_tp")
            .with("temperature_field", "temp")
            .with("cold_lethal_temperature_egg", "12.0")
            .with("cold_lethal_temperature_larva", "8.0")
            .with("hot_lethal_temperature_egg", "22.0")
            .with("hot_lethal_temperature_larva", "26.0");
        let action = LethalTempAction::from_block(&block, true).unwrap();

        // 10°C：对卵致死，对仔鱼不致死
        let ds = dataset(10.0, 35.0);
        let mut egg = Particle::at_grid(0, 5.0, 5.0, 1.0, &ds);
        egg.length_state = Some(LengthState {
            length: 2.0,
            stage: Stage::Egg,
        });
        exec(&action, &ds, &mut egg);
        assert_eq!(egg.mortality(), MortalityCause::DeadCold);

        let mut larva = Particle::at_grid(1, 5.0, 5.0, 1.0, &ds);
        larva.length_state = Some(LengthState {
            length: 6.0,
            stage: Stage::FeedingLarva,
        });
        exec(&action, &ds, &mut larva);
        assert!(larva.is_living());
    }

    #[test]
    fn test_age_table_thresholds() {
        let table = AgeTable::new(
            vec![0.0, 7200.0],
            vec![vec![10.0, 20.0], vec![5.0, 25.0]],
        )
        .unwrap();
        let action = LethalTempAction {
            temperature_field: "temp".into(),
            thresholds: TempThresholds::AgeFunction(table),
        };
        let ds = dataset(8.0, 35.0);
        // 幼龄阈值 10 → 死；高龄阈值 5 → 活
        let mut young = Particle::at_grid(0, 5.0, 5.0, 1.0, &ds);
        exec(&action, &ds, &mut young);
        assert_eq!(young.mortality(), MortalityCause::DeadCold);

        let mut old = Particle::at_grid(1, 5.0, 5.0, 1.0, &ds);
        old.increment_age(10_000.0);
        exec(&action, &ds, &mut old);
        assert!(old.is_living());
    }

    #[test]
    fn test_salinity_kills() {
        let block = ParameterBlock::new("action.lethal_salt")
            .with("salinity_field", "salt")
            .with("fresh_lethal_salinity", "5.0")
            .with("saline_lethal_salinity", "40.0");
        let action = LethalSaltAction::from_block(&block).unwrap();

        let fresh = dataset(15.0, 2.0);
        let mut p = Particle::at_grid(0, 5.0, 5.0, 1.0, &fresh);
        exec(&action, &fresh, &mut p);
        assert_eq!(p.mortality(), MortalityCause::DeadFresh);

        let saline = dataset(15.0, 45.0);
        let mut p = Particle::at_grid(1, 5.0, 5.0, 1.0, &saline);
        exec(&action, &saline, &mut p);
        assert_eq!(p.mortality(), MortalityCause::DeadSaline);
    }
}
