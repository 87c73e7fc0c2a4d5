// src/physics/migration.rs

//! 昼夜垂直迁移行为
//!
//! 白天与夜间各有目标深度（常值或按年龄查表），日出/日落钟面
//! 时刻划分昼夜。目标深度低于当地海底时保持当前深度。深度指定
//! 以"垂向独占"方式写入位移累加器，使其不被随后的平流覆盖。
//!
//! 时间箭头处理与其它行为一致：昼夜判断只看钟面时刻，正逆时
//! 模拟走同一条代码路径。

use crate::core::constants::ONE_DAY;
use crate::core::error::{LdError, LdResult};
use crate::dataset::FieldDataset;
use crate::domain::particle::Particle;
use crate::infra::config::{AgeTable, ParameterBlock};
use crate::infra::time::parse_time_of_day;
use crate::physics::action::{Action, ActionPriority, StepContext};
use chrono::NaiveTime;

/// 目标深度来源
#[derive(Debug, Clone)]
enum DepthSource {
    /// 常值深度 [m, 负值向下]
    Constant(f64),
    /// 年龄分段深度表
    AgeFunction(AgeTable),
}

impl DepthSource {
    fn depth_at(&self, age_seconds: f64) -> f64 {
        let raw = match self {
            Self::Constant(d) => *d,
            Self::AgeFunction(table) => table.lookup(age_seconds),
        };
        // 统一为负值向下
        -raw.abs()
    }
}

/// 迁移门控变量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateVariable {
    /// 年龄 [天]
    Age,
    /// 体长 [mm]
    Length,
}

/// 昼夜垂直迁移行为
#[derive(Debug, Clone)]
pub struct MigrationAction {
    day_depth: DepthSource,
    night_depth: DepthSource,
    sunrise: NaiveTime,
    sunset: NaiveTime,
    gate: GateVariable,
    threshold_min: f64,
    threshold_max: f64,
}

impl MigrationAction {
    /// 从参数块加载
    pub fn from_block(block: &ParameterBlock) -> LdResult<Self> {
        let gate = match block.get_str("threshold_variable")?.trim() {
            "age" => GateVariable::Age,
            "length" => GateVariable::Length,
            other => {
                return Err(LdError::invalid_parameter(
                    &block.name,
                    "threshold_variable",
                    other,
                    "支持 age / length",
                ))
            }
        };
        let day_depth = match block.get_str_opt("daytime_depth_file") {
            // 年龄列以天计
            Some(path) => DepthSource::AgeFunction(AgeTable::from_file(path, ONE_DAY)?),
            None => DepthSource::Constant(block.get_f64("daytime_depth")?),
        };
        let night_depth = match block.get_str_opt("nighttime_depth_file") {
            Some(path) => DepthSource::AgeFunction(AgeTable::from_file(path, ONE_DAY)?),
            None => DepthSource::Constant(block.get_f64("nighttime_depth")?),
        };
        Ok(Self {
            day_depth,
            night_depth,
            sunrise: parse_time_of_day(block.get_str("sunrise")?)?,
            sunset: parse_time_of_day(block.get_str("sunset")?)?,
            gate,
            threshold_min: block.get_f64_or("threshold_min", 0.0)?,
            threshold_max: block.get_f64_or("threshold_max", f64::MAX)?,
        })
    }

    /// 设置期检查：垂直迁移只在三维数据集上有意义
    pub fn setup(&self, dataset: &dyn FieldDataset) -> LdResult<()> {
        if !dataset.is_3d() {
            return Err(LdError::config(
                "垂直迁移无法在二维模拟中运行，请停用该行为或改用三维数据集",
            ));
        }
        Ok(())
    }

    /// 门控变量当前值
    fn gate_value(&self, particle: &Particle) -> f64 {
        match self.gate {
            GateVariable::Age => particle.age() / ONE_DAY,
            GateVariable::Length => particle
                .length_state
                .map(|s| s.length)
                .unwrap_or(0.0),
        }
    }

    /// 当地海底深度 [m, 负值]；陆点视为 0
    fn bottom(&self, particle: &Particle, ctx: &StepContext) -> f64 {
        let b = ctx
            .dataset
            .bathy(particle.x().floor() as isize, particle.y().floor() as isize);
        if b.is_nan() {
            0.0
        } else {
            -b.abs()
        }
    }

    /// 是否白天
    fn is_daytime(&self, time_of_day: NaiveTime) -> bool {
        time_of_day >= self.sunrise && time_of_day < self.sunset
    }

    /// 目标深度 [m, 负值]，低于海底时保持当前深度
    fn target_depth(&self, particle: &Particle, ctx: &StepContext) -> f64 {
        let source = if self.is_daytime(ctx.time_of_day) {
            &self.day_depth
        } else {
            &self.night_depth
        };
        let depth = source.depth_at(particle.age());
        let bottom = self.bottom(particle, ctx);
        if depth < bottom {
            particle.depth()
        } else {
            depth
        }
    }
}

impl Action for MigrationAction {
    fn name(&self) -> &str {
        "action.migration"
    }

    /// 深度指定必须先于平流写入累加器
    fn priority(&self) -> ActionPriority {
        ActionPriority::High
    }

    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        let value = self.gate_value(particle);
        if value <= self.threshold_min || value >= self.threshold_max {
            return Ok(());
        }
        let depth = self.target_depth(particle, ctx);
        let dz = ctx.dataset.depth2z(particle.x(), particle.y(), depth) - particle.z();
        particle.increment_with(0.0, 0.0, dz, false, true);
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
        let mut ds = MemoryDataset::builder(10, 10, 11)
            .uniform_bathy(100.0)
            .constant_variable("u", 0.0, 0.0, 1e6)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e6)
            .unwrap()
            .build();
        ds.update_time(0.0).unwrap();
        ds
    }

    fn action() -> MigrationAction {
        let block = ParameterBlock::new("action.migration")
            .with("threshold_variable", "age")
            .with("daytime_depth", "50")
            .with("nighttime_depth", "10")
            .with("sunrise", "06:00")
            .with("sunset", "18:00");
        MigrationAction::from_block(&block).unwrap()
    }

    fn exec_at(hour: u32, particle: &mut Particle, ds: &MemoryDataset) {
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(0);
        let mut ctx = StepContext {
            dataset: ds,
            zones: &zones,
            time: 0.0,
            dt: 3600.0,
            transport_duration: 1e6,
            time_of_day: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            rng: &mut rng,
        };
        action().execute(particle, &mut ctx).unwrap();
    }

    #[test]
    fn test_day_night_depths() {
        let ds = dataset();
        // 水深100m、11层：z=10 为表层
        let mut day = Particle::at_grid(0, 5.0, 5.0, 10.0, &ds);
        day.increment_age(3600.0);
        exec_at(12, &mut day, &ds);
        day.apply_move();
        day.grid_to_geo(&ds);
        assert!((day.depth() + 50.0).abs() < 1e-6, "白天深度 {}", day.depth());

        let mut night = Particle::at_grid(1, 5.0, 5.0, 10.0, &ds);
        night.increment_age(3600.0);
        exec_at(23, &mut night, &ds);
        night.apply_move();
        night.grid_to_geo(&ds);
        assert!((night.depth() + 10.0).abs() < 1e-6, "夜间深度 {}", night.depth());
    }

    #[test]
    fn test_gate_below_minimum() {
        let block = ParameterBlock::new("action.migration")
            .with("threshold_variable", "age")
            .with("threshold_min", "1.0")
            .with("daytime_depth", "50")
            .with("nighttime_depth", "10")
            .with("sunrise", "06:00")
            .with("sunset", "18:00");
        let action = MigrationAction::from_block(&block).unwrap();
        let ds = dataset();
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(0);
        let mut ctx = StepContext {
            dataset: &ds,
            zones: &zones,
            time: 0.0,
            dt: 3600.0,
            transport_duration: 1e6,
            time_of_day: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            rng: &mut rng,
        };
        // 年龄 0.5天 < 阈值 1天：不迁移
        let mut p = Particle::at_grid(0, 5.0, 5.0, 10.0, &ds);
        p.increment_age(0.5 * ONE_DAY);
        action.execute(&mut p, &mut ctx).unwrap();
        assert_eq!(p.pending_move(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_depth_assignment_is_exclusive() {
        let ds = dataset();
        let mut p = Particle::at_grid(0, 5.0, 5.0, 10.0, &ds);
        p.increment_age(3600.0);
        exec_at(12, &mut p, &ds);
        // 随后的平流垂向增量被独占声明屏蔽
        p.increment(0.0, 0.0, 3.0);
        p.apply_move();
        p.grid_to_geo(&ds);
        assert!((p.depth() + 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_target_below_bottom_keeps_depth() {
        // 目标深度120m超过水深100m：保持当前深度
        let block = ParameterBlock::new("action.migration")
            .with("threshold_variable", "age")
            .with("daytime_depth", "120")
            .with("nighttime_depth", "120")
            .with("sunrise", "06:00")
            .with("sunset", "18:00");
        let action = MigrationAction::from_block(&block).unwrap();
        let ds = dataset();
        let zones = ZoneRegistry::new();
        let mut rng = SimRng::seeded(0);
        let mut ctx = StepContext {
            dataset: &ds,
            zones: &zones,
            time: 0.0,
            dt: 3600.0,
            transport_duration: 1e6,
            time_of_day: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            rng: &mut rng,
        };
        let mut p = Particle::at_grid(0, 5.0, 5.0, 8.0, &ds);
        let depth0 = p.depth();
        p.increment_age(3600.0);
        action.execute(&mut p, &mut ctx).unwrap();
        p.apply_move();
        p.grid_to_geo(&ds);
        assert!((p.depth() - depth0).abs() < 1e-6);
    }

    #[test]
    fn test_2d_dataset_rejected_at_setup() {
        let ds2d = MemoryDataset::builder(8, 8, 1)
            .constant_variable("u", 0.0, 0.0, 1.0)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1.0)
            .unwrap()
            .build();
        assert!(action().setup(&ds2d).is_err());
    }
}
