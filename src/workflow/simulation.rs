// src/workflow/simulation.rs

//! 模拟装配与逐步执行
//!
//! [`Simulation`] 持有一次运行的全部状态：数据集、区域、行为管线、
//! 系统行为、时钟、随机数流与粒子群。每步顺序：滑动数据集时间窗 →
//! 对每个存活且未锁定的粒子按优先级执行行为 → 系统移动与年龄监控 →
//! 跟踪器记录。步与步严格串行；步内粒子相互独立，可选粒子级并行
//! （每粒子独立随机数流，固定种子下可复现）。

use crate::core::error::{LdError, LdResult};
use crate::core::rng::SimRng;
use crate::dataset::FieldDataset;
use crate::domain::particle::Particle;
use crate::domain::zone::{ZoneKind, ZoneRegistry};
use crate::infra::config::SimulationConfig;
use crate::infra::time::{TimeArrow, TimeManager};
use crate::io::tracker::Tracker;
use crate::physics::action::{ActionPipeline, StepContext};
use crate::physics::advection::AdvectionAction;
use crate::physics::buoyancy::BuoyancyAction;
use crate::physics::deb::DebGrowthAction;
use crate::physics::growth::GrowthAction;
use crate::physics::hdisp::HDispAction;
use crate::physics::lethal::{LethalSaltAction, LethalTempAction};
use crate::physics::migration::MigrationAction;
use crate::physics::recruitment::RecruitmentZoneAction;
use crate::physics::sysactions::{AgeAction, MoveAction};
use crate::physics::vdisp::VDispAction;
use rayon::prelude::*;

/// 一次模拟运行
pub struct Simulation {
    dataset: Box<dyn FieldDataset>,
    zones: ZoneRegistry,
    pipeline: ActionPipeline,
    move_action: MoveAction,
    age_action: AgeAction,
    time: TimeManager,
    rng: SimRng,
    /// 粒子级并行的随机数种子（并行模式下派生每粒子流）
    seed: u64,
    parallel: bool,
    particles: Vec<Particle>,
    trackers: Vec<Box<dyn Tracker>>,
    /// 每多少步记录一次输出
    record_frequency: u64,
}

impl Simulation {
    /// 建造器
    pub fn builder(dataset: Box<dyn FieldDataset>, time: TimeManager) -> SimulationBuilder {
        SimulationBuilder::new(dataset, time)
    }

    /// 当前粒子群
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// 时钟
    pub fn time(&self) -> &TimeManager {
        &self.time
    }

    /// 存活粒子数
    pub fn living_count(&self) -> usize {
        self.particles.iter().filter(|p| p.is_living()).count()
    }

    /// 取回跟踪器（运行结束后检查输出）
    pub fn into_trackers(self) -> Vec<Box<dyn Tracker>> {
        self.trackers
    }

    /// 推进一步
    ///
    /// 返回 `false` 表示运行已达配置时长。数据集时间窗滑动失败
    /// （时间超出覆盖范围）与行为内部的致命错误上抛，中止运行。
    pub fn step(&mut self) -> LdResult<bool> {
        if !self.time.has_next_step() {
            return Ok(false);
        }
        let time = self.time.time();
        self.dataset.update_time(time)?;

        let dt = self.time.dt();
        let transport_duration = self.time.transport_duration();
        let time_of_day = self.time.current_time_of_day();
        let step_index = self.time.step_index();
        let seed = self.seed;

        let dataset: &dyn FieldDataset = &*self.dataset;
        let zones = &self.zones;
        let pipeline = &self.pipeline;
        let move_action = &self.move_action;
        let age_action = &self.age_action;
        let particles = &mut self.particles;

        if self.parallel {
            // 粒子级并行：每粒子独立随机数流，由 (种子, 粒子, 步) 确定
            particles.par_iter_mut().try_for_each(|particle| {
                if !particle.is_living() {
                    return Ok(());
                }
                let mut local_rng = SimRng::seeded(
                    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
                        ^ ((particle.index() as u64) << 17)
                        ^ step_index,
                );
                let mut ctx = StepContext {
                    dataset,
                    zones,
                    time,
                    dt,
                    transport_duration,
                    time_of_day,
                    rng: &mut local_rng,
                };
                pipeline.execute(particle, &mut ctx)?;
                if particle.is_living() {
                    move_action.execute(particle, &ctx);
                    age_action.execute(particle, &ctx);
                }
                Ok::<(), LdError>(())
            })?;
        } else {
            let mut ctx = StepContext {
                dataset,
                zones,
                time,
                dt,
                transport_duration,
                time_of_day,
                rng: &mut self.rng,
            };
            for particle in particles.iter_mut() {
                if !particle.is_living() {
                    continue;
                }
                pipeline.execute(particle, &mut ctx)?;
                if particle.is_living() {
                    move_action.execute(particle, &ctx);
                    age_action.execute(particle, &ctx);
                }
            }
        }

        if step_index % self.record_frequency == 0 {
            for tracker in &mut self.trackers {
                tracker.record(step_index, time, &self.particles);
            }
        }
        Ok(true)
    }

    /// 跑完整个运行（不经工作线程；测试与批处理入口）
    pub fn run_to_end(&mut self) -> LdResult<()> {
        while self.step()? {}
        Ok(())
    }
}

/// [`Simulation`] 建造器
pub struct SimulationBuilder {
    dataset: Box<dyn FieldDataset>,
    zones: ZoneRegistry,
    pipeline: ActionPipeline,
    move_action: MoveAction,
    age_action: AgeAction,
    time: TimeManager,
    seed: Option<u64>,
    parallel: bool,
    trackers: Vec<Box<dyn Tracker>>,
    record_frequency: u64,
}

impl std::fmt::Debug for SimulationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationBuilder")
            .field("seed", &self.seed)
            .field("parallel", &self.parallel)
            .field("trackers", &self.trackers.len())
            .field("record_frequency", &self.record_frequency)
            .finish_non_exhaustive()
    }
}

impl SimulationBuilder {
    pub fn new(dataset: Box<dyn FieldDataset>, time: TimeManager) -> Self {
        Self {
            dataset,
            zones: ZoneRegistry::new(),
            pipeline: ActionPipeline::new(),
            move_action: MoveAction::default(),
            age_action: AgeAction::default(),
            time,
            seed: None,
            parallel: false,
            trackers: Vec::new(),
            record_frequency: 1,
        }
    }

    pub fn zones(mut self, zones: ZoneRegistry) -> Self {
        self.zones = zones;
        self
    }

    pub fn action(mut self, action: Box<dyn crate::physics::action::Action>) -> Self {
        self.pipeline.register(action);
        self
    }

    pub fn move_action(mut self, action: MoveAction) -> Self {
        self.move_action = action;
        self
    }

    pub fn age_action(mut self, action: AgeAction) -> Self {
        self.age_action = action;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn tracker(mut self, tracker: Box<dyn Tracker>) -> Self {
        self.trackers.push(tracker);
        self
    }

    pub fn record_frequency(mut self, every_n_steps: u64) -> Self {
        self.record_frequency = every_n_steps.max(1);
        self
    }

    /// 以网格坐标释放粒子群并完成装配
    pub fn release_at_grid(mut self, positions: &[(f64, f64, f64)]) -> Simulation {
        self.pipeline.finalize();
        let particles = positions
            .iter()
            .enumerate()
            .map(|(idx, &(x, y, z))| {
                let mut p = Particle::at_grid(idx, x, y, z, &*self.dataset);
                self.pipeline.init_particle(&mut p);
                p
            })
            .collect();
        let seed = self.seed.unwrap_or(0);
        let rng = match self.seed {
            Some(s) => SimRng::seeded(s),
            None => SimRng::from_entropy(),
        };
        log::info!(
            "模拟装配完成: {} 个行为, {} 个粒子, 时间方向 {:?}",
            self.pipeline.len(),
            positions.len(),
            self.time.arrow()
        );
        Simulation {
            dataset: self.dataset,
            zones: self.zones,
            pipeline: self.pipeline,
            move_action: self.move_action,
            age_action: self.age_action,
            time: self.time,
            rng,
            seed,
            parallel: self.parallel,
            particles,
            trackers: self.trackers,
            record_frequency: self.record_frequency,
        }
    }
}

/// 从配置装配标准行为集
///
/// 设置期完成全部参数解析与数据集变量声明；任何缺失或非法配置
/// 在此返回错误，时间步进开始后不再出现配置类错误。
pub fn build_from_config(
    config: &SimulationConfig,
    mut dataset: Box<dyn FieldDataset>,
    zones: ZoneRegistry,
) -> LdResult<SimulationBuilder> {
    let time_block = config.require_block("app.time")?;
    let arrow = match time_block.get_str_opt("time_arrow").unwrap_or("forward") {
        "backward" => TimeArrow::Backward,
        _ => TimeArrow::Forward,
    };
    let time = TimeManager::new(
        time_block.get_str("initial_time")?,
        time_block.get_duration("time_step")?,
        arrow,
        time_block.get_duration("transport_duration")?,
    )?;
    let transport_duration = time.transport_duration();

    // 生长模型启用与否门控浮力/致死温度/补充判据
    let growth_enabled =
        config.is_enabled("action.growth") || config.is_enabled("action.growth_deb");

    let mut pipeline: Vec<Box<dyn crate::physics::action::Action>> = Vec::new();

    if config.is_enabled("action.advection") {
        let block = config.require_block("action.advection")?;
        pipeline.push(Box::new(AdvectionAction::from_block(block)?));
    }
    if config.is_enabled("action.hdisp") {
        let block = config.require_block("action.hdisp")?;
        pipeline.push(Box::new(HDispAction::from_block(block)?));
    }
    if config.is_enabled("action.vdisp") {
        let block = config.require_block("action.vdisp")?;
        let action = VDispAction::from_block(block)?;
        action.setup(&mut *dataset)?;
        pipeline.push(Box::new(action));
    }
    if config.is_enabled("action.buoyancy") {
        let block = config.require_block("action.buoyancy")?;
        let action = BuoyancyAction::from_block(block, growth_enabled, transport_duration)?;
        action.setup(&mut *dataset)?;
        pipeline.push(Box::new(action));
    }
    if config.is_enabled("action.growth") {
        let block = config.require_block("action.growth")?;
        let action = GrowthAction::from_block(block)?;
        action.setup(&mut *dataset)?;
        pipeline.push(Box::new(action));
    }
    if config.is_enabled("action.growth_deb") {
        let block = config.require_block("action.growth_deb")?;
        let action = DebGrowthAction::from_block(block)?;
        action.setup(&mut *dataset)?;
        pipeline.push(Box::new(action));
    }
    if config.is_enabled("action.lethal_tp") {
        let block = config.require_block("action.lethal_tp")?;
        let action = LethalTempAction::from_block(block, growth_enabled)?;
        action.setup(&mut *dataset)?;
        pipeline.push(Box::new(action));
    }
    if config.is_enabled("action.lethal_salt") {
        let block = config.require_block("action.lethal_salt")?;
        let action = LethalSaltAction::from_block(block)?;
        action.setup(&mut *dataset)?;
        pipeline.push(Box::new(action));
    }
    if config.is_enabled("action.migration") {
        let block = config.require_block("action.migration")?;
        let action = MigrationAction::from_block(block)?;
        action.setup(&*dataset)?;
        pipeline.push(Box::new(action));
    }
    if config.is_enabled("action.recruitment") {
        let block = config.require_block("action.recruitment")?;
        let n_zones = zones.count(ZoneKind::Recruitment);
        pipeline.push(Box::new(RecruitmentZoneAction::from_block(
            block,
            growth_enabled,
            n_zones,
        )?));
    }

    let mut builder = SimulationBuilder::new(dataset, time).zones(zones);
    if let Some(block) = config.block("app.transport") {
        builder = builder
            .move_action(MoveAction::from_block(block)?)
            .age_action(AgeAction::from_block(block)?);
    }
    if let Some(seed) = time_block.get_str_opt("seed") {
        let seed: u64 = seed.trim().parse().map_err(|_| {
            LdError::invalid_parameter("app.time", "seed", seed, "不是无符号整数")
        })?;
        builder = builder.seed(seed);
    }
    for action in pipeline {
        builder = builder.action(action);
    }
    Ok(builder)
}
