// src/physics/action.rs

//! 行为抽象与执行管线
//!
//! 行为在设置期各自加载参数、声明数据集必需变量；逐步执行期按
//! 优先级升序作用于每个粒子。行为可以锁定粒子（抑制本步后续行为）
//! 或设定死亡原因（终态，此后管线不再执行该粒子）。
//!
//! 所有可变共享资源（随机数流、时钟）经 [`StepContext`] 显式传递，
//! 不使用全局静态量，也不在实体内部存放回指。

use crate::core::error::LdResult;
use crate::core::rng::SimRng;
use crate::dataset::FieldDataset;
use crate::domain::particle::Particle;
use crate::domain::zone::ZoneRegistry;

/// 行为优先级：数值越小越先执行，同级按注册顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ActionPriority {
    /// 先行（迁移、吞咽式行为：深度指定须先于平流）
    High,
    /// 常规
    #[default]
    Normal,
    /// 殿后
    Low,
}

impl ActionPriority {
    /// 排序秩
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }

    /// 从配置字符串解析，未知值回落为常规
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "highest" => Self::High,
            "low" | "lowest" => Self::Low,
            _ => Self::Normal,
        }
    }
}

/// 单步执行上下文
///
/// 生命周期 = 一个时间步；数据集快照在步内只读。
pub struct StepContext<'a> {
    /// 场数据集（快照只在步边界滑动）
    pub dataset: &'a dyn FieldDataset,
    /// 区域注册表
    pub zones: &'a ZoneRegistry,
    /// 当前时间 [s]
    pub time: f64,
    /// 带符号步长 [s]
    pub dt: f64,
    /// 输运总时长 [s]
    pub transport_duration: f64,
    /// 当前钟面时刻（昼夜判断）
    pub time_of_day: chrono::NaiveTime,
    /// 运行级随机数流
    pub rng: &'a mut SimRng,
}

impl<'a> StepContext<'a> {
    /// 步长绝对值 [s]
    #[inline]
    pub fn dt_abs(&self) -> f64 {
        self.dt.abs()
    }
}

/// 粒子行为
///
/// `execute` 返回的错误视为整个运行致命；粒子级状况
/// （出域、致死阈值、饥饿）在行为内部转为死亡原因，不上抛。
/// 行为在执行期不可变（`&self`），粒子级并行要求 `Sync`。
pub trait Action: Send + Sync {
    /// 行为名（配置块名）
    fn name(&self) -> &str;

    /// 执行优先级
    fn priority(&self) -> ActionPriority {
        ActionPriority::Normal
    }

    /// 粒子释放时初始化该行为的能力状态
    fn init(&self, _particle: &mut Particle) {}

    /// 对单个粒子执行一步
    fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()>;
}

/// 行为管线：设置期注册并排序一次，逐步执行
#[derive(Default)]
pub struct ActionPipeline {
    actions: Vec<Box<dyn Action>>,
    sorted: bool,
}

impl ActionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册行为
    pub fn register(&mut self, action: Box<dyn Action>) {
        log::info!("注册行为 \"{}\"", action.name());
        self.actions.push(action);
        self.sorted = false;
    }

    /// 按优先级稳定排序（设置完成时调用一次）
    pub fn finalize(&mut self) {
        self.actions.sort_by_key(|a| a.priority().rank());
        self.sorted = true;
    }

    /// 已注册行为数
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 对新粒子执行所有行为的初始化
    pub fn init_particle(&self, particle: &mut Particle) {
        for action in &self.actions {
            action.init(particle);
        }
    }

    /// 对单个粒子执行一步
    ///
    /// 死亡或锁定即中断剩余行为；锁定判断在每个行为执行前进行，
    /// 因此一个行为可以锁定粒子从而抑制同步内的后续行为。
    pub fn execute(&self, particle: &mut Particle, ctx: &mut StepContext) -> LdResult<()> {
        debug_assert!(self.sorted, "管线未排序：缺少 finalize() 调用");
        for action in &self.actions {
            if !particle.is_living() || particle.is_locked() {
                break;
            }
            action.execute(particle, ctx)?;
        }
        Ok(())
    }
}
