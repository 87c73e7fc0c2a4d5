// src/domain/particle.rs

//! 粒子状态模型
//!
//! 粒子同时携带两套坐标——连续网格坐标 (x, y, z) 与地理坐标
//! (lon, lat, depth)——任何位置变更之后由显式转换步骤保持同步。
//! 行为在一步之内向"待施加位移"累加增量，系统移动行为统一施加、
//! 检查水陆与边缘、再做网格→地理同步。
//!
//! 死亡原因一经设定即终态：此后任何行为不再对该粒子执行。

use crate::dataset::{FieldDataset, GridCoord};
use serde::{Deserialize, Serialize};

/// 死亡原因（封闭枚举）
///
/// 粒子级运行时状况不是错误：以终态转移表达，不中断运行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MortalityCause {
    /// 存活
    #[default]
    Alive,
    /// 离开计算域
    OutOfDomain,
    /// 搁浅上岸
    Beached,
    /// 低温致死
    DeadCold,
    /// 高温致死
    DeadHot,
    /// 低盐致死
    DeadFresh,
    /// 高盐致死
    DeadSaline,
    /// 饥饿致死（DEB饥饿判据）
    Starved,
    /// 超龄
    AgedOut,
}

impl MortalityCause {
    /// 输出记录用的数值编码
    pub fn code(self) -> i32 {
        match self {
            Self::Alive => 0,
            Self::OutOfDomain => 1,
            Self::Beached => 2,
            Self::DeadCold => 3,
            Self::DeadHot => 4,
            Self::DeadFresh => 5,
            Self::DeadSaline => 6,
            Self::Starved => 7,
            Self::AgedOut => 8,
        }
    }
}

// ============================================================
// 能力状态（按行为启用情况附加）
// ============================================================

/// 发育阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 卵
    #[default]
    Egg,
    /// 卵黄囊仔鱼
    YolkSacLarva,
    /// 摄食仔鱼
    FeedingLarva,
}

/// 长度/阶段状态（生长类行为附加）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LengthState {
    /// 体长 [mm]
    pub length: f64,
    /// 发育阶段
    pub stage: Stage,
}

/// DEB 能量收支状态
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DebState {
    /// 储备能 E [J]
    pub reserve: f64,
    /// 结构体积 V [mm3]
    pub structure: f64,
    /// 成熟投资 E_H [J]
    pub maturity: f64,
    /// 生殖缓冲 E_R [J]
    pub repro_buffer: f64,
}

/// 补充状态：逐区域独立跟踪
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecruitState {
    /// 各补充区域的已补充标志（按区域索引）
    recruited: Vec<bool>,
    /// 当前驻留的补充区域索引
    pub current_zone: Option<usize>,
    /// 在当前区域内已连续驻留的时长 [s]
    pub dwell_seconds: f64,
}

impl RecruitState {
    /// 指定区域数创建
    pub fn new(n_zones: usize) -> Self {
        Self {
            recruited: vec![false; n_zones],
            current_zone: None,
            dwell_seconds: 0.0,
        }
    }

    /// 指定区域是否已补充
    pub fn is_recruited(&self, zone_index: usize) -> bool {
        self.recruited.get(zone_index).copied().unwrap_or(false)
    }

    /// 是否在任一区域完成补充
    pub fn is_recruited_any(&self) -> bool {
        self.recruited.iter().any(|&r| r)
    }

    /// 标记区域补充（单调：只置位，不清除）
    pub fn mark_recruited(&mut self, zone_index: usize) {
        if zone_index < self.recruited.len() {
            self.recruited[zone_index] = true;
        }
    }
}

/// 产卵记忆（阶段生长曲线需要产卵时温度）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpawnState {
    /// 产卵时温度 [°C]
    pub spawning_temperature: f64,
}

// ============================================================
// 粒子
// ============================================================

/// 模拟粒子
///
/// 不变式：未锁定且存活的粒子在每步末拥有唯一权威位置，
/// 网格与地理坐标一致。
#[derive(Debug, Clone, Default)]
pub struct Particle {
    /// 粒子索引
    index: usize,
    /// 网格坐标
    x: f64,
    y: f64,
    z: f64,
    /// 地理坐标
    lon: f64,
    lat: f64,
    depth: f64,
    /// 待施加位移
    dx: f64,
    dy: f64,
    dz: f64,
    /// 位移独占声明（一步内同轴的第二次独占声明是编程错误）
    exclusive_h: bool,
    exclusive_v: bool,
    /// 年龄 [s]（按 |dt| 累加）
    age: f64,
    /// 锁定标志：锁定期间后续行为（尤其平流移动）不得改变位置
    locked: bool,
    /// 死亡原因
    mortality: MortalityCause,

    // 能力状态
    pub length_state: Option<LengthState>,
    pub deb_state: Option<DebState>,
    pub recruit_state: Option<RecruitState>,
    pub spawn_state: Option<SpawnState>,
}

impl Particle {
    /// 以网格坐标创建粒子并同步地理坐标
    pub fn at_grid(index: usize, x: f64, y: f64, z: f64, dataset: &dyn FieldDataset) -> Self {
        let mut p = Self {
            index,
            x,
            y,
            z,
            ..Default::default()
        };
        p.grid_to_geo(dataset);
        p
    }

    /// 以地理坐标创建粒子并同步网格坐标
    pub fn at_geo(
        index: usize,
        lat: f64,
        lon: f64,
        depth: f64,
        dataset: &dyn FieldDataset,
    ) -> Self {
        let mut p = Self {
            index,
            lat,
            lon,
            depth,
            ..Default::default()
        };
        p.geo_to_grid(dataset);
        p
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.z
    }

    #[inline]
    pub fn lon(&self) -> f64 {
        self.lon
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// 深度 [m]，负值向下
    #[inline]
    pub fn depth(&self) -> f64 {
        self.depth
    }

    #[inline]
    pub fn age(&self) -> f64 {
        self.age
    }

    /// 当前网格坐标
    #[inline]
    pub fn grid_coord(&self) -> GridCoord {
        GridCoord::new(self.x, self.y, self.z)
    }

    /// 是否存活
    #[inline]
    pub fn is_living(&self) -> bool {
        self.mortality == MortalityCause::Alive
    }

    #[inline]
    pub fn mortality(&self) -> MortalityCause {
        self.mortality
    }

    /// 设定死亡原因
    ///
    /// 每步最多生效一次：第一个调用者永久确定死亡原因，
    /// 其后的调用为空操作。
    pub fn kill(&mut self, cause: MortalityCause) {
        if !self.is_living() || cause == MortalityCause::Alive {
            return;
        }
        self.mortality = cause;
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// 锁定：抑制本步后续行为对位置的改动；跨步保持直至显式解锁
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// 年龄累加 [s]（调用方传入 |dt|）
    pub fn increment_age(&mut self, dt_abs: f64) {
        self.age += dt_abs;
    }

    // ============================================================
    // 位移累加与施加
    // ============================================================

    /// 累加一次位移增量
    pub fn increment(&mut self, dx: f64, dy: f64, dz: f64) {
        self.increment_with(dx, dy, dz, false, false);
    }

    /// 累加位移，可声明水平/垂向独占
    ///
    /// 独占声明使该轴当前增量成为唯一生效值（昼夜垂直迁移据此让
    /// 深度指定不被随后的平流覆盖）。同轴重复独占视为配置冲突，
    /// 记录警告并保留先到者。
    pub fn increment_with(
        &mut self,
        dx: f64,
        dy: f64,
        dz: f64,
        exclusive_h: bool,
        exclusive_v: bool,
    ) {
        if exclusive_h && self.exclusive_h {
            log::warn!("粒子{}: 水平位移独占声明冲突，保留先到者", self.index);
        } else if !self.exclusive_h {
            if exclusive_h {
                self.dx = dx;
                self.dy = dy;
                self.exclusive_h = true;
            } else {
                self.dx += dx;
                self.dy += dy;
            }
        }

        if exclusive_v && self.exclusive_v {
            log::warn!("粒子{}: 垂向位移独占声明冲突，保留先到者", self.index);
        } else if !self.exclusive_v {
            if exclusive_v {
                self.dz = dz;
                self.exclusive_v = true;
            } else {
                self.dz += dz;
            }
        }
    }

    /// 待施加位移 (dx, dy, dz)
    pub fn pending_move(&self) -> (f64, f64, f64) {
        (self.dx, self.dy, self.dz)
    }

    /// 施加累计位移并清零累加器
    pub fn apply_move(&mut self) {
        self.x += self.dx;
        self.y += self.dy;
        self.z += self.dz;
        self.dx = 0.0;
        self.dy = 0.0;
        self.dz = 0.0;
        self.exclusive_h = false;
        self.exclusive_v = false;
    }

    /// 丢弃累计位移
    pub fn cancel_move(&mut self) {
        self.dx = 0.0;
        self.dy = 0.0;
        self.dz = 0.0;
        self.exclusive_h = false;
        self.exclusive_v = false;
    }

    // ============================================================
    // 坐标同步
    // ============================================================

    /// 网格坐标 → 地理坐标
    pub fn grid_to_geo(&mut self, dataset: &dyn FieldDataset) {
        let (lat, lon) = dataset.xy_to_latlon(self.x, self.y);
        self.lat = lat;
        self.lon = lon;
        if dataset.is_3d() {
            self.depth = dataset.z2depth(self.x, self.y, self.z);
        }
    }

    /// 地理坐标 → 网格坐标
    pub fn geo_to_grid(&mut self, dataset: &dyn FieldDataset) {
        let (x, y) = dataset.latlon_to_xy(self.lat, self.lon);
        self.x = x;
        self.y = y;
        if dataset.is_3d() {
            self.z = dataset.depth2z(x, y, self.depth);
        }
    }

    /// 直接设定垂向网格坐标（扩散反射边界后的修正）
    pub fn set_z(&mut self, z: f64) {
        self.z = z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;

    fn dataset() -> MemoryDataset {
        MemoryDataset::builder(10, 10, 5)
            .constant_variable("u", 0.0, 0.0, 1e6)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e6)
            .unwrap()
            .build()
    }

    #[test]
    fn test_kill_is_terminal() {
        let ds = dataset();
        let mut p = Particle::at_grid(0, 5.0, 5.0, 2.0, &ds);
        assert!(p.is_living());
        p.kill(MortalityCause::DeadCold);
        assert_eq!(p.mortality(), MortalityCause::DeadCold);
        // 第二次 kill 不改变死亡原因
        p.kill(MortalityCause::Beached);
        assert_eq!(p.mortality(), MortalityCause::DeadCold);
        assert!(!p.is_living());
    }

    #[test]
    fn test_move_accumulation() {
        let ds = dataset();
        let mut p = Particle::at_grid(0, 5.0, 5.0, 2.0, &ds);
        p.increment(0.1, 0.2, 0.0);
        p.increment(0.3, -0.1, 0.5);
        let (dx, dy, dz) = p.pending_move();
        assert!((dx - 0.4).abs() < 1e-12);
        assert!((dy - 0.1).abs() < 1e-12);
        assert!((dz - 0.5).abs() < 1e-12);
        p.apply_move();
        assert!((p.x() - 5.4).abs() < 1e-12);
        assert_eq!(p.pending_move(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_vertical_exclusivity() {
        let ds = dataset();
        let mut p = Particle::at_grid(0, 5.0, 5.0, 2.0, &ds);
        p.increment(0.0, 0.0, 0.3);
        // 独占声明覆盖已累加的垂向增量
        p.increment_with(0.0, 0.0, -1.0, false, true);
        // 独占之后的普通增量被忽略
        p.increment(0.0, 0.0, 0.5);
        let (_, _, dz) = p.pending_move();
        assert!((dz + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coordinate_sync() {
        let ds = dataset();
        let mut p = Particle::at_grid(0, 5.0, 5.0, 4.0, &ds);
        // 表层 z = nz-1 → depth 0
        assert!(p.depth().abs() < 1e-9);
        p.increment(1.0, 0.0, 0.0);
        p.apply_move();
        p.grid_to_geo(&ds);
        let (lat, lon) = ds.xy_to_latlon(6.0, 5.0);
        assert!((p.lat() - lat).abs() < 1e-12);
        assert!((p.lon() - lon).abs() < 1e-12);
    }

    #[test]
    fn test_geo_roundtrip() {
        let ds = dataset();
        let mut p = Particle::at_grid(0, 3.25, 4.5, 2.0, &ds);
        let (x0, y0, z0) = (p.x(), p.y(), p.z());
        p.grid_to_geo(&ds);
        p.geo_to_grid(&ds);
        assert!((p.x() - x0).abs() < 1e-9);
        assert!((p.y() - y0).abs() < 1e-9);
        assert!((p.z() - z0).abs() < 1e-6);
    }

    #[test]
    fn test_recruit_state_monotonic() {
        let mut rs = RecruitState::new(3);
        assert!(!rs.is_recruited(1));
        rs.mark_recruited(1);
        assert!(rs.is_recruited(1));
        assert!(rs.is_recruited_any());
        // 无清除接口：补充单调
        rs.mark_recruited(1);
        assert!(rs.is_recruited(1));
    }

    #[test]
    fn test_lock_persists() {
        let ds = dataset();
        let mut p = Particle::at_grid(0, 5.0, 5.0, 2.0, &ds);
        p.lock();
        assert!(p.is_locked());
        p.unlock();
        assert!(!p.is_locked());
    }
}
