// src/dataset/mod.rs

//! 场数据集契约
//!
//! 行为管线消费的环境场采样接口：任意网格坐标与时刻的标量采样、
//! 速度分量、域内/边缘判断、地理⇄网格与深度⇄垂向索引的坐标转换、
//! 以及快照时间推进。空间上双线性/三线性，时间上在 tp0/tp1 两个
//! 时间快照之间线性插值。

pub mod memory;
pub mod snapshot;

use crate::core::error::LdResult;

pub use memory::{MemoryDataset, MemoryDatasetBuilder, VariableRecords};
pub use snapshot::TimeBracket;

/// 连续网格坐标
///
/// x/y 为水平网格的分数索引，z 为垂向网格的分数索引
/// （0 = 海底层，nz-1 = 表层）。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridCoord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GridCoord {
    /// 创建三维网格坐标
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// 平移后的坐标
    #[inline]
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }
}

/// 场数据集接口
///
/// # 实现要求
///
/// 1. 速度分量以"网格单位/秒"表达（物理流速除以当地网格间距），
///    乘以 dt 即得网格坐标位移
/// 2. 出域采样返回 [`crate::LdError::OutOfDomain`]，与致命读取错误区分
/// 3. `update_time` 仅在步边界由控制器调用；一步之内快照只读
pub trait FieldDataset: Send + Sync {
    /// 数据集名称
    fn name(&self) -> &str;

    /// 声明必需变量；缺失是设置期致命错误
    fn require_variable(&mut self, name: &str) -> LdResult<()>;

    /// 推进快照时间窗，使 tp0.time <= time <= tp1.time
    /// （逆时针头下不等号取反）。无更多记录时返回
    /// [`crate::LdError::TimeOutOfRange`]，整个运行致命。
    fn update_time(&mut self, time: f64) -> LdResult<()>;

    /// 任意网格坐标、任意时刻的标量采样
    fn sample(&self, name: &str, point: &GridCoord, time: f64) -> LdResult<f64>;

    /// u 速度分量 [网格单位/s]
    fn get_dux(&self, point: &GridCoord, time: f64) -> LdResult<f64>;
    /// v 速度分量 [网格单位/s]
    fn get_dvy(&self, point: &GridCoord, time: f64) -> LdResult<f64>;
    /// w 速度分量 [网格单位/s]
    fn get_dwz(&self, point: &GridCoord, time: f64) -> LdResult<f64>;

    /// 网格尺寸
    fn nx(&self) -> usize;
    fn ny(&self) -> usize;
    fn nz(&self) -> usize;

    /// 是否三维数据集
    fn is_3d(&self) -> bool {
        self.nz() > 1
    }

    /// x 向网格间距 [m]
    fn dxi(&self, j: usize, i: usize) -> f64;
    /// y 向网格间距 [m]
    fn deta(&self, j: usize, i: usize) -> f64;

    /// 水深 [m]（正值；干点/陆点返回 NaN）
    fn bathy(&self, i: isize, j: isize) -> f64;

    /// 坐标是否位于计算域边缘（平流与系统移动行为据此判定出域）
    fn is_on_edge(&self, point: &GridCoord) -> bool;

    /// 整格点是否为水
    fn is_in_water(&self, i: isize, j: isize) -> bool;

    /// 连续坐标是否位于水中（最近整格点判断）
    fn is_in_water_at(&self, point: &GridCoord) -> bool {
        self.is_in_water(point.x.round() as isize, point.y.round() as isize)
    }

    /// 是否贴近岸线（相邻格点含陆地时插值模板收缩为1）
    fn is_close_to_coast(&self, point: &GridCoord) -> bool;

    /// 深度 [m, 负值向下] → 垂向分数索引
    fn depth2z(&self, x: f64, y: f64, depth: f64) -> f64;

    /// 垂向分数索引 → 深度 [m, 负值向下]
    fn z2depth(&self, x: f64, y: f64, z: f64) -> f64;

    /// 地理坐标 → 网格坐标
    fn latlon_to_xy(&self, lat: f64, lon: f64) -> (f64, f64);

    /// 网格坐标 → 地理坐标，返回 (lat, lon)
    fn xy_to_latlon(&self, x: f64, y: f64) -> (f64, f64);
}
