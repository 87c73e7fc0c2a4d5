// src/domain/zone.rs

//! 区域注册表
//!
//! 命名多边形区域（释放区/补充区），可选测深掩膜（近岸/离岸等深
//! 线带）与深度带。地理多边形在运行开始前一次性转换到网格空间，
//! 成员判定用穿越数法。运行期间区域只读。

use crate::core::error::{LdError, LdResult};
use crate::dataset::FieldDataset;
use serde::{Deserialize, Serialize};

/// 区域类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    /// 释放区
    Release,
    /// 补充区
    Recruitment,
}

/// 测深掩膜：成员资格限制在等深线带 (inshore, offshore) 之间
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BathyMask {
    /// 近岸等深线 [m]
    pub inshore_line: f64,
    /// 离岸等深线 [m]
    pub offshore_line: f64,
}

/// 深度带：成员资格限制在 [upper, lower] 深度范围（正值，向下）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DepthBand {
    /// 上界深度 [m]
    pub upper_depth: f64,
    /// 下界深度 [m]
    pub lower_depth: f64,
}

/// 多边形区域
#[derive(Debug, Clone)]
pub struct Zone {
    /// 区域名
    key: String,
    /// 区域类型
    kind: ZoneKind,
    /// 区域索引（同类型内唯一）
    index: usize,
    /// 网格空间多边形顶点（首尾闭合）
    polygon: Vec<(f64, f64)>,
    /// 可选颜色标签 (RGB)
    pub color: Option<[u8; 3]>,
    /// 可选测深掩膜
    bathy_mask: Option<BathyMask>,
    /// 可选深度带
    depth_band: Option<DepthBand>,
}

impl Zone {
    /// 以地理顶点构建区域，顶点即刻转换到网格空间并闭合
    pub fn from_geo_polygon(
        key: impl Into<String>,
        kind: ZoneKind,
        index: usize,
        vertices_latlon: &[(f64, f64)],
        dataset: &dyn FieldDataset,
    ) -> LdResult<Self> {
        if vertices_latlon.len() < 3 {
            return Err(LdError::config("区域多边形至少需要3个顶点"));
        }
        let mut polygon: Vec<(f64, f64)> = vertices_latlon
            .iter()
            .map(|&(lat, lon)| dataset.latlon_to_xy(lat, lon))
            .collect();
        let first = polygon[0];
        polygon.push(first);
        Ok(Self {
            key: key.into(),
            kind,
            index,
            polygon,
            color: None,
            bathy_mask: None,
            depth_band: None,
        })
    }

    /// 直接以网格顶点构建（测试与解析算例）
    pub fn from_grid_polygon(
        key: impl Into<String>,
        kind: ZoneKind,
        index: usize,
        vertices: &[(f64, f64)],
    ) -> LdResult<Self> {
        if vertices.len() < 3 {
            return Err(LdError::config("区域多边形至少需要3个顶点"));
        }
        let mut polygon = vertices.to_vec();
        let first = polygon[0];
        polygon.push(first);
        Ok(Self {
            key: key.into(),
            kind,
            index,
            polygon,
            color: None,
            bathy_mask: None,
            depth_band: None,
        })
    }

    /// 设置测深掩膜（建造式）
    pub fn with_bathy_mask(mut self, inshore_line: f64, offshore_line: f64) -> Self {
        self.bathy_mask = Some(BathyMask {
            inshore_line,
            offshore_line,
        });
        self
    }

    /// 设置深度带（建造式）
    pub fn with_depth_band(mut self, upper_depth: f64, lower_depth: f64) -> Self {
        self.depth_band = Some(DepthBand {
            upper_depth,
            lower_depth,
        });
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 粒子是否位于区域内
    ///
    /// 成员资格 = 多边形 ∧ 测深带 ∧ 深度带。
    pub fn contains(
        &self,
        x: f64,
        y: f64,
        depth: f64,
        dataset: &dyn FieldDataset,
    ) -> bool {
        if let Some(band) = self.depth_band {
            let d = depth.abs();
            if d < band.upper_depth || d > band.lower_depth {
                return false;
            }
        }
        if let Some(mask) = self.bathy_mask {
            let h = dataset.bathy(x.round() as isize, y.round() as isize);
            if !(h > mask.inshore_line && h < mask.offshore_line) {
                return false;
            }
        }
        self.polygon_contains(x, y)
    }

    /// 穿越数法点在多边形内判定（网格空间）
    fn polygon_contains(&self, x: f64, y: f64) -> bool {
        let mut crossings: i32 = 0;
        for k in 0..self.polygon.len() - 1 {
            let (xk, yk) = self.polygon[k];
            let (xk1, yk1) = self.polygon[k + 1];
            if xk == xk1 {
                continue;
            }
            let dx1 = x - xk;
            let dx2 = xk1 - x;
            let dxy = dx2 * (y - yk) - dx1 * (yk1 - y);
            let mut inc = 0;
            if xk == x && yk == y {
                crossings = 1;
            } else if (dx1 == 0.0 && y >= yk) || (dx2 == 0.0 && y >= yk1) {
                inc = 1;
            } else if dx1 * dx2 > 0.0 && (xk1 - xk) * dxy >= 0.0 {
                inc = 2;
            }
            if xk1 > xk {
                crossings += inc;
            } else {
                crossings -= inc;
            }
        }
        crossings != 0
    }
}

/// 区域注册表：运行开始前构建，运行期间不可变
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加区域（建造式）
    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zones.push(zone);
        self
    }

    /// 按类型过滤
    pub fn by_kind(&self, kind: ZoneKind) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(move |z| z.kind() == kind)
    }

    /// 指定类型的区域数量
    pub fn count(&self, kind: ZoneKind) -> usize {
        self.by_kind(kind).count()
    }

    /// 粒子命中的第一个指定类型区域的索引
    pub fn find_zone(
        &self,
        kind: ZoneKind,
        x: f64,
        y: f64,
        depth: f64,
        dataset: &dyn FieldDataset,
    ) -> Option<usize> {
        self.by_kind(kind)
            .find(|z| z.contains(x, y, depth, dataset))
            .map(|z| z.index())
    }
}
