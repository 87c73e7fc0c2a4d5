// src/dataset/memory.rs

//! 内存场数据集
//!
//! [`FieldDataset`] 的内存实现：直线网格 + σ 垂向坐标 + 每变量的
//! 时间记录序列。测试与解析算例直接驱动它；记录步进、时间窗滑动
//! 与"时间超出覆盖范围即致命"的语义与文件驱动的数据集一致。
//!
//! 约定：
//! - 水平网格为直线网格，间距常值 [m]
//! - 垂向为 σ 坐标：k=0 在海底，k=nz-1 在海面，
//!   depth(x,y,k) = -H(x,y)·(1 - k/(nz-1))
//! - 变量存放于同位网格点（rho点），速度同位

use crate::core::constants::Z_EPS;
use crate::core::error::{LdError, LdResult};
use crate::dataset::snapshot::{Snapshot, TimeBracket};
use crate::dataset::{FieldDataset, GridCoord};
use ndarray::{Array2, Array3};
use std::collections::BTreeMap;

/// 单变量的时间记录序列
#[derive(Debug, Clone)]
pub struct VariableRecords {
    /// 记录时间 [s]（严格单调递增）
    times: Vec<f64>,
    /// 各记录场 [nz, ny, nx]（二维场 nz=1）
    records: Vec<Array3<f64>>,
    /// 当前时间窗
    bracket: TimeBracket,
}

impl VariableRecords {
    /// 创建记录序列
    pub fn new(times: Vec<f64>, records: Vec<Array3<f64>>) -> LdResult<Self> {
        LdError::check_size("variable records", times.len(), records.len())?;
        if times.len() < 2 {
            return Err(LdError::config("变量记录至少需要两个时刻"));
        }
        for w in times.windows(2) {
            if w[1] <= w[0] {
                return Err(LdError::config("记录时间必须严格单调递增"));
            }
        }
        Ok(Self {
            times,
            records,
            bracket: TimeBracket::new(),
        })
    }

    /// 数据覆盖时间范围
    fn time_range(&self) -> (f64, f64) {
        (self.times[0], *self.times.last().expect("非空"))
    }

    /// 滑动时间窗到包夹 time 的两条记录
    fn update_time(&mut self, time: f64) -> LdResult<()> {
        if !self.bracket.needs_update(time) {
            return Ok(());
        }
        let (start, end) = self.time_range();
        if time < start || time > end {
            return Err(LdError::TimeOutOfRange {
                requested: time,
                start,
                end,
            });
        }
        // 定位包夹区间 [r, r+1]
        let mut r = self.times.len() - 2;
        for i in 0..self.times.len() - 1 {
            if self.times[i] <= time && time <= self.times[i + 1] {
                r = i;
                break;
            }
        }
        self.bracket = TimeBracket::new();
        self.bracket
            .push(Snapshot::new(self.times[r], self.records[r].clone()));
        self.bracket
            .push(Snapshot::new(self.times[r + 1], self.records[r + 1].clone()));
        log::debug!(
            "记录窗滑动至 [{:.0}s, {:.0}s]",
            self.times[r],
            self.times[r + 1]
        );
        Ok(())
    }

    /// 该变量的垂向层数
    fn nz(&self) -> usize {
        self.records[0].dim().0
    }
}

/// 内存场数据集
pub struct MemoryDataset {
    name: String,
    nx: usize,
    ny: usize,
    nz: usize,
    /// 水平间距 [m]
    dx_m: f64,
    dy_m: f64,
    /// 地理锚点与步进 [度]
    lon0: f64,
    lat0: f64,
    dlon: f64,
    dlat: f64,
    /// 水陆掩膜 [ny, nx]（true=水）
    mask: Array2<bool>,
    /// 水深 [ny, nx]，正值 [m]
    bathy: Array2<f64>,
    /// 变量表
    variables: BTreeMap<String, VariableRecords>,
    /// 速度变量名
    u_name: String,
    v_name: String,
    w_name: Option<String>,
}

impl MemoryDataset {
    /// 建造器
    pub fn builder(nx: usize, ny: usize, nz: usize) -> MemoryDatasetBuilder {
        MemoryDatasetBuilder::new(nx, ny, nz)
    }

    /// 限制后的垂向索引
    #[inline]
    fn clamp_z(&self, z: f64) -> f64 {
        z.max(0.0).min(self.nz as f64 - 1.0 - Z_EPS)
    }

    /// 水平索引是否可作插值模板原点（i..i+1, j..j+1 全在界内）
    fn check_stencil(&self, i: isize, j: isize, n: usize) -> LdResult<()> {
        let hi = (n - 1) as isize;
        if i < 0 || j < 0 || i + hi > self.nx as isize - 1 || j + hi > self.ny as isize - 1 {
            return Err(LdError::out_of_domain(i as f64, j as f64));
        }
        Ok(())
    }

    /// 双线性水深插值 [m, 正值]
    fn bathy_at(&self, x: f64, y: f64) -> f64 {
        let i = (x.floor() as isize).clamp(0, self.nx as isize - 2) as usize;
        let j = (y.floor() as isize).clamp(0, self.ny as isize - 2) as usize;
        let dx = (x - i as f64).clamp(0.0, 1.0);
        let dy = (y - j as f64).clamp(0.0, 1.0);
        let mut hh = 0.0;
        let mut co_sum = 0.0;
        for ii in 0..2usize {
            for jj in 0..2usize {
                if self.mask[[j + jj, i + ii]] {
                    let co = ((1.0 - ii as f64 - dx) * (1.0 - jj as f64 - dy)).abs();
                    co_sum += co;
                    hh += co * self.bathy[[j + jj, i + ii]];
                }
            }
        }
        if co_sum > 0.0 {
            hh / co_sum
        } else {
            f64::NAN
        }
    }

    /// 指定变量、指定时刻的时空插值
    fn interpolate(
        &self,
        records: &VariableRecords,
        point: &GridCoord,
        time: f64,
    ) -> LdResult<f64> {
        if point.x < 0.0
            || point.x > self.nx as f64 - 1.0
            || point.y < 0.0
            || point.y > self.ny as f64 - 1.0
        {
            return Err(LdError::out_of_domain(point.x, point.y));
        }
        // 贴岸时模板收缩为最近格点
        let n = if self.is_close_to_coast(point) { 1 } else { 2 };
        let (i, j) = if n == 1 {
            (point.x.round() as isize, point.y.round() as isize)
        } else {
            // 原点夹紧到 nx-2/ny-2：x = nx-1 时以 dx = 1 落在末列
            (
                (point.x.floor() as isize).min(self.nx as isize - 2),
                (point.y.floor() as isize).min(self.ny as isize - 2),
            )
        };
        self.check_stencil(i, j, n)?;
        let dx = point.x - i as f64;
        let dy = point.y - j as f64;

        let var_nz = records.nz();
        let (k, dz, kn) = if var_nz == 1 {
            (0usize, 0.0, 1usize)
        } else {
            let kz = self.clamp_z(point.z).min(var_nz as f64 - 1.0 - Z_EPS);
            (kz.floor() as usize, kz - kz.floor(), 2usize)
        };

        let mut value = 0.0;
        let mut co_sum = 0.0;
        for ii in 0..n {
            for jj in 0..n {
                let (gi, gj) = ((i + ii as isize) as usize, (j + jj as isize) as usize);
                if !self.mask[[gj, gi]] {
                    continue;
                }
                for kk in 0..kn {
                    let co = ((1.0 - ii as f64 - dx)
                        * (1.0 - jj as f64 - dy)
                        * (1.0 - kk as f64 - dz))
                        .abs();
                    co_sum += co;
                    value += co * records.bracket.at(k + kk, gj, gi, time)?;
                }
            }
        }
        if co_sum > 0.0 {
            value /= co_sum;
        }
        Ok(value)
    }

    /// 当地垂向格距 [m]
    fn cell_height(&self, x: f64, y: f64, z: f64) -> f64 {
        if self.nz == 1 {
            return 1.0;
        }
        let k = self.clamp_z(z);
        let upper = self.z2depth(x, y, (k + 0.5).min(self.nz as f64 - 1.0));
        let lower = self.z2depth(x, y, (k - 0.5).max(0.0));
        (upper - lower).abs().max(1e-6)
    }
}

impl FieldDataset for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn require_variable(&mut self, name: &str) -> LdResult<()> {
        if self.variables.contains_key(name) {
            Ok(())
        } else {
            Err(LdError::missing_variable(name))
        }
    }

    fn update_time(&mut self, time: f64) -> LdResult<()> {
        for records in self.variables.values_mut() {
            records.update_time(time)?;
        }
        Ok(())
    }

    fn sample(&self, name: &str, point: &GridCoord, time: f64) -> LdResult<f64> {
        let records = self
            .variables
            .get(name)
            .ok_or_else(|| LdError::missing_variable(name))?;
        self.interpolate(records, point, time)
    }

    fn get_dux(&self, point: &GridCoord, time: f64) -> LdResult<f64> {
        let u = self.sample(&self.u_name, point, time)?;
        Ok(u / self.dx_m)
    }

    fn get_dvy(&self, point: &GridCoord, time: f64) -> LdResult<f64> {
        let v = self.sample(&self.v_name, point, time)?;
        Ok(v / self.dy_m)
    }

    fn get_dwz(&self, point: &GridCoord, time: f64) -> LdResult<f64> {
        match &self.w_name {
            None => Ok(0.0),
            Some(w_name) => {
                let w = self.sample(w_name, point, time)?;
                Ok(w / self.cell_height(point.x, point.y, point.z))
            }
        }
    }

    fn nx(&self) -> usize {
        self.nx
    }

    fn ny(&self) -> usize {
        self.ny
    }

    fn nz(&self) -> usize {
        self.nz
    }

    fn dxi(&self, _j: usize, _i: usize) -> f64 {
        self.dx_m
    }

    fn deta(&self, _j: usize, _i: usize) -> f64 {
        self.dy_m
    }

    fn bathy(&self, i: isize, j: isize) -> f64 {
        if self.is_in_water(i, j) {
            self.bathy[[j as usize, i as usize]]
        } else {
            f64::NAN
        }
    }

    fn is_on_edge(&self, point: &GridCoord) -> bool {
        point.x > self.nx as f64 - 2.0
            || point.x < 1.0
            || point.y > self.ny as f64 - 2.0
            || point.y < 1.0
    }

    fn is_in_water(&self, i: isize, j: isize) -> bool {
        if i < 0 || j < 0 || i >= self.nx as isize || j >= self.ny as isize {
            return false;
        }
        self.mask[[j as usize, i as usize]]
    }

    fn is_close_to_coast(&self, point: &GridCoord) -> bool {
        let i = point.x.round() as isize;
        let j = point.y.round() as isize;
        let ii = if i - point.x.floor() as isize == 0 { 1 } else { -1 };
        let jj = if j - point.y.floor() as isize == 0 { 1 } else { -1 };
        !(self.is_in_water(i + ii, j)
            && self.is_in_water(i + ii, j + jj)
            && self.is_in_water(i, j + jj))
    }

    fn depth2z(&self, x: f64, y: f64, depth: f64) -> f64 {
        if self.nz == 1 {
            return 0.0;
        }
        let h = self.bathy_at(x, y);
        if !h.is_finite() || h <= 0.0 {
            return 0.0;
        }
        // σ 坐标反演：depth = -H·(1 - k/(nz-1))
        let z = (1.0 + depth / h) * (self.nz as f64 - 1.0);
        self.clamp_z(z)
    }

    fn z2depth(&self, x: f64, y: f64, z: f64) -> f64 {
        if self.nz == 1 {
            return 0.0;
        }
        let h = self.bathy_at(x, y);
        if !h.is_finite() || h <= 0.0 {
            return 0.0;
        }
        let kz = z.max(0.0).min(self.nz as f64 - 1.0);
        -h * (1.0 - kz / (self.nz as f64 - 1.0))
    }

    fn latlon_to_xy(&self, lat: f64, lon: f64) -> (f64, f64) {
        ((lon - self.lon0) / self.dlon, (lat - self.lat0) / self.dlat)
    }

    fn xy_to_latlon(&self, x: f64, y: f64) -> (f64, f64) {
        (self.lat0 + y * self.dlat, self.lon0 + x * self.dlon)
    }
}

// ============================================================
// 建造器
// ============================================================

/// [`MemoryDataset`] 建造器
pub struct MemoryDatasetBuilder {
    name: String,
    nx: usize,
    ny: usize,
    nz: usize,
    dx_m: f64,
    dy_m: f64,
    lon0: f64,
    lat0: f64,
    dlon: f64,
    dlat: f64,
    mask: Array2<bool>,
    bathy: Array2<f64>,
    variables: BTreeMap<String, VariableRecords>,
    u_name: String,
    v_name: String,
    w_name: Option<String>,
}

impl MemoryDatasetBuilder {
    /// 全水域、千米级间距、百米水深的默认几何
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        assert!(nx >= 4 && ny >= 4, "网格至少 4x4");
        assert!(nz >= 1, "至少一层");
        Self {
            name: "memory".into(),
            nx,
            ny,
            nz,
            dx_m: 1000.0,
            dy_m: 1000.0,
            lon0: 0.0,
            lat0: 0.0,
            dlon: 0.01,
            dlat: 0.01,
            mask: Array2::from_elem((ny, nx), true),
            bathy: Array2::from_elem((ny, nx), 100.0),
            variables: BTreeMap::new(),
            u_name: "u".into(),
            v_name: "v".into(),
            w_name: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 水平间距 [m]
    pub fn spacing(mut self, dx_m: f64, dy_m: f64) -> Self {
        self.dx_m = dx_m;
        self.dy_m = dy_m;
        self
    }

    /// 地理锚点与经纬步进 [度]
    pub fn geography(mut self, lon0: f64, lat0: f64, dlon: f64, dlat: f64) -> Self {
        self.lon0 = lon0;
        self.lat0 = lat0;
        self.dlon = dlon;
        self.dlat = dlat;
        self
    }

    /// 统一水深 [m]
    pub fn uniform_bathy(mut self, depth: f64) -> Self {
        self.bathy.fill(depth);
        self
    }

    /// 指定格点设为陆地
    pub fn land(mut self, cells: &[(usize, usize)]) -> Self {
        for &(i, j) in cells {
            self.mask[[j, i]] = false;
        }
        self
    }

    /// 速度变量名（w 传 None 表示无垂向速度场）
    pub fn velocity_names(
        mut self,
        u: impl Into<String>,
        v: impl Into<String>,
        w: Option<String>,
    ) -> Self {
        self.u_name = u.into();
        self.v_name = v.into();
        self.w_name = w;
        self
    }

    /// 添加完整记录序列变量
    pub fn variable(
        mut self,
        name: impl Into<String>,
        times: Vec<f64>,
        records: Vec<Array3<f64>>,
    ) -> LdResult<Self> {
        self.variables
            .insert(name.into(), VariableRecords::new(times, records)?);
        Ok(self)
    }

    /// 添加时空常值变量，覆盖 [t_start, t_end]
    pub fn constant_variable(
        self,
        name: impl Into<String>,
        value: f64,
        t_start: f64,
        t_end: f64,
    ) -> LdResult<Self> {
        let nz = self.nz;
        let shape = (nz, self.ny, self.nx);
        self.variable(
            name,
            vec![t_start, t_end],
            vec![Array3::from_elem(shape, value), Array3::from_elem(shape, value)],
        )
    }

    /// 添加垂向剖面变量（每层常值），覆盖 [t_start, t_end]
    pub fn profile_variable(
        self,
        name: impl Into<String>,
        profile: &[f64],
        t_start: f64,
        t_end: f64,
    ) -> LdResult<Self> {
        if profile.len() != self.nz {
            return Err(LdError::size_mismatch("profile", self.nz, profile.len()));
        }
        let (ny, nx) = (self.ny, self.nx);
        let mut field = Array3::zeros((profile.len(), ny, nx));
        for (k, &v) in profile.iter().enumerate() {
            field.slice_mut(ndarray::s![k, .., ..]).fill(v);
        }
        self.variable(name, vec![t_start, t_end], vec![field.clone(), field])
    }

    /// 构建数据集并把时间窗预装载到 t_start
    pub fn build(self) -> MemoryDataset {
        MemoryDataset {
            name: self.name,
            nx: self.nx,
            ny: self.ny,
            nz: self.nz,
            dx_m: self.dx_m,
            dy_m: self.dy_m,
            lon0: self.lon0,
            lat0: self.lat0,
            dlon: self.dlon,
            dlat: self.dlat,
            mask: self.mask,
            bathy: self.bathy,
            variables: self.variables,
            u_name: self.u_name,
            v_name: self.v_name,
            w_name: self.w_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_dataset(u: f64) -> MemoryDataset {
        MemoryDataset::builder(10, 10, 5)
            .spacing(1000.0, 1000.0)
            .constant_variable("u", u, 0.0, 1e6)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1e6)
            .unwrap()
            .constant_variable("temp", 15.0, 0.0, 1e6)
            .unwrap()
            .build()
    }

    #[test]
    fn test_require_variable() {
        let mut ds = uniform_dataset(0.1);
        assert!(ds.require_variable("temp").is_ok());
        assert!(matches!(
            ds.require_variable("salinity"),
            Err(LdError::MissingVariable { .. })
        ));
    }

    #[test]
    fn test_sample_constant_field() {
        let mut ds = uniform_dataset(0.1);
        ds.update_time(100.0).unwrap();
        let p = GridCoord::new(4.3, 5.7, 2.2);
        let v = ds.sample("temp", &p, 100.0).unwrap();
        assert!((v - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_in_grid_units() {
        let mut ds = uniform_dataset(0.1);
        ds.update_time(0.0).unwrap();
        let p = GridCoord::new(5.0, 5.0, 2.0);
        // 0.1 m/s / 1000 m = 1e-4 格/s
        let dux = ds.get_dux(&p, 0.0).unwrap();
        assert!((dux - 1e-4).abs() < 1e-12);
        assert!(ds.get_dwz(&p, 0.0).unwrap().abs() < 1e-15);
    }

    #[test]
    fn test_time_interpolation_between_records() {
        let shape = (1, 4, 4);
        let mut ds = MemoryDataset::builder(4, 4, 1)
            .variable(
                "u",
                vec![0.0, 100.0],
                vec![Array3::from_elem(shape, 1.0), Array3::from_elem(shape, 3.0)],
            )
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 100.0)
            .unwrap()
            .build();
        ds.update_time(50.0).unwrap();
        let v = ds
            .sample("u", &GridCoord::new(1.5, 1.5, 0.0), 50.0)
            .unwrap();
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_out_of_range_is_fatal() {
        let mut ds = uniform_dataset(0.1);
        let err = ds.update_time(2e6).unwrap_err();
        assert!(matches!(err, LdError::TimeOutOfRange { .. }));
    }

    #[test]
    fn test_edge_detection() {
        let ds = uniform_dataset(0.0);
        assert!(ds.is_on_edge(&GridCoord::new(0.5, 5.0, 0.0)));
        assert!(ds.is_on_edge(&GridCoord::new(8.5, 5.0, 0.0)));
        assert!(!ds.is_on_edge(&GridCoord::new(5.0, 5.0, 0.0)));
    }

    #[test]
    fn test_depth_z_inverse() {
        let ds = uniform_dataset(0.0);
        for &z in &[0.0, 0.7, 2.0, 3.9] {
            let depth = ds.z2depth(5.0, 5.0, z);
            let back = ds.depth2z(5.0, 5.0, depth);
            assert!((back - z).abs() < 1e-6, "z={} back={}", z, back);
        }
    }

    #[test]
    fn test_sigma_monotone() {
        let ds = uniform_dataset(0.0);
        // 海底层最深，表层为0
        assert!(ds.z2depth(5.0, 5.0, 0.0) < ds.z2depth(5.0, 5.0, 4.0));
        assert!((ds.z2depth(5.0, 5.0, 4.0)).abs() < 1e-9);
        assert!((ds.z2depth(5.0, 5.0, 0.0) + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_land_mask_and_coast() {
        let ds = MemoryDataset::builder(8, 8, 1)
            .constant_variable("u", 0.0, 0.0, 1.0)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1.0)
            .unwrap()
            .land(&[(4, 4)])
            .build();
        assert!(!ds.is_in_water(4, 4));
        assert!(ds.is_in_water(3, 4));
        assert!(ds.is_close_to_coast(&GridCoord::new(3.4, 3.4, 0.0)));
        assert!(!ds.is_close_to_coast(&GridCoord::new(1.5, 1.5, 0.0)));
    }

    #[test]
    fn test_latlon_roundtrip() {
        let ds = uniform_dataset(0.0);
        let (x, y) = ds.latlon_to_xy(0.05, 0.03);
        let (lat, lon) = ds.xy_to_latlon(x, y);
        assert!((lat - 0.05).abs() < 1e-12);
        assert!((lon - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_domain_sample() {
        let mut ds = uniform_dataset(0.1);
        ds.update_time(0.0).unwrap();
        let err = ds
            .sample("u", &GridCoord::new(-3.0, 5.0, 0.0), 0.0)
            .unwrap_err();
        assert!(err.is_out_of_domain());
    }
}
