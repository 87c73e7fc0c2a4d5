// src/io/tracker.rs

//! 输出跟踪契约
//!
//! 每个记录步调用一次 [`Tracker::record`]，跟踪器通过粒子的只读
//! 访问方法拉取它关心的字段。具体的文件写出（NetCDF等）是外部
//! 协作者；核心只提供内存记录实现供测试与解析算例使用。

use crate::domain::particle::{MortalityCause, Particle};

/// 输出跟踪器
pub trait Tracker: Send {
    /// 跟踪器名
    fn name(&self) -> &str;

    /// 记录一个时间步
    fn record(&mut self, step: u64, time: f64, particles: &[Particle]);
}

/// 单粒子快照记录
#[derive(Debug, Clone)]
pub struct ParticleRecord {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub lon: f64,
    pub lat: f64,
    pub depth: f64,
    pub age: f64,
    pub mortality: MortalityCause,
    /// 体长 [mm]（生长行为启用时）
    pub length: Option<f64>,
    /// 是否已在任一区域完成补充
    pub recruited: bool,
}

impl ParticleRecord {
    /// 从粒子拉取快照
    pub fn pull(particle: &Particle) -> Self {
        Self {
            index: particle.index(),
            x: particle.x(),
            y: particle.y(),
            z: particle.z(),
            lon: particle.lon(),
            lat: particle.lat(),
            depth: particle.depth(),
            age: particle.age(),
            mortality: particle.mortality(),
            length: particle.length_state.map(|s| s.length),
            recruited: particle
                .recruit_state
                .as_ref()
                .map(|s| s.is_recruited_any())
                .unwrap_or(false),
        }
    }
}

/// 内存跟踪器：完整保留每个记录步的粒子快照
#[derive(Debug, Default)]
pub struct MemoryTracker {
    records: Vec<(u64, f64, Vec<ParticleRecord>)>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的步数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 全部记录
    pub fn records(&self) -> &[(u64, f64, Vec<ParticleRecord>)] {
        &self.records
    }

    /// 最后一个记录步
    pub fn last(&self) -> Option<&(u64, f64, Vec<ParticleRecord>)> {
        self.records.last()
    }
}

impl Tracker for MemoryTracker {
    fn name(&self) -> &str {
        "memory"
    }

    fn record(&mut self, step: u64, time: f64, particles: &[Particle]) {
        let snapshot = particles.iter().map(ParticleRecord::pull).collect();
        self.records.push((step, time, snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;

    #[test]
    fn test_memory_tracker_records() {
        let ds = MemoryDataset::builder(8, 8, 3)
            .constant_variable("u", 0.0, 0.0, 1.0)
            .unwrap()
            .constant_variable("v", 0.0, 0.0, 1.0)
            .unwrap()
            .build();
        let particles = vec![
            Particle::at_grid(0, 4.0, 4.0, 1.0, &ds),
            Particle::at_grid(1, 5.0, 5.0, 1.0, &ds),
        ];
        let mut tracker = MemoryTracker::new();
        tracker.record(1, 3600.0, &particles);
        assert_eq!(tracker.len(), 1);
        let (step, time, records) = tracker.last().unwrap();
        assert_eq!(*step, 1);
        assert!((*time - 3600.0).abs() < 1e-12);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].index, 1);
        assert_eq!(records[0].mortality, MortalityCause::Alive);
        assert!(records[0].length.is_none());
    }
}
