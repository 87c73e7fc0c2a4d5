// src/infra/time.rs

//! 模拟时间管理
//!
//! 当前时间 = chrono 起始时刻 + 已演化秒数。步长带符号：负值表示
//! 逆时（backward）模拟。时间箭头在整个运行期间固定不变。

use crate::core::error::{LdError, LdResult};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 时间方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeArrow {
    /// 正向模拟
    #[default]
    Forward,
    /// 逆向模拟
    Backward,
}

impl TimeArrow {
    /// 方向符号：正向 +1，逆向 -1
    #[inline]
    pub fn signum(self) -> f64 {
        match self {
            Self::Forward => 1.0,
            Self::Backward => -1.0,
        }
    }
}

/// 模拟时间管理器
///
/// 持有当前时间、带符号步长、输运总时长与单调递增的步计数。
/// 当累计时间达到配置时长时运行终止。
#[derive(Debug, Clone)]
pub struct TimeManager {
    /// 起始时刻（UTC锚点，用于昼夜判断与输出时间戳）
    origin: DateTime<Utc>,
    /// 起始时间 [s]（自起始时刻，恒为0，保留字段便于续算）
    t0: f64,
    /// 当前时间 [s]
    time: f64,
    /// 带符号步长 [s]
    dt: f64,
    /// 输运总时长 [s]（非负）
    transport_duration: f64,
    /// 步索引
    i_step: u64,
}

impl TimeManager {
    /// 创建时间管理器
    ///
    /// `dt_seconds` 为步长绝对值，方向由 `arrow` 给出；
    /// 步长与时长必须为正。
    pub fn new(
        origin_iso: &str,
        dt_seconds: f64,
        arrow: TimeArrow,
        transport_duration: f64,
    ) -> LdResult<Self> {
        let origin = DateTime::parse_from_rfc3339(origin_iso)
            .map_err(|e| LdError::config(format!("起始时间格式错误: {}", e)))?
            .with_timezone(&Utc);
        if dt_seconds <= 0.0 {
            return Err(LdError::config(format!("步长必须为正: {}", dt_seconds)));
        }
        if transport_duration <= 0.0 {
            return Err(LdError::config(format!(
                "输运时长必须为正: {}",
                transport_duration
            )));
        }
        Ok(Self {
            origin,
            t0: 0.0,
            time: 0.0,
            dt: dt_seconds * arrow.signum(),
            transport_duration,
            i_step: 0,
        })
    }

    /// 当前时间 [s]
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// 带符号步长 [s]
    #[inline]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// 步长绝对值 [s]（所有"时钟"类累加使用）
    #[inline]
    pub fn dt_abs(&self) -> f64 {
        self.dt.abs()
    }

    /// 时间方向
    #[inline]
    pub fn arrow(&self) -> TimeArrow {
        if self.dt >= 0.0 {
            TimeArrow::Forward
        } else {
            TimeArrow::Backward
        }
    }

    /// 输运总时长 [s]
    #[inline]
    pub fn transport_duration(&self) -> f64 {
        self.transport_duration
    }

    /// 步索引
    #[inline]
    pub fn step_index(&self) -> u64 {
        self.i_step
    }

    /// 推进一步并判断模拟是否继续
    ///
    /// 返回 `true` 表示推进后的时间仍在配置时长以内；
    /// 返回 `false` 表示运行结束（时间不再推进）。
    pub fn has_next_step(&mut self) -> bool {
        if (self.time + self.dt - self.t0).abs() > self.transport_duration {
            return false;
        }
        self.time += self.dt;
        self.i_step += 1;
        true
    }

    /// 当前UTC时刻
    pub fn current_utc(&self) -> DateTime<Utc> {
        self.origin + chrono::Duration::milliseconds((self.time * 1000.0) as i64)
    }

    /// 当前钟面时间（昼夜垂直迁移判断使用）
    pub fn current_time_of_day(&self) -> NaiveTime {
        self.current_utc().time()
    }

    /// 已演化比例 [0, 1]
    pub fn progress(&self) -> f64 {
        ((self.time - self.t0).abs() / self.transport_duration).min(1.0)
    }
}

/// 解析 "HH:MM" 钟面时刻（日出/日落参数）
pub fn parse_time_of_day(value: &str) -> LdResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| LdError::config(format!("时刻格式错误 '{}': {}", value, e)))
}
