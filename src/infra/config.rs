// src/infra/config.rs

//! 模拟配置
//!
//! 每个行为从以名字作用域化的"平面键→字符串"参数块读取自身参数，
//! 数值/布尔/时长的解析由访问方法完成。缺失或非法的参数一律在
//! 设置期以错误返回，绝不推迟到逐步执行期。

use crate::core::constants::{ONE_DAY, ONE_HOUR, ONE_MINUTE};
use crate::core::error::{LdError, LdResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

/// 单个参数块：块名 + 平面键值表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterBlock {
    /// 块名（例如 "action.advection"）
    pub name: String,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 键值表
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl ParameterBlock {
    /// 创建空块
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            parameters: BTreeMap::new(),
        }
    }

    /// 写入一个参数（建造式）
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 参数是否为空值
    ///
    /// 不存在、空串或字面量 "null" 均视为空。
    pub fn is_null(&self, key: &str) -> bool {
        match self.parameters.get(key) {
            None => true,
            Some(v) => {
                let v = v.trim();
                v.is_empty() || v.eq_ignore_ascii_case("null")
            }
        }
    }

    /// 原始字符串参数
    pub fn get_str(&self, key: &str) -> LdResult<&str> {
        self.parameters
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| LdError::missing_parameter(&self.name, key))
    }

    /// 可选字符串参数
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        if self.is_null(key) {
            None
        } else {
            self.parameters.get(key).map(|s| s.as_str())
        }
    }

    /// f64 参数
    pub fn get_f64(&self, key: &str) -> LdResult<f64> {
        let raw = self.get_str(key)?;
        raw.trim().parse::<f64>().map_err(|e| {
            LdError::invalid_parameter(&self.name, key, raw, format!("不是数值: {}", e))
        })
    }

    /// f64 参数，缺失时取默认值（非法值仍是错误）
    pub fn get_f64_or(&self, key: &str, default: f64) -> LdResult<f64> {
        if self.is_null(key) {
            Ok(default)
        } else {
            self.get_f64(key)
        }
    }

    /// bool 参数
    pub fn get_bool(&self, key: &str) -> LdResult<bool> {
        let raw = self.get_str(key)?;
        raw.trim().parse::<bool>().map_err(|e| {
            LdError::invalid_parameter(&self.name, key, raw, format!("不是布尔值: {}", e))
        })
    }

    /// bool 参数，缺失时取默认值
    pub fn get_bool_or(&self, key: &str, default: bool) -> LdResult<bool> {
        if self.is_null(key) {
            Ok(default)
        } else {
            self.get_bool(key)
        }
    }

    /// 时长参数 [s]
    ///
    /// 接受 "1234.5"（秒）或 "NdNhNm" 组合（如 "2d12h"、"90m"）。
    pub fn get_duration(&self, key: &str) -> LdResult<f64> {
        let raw = self.get_str(key)?;
        parse_duration(raw).map_err(|reason| {
            LdError::invalid_parameter(&self.name, key, raw, reason)
        })
    }
}

/// 解析时长字符串为秒
fn parse_duration(raw: &str) -> Result<f64, String> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<f64>() {
        return if v >= 0.0 {
            Ok(v)
        } else {
            Err("时长不能为负".into())
        };
    }
    let mut total = 0.0;
    let mut number = String::new();
    let mut matched = false;
    for c in s.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let unit = match c {
            'd' => ONE_DAY,
            'h' => ONE_HOUR,
            'm' => ONE_MINUTE,
            's' => 1.0,
            _ => return Err(format!("未知时长单位: '{}'", c)),
        };
        let v: f64 = number
            .parse()
            .map_err(|_| format!("时长数值非法: '{}'", number))?;
        total += v * unit;
        number.clear();
        matched = true;
    }
    if !number.is_empty() || !matched {
        return Err("时长格式应为秒数或 NdNhNmNs 组合".into());
    }
    Ok(total)
}

/// 整份模拟配置：块集合
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// 所有参数块
    pub blocks: Vec<ParameterBlock>,
}

impl SimulationConfig {
    /// 从JSON文件加载
    pub fn from_file(path: impl AsRef<Path>) -> LdResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LdError::file_not_found(path));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// 按名取块（启用与否不论）
    pub fn block(&self, name: &str) -> Option<&ParameterBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// 按名取块，缺失即设置错误
    pub fn require_block(&self, name: &str) -> LdResult<&ParameterBlock> {
        self.block(name)
            .ok_or_else(|| LdError::config(format!("缺少参数块: {}", name)))
    }

    /// 块是否启用
    pub fn is_enabled(&self, name: &str) -> bool {
        self.block(name).map(|b| b.enabled).unwrap_or(false)
    }

    /// 添加块（建造式）
    pub fn with_block(mut self, block: ParameterBlock) -> Self {
        self.blocks.push(block);
        self
    }
}

// ============================================================
// 年龄索引查找表（分号分隔文本，首行表头）
// ============================================================

/// 年龄→数值查找表
///
/// 行为的外部表格（年龄→卵密度、年龄→致死温度、年龄→栖息深度）
/// 均为"分号分隔、首行表头"的小表。查找为分段常值：命中
/// `[age[i], age[i+1])` 取第 i 行，超出末行取末行值。
#[derive(Debug, Clone)]
pub struct AgeTable {
    /// 年龄阈值 [s]（单调递增）
    ages: Vec<f64>,
    /// 各年龄段的值（可多列）
    values: Vec<Vec<f64>>,
}

impl AgeTable {
    /// 从内存数据创建
    pub fn new(ages: Vec<f64>, values: Vec<Vec<f64>>) -> LdResult<Self> {
        LdError::check_size("age table", ages.len(), values.len())?;
        if ages.is_empty() {
            return Err(LdError::config("年龄表为空"));
        }
        for w in ages.windows(2) {
            if w[1] <= w[0] {
                return Err(LdError::config("年龄表阈值必须单调递增"));
            }
        }
        Ok(Self { ages, values })
    }

    /// 从分号分隔文件加载
    ///
    /// `age_scale` 把首列转换成秒（小时表传 3600，天表传 86400）。
    pub fn from_file(path: impl AsRef<Path>, age_scale: f64) -> LdResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LdError::file_not_found(path));
        }
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut ages = Vec::new();
        let mut values = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if lineno == 0 || trimmed.is_empty() {
                // 首行表头
                continue;
            }
            let fields: Vec<&str> = trimmed.split(';').map(|f| f.trim()).collect();
            if fields.len() < 2 {
                return Err(LdError::parse(path, lineno + 1, "至少需要两列"));
            }
            let age: f64 = fields[0]
                .parse()
                .map_err(|e| LdError::parse(path, lineno + 1, format!("年龄列非法: {}", e)))?;
            let mut row = Vec::with_capacity(fields.len() - 1);
            for f in &fields[1..] {
                let v: f64 = f
                    .parse()
                    .map_err(|e| LdError::parse(path, lineno + 1, format!("数值列非法: {}", e)))?;
                row.push(v);
            }
            ages.push(age * age_scale);
            values.push(row);
        }
        Self::new(ages, values)
    }

    /// 按年龄查找（第一列值）
    pub fn lookup(&self, age_seconds: f64) -> f64 {
        self.lookup_row(age_seconds)[0]
    }

    /// 按年龄查找整行
    pub fn lookup_row(&self, age_seconds: f64) -> &[f64] {
        let mut idx = self.ages.len() - 1;
        for i in 0..self.ages.len() - 1 {
            if self.ages[i] <= age_seconds && age_seconds < self.ages[i + 1] {
                idx = i;
                break;
            }
        }
        &self.values[idx]
    }

    /// 表行数
    pub fn len(&self) -> usize {
        self.ages.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_typed_accessors() {
        let block = ParameterBlock::new("action.test")
            .with("epsilon", "1e-9")
            .with("enabled_flag", "true")
            .with("note", "null");

        assert!((block.get_f64("epsilon").unwrap() - 1e-9).abs() < 1e-24);
        assert!(block.get_bool("enabled_flag").unwrap());
        assert!(block.is_null("note"));
        assert!(block.is_null("missing"));
        assert!(block.get_f64("missing").is_err());
    }

    #[test]
    fn test_invalid_value_is_setup_error() {
        let block = ParameterBlock::new("action.test").with("coeff1", "abc");
        let err = block.get_f64("coeff1").unwrap_err();
        assert!(matches!(err, LdError::InvalidParameter { .. }));
    }

    #[test]
    fn test_duration_parsing() {
        let block = ParameterBlock::new("app.time")
            .with("plain", "7200")
            .with("composite", "2d12h")
            .with("minutes", "90m");
        assert!((block.get_duration("plain").unwrap() - 7200.0).abs() < 1e-9);
        assert!((block.get_duration("composite").unwrap() - 2.5 * 86400.0).abs() < 1e-9);
        assert!((block.get_duration("minutes").unwrap() - 5400.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_lookup() {
        let config = SimulationConfig::default()
            .with_block(ParameterBlock::new("action.advection").with("scheme", "rk4"));
        assert!(config.is_enabled("action.advection"));
        assert!(!config.is_enabled("action.growth"));
        assert!(config.require_block("action.growth").is_err());
    }

    #[test]
    fn test_age_table_lookup() {
        let table = AgeTable::new(
            vec![0.0, 3600.0, 7200.0],
            vec![vec![1.025], vec![1.026], vec![1.027]],
        )
        .unwrap();
        assert!((table.lookup(0.0) - 1.025).abs() < 1e-12);
        assert!((table.lookup(3599.0) - 1.025).abs() < 1e-12);
        assert!((table.lookup(3600.0) - 1.026).abs() < 1e-12);
        // 超出末行取末行
        assert!((table.lookup(1e9) - 1.027).abs() < 1e-12);
    }

    #[test]
    fn test_age_table_monotonic() {
        assert!(AgeTable::new(vec![0.0, 0.0], vec![vec![1.0], vec![2.0]]).is_err());
    }
}
