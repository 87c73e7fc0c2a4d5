// src/workflow/runner.rs

//! 模拟运行控制器
//!
//! 逐步循环运行在独立的工作线程上，与任何展示线程分离；步与步
//! 严格串行。取消是协作式的：停止标志在步边界轮询，当前步内的
//! 粒子/行为执行允许跑完再停。

use crate::core::error::{LdError, LdResult};
use crate::workflow::simulation::Simulation;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// 运行结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 达到配置时长正常结束
    Completed,
    /// 响应停止请求结束
    Stopped,
}

/// 模拟运行器
pub struct SimulationRunner {
    stop_requested: Arc<AtomicBool>,
    handle: Option<JoinHandle<LdResult<(Simulation, RunOutcome)>>>,
}

impl SimulationRunner {
    /// 在工作线程上启动运行
    pub fn start(mut simulation: Simulation) -> Self {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_requested);
        let handle = std::thread::spawn(move || {
            log::info!("模拟开始");
            loop {
                // 步边界轮询停止标志
                if stop.load(Ordering::SeqCst) {
                    log::info!(
                        "响应停止请求，于第 {} 步结束",
                        simulation.time().step_index()
                    );
                    return Ok((simulation, RunOutcome::Stopped));
                }
                match simulation.step() {
                    Ok(true) => {
                        let step = simulation.time().step_index();
                        if step % 24 == 0 {
                            log::info!(
                                "第 {} 步, 进度 {:.0}%, 存活 {}",
                                step,
                                simulation.time().progress() * 100.0,
                                simulation.living_count()
                            );
                        }
                    }
                    Ok(false) => {
                        log::info!("模拟完成, 共 {} 步", simulation.time().step_index());
                        return Ok((simulation, RunOutcome::Completed));
                    }
                    Err(e) => {
                        log::error!("模拟中止: {}", e);
                        return Err(e);
                    }
                }
            }
        });
        Self {
            stop_requested,
            handle: Some(handle),
        }
    }

    /// 请求停止（协作式，当前步执行完后生效）
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// 是否已请求停止
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// 等待运行结束并取回模拟状态
    pub fn join(mut self) -> LdResult<(Simulation, RunOutcome)> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| LdError::Workflow("运行已被取回".into()))?;
        handle
            .join()
            .map_err(|_| LdError::Workflow("工作线程崩溃".into()))?
    }
}
