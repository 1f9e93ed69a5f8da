// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 工作线程状态 (控制面只读原子量)

use crate::counting::Phase;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// 运行代数 + 阶段 + 人数 + 运行标记
///
/// 每次启动分配新的代数; 非当前代数的写入一律忽略,
/// 被放弃的旧工作线程因此无法影响新一轮运行.
#[derive(Debug)]
pub struct EngineStatus {
    generation: AtomicU64,
    phase: AtomicU8,
    count: AtomicU32,
    running: AtomicBool,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            generation: AtomicU64::new(0),
            phase: AtomicU8::new(Phase::Stopped.as_u8()),
            count: AtomicU32::new(0),
            running: AtomicBool::new(false),
        }
    }
}

impl EngineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新一轮: 人数归零, 进入 Setup, 返回本轮代数
    pub fn begin_run(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.count.store(0, Ordering::Release);
        self.phase.store(Phase::Setup.as_u8(), Ordering::Release);
        self.running.store(true, Ordering::Release);
        generation
    }

    /// Setup → Counting; 其他阶段返回 `false`
    pub fn begin_counting(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self
                .phase
                .compare_exchange(
                    Phase::Setup.as_u8(),
                    Phase::Counting.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }

    /// 发布人数 (仅当前代数生效)
    pub fn publish_count(&self, generation: u64, count: u32) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.count.store(count, Ordering::Release);
        true
    }

    /// 工作线程正常结束
    pub fn finish_run(&self, generation: u64) {
        if self
            .generation
            .compare_exchange(generation, generation, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.running.store(false, Ordering::Release);
            self.phase.store(Phase::Stopped.as_u8(), Ordering::Release);
        }
    }

    /// 放弃指定代数的工作线程 (停止超时): 代数前移, 旧线程的后续写入失效
    ///
    /// 该代数已不是当前代数时什么也不做
    pub fn abandon(&self, generation: u64) -> bool {
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.running.store(false, Ordering::Release);
        self.phase.store(Phase::Stopped.as_u8(), Ordering::Release);
        true
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}
