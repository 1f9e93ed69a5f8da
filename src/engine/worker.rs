// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 计数工作线程: 取命令 → 采集 → 计数线 → (计数阶段) 检测/跟踪/越线 → 标注 → 发布

use super::annotate::{encode_jpeg, Annotator};
use super::preview::PreviewSink;
use super::status::EngineStatus;
use crate::config::CounterConfig;
use crate::counting::{
    check_line_crossing, line_points, Direction, LineConfig, NearestTracker, Phase, Tracker,
};
use crate::detection::{PersonDetector, PersonFilter};
use crate::error::{CounterError, Result};
use crate::input::FrameSource;
use crate::pipeline::{CommandChannel, FrameBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 工作线程独占的外部能力
pub struct EngineParts {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn PersonDetector>,
    /// `None` 即 headless
    pub preview: Option<Box<dyn PreviewSink>>,
}

/// 工作线程参数
#[derive(Clone)]
pub struct EngineSettings {
    pub filter: PersonFilter,
    pub match_distance: f32,
    pub frame_interval: Duration,
    pub max_capture_failures: u32,
    pub jpeg_quality: u8,
    pub annotator: Annotator,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&CounterConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &CounterConfig) -> Self {
        Self {
            filter: PersonFilter {
                min_confidence: config.person_conf,
                min_size: config.person_min_size,
            },
            match_distance: config.match_distance,
            frame_interval: config.frame_interval(),
            max_capture_failures: config.max_capture_failures.max(1),
            jpeg_quality: config.jpeg_quality,
            annotator: Annotator::load(config.font_path.as_deref()),
        }
    }
}

/// 一轮运行的身份: 代数 + 取消标记
#[derive(Clone, Debug)]
pub struct RunToken {
    generation: u64,
    cancel: Arc<AtomicBool>,
}

impl RunToken {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 请求在下一轮迭代边界退出
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// 单次迭代结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// 已发布一帧, 附带本帧的越线事件
    Published {
        phase: Phase,
        crossings: Vec<(u32, Direction)>,
    },
    /// 采集超时, 本轮跳过
    NoFrame,
    /// 本轮运行已被放弃
    Abandoned,
}

pub struct CountingEngine {
    parts: EngineParts,
    settings: EngineSettings,
    frames: FrameBuffer,
    commands: CommandChannel,
    status: Arc<EngineStatus>,
    run: RunToken,

    line: LineConfig,
    tracker: NearestTracker,
    occupancy: u32,
    last_phase: Phase,
    capture_failures: u32,

    // 吞吐统计
    fps_count: u32,
    fps_last: Instant,
}

impl CountingEngine {
    pub fn new(
        parts: EngineParts,
        settings: EngineSettings,
        frames: FrameBuffer,
        commands: CommandChannel,
        status: Arc<EngineStatus>,
        run: RunToken,
    ) -> Self {
        let tracker = NearestTracker::new(settings.match_distance);
        Self {
            parts,
            settings,
            frames,
            commands,
            status,
            run,
            line: LineConfig::default(),
            tracker,
            occupancy: 0,
            last_phase: Phase::Setup,
            capture_failures: 0,
            fps_count: 0,
            fps_last: Instant::now(),
        }
    }

    pub fn line(&self) -> LineConfig {
        self.line
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    fn is_current(&self) -> bool {
        self.status.is_current(self.run.generation)
    }

    /// 执行一次迭代
    pub fn step(&mut self) -> Result<StepOutcome> {
        if !self.is_current() {
            return Ok(StepOutcome::Abandoned);
        }

        // 1. 本轮开始前已入队的命令按顺序生效
        let applied = self.commands.drain_into(&mut self.line);
        if applied > 0 {
            debug!(
                "📐 计数线更新: 位置 {} 角度 {} ({} 条命令)",
                self.line.position(),
                self.line.angle(),
                applied
            );
        }

        // 2. 采集
        let frame = match self.parts.source.read().map_err(CounterError::capture)? {
            Some(frame) => {
                self.capture_failures = 0;
                frame
            }
            None => {
                self.capture_failures += 1;
                if self.capture_failures >= self.settings.max_capture_failures {
                    return Err(CounterError::CaptureExhausted(self.capture_failures));
                }
                warn!(
                    "⚠️ 未取到画面 ({}/{})",
                    self.capture_failures, self.settings.max_capture_failures
                );
                return Ok(StepOutcome::NoFrame);
            }
        };

        // 3. 计数线
        let (width, height) = frame.dimensions();
        let (start, end) = line_points(width, height, &self.line);

        let phase = self.status.phase();
        if phase != self.last_phase {
            info!("🔄 阶段切换: {} → {}", self.last_phase.name(), phase.name());
            self.last_phase = phase;
        }

        // 4. 计数阶段: 检测 → 跟踪 → 越线
        let mut display = frame.clone();
        let mut crossings = Vec::new();
        if phase == Phase::Counting {
            let detections = self
                .parts
                .detector
                .detect(&frame)
                .map_err(CounterError::detection)?;
            let people = self.settings.filter.apply(detections);

            for step in self.tracker.update(&people) {
                let crossed =
                    check_line_crossing(step.current, step.previous, start, end, self.line.angle());
                if let Some(direction) = crossed {
                    self.apply_crossing(step.id, direction);
                    crossings.push((step.id, direction));
                }
            }
            self.status.publish_count(self.run.generation, self.occupancy);
            self.settings.annotator.draw_people(&mut display, &people);
        }

        // 5. 标注 + 编码
        let annotator = &self.settings.annotator;
        annotator.draw_line(&mut display, start, end);
        annotator.draw_status(&mut display, phase, &self.line, self.occupancy);
        let jpeg = encode_jpeg(&display, self.settings.jpeg_quality)?;

        if let Some(preview) = self.parts.preview.as_mut() {
            if let Err(e) = preview.show(&jpeg) {
                warn!("⚠️ {}", CounterError::preview(e));
            }
        }

        // 6. 发布 (被放弃的线程不再写队列)
        if !self.is_current() {
            return Ok(StepOutcome::Abandoned);
        }
        self.frames.publish(jpeg);

        Ok(StepOutcome::Published { phase, crossings })
    }

    /// 越线更新人数, 出去时不低于 0
    fn apply_crossing(&mut self, id: u32, direction: Direction) {
        self.occupancy = match direction {
            Direction::In => self.occupancy.saturating_add(1),
            Direction::Out => self.occupancy.saturating_sub(1),
        };
        info!(
            "🚶 目标 {} 越线 ({}) → 当前人数 {}",
            id,
            direction.as_str(),
            self.occupancy
        );
    }

    fn tick_fps(&mut self) {
        self.fps_count += 1;
        let elapsed = self.fps_last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            info!(
                "📊 {:.1} fps | 阶段 {} | 人数 {} | 跟踪 {} | 丢帧 {}",
                self.fps_count as f64 / elapsed,
                self.last_phase.name(),
                self.occupancy,
                self.tracker.track_count(),
                self.frames.dropped()
            );
            self.fps_count = 0;
            self.fps_last = Instant::now();
        }
    }

    /// 主循环: 直到取消 / 被放弃 / 出错
    pub fn run(mut self) {
        info!("▶️ 计数线程启动 (Gen: {})", self.run.generation);

        while !self.run.is_cancelled() {
            match self.step() {
                Ok(StepOutcome::Abandoned) => {
                    info!("🛑 运行已被放弃 (Gen: {})", self.run.generation);
                    break;
                }
                Ok(_) => self.tick_fps(),
                Err(e) => {
                    error!("❌ {}", e);
                    break;
                }
            }
            std::thread::sleep(self.settings.frame_interval);
        }

        self.release_parts();
        info!(
            "⏹️ 计数线程退出 (Gen: {}, 人数 {})",
            self.run.generation, self.occupancy
        );
    }

    /// 释放采集与预览, 单项失败只记录
    fn release_parts(&mut self) {
        if let Err(e) = self.parts.source.release() {
            warn!("⚠️ 释放采集设备失败: {:#}", e);
        }
        if let Some(preview) = self.parts.preview.as_mut() {
            if let Err(e) = preview.close() {
                warn!("⚠️ 释放预览失败: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::{Command, Detection};
    use image::RgbImage;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: usize,
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> anyhow::Result<Option<RgbImage>> {
            if self.frames == 0 {
                return Ok(None);
            }
            self.frames -= 1;
            Ok(Some(RgbImage::new(400, 400)))
        }
    }

    struct ScriptedDetector {
        script: VecDeque<anyhow::Result<Vec<Detection>>>,
    }

    impl PersonDetector for ScriptedDetector {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
            self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn person_at(y: i32) -> Detection {
        Detection::new(180, y - 80, 220, y, 0.9)
    }

    fn engine(
        frames: usize,
        script: Vec<anyhow::Result<Vec<Detection>>>,
    ) -> (CountingEngine, Arc<EngineStatus>, FrameBuffer, CommandChannel) {
        let status = Arc::new(EngineStatus::new());
        let generation = status.begin_run();
        let buffer = FrameBuffer::new(10);
        let commands = CommandChannel::new();
        let parts = EngineParts {
            source: Box::new(ScriptedSource { frames }),
            detector: Box::new(ScriptedDetector {
                script: script.into(),
            }),
            preview: None,
        };
        let settings = EngineSettings {
            annotator: Annotator::default(),
            max_capture_failures: 3,
            ..EngineSettings::default()
        };
        let engine = CountingEngine::new(
            parts,
            settings,
            buffer.clone(),
            commands.clone(),
            status.clone(),
            RunToken::new(generation),
        );
        (engine, status, buffer, commands)
    }

    fn walk(ys: &[i32]) -> Vec<anyhow::Result<Vec<Detection>>> {
        ys.iter().map(|&y| Ok(vec![person_at(y)])).collect()
    }

    #[test]
    fn setup_phase_publishes_without_detecting() {
        let (mut engine, status, buffer, _) = engine(2, vec![Err(anyhow::anyhow!("unused"))]);
        let outcome = engine.step().unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Published {
                phase: Phase::Setup,
                crossings: vec![]
            }
        );
        assert_eq!(buffer.len(), 1);
        assert_eq!(status.count(), 0);
    }

    #[test]
    fn queued_commands_apply_before_the_frame() {
        let (mut engine, _, _, commands) = engine(1, vec![]);
        commands.send(Command::SetPosition(10));
        commands.send(Command::SetAngle(20));
        commands.send(Command::SetPosition(30));
        engine.step().unwrap();
        assert_eq!(engine.line(), LineConfig::new(30, 20));
    }

    #[test]
    fn downward_walk_across_center_line_counts_one() {
        let ys = [100, 150, 190, 210, 250, 300];
        let (mut engine, status, _, _) = engine(ys.len(), walk(&ys));
        assert!(status.begin_counting());

        let mut events = Vec::new();
        for _ in 0..ys.len() {
            if let StepOutcome::Published { crossings, .. } = engine.step().unwrap() {
                events.extend(crossings);
            }
        }
        assert_eq!(events, vec![(0, Direction::In)]);
        assert_eq!(status.count(), 1);
    }

    #[test]
    fn upward_walk_never_goes_negative() {
        let ys = [300, 250, 210, 190, 150, 100];
        let (mut engine, status, _, _) = engine(ys.len(), walk(&ys));
        assert!(status.begin_counting());
        for _ in 0..ys.len() {
            engine.step().unwrap();
        }
        assert_eq!(engine.occupancy(), 0);
        assert_eq!(status.count(), 0);
    }

    #[test]
    fn walking_back_across_the_line_restores_zero() {
        let down = [100, 150, 190, 210, 250, 300];
        let back = [250, 210, 190, 150, 100];
        let ys: Vec<i32> = down.iter().chain(back.iter()).copied().collect();
        let (mut engine, status, _, _) = engine(ys.len(), walk(&ys));
        assert!(status.begin_counting());

        for _ in 0..down.len() {
            engine.step().unwrap();
        }
        assert_eq!(status.count(), 1);

        let mut events = Vec::new();
        for _ in 0..back.len() {
            if let StepOutcome::Published { crossings, .. } = engine.step().unwrap() {
                events.extend(crossings);
            }
        }
        assert_eq!(events, vec![(0, Direction::Out)]);
        assert_eq!(status.count(), 0);
    }

    #[test]
    fn weak_detections_are_not_tracked() {
        let weak = vec![
            Ok(vec![Detection::new(180, 110, 220, 190, 0.2)]),
            Ok(vec![Detection::new(180, 130, 220, 210, 0.2)]),
        ];
        let (mut engine, status, _, _) = engine(2, weak);
        status.begin_counting();
        engine.step().unwrap();
        engine.step().unwrap();
        assert_eq!(status.count(), 0);
    }

    #[test]
    fn detection_failure_ends_the_run() {
        let (mut engine, status, _, _) = engine(1, vec![Err(anyhow::anyhow!("model crashed"))]);
        status.begin_counting();
        let err = engine.step().unwrap_err();
        assert!(matches!(err, CounterError::Detection(msg) if msg.contains("model crashed")));
    }

    #[test]
    fn repeated_capture_timeouts_exhaust() {
        let (mut engine, _, buffer, _) = engine(0, vec![]);
        assert_eq!(engine.step().unwrap(), StepOutcome::NoFrame);
        assert_eq!(engine.step().unwrap(), StepOutcome::NoFrame);
        assert!(matches!(engine.step(), Err(CounterError::CaptureExhausted(3))));
        assert!(buffer.is_empty());
    }

    #[test]
    fn abandoned_engine_stops_publishing() {
        let (mut engine, status, buffer, _) = engine(2, vec![]);
        status.abandon(status.generation());
        assert_eq!(engine.step().unwrap(), StepOutcome::Abandoned);
        assert!(buffer.is_empty());
    }
}
