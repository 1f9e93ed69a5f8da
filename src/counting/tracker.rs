// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 最近邻跟踪器
//! Nearest-neighbour foot-position tracker

use super::types::{Detection, Point, Track};

/// 默认匹配距离 (像素)
pub const DEFAULT_MATCH_DISTANCE: f32 = 100.0;

/// 单个检测的跟踪结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackStep {
    pub id: u32,
    /// 匹配到的上一帧位置, 新目标为 `None`
    pub previous: Option<Point>,
    pub current: Point,
}

/// 跟踪器统一接口
pub trait Tracker {
    /// 用当前帧检测框更新跟踪集合, 每个检测返回一条记录 (与输入顺序一致)
    fn update(&mut self, detections: &[Detection]) -> Vec<TrackStep>;

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;

    /// 当前跟踪集合
    fn tracks(&self) -> &[Track];
}

/// 贪心最近邻跟踪
///
/// 按检测顺序依次为每个检测挑选距离最近且未被占用的上一帧目标,
/// 距离不超过阈值即匹配. 未匹配的检测分配 `最大 id + 1`.
/// 上一帧未被引用的目标直接丢弃, 不做遮挡恢复.
pub struct NearestTracker {
    tracks: Vec<Track>,
    max_distance: f32,
}

impl Default for NearestTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_DISTANCE)
    }
}

impl NearestTracker {
    pub fn new(max_distance: f32) -> Self {
        Self {
            tracks: Vec::new(),
            max_distance,
        }
    }
}

impl Tracker for NearestTracker {
    fn update(&mut self, detections: &[Detection]) -> Vec<TrackStep> {
        let mut used = vec![false; self.tracks.len()];
        let mut next_tracks = Vec::with_capacity(detections.len());
        let mut steps = Vec::with_capacity(detections.len());

        // 新 id 在上一帧与本帧已分配的 id 之上递增
        let mut max_id: Option<u32> = self.tracks.iter().map(|t| t.id).max();

        for det in detections {
            let foot = det.foot();

            let mut best: Option<(usize, f32)> = None;
            for (idx, track) in self.tracks.iter().enumerate() {
                if used[idx] {
                    continue;
                }
                let dist = foot.distance(&track.foot);
                if dist > self.max_distance {
                    continue;
                }
                match best {
                    Some((_, best_dist)) if best_dist <= dist => {}
                    _ => best = Some((idx, dist)),
                }
            }

            let step = match best {
                Some((idx, _)) => {
                    used[idx] = true;
                    let prev = self.tracks[idx];
                    TrackStep {
                        id: prev.id,
                        previous: Some(prev.foot),
                        current: foot,
                    }
                }
                None => {
                    let id = max_id.map_or(0, |m| m + 1);
                    max_id = Some(id);
                    TrackStep {
                        id,
                        previous: None,
                        current: foot,
                    }
                }
            };

            next_tracks.push(Track {
                id: step.id,
                foot: step.current,
            });
            steps.push(step);
        }

        self.tracks = next_tracks;
        steps
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}
