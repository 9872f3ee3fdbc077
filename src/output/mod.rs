// 该文件是 Wanglou （望楼） 项目的一部分。
// src/output/mod.rs - 结果输出模块
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

#[cfg(feature = "record_jsonl")]
mod jsonl_record;

#[cfg(feature = "record_jsonl")]
pub use jsonl_record::JsonlRecord;

use tracing::{error, info};

use crate::model::{CoordSpace, DetectionBatch};
use crate::session::DetectorListener;

/// 日志监听器: 把统一检测结果写入 tracing 日志
pub struct LogOutput;

impl DetectorListener for LogOutput {
  fn on_error(&self, message: &str) {
    error!("{}", message);
  }

  fn on_results(&self, batch: &DetectionBatch) {
    info!(
      "检测到 {} 个对象, 推理耗时 {} ms, 帧率 {:.1}",
      batch.items.len(),
      batch.inference_time_ms,
      batch.fps
    );

    for item in &batch.items {
      match batch.coord_space {
        CoordSpace::Pixel => info!(
          "  - {}: {:.1}% at ({:.0}, {:.0})-({:.0}, {:.0})",
          item.label,
          item.score * 100.0,
          item.bbox[0],
          item.bbox[1],
          item.bbox[2],
          item.bbox[3]
        ),
        CoordSpace::Normalized => info!(
          "  - {}: {:.1}% at 归一化 ({:.3}, {:.3})-({:.3}, {:.3})",
          item.label,
          item.score * 100.0,
          item.bbox[0],
          item.bbox[1],
          item.bbox[2],
          item.bbox[3]
        ),
      }
    }
  }
}

/// 组合监听器: 把结果同时转发给两个监听器
pub struct Tee<A, B>(pub A, pub B);

impl<A: DetectorListener, B: DetectorListener> DetectorListener for Tee<A, B> {
  fn on_error(&self, message: &str) {
    self.0.on_error(message);
    self.1.on_error(message);
  }

  fn on_results(&self, batch: &DetectionBatch) {
    self.0.on_results(batch);
    self.1.on_results(batch);
  }
}
