// 该文件是 Wanglou （望楼） 项目的一部分。
// src/output/jsonl_record.rs - JSONL 记录输出
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing::error;

use crate::model::{CoordSpace, DetectionBatch};
use crate::session::DetectorListener;

/// JSONL 记录监听器
///
/// 每帧一行 JSON 状态记录，供外部消费方（面板、转发服务）读取。
pub struct JsonlRecord {
  writer: Mutex<BufWriter<File>>,
}

impl JsonlRecord {
  pub fn create(path: &Path) -> std::io::Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    let file = File::create(path)?;
    Ok(Self {
      writer: Mutex::new(BufWriter::new(file)),
    })
  }

  fn write_line(&self, value: serde_json::Value) {
    let mut writer = match self.writer.lock() {
      Ok(writer) => writer,
      Err(poisoned) => poisoned.into_inner(),
    };

    if let Err(e) = writeln!(writer, "{}", value).and_then(|_| writer.flush()) {
      error!("写入记录失败: {}", e);
    }
  }
}

impl DetectorListener for JsonlRecord {
  fn on_error(&self, message: &str) {
    self.write_line(json!({
      "time": Utc::now().to_rfc3339(),
      "error": message,
    }));
  }

  fn on_results(&self, batch: &DetectionBatch) {
    let detections: Vec<serde_json::Value> = batch
      .items
      .iter()
      .map(|item| {
        json!({
          "label": item.label,
          "score": item.score,
          "bbox": item.bbox,
        })
      })
      .collect();

    self.write_line(json!({
      "time": Utc::now().to_rfc3339(),
      "fps": batch.fps,
      "inference_ms": batch.inference_time_ms,
      "width": batch.image_width,
      "height": batch.image_height,
      "coord_space": match batch.coord_space {
        CoordSpace::Pixel => "pixel",
        CoordSpace::Normalized => "normalized",
      },
      "detections": detections,
    }));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;
  use std::sync::Arc;

  #[test]
  fn batches_and_errors_become_json_lines() {
    let path = std::env::temp_dir().join("wanglou_record_test.jsonl");
    let record = JsonlRecord::create(&path).unwrap();

    let batch = DetectionBatch {
      items: vec![DetectItem {
        bbox: [1.0, 2.0, 3.0, 4.0],
        score: 0.75,
        class_id: 0,
        label: "person".to_string(),
      }],
      inference_time_ms: 12,
      fps: 24.0,
      image_width: 640,
      image_height: 480,
      coord_space: CoordSpace::Pixel,
      labels: Arc::new(vec!["person".to_string()]),
    };

    record.on_results(&batch);
    record.on_error("测试错误");
    drop(record);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["coord_space"], "pixel");
    assert_eq!(first["detections"][0]["label"], "person");

    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["error"], "测试错误");
  }
}
