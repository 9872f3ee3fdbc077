// 该文件是 Wanglou （望楼） 项目的一部分。
// src/labels.rs - 标签词表
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

use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {0}: {1}")]
  Read(String, std::io::Error),
}

/// 内置 COCO 词表（主检测器使用）
pub fn coco_vocabulary() -> Vec<String> {
  COCO_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// 加载换行分隔的标签文件，保持原始顺序
pub fn load_labels(path: &Path) -> Result<Vec<String>, LabelError> {
  let text = std::fs::read_to_string(path)
    .map_err(|e| LabelError::Read(path.display().to_string(), e))?;

  let labels: Vec<String> = text
    .lines()
    .map(|line| line.trim_end_matches('\r').to_string())
    .collect();

  debug!("从 {} 加载了 {} 个标签", path.display(), labels.len());
  Ok(labels)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn temp_label_file(name: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
  }

  #[test]
  fn load_labels_preserves_order() {
    let path = temp_label_file("wanglou_labels_order.txt", "person\nbicycle\ncar\n");
    let labels = load_labels(&path).unwrap();
    assert_eq!(labels, vec!["person", "bicycle", "car"]);
  }

  #[test]
  fn load_labels_handles_crlf_and_interior_blanks() {
    let path = temp_label_file("wanglou_labels_crlf.txt", "person\r\n\r\ncar\r\n");
    let labels = load_labels(&path).unwrap();
    // 内部空行保留，保证类别索引不漂移
    assert_eq!(labels, vec!["person", "", "car"]);
  }

  #[test]
  fn load_labels_missing_file_is_an_error() {
    let path = std::env::temp_dir().join("wanglou_labels_missing.txt");
    let _ = std::fs::remove_file(&path);
    assert!(load_labels(&path).is_err());
  }

  #[test]
  fn coco_vocabulary_is_complete() {
    let vocab = coco_vocabulary();
    assert_eq!(vocab.len(), 80);
    assert_eq!(vocab[0], "person");
    assert_eq!(vocab[79], "toothbrush");
  }
}
