// 该文件是 Wanglou （望楼） 项目的一部分。
// src/model/mod.rs - 检测结果与后端定义
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

mod ssd;
mod yolov8;

pub use self::ssd::{SsdBuilder, SsdDetector, SsdError};
pub use self::yolov8::{YoloError, YoloV8Builder, YoloV8Detector, YoloVariant};

use std::sync::Arc;

use image::RgbImage;

/// 边界框坐标空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordSpace {
  /// 像素坐标，相对于推理帧尺寸
  Pixel,
  /// 归一化坐标 [0, 1]
  Normalized,
}

/// 单个检测结果
#[derive(Debug, Clone)]
pub struct DetectItem {
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
  pub score: f32,
  pub class_id: usize,
  pub label: String,
}

/// 一帧的统一检测结果
#[derive(Debug, Clone)]
pub struct DetectionBatch {
  pub items: Vec<DetectItem>,
  pub inference_time_ms: u64,
  pub fps: f32,
  /// 推理帧宽度
  pub image_width: u32,
  /// 推理帧高度
  pub image_height: u32,
  /// 边界框坐标空间
  pub coord_space: CoordSpace,
  /// 当前模型的完整标签词表
  pub labels: Arc<Vec<String>>,
}

/// 检测后端
pub trait Backend {
  type Error;

  fn detect(&self, image: &RgbImage) -> Result<Vec<DetectItem>, Self::Error>;
}
