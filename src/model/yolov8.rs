// 该文件是 Wanglou （望楼） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 备用检测后端
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

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;
use image::imageops::FilterType;
use thiserror::Error;
use tract_tflite::prelude::*;
use tracing::{debug, info, warn};

use crate::model::{Backend, DetectItem};

const YOLO_NMS_THRESHOLD: f32 = 0.45;

/// YOLOv8 模型变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YoloVariant {
  /// 浮点模型，640x640 输入
  Fp32,
  /// 量化模型，固定 224x224 输入
  Int8,
}

impl YoloVariant {
  fn default_input(&self) -> (u32, u32) {
    match self {
      YoloVariant::Fp32 => (640, 640),
      YoloVariant::Int8 => (224, 224),
    }
  }
}

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("推理错误: {0}")]
  Inference(String),
}

/// YOLOv8 备用检测后端
///
/// 执行 Ultralytics 风格的 YOLOv8 TFLite 导出模型，
/// 输出为未经 NMS 的预测矩阵，边界框使用归一化坐标。
pub struct YoloV8Detector {
  plan: TypedRunnableModel<TypedModel>,
  variant: YoloVariant,
  input_width: u32,
  input_height: u32,
  input_type: DatumType,
  score_threshold: f32,
  nms_threshold: f32,
  labels: Arc<Vec<String>>,
}

pub struct YoloV8Builder {
  model_path: PathBuf,
  variant: YoloVariant,
  score_threshold: f32,
  nms_threshold: f32,
  labels: Arc<Vec<String>>,
}

impl YoloV8Builder {
  pub fn new(model_path: impl Into<PathBuf>, variant: YoloVariant) -> Self {
    Self {
      model_path: model_path.into(),
      variant,
      score_threshold: 0.5,
      nms_threshold: YOLO_NMS_THRESHOLD,
      labels: Arc::new(Vec::new()),
    }
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn labels(mut self, labels: Arc<Vec<String>>) -> Self {
    self.labels = labels;
    self
  }

  pub fn build(self) -> Result<YoloV8Detector, YoloError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model = tract_tflite::tflite()
      .model_for_path(&self.model_path)
      .map_err(|e| YoloError::ModelLoad(format!("{}: {}", self.model_path.display(), e)))?;

    let (input_type, input_height, input_width) = {
      let fact = model
        .input_fact(0)
        .map_err(|e| YoloError::ModelInvalid(format!("无法获取输入张量信息: {}", e)))?;
      let input_type = fact.datum_type;
      match fact.shape.as_concrete() {
        Some(shape) if shape.len() == 4 && shape[3] == 3 => {
          (input_type, shape[1] as u32, shape[2] as u32)
        }
        _ => {
          let (w, h) = self.variant.default_input();
          warn!("模型输入维度不是常量, 使用 {:?} 变体默认尺寸 {}x{}", self.variant, w, h);
          (input_type, h, w)
        }
      }
    };

    debug!(
      "模型输入: {}x{}, 类型 {:?}, 变体 {:?}",
      input_width, input_height, input_type, self.variant
    );

    let plan = model
      .into_optimized()
      .map_err(|e| YoloError::ModelInvalid(format!("模型优化失败: {}", e)))?
      .into_runnable()
      .map_err(|e| YoloError::ModelInvalid(format!("无法创建推理计划: {}", e)))?;

    info!("模型加载完成");

    Ok(YoloV8Detector {
      plan,
      variant: self.variant,
      input_width,
      input_height,
      input_type,
      score_threshold: self.score_threshold,
      nms_threshold: self.nms_threshold,
      labels: self.labels,
    })
  }
}

impl YoloV8Detector {
  pub fn variant(&self) -> YoloVariant {
    self.variant
  }

  fn input_tensor(&self, image: &RgbImage) -> Result<Tensor, YoloError> {
    let shape = [
      1usize,
      self.input_height as usize,
      self.input_width as usize,
      3,
    ];

    if self.input_type.unquantized() == u8::datum_type() {
      let data = quantized_input(image, self.input_width, self.input_height);
      let tensor = Tensor::from_shape(&shape, &data)
        .map_err(|e| YoloError::Inference(format!("无法构造输入张量: {}", e)))?;
      if self.input_type.is_quantized() {
        return tensor
          .cast_to_dt(self.input_type)
          .map(|t| t.into_owned())
          .map_err(|e| YoloError::Inference(format!("输入量化失败: {}", e)));
      }
      return Ok(tensor);
    }

    let data = float_input(image, self.input_width, self.input_height);
    Tensor::from_shape(&shape, &data)
      .map_err(|e| YoloError::Inference(format!("无法构造输入张量: {}", e)))
  }
}

impl Backend for YoloV8Detector {
  type Error = YoloError;

  fn detect(&self, image: &RgbImage) -> Result<Vec<DetectItem>, YoloError> {
    let tensor = self.input_tensor(image)?;

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(|e| YoloError::Inference(e.to_string()))?;

    let output = outputs
      .first()
      .ok_or_else(|| YoloError::Inference("模型没有输出张量".to_string()))?;

    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 {
      return Err(YoloError::Inference(format!(
        "预期 [1, 属性, 预测] 输出, 实际维度 {:?}",
        shape
      )));
    }

    // [1, 84, N]（属性优先）或 [1, N, 84]: 属性数远小于预测数
    let (attrs, preds, attrs_major) = if shape[1] <= shape[2] {
      (shape[1], shape[2], true)
    } else {
      (shape[2], shape[1], false)
    };

    let data = output
      .as_slice::<f32>()
      .map_err(|e| YoloError::Inference(format!("无法读取模型输出: {}", e)))?;

    let items = decode_predictions(
      data,
      attrs,
      preds,
      attrs_major,
      self.score_threshold,
      &self.labels,
    );
    let items = nms(items, self.nms_threshold);

    debug!("检测到 {} 个物体", items.len());
    Ok(items)
  }
}

/// 将帧缩放到模型输入尺寸，保持 u8 像素
fn quantized_input(image: &RgbImage, width: u32, height: u32) -> Vec<u8> {
  image::imageops::resize(image, width, height, FilterType::Triangle).into_raw()
}

/// 将帧缩放到模型输入尺寸并归一到 [0, 1]
fn float_input(image: &RgbImage, width: u32, height: u32) -> Vec<f32> {
  image::imageops::resize(image, width, height, FilterType::Triangle)
    .as_raw()
    .iter()
    .map(|&v| v as f32 / 255.0)
    .collect()
}

/// 解码 Ultralytics 预测矩阵: 每个预测为 [cx, cy, w, h, 类别分数...]
fn decode_predictions(
  data: &[f32],
  attrs: usize,
  preds: usize,
  attrs_major: bool,
  score_threshold: f32,
  labels: &[String],
) -> Vec<DetectItem> {
  if attrs < 5 || data.len() < attrs * preds {
    return Vec::new();
  }

  let num_classes = attrs - 4;
  let at = |pred: usize, attr: usize| {
    if attrs_major {
      data[attr * preds + pred]
    } else {
      data[pred * attrs + attr]
    }
  };

  let mut items = Vec::new();
  for pred in 0..preds {
    let mut best_score = 0.0f32;
    let mut best_class = 0usize;
    for class in 0..num_classes {
      let score = at(pred, 4 + class);
      if score > best_score {
        best_score = score;
        best_class = class;
      }
    }

    if best_score < score_threshold {
      continue;
    }

    let cx = at(pred, 0);
    let cy = at(pred, 1);
    let w = at(pred, 2);
    let h = at(pred, 3);

    let x_min = (cx - w / 2.0).clamp(0.0, 1.0);
    let y_min = (cy - h / 2.0).clamp(0.0, 1.0);
    let x_max = (cx + w / 2.0).clamp(0.0, 1.0);
    let y_max = (cy + h / 2.0).clamp(0.0, 1.0);

    items.push(DetectItem {
      bbox: [x_min, y_min, x_max, y_max],
      score: best_score.clamp(0.0, 1.0),
      class_id: best_class,
      label: labels
        .get(best_class)
        .cloned()
        .unwrap_or_else(|| "unknown".to_string()),
    });
  }

  items
}

/// 同类别的非极大值抑制
fn nms(mut items: Vec<DetectItem>, nms_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result = Vec::new();
  while !items.is_empty() {
    let best = items.remove(0);
    items.retain(|item| item.class_id != best.class_id || iou(&best.bbox, &item.bbox) < nms_threshold);
    result.push(best);
  }

  result
}

/// 计算两个边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}
