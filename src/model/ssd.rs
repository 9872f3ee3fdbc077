// 该文件是 Wanglou （望楼） 项目的一部分。
// src/model/ssd.rs - 主检测后端（通用目标检测模型）
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
use tracing::{debug, info};

use crate::model::{Backend, DetectItem};

/// TFLite 检测模型后处理输出的张量数量: 框、类别、分数、数量
const SSD_NUM_OUTPUTS: usize = 4;

#[derive(Error, Debug)]
pub enum SsdError {
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("推理错误: {0}")]
  Inference(String),
}

/// 主检测后端
///
/// 执行 TFLite 检测模型（MobileNet SSD / EfficientDet-Lite 系列），
/// 输出为后处理完成的四个张量。
pub struct SsdDetector {
  plan: TypedRunnableModel<TypedModel>,
  input_width: u32,
  input_height: u32,
  input_type: DatumType,
  score_threshold: f32,
  max_results: usize,
  labels: Arc<Vec<String>>,
}

pub struct SsdBuilder {
  model_path: PathBuf,
  score_threshold: f32,
  max_results: usize,
  num_threads: usize,
  labels: Arc<Vec<String>>,
}

impl SsdBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      score_threshold: 0.5,
      max_results: 3,
      num_threads: 2,
      labels: Arc::new(Vec::new()),
    }
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn max_results(mut self, max_results: usize) -> Self {
    self.max_results = max_results;
    self
  }

  pub fn num_threads(mut self, num_threads: usize) -> Self {
    self.num_threads = num_threads;
    self
  }

  pub fn labels(mut self, labels: Arc<Vec<String>>) -> Self {
    self.labels = labels;
    self
  }

  pub fn build(self) -> Result<SsdDetector, SsdError> {
    info!("加载模型文件: {}", self.model_path.display());
    let model = tract_tflite::tflite()
      .model_for_path(&self.model_path)
      .map_err(|e| SsdError::ModelLoad(format!("{}: {}", self.model_path.display(), e)))?;

    let (input_type, input_height, input_width) = {
      let fact = model
        .input_fact(0)
        .map_err(|e| SsdError::ModelInvalid(format!("无法获取输入张量信息: {}", e)))?;
      let shape = fact
        .shape
        .as_concrete()
        .ok_or_else(|| SsdError::ModelInvalid("模型输入维度不是常量".to_string()))?;
      if shape.len() != 4 || shape[3] != 3 {
        return Err(SsdError::ModelInvalid(format!(
          "预期 NHWC RGB 输入, 实际维度 {:?}",
          shape
        )));
      }
      (fact.datum_type, shape[1] as u32, shape[2] as u32)
    };

    debug!(
      "模型输入: {}x{}, 类型 {:?}",
      input_width, input_height, input_type
    );

    let plan = model
      .into_optimized()
      .map_err(|e| SsdError::ModelInvalid(format!("模型优化失败: {}", e)))?
      .into_runnable()
      .map_err(|e| SsdError::ModelInvalid(format!("无法创建推理计划: {}", e)))?;

    // tract 的推理计划为单线程执行，线程数配置仅作记录
    info!("模型加载完成 (线程数配置: {})", self.num_threads);

    Ok(SsdDetector {
      plan,
      input_width,
      input_height,
      input_type,
      score_threshold: self.score_threshold,
      max_results: self.max_results,
      labels: self.labels,
    })
  }
}

impl SsdDetector {
  fn input_tensor(&self, resized: &RgbImage) -> Result<Tensor, SsdError> {
    let shape = [
      1usize,
      self.input_height as usize,
      self.input_width as usize,
      3,
    ];

    if self.input_type.unquantized() == u8::datum_type() {
      let tensor = Tensor::from_shape(&shape, resized.as_raw())
        .map_err(|e| SsdError::Inference(format!("无法构造输入张量: {}", e)))?;
      if self.input_type.is_quantized() {
        return tensor
          .cast_to_dt(self.input_type)
          .map(|t| t.into_owned())
          .map_err(|e| SsdError::Inference(format!("输入量化失败: {}", e)));
      }
      return Ok(tensor);
    }

    // 浮点输入按 TFLite 检测模型的约定归一到 [-1, 1]
    let data: Vec<f32> = resized
      .as_raw()
      .iter()
      .map(|&v| (v as f32 - 127.5) / 127.5)
      .collect();
    Tensor::from_shape(&shape, &data)
      .map_err(|e| SsdError::Inference(format!("无法构造输入张量: {}", e)))
  }
}

impl Backend for SsdDetector {
  type Error = SsdError;

  fn detect(&self, image: &RgbImage) -> Result<Vec<DetectItem>, SsdError> {
    let resized = image::imageops::resize(
      image,
      self.input_width,
      self.input_height,
      FilterType::Triangle,
    );

    let tensor = self.input_tensor(&resized)?;

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(|e| SsdError::Inference(e.to_string()))?;

    if outputs.len() < SSD_NUM_OUTPUTS {
      return Err(SsdError::Inference(format!(
        "预期 {} 个输出张量, 实际 {}",
        SSD_NUM_OUTPUTS,
        outputs.len()
      )));
    }

    let boxes = outputs[0]
      .as_slice::<f32>()
      .map_err(|e| SsdError::Inference(format!("无法读取边界框输出: {}", e)))?;
    let tensor1 = outputs[1]
      .as_slice::<f32>()
      .map_err(|e| SsdError::Inference(format!("无法读取第 1 个输出: {}", e)))?;
    let tensor2 = outputs[2]
      .as_slice::<f32>()
      .map_err(|e| SsdError::Inference(format!("无法读取第 2 个输出: {}", e)))?;
    let count = outputs[3]
      .as_slice::<f32>()
      .map_err(|e| SsdError::Inference(format!("无法读取数量输出: {}", e)))?;

    let count = count.first().copied().unwrap_or(0.0).max(0.0) as usize;
    let (classes, scores) = match_class_score_tensors(tensor1, tensor2);

    Ok(collect_detections(
      boxes,
      classes,
      scores,
      count,
      self.score_threshold,
      self.max_results,
      image.width(),
      image.height(),
      &self.labels,
    ))
  }
}

/// 类别/分数输出的顺序在不同模型导出版本之间会交换，
/// 根据取值范围判断哪个是类别张量（类别索引会超过 1.0）
fn match_class_score_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
) -> (&'a [f32], &'a [f32]) {
  if tensor2.iter().any(|v| *v > 1.0 + f32::EPSILON) {
    debug!("输出顺序交换: 索引 2 是类别, 索引 1 是分数");
    (tensor2, tensor1)
  } else {
    (tensor1, tensor2)
  }
}

#[allow(clippy::too_many_arguments)]
fn collect_detections(
  boxes: &[f32],
  classes: &[f32],
  scores: &[f32],
  count: usize,
  score_threshold: f32,
  max_results: usize,
  image_width: u32,
  image_height: u32,
  labels: &[String],
) -> Vec<DetectItem> {
  let width = image_width as f32;
  let height = image_height as f32;
  let count = count
    .min(scores.len())
    .min(classes.len())
    .min(boxes.len() / 4);

  let mut items = Vec::new();
  for i in 0..count {
    let score = scores[i].clamp(0.0, 1.0);
    if score < score_threshold {
      continue;
    }

    let class_id = classes[i].max(0.0) as usize;

    // 输出框为归一化的 [y_min, x_min, y_max, x_max]
    let y_min = boxes[i * 4].clamp(0.0, 1.0);
    let x_min = boxes[i * 4 + 1].clamp(0.0, 1.0);
    let y_max = boxes[i * 4 + 2].clamp(0.0, 1.0);
    let x_max = boxes[i * 4 + 3].clamp(0.0, 1.0);

    items.push(DetectItem {
      bbox: [x_min * width, y_min * height, x_max * width, y_max * height],
      score,
      class_id,
      label: labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| "unknown".to_string()),
    });
  }

  items.sort_by(|a, b| b.score.total_cmp(&a.score));
  items.truncate(max_results);

  debug!("检测到 {} 个物体", items.len());
  items
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels() -> Vec<String> {
    vec!["person".to_string(), "bicycle".to_string(), "car".to_string()]
  }

  #[test]
  fn detections_respect_threshold_and_max_results() {
    // 四个候选，其中一个低于阈值
    let boxes = [
      0.0, 0.0, 0.5, 0.5, //
      0.1, 0.1, 0.6, 0.6, //
      0.2, 0.2, 0.7, 0.7, //
      0.3, 0.3, 0.8, 0.8,
    ];
    let classes = [0.0, 1.0, 2.0, 0.0];
    let scores = [0.9, 0.3, 0.7, 0.6];

    let items = collect_detections(&boxes, &classes, &scores, 4, 0.5, 2, 100, 100, &labels());

    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.score >= 0.5));
    // 按分数降序
    assert_eq!(items[0].label, "person");
    assert_eq!(items[1].label, "car");
  }

  #[test]
  fn boxes_are_denormalized_to_pixels() {
    let boxes = [0.1, 0.2, 0.5, 0.6];
    let classes = [1.0];
    let scores = [0.8];

    let items = collect_detections(&boxes, &classes, &scores, 1, 0.5, 3, 200, 100, &labels());

    assert_eq!(items.len(), 1);
    // [x_min, y_min, x_max, y_max]
    assert_eq!(items[0].bbox, [40.0, 10.0, 120.0, 50.0]);
    assert_eq!(items[0].label, "bicycle");
  }

  #[test]
  fn count_is_bounded_by_tensor_sizes() {
    let boxes = [0.0, 0.0, 1.0, 1.0];
    let classes = [0.0];
    let scores = [0.9];

    // 数量张量声称 10 个结果，实际只有 1 个
    let items = collect_detections(&boxes, &classes, &scores, 10, 0.5, 5, 10, 10, &labels());
    assert_eq!(items.len(), 1);
  }

  #[test]
  fn out_of_vocabulary_class_is_unknown() {
    let boxes = [0.0, 0.0, 1.0, 1.0];
    let classes = [42.0];
    let scores = [0.9];

    let items = collect_detections(&boxes, &classes, &scores, 1, 0.5, 3, 10, 10, &labels());
    assert_eq!(items[0].label, "unknown");
  }

  #[test]
  fn class_score_tensor_order_is_disambiguated() {
    let classes = [0.0, 3.0, 17.0];
    let scores = [0.9, 0.8, 0.7];

    // 正常顺序: (类别, 分数)
    let (c, s) = match_class_score_tensors(&classes, &scores);
    assert_eq!(c, &classes);
    assert_eq!(s, &scores);

    // 交换顺序也能识别
    let (c, s) = match_class_score_tensors(&scores, &classes);
    assert_eq!(c, &classes);
    assert_eq!(s, &scores);
  }
}
