// 该文件是 Wanglou （望楼） 项目的一部分。
// src/config.rs - 检测器配置
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

use clap::ValueEnum;
use tracing::warn;

/// 推理执行委托（硬件执行目标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Delegate {
  /// 默认处理器执行
  Cpu,
  /// 图形处理器执行（需设备支持，不支持时回退到默认执行）
  Gpu,
  /// 专用神经网络加速器执行
  Npu,
}

/// 支持的检测模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
  MobileNetV1,
  EfficientDetLite0,
  EfficientDetLite1,
  EfficientDetLite2,
  YoloV8,
  YoloV8Int8,
}

impl ModelKind {
  /// 模型资源文件名（固定查找表）
  pub fn model_file(&self) -> &'static str {
    match self {
      ModelKind::MobileNetV1 => "mobilenetv1.tflite",
      ModelKind::EfficientDetLite0 => "efficientdet-lite0.tflite",
      ModelKind::EfficientDetLite1 => "efficientdet-lite1.tflite",
      ModelKind::EfficientDetLite2 => "efficientdet-lite2.tflite",
      ModelKind::YoloV8 => "model-yolov8.tflite",
      ModelKind::YoloV8Int8 => "yolov8n-full-int8.tflite",
    }
  }

  /// 是否由 YOLOv8 备用检测器执行
  pub fn is_yolo(&self) -> bool {
    matches!(self, ModelKind::YoloV8 | ModelKind::YoloV8Int8)
  }

  /// 从名称解析模型；未知名称回退到默认模型
  pub fn from_name(name: &str) -> Self {
    match name {
      "mobilenetv1" => ModelKind::MobileNetV1,
      "efficientdet-lite0" => ModelKind::EfficientDetLite0,
      "efficientdet-lite1" => ModelKind::EfficientDetLite1,
      "efficientdet-lite2" => ModelKind::EfficientDetLite2,
      "yolov8" => ModelKind::YoloV8,
      "yolov8-int8" => ModelKind::YoloV8Int8,
      other => {
        warn!("未知的模型名称: {}, 回退到 mobilenetv1", other);
        ModelKind::MobileNetV1
      }
    }
  }
}

/// 检测器配置
///
/// 对单个后端实例而言配置不可变，修改配置需要重新初始化后端。
#[derive(Debug, Clone)]
pub struct DetectorConfig {
  /// 置信度阈值 (0.0 - 1.0)
  pub score_threshold: f32,
  /// 推理线程数（当前运行时为单线程执行，该值仅作记录）
  pub num_threads: usize,
  /// 主检测器的最大结果数（备用检测器不受此限制）
  pub max_results: usize,
  /// 执行委托
  pub delegate: Delegate,
  /// 模型选择
  pub model: ModelKind,
  /// 模型资源目录
  pub model_dir: PathBuf,
  /// 标签文件路径；缺省时使用 <model_dir>/labels.txt
  pub labels_file: Option<PathBuf>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      score_threshold: 0.5,
      num_threads: 2,
      max_results: 3,
      delegate: Delegate::Cpu,
      model: ModelKind::MobileNetV1,
      model_dir: PathBuf::from("models"),
      labels_file: None,
    }
  }
}

impl DetectorConfig {
  /// 当前模型的资源文件路径
  pub fn model_path(&self) -> PathBuf {
    self.model_dir.join(self.model.model_file())
  }

  /// 标签文件路径
  pub fn labels_path(&self) -> PathBuf {
    self
      .labels_file
      .clone()
      .unwrap_or_else(|| self.model_dir.join("labels.txt"))
  }
}
