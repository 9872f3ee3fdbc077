// 该文件是 Wanglou （望楼） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;

use crate::config::{Delegate, DetectorConfig, ModelKind};

/// Wanglou 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型资源目录（.tflite 模型与 labels.txt）
  #[arg(long, default_value = "models", value_name = "DIR")]
  pub model_dir: PathBuf,

  /// 模型名称
  /// 支持: mobilenetv1, efficientdet-lite0, efficientdet-lite1,
  /// efficientdet-lite2, yolov8, yolov8-int8；未知名称回退到默认模型
  #[arg(long, default_value = "mobilenetv1", value_name = "MODEL")]
  pub model: String,

  /// 输入来源（图片文件、V4L2 设备路径或 synthetic://WxH）
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 推理线程数
  #[arg(long, default_value = "2", value_name = "COUNT")]
  pub threads: usize,

  /// 主检测器的最大结果数
  #[arg(long, default_value = "3", value_name = "COUNT")]
  pub max_results: usize,

  /// 执行委托
  #[arg(long, value_enum, default_value = "cpu")]
  pub delegate: Delegate,

  /// 帧旋转角度（90 的倍数）
  #[arg(long, default_value = "0", value_name = "DEGREES")]
  pub rotation: i32,

  /// 标签文件路径（YOLOv8 模型需要；默认 <model-dir>/labels.txt）
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 最大处理帧数
  #[arg(long, value_name = "COUNT")]
  pub frame_number: Option<usize>,

  /// JSONL 记录输出路径
  #[cfg(feature = "record_jsonl")]
  #[arg(long, value_name = "FILE")]
  pub record: Option<PathBuf>,
}

impl Args {
  /// 从命令行参数构造检测器配置
  pub fn detector_config(&self) -> DetectorConfig {
    DetectorConfig {
      score_threshold: self.threshold,
      num_threads: self.threads,
      max_results: self.max_results,
      delegate: self.delegate,
      model: ModelKind::from_name(&self.model),
      model_dir: self.model_dir.clone(),
      labels_file: self.labels.clone(),
    }
  }
}
