// 该文件是 Wanglou （望楼） 项目的一部分。
// src/session.rs - 检测调度
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

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Delegate, DetectorConfig, ModelKind};
use crate::labels::{self, LabelError};
use crate::model::{
  Backend, CoordSpace, DetectionBatch, SsdBuilder, SsdDetector, SsdError, YoloError,
  YoloV8Builder, YoloV8Detector, YoloVariant,
};
use crate::preprocess::{ForegroundExtractor, rotate_to_upright};

/// 检测结果监听器
///
/// 统一结果与错误的消费方，通常驱动界面刷新或记录输出。
/// 所有错误都以可读文本上报，不使用错误码。
pub trait DetectorListener {
  fn on_error(&self, message: &str);
  fn on_results(&self, batch: &DetectionBatch);
}

/// 加速器能力查询
pub trait AcceleratorProbe {
  fn gpu_supported(&self) -> bool;
}

/// 默认探测: 当前运行时没有 GPU 委托实现
pub struct DefaultProbe;

impl AcceleratorProbe for DefaultProbe {
  fn gpu_supported(&self) -> bool {
    false
  }
}

#[derive(Error, Debug)]
pub enum InitError {
  #[error("标签加载失败: {0}")]
  Labels(#[from] LabelError),
  #[error("主检测器初始化失败: {0}")]
  Primary(#[from] SsdError),
  #[error("YOLOv8 检测器初始化失败: {0}")]
  Alternate(#[from] YoloError),
}

/// 活动后端句柄；同一时刻至多一个变体存活，
/// 切换模型时先销毁旧句柄再构造新句柄。
enum BackendHandle {
  None,
  Primary(SsdDetector),
  AlternateFp32(YoloV8Detector),
  AlternateInt8(YoloV8Detector),
}

/// 帧率估计: 相邻两次 detect 调用的间隔倒数
struct FpsCounter {
  last_tick: Option<Instant>,
}

impl FpsCounter {
  fn new() -> Self {
    Self { last_tick: None }
  }

  fn tick(&mut self) -> f32 {
    self.tick_at(Instant::now())
  }

  fn tick_at(&mut self, now: Instant) -> f32 {
    let fps = match self.last_tick {
      Some(last) => {
        let elapsed_ms = now.duration_since(last).as_millis() as u64;
        1000.0 / elapsed_ms.max(1) as f32
      }
      // 首帧没有间隔可用
      None => 0.0,
    };
    self.last_tick = Some(now);
    fps
  }
}

/// 检测调度器
///
/// 持有配置与活动后端，驱动 预处理 -> 推理 -> 结果归一化 流水线，
/// 并把统一结果转发给监听器。`detect` 与 `configure` 均要求独占借用，
/// 单次调用约定由借用检查保证。
pub struct DetectSession<L> {
  config: DetectorConfig,
  backend: BackendHandle,
  foreground: ForegroundExtractor,
  vocabulary: Arc<Vec<String>>,
  fps: FpsCounter,
  probe: Box<dyn AcceleratorProbe>,
  listener: L,
}

impl<L: DetectorListener> DetectSession<L> {
  pub fn new(config: DetectorConfig, listener: L) -> Self {
    Self {
      config,
      backend: BackendHandle::None,
      foreground: ForegroundExtractor::new(),
      vocabulary: Arc::new(Vec::new()),
      fps: FpsCounter::new(),
      probe: Box::new(DefaultProbe),
      listener,
    }
  }

  pub fn with_probe(mut self, probe: Box<dyn AcceleratorProbe>) -> Self {
    self.probe = probe;
    self
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn listener(&self) -> &L {
    &self.listener
  }

  pub fn has_backend(&self) -> bool {
    !matches!(self.backend, BackendHandle::None)
  }

  pub fn is_using_yolov8(&self) -> bool {
    matches!(self.backend, BackendHandle::AlternateFp32(_))
  }

  pub fn is_using_yolov8_int8(&self) -> bool {
    matches!(self.backend, BackendHandle::AlternateInt8(_))
  }

  /// 销毁活动后端；下一次 detect 会惰性重建
  pub fn clear_backend(&mut self) {
    self.backend = BackendHandle::None;
  }

  /// 替换配置并重新初始化后端
  pub fn update_config(&mut self, config: DetectorConfig) -> Result<(), InitError> {
    self.config = config;
    self.clear_backend();
    self.configure()
  }

  /// 初始化检测后端
  ///
  /// 失败时通过监听器上报并保持无活动后端，
  /// 后续 detect 调用会按需重试。
  pub fn configure(&mut self) -> Result<(), InitError> {
    self.backend = BackendHandle::None;

    let delegate = self.resolve_delegate();
    let model_path = self.config.model_path();
    info!(
      "初始化检测后端: 模型 {}, 委托 {:?}",
      model_path.display(),
      delegate
    );

    match self.build_backend() {
      Ok(()) => {
        info!("检测后端就绪");
        Ok(())
      }
      Err(e) => {
        self.backend = BackendHandle::None;
        self.listener.on_error(&format!("检测后端初始化失败: {}", e));
        Err(e)
      }
    }
  }

  /// 消化委托请求: GPU 需设备支持，不支持时上报并回退到默认执行；
  /// NPU 在当前运行时没有对应实现，同样落到默认执行
  fn resolve_delegate(&self) -> Delegate {
    match self.config.delegate {
      Delegate::Gpu if !self.probe.gpu_supported() => {
        self
          .listener
          .on_error("当前设备不支持 GPU 加速, 回退到默认执行");
        Delegate::Cpu
      }
      Delegate::Npu => {
        debug!("当前运行时没有 NPU 委托, 使用默认执行");
        Delegate::Cpu
      }
      delegate => delegate,
    }
  }

  fn build_backend(&mut self) -> Result<(), InitError> {
    let model_path = self.config.model_path();

    if self.config.model.is_yolo() {
      let vocabulary = Arc::new(labels::load_labels(&self.config.labels_path())?);
      let variant = if self.config.model == ModelKind::YoloV8Int8 {
        YoloVariant::Int8
      } else {
        YoloVariant::Fp32
      };

      let detector = YoloV8Builder::new(&model_path, variant)
        .score_threshold(self.config.score_threshold)
        .labels(vocabulary.clone())
        .build()?;

      self.vocabulary = vocabulary;
      self.backend = match variant {
        YoloVariant::Fp32 => BackendHandle::AlternateFp32(detector),
        YoloVariant::Int8 => BackendHandle::AlternateInt8(detector),
      };
    } else {
      let vocabulary = Arc::new(labels::coco_vocabulary());

      let detector = SsdBuilder::new(&model_path)
        .score_threshold(self.config.score_threshold)
        .max_results(self.config.max_results)
        .num_threads(self.config.num_threads)
        .labels(vocabulary.clone())
        .build()?;

      self.vocabulary = vocabulary;
      self.backend = BackendHandle::Primary(detector);
    }

    Ok(())
  }

  /// 处理一帧
  ///
  /// 只产生副作用: 统一结果或错误都经由监听器上报，
  /// 推理失败不会传播也不会中止会话。
  pub fn detect(&mut self, image: &RgbImage, rotation_degrees: i32) {
    if !self.has_backend() {
      // 惰性初始化，每帧至多一次；失败已上报，本帧放弃
      if self.configure().is_err() {
        return;
      }
    }

    // 主后端走前景提取与旋转归一化，备用后端直接使用原帧
    let prepared = if matches!(self.backend, BackendHandle::Primary(_)) {
      let cleaned = self.foreground.apply(image);
      Some(rotate_to_upright(&cleaned, rotation_degrees))
    } else {
      None
    };

    let is_alternate = matches!(
      self.backend,
      BackendHandle::AlternateFp32(_) | BackendHandle::AlternateInt8(_)
    );

    let started = Instant::now();
    let outcome = match (&self.backend, &prepared) {
      (BackendHandle::Primary(detector), Some(frame)) => detector
        .detect(frame)
        .map(|items| (items, frame.width(), frame.height(), CoordSpace::Pixel))
        .map_err(|e| format!("推理失败: {}", e)),
      (BackendHandle::AlternateFp32(detector), _) | (BackendHandle::AlternateInt8(detector), _) => {
        detector
          .detect(image)
          .map(|items| (items, image.width(), image.height(), CoordSpace::Normalized))
          .map_err(|e| format!("YOLOv8 推理失败: {}", e))
      }
      _ => return,
    };
    let mut inference_time_ms = started.elapsed().as_millis() as u64;
    let fps = self.fps.tick();

    match outcome {
      Ok((items, image_width, image_height, coord_space)) => {
        if is_alternate && items.is_empty() {
          // 备用后端没有检测到目标时仍然上报，保持帧率与界面刷新
          inference_time_ms = 0;
        }

        let batch = DetectionBatch {
          items,
          inference_time_ms,
          fps,
          image_width,
          image_height,
          coord_space,
          labels: self.vocabulary.clone(),
        };
        self.listener.on_results(&batch);
      }
      Err(message) => self.listener.on_error(&message),
    }
  }
}
