// 该文件是 Wanglou （望楼） 项目的一部分。
// tests/session_lifecycle.rs - 检测调度生命周期测试
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

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::RgbImage;

use wanglou::config::{Delegate, DetectorConfig, ModelKind};
use wanglou::model::DetectionBatch;
use wanglou::session::{AcceleratorProbe, DetectSession, DetectorListener, InitError};

/// 记录监听器: 收集错误与结果供断言使用
#[derive(Clone, Default)]
struct RecordingListener {
  errors: Arc<Mutex<Vec<String>>>,
  batches: Arc<Mutex<usize>>,
}

impl RecordingListener {
  fn errors(&self) -> Vec<String> {
    self.errors.lock().unwrap().clone()
  }

  fn batch_count(&self) -> usize {
    *self.batches.lock().unwrap()
  }
}

impl DetectorListener for RecordingListener {
  fn on_error(&self, message: &str) {
    self.errors.lock().unwrap().push(message.to_string());
  }

  fn on_results(&self, _batch: &DetectionBatch) {
    *self.batches.lock().unwrap() += 1;
  }
}

struct GpuProbe(bool);

impl AcceleratorProbe for GpuProbe {
  fn gpu_supported(&self) -> bool {
    self.0
  }
}

/// 指向一个空目录的配置, 所有模型文件都不存在
fn empty_model_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(name);
  let _ = std::fs::remove_dir_all(&dir);
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn config_for(model: ModelKind, dir: &str) -> DetectorConfig {
  DetectorConfig {
    model,
    model_dir: empty_model_dir(dir),
    ..DetectorConfig::default()
  }
}

#[test]
fn failed_configure_reports_and_leaves_no_backend() {
  let listener = RecordingListener::default();
  let config = config_for(ModelKind::MobileNetV1, "wanglou_cfg_fail");
  let mut session = DetectSession::new(config, listener.clone());

  assert!(session.configure().is_err());
  assert!(!session.has_backend());

  let errors = listener.errors();
  assert_eq!(errors.len(), 1);
  assert!(errors[0].contains("检测后端初始化失败"));
}

#[test]
fn detect_without_backend_retries_configure_each_frame() {
  let listener = RecordingListener::default();
  let config = config_for(ModelKind::MobileNetV1, "wanglou_lazy_retry");
  let mut session = DetectSession::new(config, listener.clone());

  let frame = RgbImage::new(100, 100);

  // 每次 detect 恰好一次初始化尝试, 失败后放弃该帧
  session.detect(&frame, 0);
  assert_eq!(listener.errors().len(), 1);
  assert_eq!(listener.batch_count(), 0);

  session.detect(&frame, 0);
  assert_eq!(listener.errors().len(), 2);
  assert_eq!(listener.batch_count(), 0);
}

#[test]
fn gpu_request_without_support_notifies_and_downgrades() {
  let listener = RecordingListener::default();
  let config = DetectorConfig {
    delegate: Delegate::Gpu,
    model_dir: empty_model_dir("wanglou_gpu_fallback"),
    ..DetectorConfig::default()
  };
  let mut session =
    DetectSession::new(config, listener.clone()).with_probe(Box::new(GpuProbe(false)));

  // 初始化仍会因缺少模型文件失败, 但第一条通知必须是 GPU 降级
  let _ = session.configure();

  let errors = listener.errors();
  assert!(errors.len() >= 2);
  assert!(errors[0].contains("GPU"));
  assert!(errors[0].contains("回退"));
}

#[test]
fn supported_gpu_produces_no_downgrade_notice() {
  let listener = RecordingListener::default();
  let config = DetectorConfig {
    delegate: Delegate::Gpu,
    model_dir: empty_model_dir("wanglou_gpu_ok"),
    ..DetectorConfig::default()
  };
  let mut session =
    DetectSession::new(config, listener.clone()).with_probe(Box::new(GpuProbe(true)));

  let _ = session.configure();

  let errors = listener.errors();
  assert!(errors.iter().all(|e| !e.contains("GPU")));
}

#[test]
fn missing_labels_fail_yolo_configuration_first() {
  let listener = RecordingListener::default();
  let config = config_for(ModelKind::YoloV8, "wanglou_yolo_labels");
  let mut session = DetectSession::new(config, listener.clone());

  // 标签文件不存在, YOLO 路径在加载模型之前就失败
  match session.configure() {
    Err(InitError::Labels(_)) => {}
    other => panic!("预期标签加载失败, 实际 {:?}", other.err()),
  }
  assert!(!session.has_backend());
}

#[test]
fn present_labels_move_failure_to_model_loading() {
  let listener = RecordingListener::default();
  let dir = empty_model_dir("wanglou_yolo_model");
  let mut file = std::fs::File::create(dir.join("labels.txt")).unwrap();
  writeln!(file, "person\nbicycle").unwrap();

  let config = DetectorConfig {
    model: ModelKind::YoloV8,
    model_dir: dir,
    ..DetectorConfig::default()
  };
  let mut session = DetectSession::new(config, listener.clone());

  match session.configure() {
    Err(InitError::Alternate(_)) => {}
    other => panic!("预期模型加载失败, 实际 {:?}", other.err()),
  }
}

#[test]
fn switching_model_kind_clears_yolo_flags() {
  let listener = RecordingListener::default();
  let config = config_for(ModelKind::YoloV8Int8, "wanglou_switch");
  let mut session = DetectSession::new(config, listener.clone());

  let _ = session.configure();
  assert!(!session.is_using_yolov8());
  assert!(!session.is_using_yolov8_int8());

  // 切回主模型: 旧句柄销毁, YOLO 标志保持复位
  let ssd_config = DetectorConfig {
    model: ModelKind::MobileNetV1,
    model_dir: empty_model_dir("wanglou_switch"),
    ..DetectorConfig::default()
  };
  let _ = session.update_config(ssd_config);
  assert!(!session.is_using_yolov8());
  assert!(!session.is_using_yolov8_int8());
  assert_eq!(session.config().model, ModelKind::MobileNetV1);
}

#[test]
fn clear_backend_is_idempotent() {
  let listener = RecordingListener::default();
  let config = config_for(ModelKind::MobileNetV1, "wanglou_clear");
  let mut session = DetectSession::new(config, listener);

  session.clear_backend();
  assert!(!session.has_backend());
  session.clear_backend();
  assert!(!session.has_backend());
}

#[test]
fn default_config_matches_demo_settings() {
  let config = DetectorConfig::default();
  assert_eq!(config.delegate, Delegate::Cpu);
  assert_eq!(config.model, ModelKind::MobileNetV1);
  assert_eq!(config.max_results, 3);
  assert!((config.score_threshold - 0.5).abs() < f32::EPSILON);
}
