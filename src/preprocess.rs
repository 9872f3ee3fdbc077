// 该文件是 Wanglou （望楼） 项目的一部分。
// src/preprocess.rs - 前景提取与旋转归一化
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

use image::{GrayImage, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use tracing::{debug, warn};

/// 背景模型学习率
const LEARNING_RATE: f32 = 0.02;
/// 前景判定阈值（平方距离与方差之比）
const VAR_THRESHOLD: f32 = 16.0;
/// 方差下限，防止静止场景把噪声判为前景
const MIN_VARIANCE: f32 = 4.0;
/// 新像素的初始方差
const INIT_VARIANCE: f32 = 225.0;

/// 前景提取器
///
/// 对每个像素维护灰度均值与方差的运行统计（单高斯背景模型），
/// 偏离背景统计的像素视为前景。掩码经形态学开运算去噪后与原帧按位与，
/// 得到只保留运动内容的帧。
pub struct ForegroundExtractor {
  mean: Vec<f32>,
  variance: Vec<f32>,
  width: u32,
  height: u32,
}

impl ForegroundExtractor {
  pub fn new() -> Self {
    Self {
      mean: Vec::new(),
      variance: Vec::new(),
      width: 0,
      height: 0,
    }
  }

  /// 丢弃已有背景统计，下一帧重新初始化
  pub fn reset(&mut self) {
    self.mean.clear();
    self.variance.clear();
    self.width = 0;
    self.height = 0;
  }

  /// 更新背景模型并返回清理后的帧
  pub fn apply(&mut self, image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let gray = grayscale(image);

    if self.mean.is_empty() || self.width != width || self.height != height {
      // 第一帧用于初始化背景统计，直接透传
      debug!("初始化背景模型: {}x{}", width, height);
      self.width = width;
      self.height = height;
      self.mean = gray;
      self.variance = vec![INIT_VARIANCE; (width * height) as usize];
      return image.clone();
    }

    let mut mask_data = vec![0u8; (width * height) as usize];
    for (i, &value) in gray.iter().enumerate() {
      let diff = value - self.mean[i];
      if diff * diff > VAR_THRESHOLD * self.variance[i] {
        mask_data[i] = 255;
      }

      self.mean[i] += LEARNING_RATE * diff;
      self.variance[i] =
        (self.variance[i] + LEARNING_RATE * (diff * diff - self.variance[i])).max(MIN_VARIANCE);
    }

    let mask = GrayImage::from_raw(width, height, mask_data)
      .expect("掩码尺寸与帧一致");

    // 开运算去掉孤立噪点
    let mask = imageproc::morphology::open(&mask, Norm::LInf, 1);

    // 掩码与原帧按位与，背景置零
    let mut cleaned = image.clone();
    for (x, y, pixel) in cleaned.enumerate_pixels_mut() {
      if mask.get_pixel(x, y)[0] == 0 {
        *pixel = Rgb([0, 0, 0]);
      }
    }

    cleaned
  }
}

impl Default for ForegroundExtractor {
  fn default() -> Self {
    Self::new()
  }
}

fn grayscale(image: &RgbImage) -> Vec<f32> {
  image
    .pixels()
    .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
    .collect()
}

/// 按旋转提示把帧转回正向；只处理 90 度的倍数
pub fn rotate_to_upright(image: &RgbImage, rotation_degrees: i32) -> RgbImage {
  match rotation_degrees.rem_euclid(360) {
    0 => image.clone(),
    90 => image::imageops::rotate90(image),
    180 => image::imageops::rotate180(image),
    270 => image::imageops::rotate270(image),
    other => {
      warn!("旋转角度 {} 不是 90 的倍数, 跳过旋转", other);
      image.clone()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn flat_frame(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
  }

  #[test]
  fn first_frame_passes_through() {
    let mut extractor = ForegroundExtractor::new();
    let frame = flat_frame(16, 16, 128);
    let cleaned = extractor.apply(&frame);
    assert_eq!(cleaned, frame);
  }

  #[test]
  fn static_scene_is_masked_out() {
    let mut extractor = ForegroundExtractor::new();
    let frame = flat_frame(16, 16, 128);
    extractor.apply(&frame);
    let cleaned = extractor.apply(&frame);

    // 没有运动，整帧被判为背景并置零
    assert!(cleaned.pixels().all(|p| p[0] == 0 && p[1] == 0 && p[2] == 0));
  }

  #[test]
  fn moving_block_survives_masking() {
    let mut extractor = ForegroundExtractor::new();
    let background = flat_frame(32, 32, 64);
    extractor.apply(&background);

    // 第二帧中出现一个亮块
    let mut frame = background.clone();
    for y in 8..20 {
      for x in 8..20 {
        frame.put_pixel(x, y, Rgb([250, 250, 250]));
      }
    }
    let cleaned = extractor.apply(&frame);

    // 块的内部保留原值，远处背景被置零
    assert_eq!(*cleaned.get_pixel(14, 14), Rgb([250, 250, 250]));
    assert_eq!(*cleaned.get_pixel(28, 28), Rgb([0, 0, 0]));
  }

  #[test]
  fn isolated_speckle_is_removed_by_opening() {
    let mut extractor = ForegroundExtractor::new();
    let background = flat_frame(32, 32, 64);
    extractor.apply(&background);

    // 单像素噪点
    let mut frame = background.clone();
    frame.put_pixel(5, 5, Rgb([255, 255, 255]));
    let cleaned = extractor.apply(&frame);

    assert_eq!(*cleaned.get_pixel(5, 5), Rgb([0, 0, 0]));
  }

  #[test]
  fn dimension_change_resets_the_model() {
    let mut extractor = ForegroundExtractor::new();
    extractor.apply(&flat_frame(16, 16, 128));

    // 尺寸变化后第一帧重新透传
    let frame = flat_frame(32, 16, 200);
    let cleaned = extractor.apply(&frame);
    assert_eq!(cleaned, frame);
  }

  #[test]
  fn rotation_swaps_dimensions() {
    let mut frame = RgbImage::new(4, 2);
    frame.put_pixel(0, 0, Rgb([255, 0, 0]));

    let rotated = rotate_to_upright(&frame, 90);
    assert_eq!(rotated.dimensions(), (2, 4));

    let rotated = rotate_to_upright(&frame, 270);
    assert_eq!(rotated.dimensions(), (2, 4));

    let rotated = rotate_to_upright(&frame, 180);
    assert_eq!(rotated.dimensions(), (4, 2));
  }

  #[test]
  fn rotation_accepts_negative_multiples() {
    let frame = RgbImage::new(4, 2);
    let rotated = rotate_to_upright(&frame, -90);
    // -90 等价于 270
    assert_eq!(rotated.dimensions(), (2, 4));
  }

  #[test]
  fn non_multiple_rotation_passes_through() {
    let frame = RgbImage::new(4, 2);
    let rotated = rotate_to_upright(&frame, 45);
    assert_eq!(rotated.dimensions(), (4, 2));
  }
}
