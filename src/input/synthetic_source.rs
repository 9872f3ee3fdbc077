// 该文件是 Wanglou （望楼） 项目的一部分。
// src/input/synthetic_source.rs - 合成帧输入源
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

use std::time::Instant;

use anyhow::Result;
use image::{Rgb, RgbImage};

use super::{Frame, InputSource, InputSourceType};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const BACKGROUND_VALUE: u8 = 96;
const BLOCK_SIZE: u32 = 48;

/// 合成帧输入源
///
/// 生成灰色背景上平移的白色方块，基准测试与背景建模都用得上，
/// 不依赖摄像头或图片素材。
pub struct SyntheticSource {
  width: u32,
  height: u32,
  frame_index: u64,
  start_time: Instant,
}

impl SyntheticSource {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      frame_index: 0,
      start_time: Instant::now(),
    }
  }

  /// 解析 "WxH" 形式的尺寸；空串使用默认尺寸
  pub fn parse(spec: &str) -> Result<Self> {
    if spec.is_empty() {
      return Ok(Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));
    }

    let (w, h) = spec
      .split_once('x')
      .ok_or_else(|| anyhow::anyhow!("合成输入源尺寸格式错误: {}", spec))?;
    let width: u32 = w
      .parse()
      .map_err(|_| anyhow::anyhow!("合成输入源宽度无效: {}", w))?;
    let height: u32 = h
      .parse()
      .map_err(|_| anyhow::anyhow!("合成输入源高度无效: {}", h))?;
    if width == 0 || height == 0 {
      anyhow::bail!("合成输入源尺寸不能为 0: {}", spec);
    }

    Ok(Self::new(width, height))
  }

  fn render(&self) -> RgbImage {
    let mut image = RgbImage::from_pixel(
      self.width,
      self.height,
      Rgb([BACKGROUND_VALUE, BACKGROUND_VALUE, BACKGROUND_VALUE]),
    );

    // 方块随帧号平移，制造稳定的运动前景
    let block = BLOCK_SIZE.min(self.width).min(self.height);
    let span_x = (self.width - block).max(1) as u64;
    let span_y = (self.height - block).max(1) as u64;
    let x0 = ((self.frame_index * 7) % span_x) as u32;
    let y0 = ((self.frame_index * 3) % span_y) as u32;

    for y in y0..(y0 + block).min(self.height) {
      for x in x0..(x0 + block).min(self.width) {
        image.put_pixel(x, y, Rgb([255, 255, 255]));
      }
    }

    image
  }
}

impl Iterator for SyntheticSource {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    let frame = Frame {
      image: self.render(),
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
      rotation: 0,
    };

    self.frame_index += 1;
    Some(Ok(frame))
  }
}

impl InputSource for SyntheticSource {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Synthetic
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_are_numbered_sequentially() {
    let mut source = SyntheticSource::new(64, 64);
    let a = source.next().unwrap().unwrap();
    let b = source.next().unwrap().unwrap();
    assert_eq!(a.index, 0);
    assert_eq!(b.index, 1);
    assert_eq!(a.image.dimensions(), (64, 64));
  }

  #[test]
  fn block_moves_between_frames() {
    let mut source = SyntheticSource::new(128, 128);
    let a = source.next().unwrap().unwrap();
    let b = source.next().unwrap().unwrap();
    assert_ne!(a.image.as_raw(), b.image.as_raw());
  }

  #[test]
  fn parse_accepts_dimensions() {
    let source = SyntheticSource::parse("320x240").unwrap();
    assert_eq!((source.width(), source.height()), (320, 240));
  }

  #[test]
  fn parse_empty_uses_defaults() {
    let source = SyntheticSource::parse("").unwrap();
    assert_eq!(
      (source.width(), source.height()),
      (DEFAULT_WIDTH, DEFAULT_HEIGHT)
    );
  }

  #[test]
  fn parse_rejects_bad_specs() {
    assert!(SyntheticSource::parse("640").is_err());
    assert!(SyntheticSource::parse("ax480").is_err());
    assert!(SyntheticSource::parse("0x0").is_err());
  }
}
