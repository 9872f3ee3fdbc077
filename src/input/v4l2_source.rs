// 该文件是 Wanglou （望楼） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
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

use std::pin::Pin;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{info, warn};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{Frame, InputSource, InputSourceType};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;

/// 摄像头像素格式
#[derive(Clone, Copy)]
enum PixelFormat {
  Yuyv,
  Mjpg,
}

/// V4L2 摄像头输入源
///
/// 优先请求 YUYV 格式；驱动只支持 MJPG 时退回 JPEG 解码。
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct V4l2Source {
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  device: Pin<Box<Device>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  format: PixelFormat,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl V4l2Source {
  pub fn new(device_path: &str) -> Result<Self> {
    let device = Box::pin(
      Device::with_path(device_path).with_context(|| format!("无法打开设备: {}", device_path))?,
    );

    // 请求 YUYV；驱动可能改写格式，按协商结果处理
    let mut format = device.format()?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;

    let pixel_format = match &format.fourcc.repr {
      b"YUYV" => PixelFormat::Yuyv,
      b"MJPG" => {
        warn!("设备不支持 YUYV, 使用 MJPG 解码");
        PixelFormat::Mjpg
      }
      other => {
        anyhow::bail!(
          "设备像素格式不受支持: {}",
          String::from_utf8_lossy(other)
        );
      }
    };

    info!(
      "摄像头格式协商完成: {}x{} {}",
      format.width, format.height, format.fourcc
    );

    let mut source = Self {
      device,
      stream: None,
      format: pixel_format,
      frame_index: 0,
      width: format.width,
      height: format.height,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定，不会移动，所以引用始终有效。
    // stream 存储在同一个结构体中，并在 Drop 里先于 device 释放。
    let device_ref: &Device = &source.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)
        .context("无法创建捕获流")?
    };

    source.stream = Some(stream);
    Ok(source)
  }

}

fn decode_frame(buffer: &[u8], format: PixelFormat, width: u32, height: u32) -> Result<RgbImage> {
  match format {
    PixelFormat::Yuyv => {
      let rgb = yuyv_to_rgb(buffer, width, height);
      RgbImage::from_raw(width, height, rgb).ok_or_else(|| anyhow::anyhow!("无法创建 RGB 图像"))
    }
    PixelFormat::Mjpg => Ok(
      image::load_from_memory_with_format(buffer, image::ImageFormat::Jpeg)
        .context("MJPG 帧解码失败")?
        .to_rgb8(),
    ),
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
  }
}

impl Iterator for V4l2Source {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    let format = self.format;
    let (width, height) = (self.width, self.height);
    let stream = self.stream.as_mut()?;

    let image = match stream.next() {
      Ok((buffer, _meta)) => decode_frame(buffer, format, width, height),
      Err(e) => Err(anyhow::anyhow!("无法捕获帧: {}", e)),
    };

    Some(image.map(|image| {
      let frame = Frame {
        image,
        index: self.frame_index,
        timestamp_ms: self.start_time.elapsed().as_millis() as u64,
        rotation: 0,
      };
      self.frame_index += 1;
      frame
    }))
  }
}

impl InputSource for V4l2Source {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::V4l2
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(30.0) // V4L2 默认帧率
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let mut rgb = Vec::with_capacity((width * height * 3) as usize);

  for chunk in yuyv.chunks(4) {
    if chunk.len() < 4 {
      break;
    }

    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_gray_maps_to_gray() {
    // 两个像素的中性灰: Y=128, U=V=128
    let yuyv = [128u8, 128, 128, 128];
    let rgb = yuyv_to_rgb(&yuyv, 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
  }

  #[test]
  fn yuyv_truncated_chunk_is_dropped() {
    let yuyv = [128u8, 128, 128, 128, 64, 64];
    let rgb = yuyv_to_rgb(&yuyv, 2, 1);
    // 不完整的尾部数据被丢弃
    assert_eq!(rgb.len(), 6);
  }
}
