// 该文件是 Wanglou （望楼） 项目的一部分。
// src/task.rs - 任务驱动
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

use std::{thread, time::Duration};

use tracing::{info, warn};

use crate::input::Frame;
use crate::session::{DetectSession, DetectorListener};

/// 任务: 把输入源的帧送入检测调度器
pub trait Task<I, L>: Sized {
  type Error;
  fn run_task(self, input: I, session: &mut DetectSession<L>) -> Result<(), Self::Error>;
}

/// 单帧任务
pub struct OneShotTask;

impl<I: Iterator<Item = anyhow::Result<Frame>>, L: DetectorListener> Task<I, L> for OneShotTask {
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, session: &mut DetectSession<L>) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功, 开始推理...");

    let now = std::time::Instant::now();
    session.detect(&frame.image, frame.rotation);
    info!("单帧处理完成, 耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 重复推理基准任务: 同一帧重复处理并统计平均耗时
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    if times > 0 {
      self.times = times;
    }
    self
  }
}

impl<I: Iterator<Item = anyhow::Result<Frame>>, L: DetectorListener> Task<I, L> for RepeatShotTask {
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, session: &mut DetectSession<L>) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功, 开始推理...");

    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = std::time::Instant::now();
      session.detect(&frame.image, frame.rotation);
      let elapsed = now.elapsed();
      info!("({})处理完成, 耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
    }

    if times.len() > 2 {
      // 跳过前两次预热
      warn!(
        "平均处理时间: {:.2?}",
        times.iter().skip(2).sum::<Duration>() / (times.len() - 2) as u32
      );
    }

    Ok(())
  }
}

/// 连续任务: 循环处理输入源的帧，支持帧数上限与 Ctrl-C 中断
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<I: Iterator<Item = anyhow::Result<Frame>>, L: DetectorListener> Task<I, L> for ContinuousTask {
  type Error = anyhow::Error;

  fn run_task(self, input: I, session: &mut DetectSession<L>) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号, 准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .expect("Error setting Ctrl-C handler");

    let mut frame_index = 0usize;
    let mut now = std::time::Instant::now();
    for frame in input {
      let frame = frame?;
      frame_index = (frame_index + 1) % usize::MAX;
      info!("处理第 {} 帧图像", frame_index);

      session.detect(&frame.image, frame.rotation);
      let elapsed = now.elapsed();
      now = std::time::Instant::now();
      info!("帧处理完成, 耗时: {:.2?}", elapsed);

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收, 退出任务循环");
        break;
      }
    }

    info!("任务完成, 退出");
    Ok(())
  }
}
