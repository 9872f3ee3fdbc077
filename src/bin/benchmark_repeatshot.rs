// 该文件是 Wanglou （望楼） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理基准
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use wanglou::args::Args;
use wanglou::output::LogOutput;
use wanglou::session::DetectSession;
use wanglou::task::{RepeatShotTask, Task};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型目录: {}", args.model_dir.display());
  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);

  let input = wanglou::input::create_input_source(&args.input)?;
  let config = args.detector_config();

  // 命令行的旋转提示覆盖输入源的缺省值
  let rotation = args.rotation;
  let input = input.map(move |frame| {
    frame.map(|mut frame| {
      frame.rotation = rotation;
      frame
    })
  });

  let task = match args.frame_number {
    Some(times) => RepeatShotTask::default().with_times(times),
    None => RepeatShotTask::default(),
  };

  let mut session = DetectSession::new(config, LogOutput);
  task.run_task(input, &mut session)
}
