// 该文件是 InsightX （洞察） 项目的一部分。
// src/args.rs - 命令行参数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use url::Url;

use insightx::config::Config;
use insightx::list::{DEFAULT_LIMIT, SortField};
use insightx::record::ImageId;

/// InsightX 图像分析控制台
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后端 API 地址，例如 http://localhost:8000 ，mock://local 表示内存模拟后端
  /// （可带 latency_ms、processing_ms 参数，--mock-* 选项优先）
  /// 未指定时读取 INSIGHTX_API_URL / NEXT_PUBLIC_API_URL
  #[arg(long, global = true, value_name = "URL")]
  pub api: Option<Url>,

  /// 模拟后端每次请求的延迟（毫秒）
  #[arg(long, global = true, value_name = "MILLIS")]
  pub mock_latency_ms: Option<u64>,

  /// 模拟后端完成处理所需的时间（毫秒）
  #[arg(long, global = true, value_name = "MILLIS")]
  pub mock_processing_ms: Option<u64>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 分页列出图像
  List {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: u32,
    /// 按文件名搜索（不区分大小写）
    #[arg(long, default_value = "")]
    search: String,
    /// 排序字段: id, name, status, nsfw, date, updated
    #[arg(long, value_name = "FIELD")]
    sort: Option<SortField>,
    /// 降序排列
    #[arg(long)]
    desc: bool,
    /// 以卡片形式显示
    #[arg(long)]
    cards: bool,
  },
  /// 显示单张图像的详情
  Show { id: ImageId },
  /// 重新获取若干图像的处理结果
  Refresh {
    #[arg(required = true)]
    ids: Vec<ImageId>,
  },
  /// 上传图像文件（JPG、JPEG、PNG、WEBP，单个不超过 10MB）
  Upload {
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
    /// 单文件模式
    #[arg(long)]
    single: bool,
  },
  /// 删除一张图像
  Delete { id: ImageId },
  /// 交互式会话
  Session {
    /// 单文件上传模式：放入文件即上传，成功提示 2 秒后自动清除
    #[arg(long)]
    single: bool,
  },
}

impl Args {
  /// 命令行参数覆盖环境变量中的配置
  pub fn apply(&self, mut config: Config) -> Config {
    if let Some(api) = &self.api {
      config.set_gateway_url(api);
    }
    if let Some(millis) = self.mock_latency_ms {
      config.mock_latency = Duration::from_millis(millis);
    }
    if let Some(millis) = self.mock_processing_ms {
      config.mock_processing = Duration::from_millis(millis);
    }
    config
  }
}
