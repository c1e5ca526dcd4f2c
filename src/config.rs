// 该文件是 InsightX （洞察） 项目的一部分。
// src/config.rs - 运行配置
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

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::FromUrlWithScheme;
use crate::gateway::MockGateway;
use crate::gateway::mock::{DEFAULT_LATENCY, DEFAULT_PROCESSING_DELAY};

const API_URL_VARS: [&str; 2] = ["INSIGHTX_API_URL", "NEXT_PUBLIC_API_URL"];
const MOCK_LATENCY_VAR: &str = "INSIGHTX_MOCK_LATENCY_MS";
const MOCK_PROCESSING_VAR: &str = "INSIGHTX_MOCK_PROCESSING_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("环境变量 {var} 不是合法的 URL: {source}")]
  InvalidUrl {
    var: &'static str,
    source: url::ParseError,
  },
  #[error("环境变量 {var} 不是合法的毫秒数: {value}")]
  InvalidMillis { var: &'static str, value: String },
}

/// 进程启动时构造一次，之后只读。
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  /// 后端 API 基础地址，缺省时使用内存模拟后端
  pub api_url: Option<Url>,
  /// 模拟后端每次请求的延迟
  pub mock_latency: Duration,
  /// 模拟后端完成处理所需的时间
  pub mock_processing: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      api_url: None,
      mock_latency: DEFAULT_LATENCY,
      mock_processing: DEFAULT_PROCESSING_DELAY,
    }
  }
}

impl Config {
  /// 从环境变量（以及 `.env` 文件）读取配置。
  ///
  /// - `INSIGHTX_API_URL`（或 `NEXT_PUBLIC_API_URL`）: 后端地址
  /// - `INSIGHTX_MOCK_LATENCY_MS`: 模拟请求延迟，默认 500
  /// - `INSIGHTX_MOCK_PROCESSING_MS`: 模拟处理耗时，默认 5000
  pub fn from_env() -> Result<Self, ConfigError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Config::default();

    for var in API_URL_VARS {
      if let Some(raw) = lookup(var).filter(|v| !v.trim().is_empty()) {
        let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { var, source })?;
        config.set_gateway_url(&url);
        break;
      }
    }

    if let Some(raw) = lookup(MOCK_LATENCY_VAR) {
      config.mock_latency = parse_millis(MOCK_LATENCY_VAR, &raw)?;
    }
    if let Some(raw) = lookup(MOCK_PROCESSING_VAR) {
      config.mock_processing = parse_millis(MOCK_PROCESSING_VAR, &raw)?;
    }

    Ok(config)
  }

  /// 指定网关地址。`mock://` 地址选择模拟后端，其中的 `latency_ms` 与
  /// `processing_ms` 写入模拟后端的时间设置。
  pub fn set_gateway_url(&mut self, url: &Url) {
    if url.scheme() != MockGateway::SCHEME {
      self.api_url = Some(url.clone());
      return;
    }
    self.api_url = None;
    for (k, v) in url.query_pairs() {
      let Ok(millis) = v.parse::<u64>() else {
        continue;
      };
      match k.as_ref() {
        "latency_ms" => self.mock_latency = Duration::from_millis(millis),
        "processing_ms" => self.mock_processing = Duration::from_millis(millis),
        _ => {}
      }
    }
  }

  /// 网关地址: 配置了后端时使用后端地址，否则为 `mock://local`。
  pub fn gateway_url(&self) -> Url {
    match &self.api_url {
      Some(url) => url.clone(),
      None => {
        let mut url = Url::parse("mock://local").expect("内置的模拟后端地址必须合法");
        url
          .query_pairs_mut()
          .append_pair("latency_ms", &self.mock_latency.as_millis().to_string())
          .append_pair("processing_ms", &self.mock_processing.as_millis().to_string());
        url
      }
    }
  }
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
  raw
    .trim()
    .parse::<u64>()
    .map(Duration::from_millis)
    .map_err(|_| ConfigError::InvalidMillis {
      var,
      value: raw.to_string(),
    })
}
