// 该文件是 InsightX （洞察） 项目的一部分。
// src/gateway.rs - 后端网关定义
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

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::record::{ImageId, ImageRecord, PagedResult};

#[cfg(feature = "http_gateway")]
mod http;
#[cfg(feature = "http_gateway")]
pub use self::http::HttpGateway;

pub mod mock;
pub use self::mock::MockGateway;

/// 列表查询参数，页码从 1 开始
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
  pub page: u32,
  pub limit: u32,
  pub search: String,
}

impl ListQuery {
  pub fn new(page: u32, limit: u32, search: impl Into<String>) -> Self {
    ListQuery {
      page,
      limit,
      search: search.into(),
    }
  }
}

/// 待上传的本地文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
  pub name: String,
  pub mime: String,
  pub data: Bytes,
}

impl UploadFile {
  pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
    UploadFile {
      name: name.into(),
      mime: mime.into(),
      data: data.into(),
    }
  }

  pub fn size(&self) -> u64 {
    self.data.len() as u64
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
  pub sent: u64,
  pub total: u64,
}

impl TransferProgress {
  pub fn fraction(&self) -> f64 {
    if self.total == 0 {
      1.0
    } else {
      (self.sent.min(self.total) as f64) / (self.total as f64)
    }
  }
}

pub type ProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

#[derive(Error, Debug)]
pub enum GatewayError {
  #[error("图像 {0} 不存在")]
  NotFound(ImageId),
  #[cfg(feature = "http_gateway")]
  #[error("HTTP 请求错误: {0}")]
  Http(#[from] reqwest::Error),
  #[error("后端返回状态码 {status}: {body}")]
  Status { status: u16, body: String },
  #[error("无法解析后端响应: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的请求地址: {0}")]
  InvalidUrl(#[from] url::ParseError),
}

impl GatewayError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, GatewayError::NotFound(_))
  }
}

/// 后端网关。所有操作都可能因传输失败而出错，调用方负责提示用户。
pub trait Gateway: Send + Sync {
  fn list(&self, query: &ListQuery) -> impl Future<Output = Result<PagedResult, GatewayError>> + Send;

  fn get_by_id(&self, id: ImageId) -> impl Future<Output = Result<ImageRecord, GatewayError>> + Send;

  fn create(
    &self,
    file: UploadFile,
    on_progress: ProgressFn,
  ) -> impl Future<Output = Result<ImageRecord, GatewayError>> + Send;

  fn delete_by_id(&self, id: ImageId) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

pub enum GatewayWrapper {
  #[cfg(feature = "http_gateway")]
  Http(HttpGateway),
  Mock(MockGateway),
}

impl FromUrl for GatewayWrapper {
  type Error = GatewayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    match url.scheme() {
      #[cfg(feature = "http_gateway")]
      "http" | "https" => Ok(GatewayWrapper::Http(HttpGateway::from_url(url)?)),
      MockGateway::SCHEME => Ok(GatewayWrapper::Mock(MockGateway::from_url(url)?)),
      _ => Err(GatewayError::SchemeMismatch),
    }
  }
}

impl GatewayWrapper {
  pub fn is_mock(&self) -> bool {
    matches!(self, GatewayWrapper::Mock(_))
  }
}

impl Gateway for GatewayWrapper {
  async fn list(&self, query: &ListQuery) -> Result<PagedResult, GatewayError> {
    match self {
      #[cfg(feature = "http_gateway")]
      GatewayWrapper::Http(gateway) => gateway.list(query).await,
      GatewayWrapper::Mock(gateway) => gateway.list(query).await,
    }
  }

  async fn get_by_id(&self, id: ImageId) -> Result<ImageRecord, GatewayError> {
    match self {
      #[cfg(feature = "http_gateway")]
      GatewayWrapper::Http(gateway) => gateway.get_by_id(id).await,
      GatewayWrapper::Mock(gateway) => gateway.get_by_id(id).await,
    }
  }

  async fn create(&self, file: UploadFile, on_progress: ProgressFn) -> Result<ImageRecord, GatewayError> {
    match self {
      #[cfg(feature = "http_gateway")]
      GatewayWrapper::Http(gateway) => gateway.create(file, on_progress).await,
      GatewayWrapper::Mock(gateway) => gateway.create(file, on_progress).await,
    }
  }

  async fn delete_by_id(&self, id: ImageId) -> Result<(), GatewayError> {
    match self {
      #[cfg(feature = "http_gateway")]
      GatewayWrapper::Http(gateway) => gateway.delete_by_id(id).await,
      GatewayWrapper::Mock(gateway) => gateway.delete_by_id(id).await,
    }
  }
}
