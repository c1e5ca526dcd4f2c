// 该文件是 InsightX （洞察） 项目的一部分。
// src/gateway/http.rs - HTTP 后端网关
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

use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Gateway, GatewayError, ListQuery, ProgressFn, TransferProgress, UploadFile};
use crate::record::{ImageId, ImageRecord, PagedResult};
use crate::{FromUrl, FromUrlWithScheme};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// 上传接口可能只返回编号与文件名
#[derive(Debug, Deserialize)]
struct UploadReceipt {
  image_id: ImageId,
  name: String,
}

pub struct HttpGateway {
  client: Client,
  base: String,
}

impl FromUrlWithScheme for HttpGateway {
  const SCHEME: &'static str = "http";
}

impl FromUrl for HttpGateway {
  type Error = GatewayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME && url.scheme() != "https" {
      error!(
        "URI scheme mismatch: expected '{}' or 'https', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GatewayError::SchemeMismatch);
    }

    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let base = url.as_str().trim_end_matches('/').to_string();
    info!("使用后端 API: {}", base);

    Ok(HttpGateway { client, base })
  }
}

impl HttpGateway {
  fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base, path)
  }

  fn list_url(&self, query: &ListQuery) -> Result<Url, GatewayError> {
    let mut url = Url::parse(&self.endpoint("images/list"))?;
    url
      .query_pairs_mut()
      .append_pair("page", &query.page.to_string())
      .append_pair("limit", &query.limit.to_string());
    if !query.search.is_empty() {
      url.query_pairs_mut().append_pair("search", &query.search);
    }
    Ok(url)
  }

  /// 非 2xx 状态转换为错误，404 视为记录不存在。
  async fn check_status(response: Response, id: Option<ImageId>) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    if let (StatusCode::NOT_FOUND, Some(id)) = (status, id) {
      return Err(GatewayError::NotFound(id));
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "后端请求失败: {}", body);
    Err(GatewayError::Status {
      status: status.as_u16(),
      body,
    })
  }
}

impl Gateway for HttpGateway {
  async fn list(&self, query: &ListQuery) -> Result<PagedResult, GatewayError> {
    let url = self.list_url(query)?;
    debug!("GET {}", url);

    let response = self.client.get(url).send().await?;
    let body = Self::check_status(response, None).await?.bytes().await?;
    let mut result: PagedResult = serde_json::from_slice(&body)?;

    if result.items.len() > result.limit as usize {
      warn!(
        received = result.items.len(),
        limit = result.limit,
        "后端返回的条目数超过分页大小，已截断"
      );
      result.items.truncate(result.limit as usize);
    }
    info!(
      page = result.page,
      total = result.total,
      "收到 {} 条图像记录",
      result.items.len()
    );
    Ok(result)
  }

  async fn get_by_id(&self, id: ImageId) -> Result<ImageRecord, GatewayError> {
    let url = self.endpoint(&format!("images/{id}"));
    debug!("GET {}", url);

    let response = self.client.get(&url).send().await?;
    let body = Self::check_status(response, Some(id)).await?.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
  }

  async fn create(&self, file: UploadFile, on_progress: ProgressFn) -> Result<ImageRecord, GatewayError> {
    let url = self.endpoint("images/upload");
    let total = file.size();
    info!(name = %file.name, bytes = total, "上传图像");

    let chunks: Vec<Bytes> = (0..file.data.len())
      .step_by(UPLOAD_CHUNK_SIZE)
      .map(|start| {
        let end = (start + UPLOAD_CHUNK_SIZE).min(file.data.len());
        file.data.slice(start..end)
      })
      .collect();
    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
      sent += chunk.len() as u64;
      on_progress(TransferProgress { sent, total });
      Ok::<Bytes, std::io::Error>(chunk)
    });

    let part = Part::stream_with_length(Body::wrap_stream(stream), total)
      .file_name(file.name.clone())
      .mime_str(&file.mime)?;
    let form = Form::new().part("file", part);

    let response = self.client.post(&url).multipart(form).send().await?;
    let body = Self::check_status(response, None).await?.bytes().await?;

    if let Ok(record) = serde_json::from_slice::<ImageRecord>(&body) {
      return Ok(record);
    }
    let receipt: UploadReceipt = serde_json::from_slice(&body)?;
    debug!(
      image_id = %receipt.image_id,
      name = %receipt.name,
      "上传接口只返回了编号，重新获取完整记录"
    );
    self.get_by_id(receipt.image_id).await
  }

  async fn delete_by_id(&self, id: ImageId) -> Result<(), GatewayError> {
    let url = self.endpoint(&format!("images/{id}"));
    info!(image_id = %id, "删除图像");

    let response = self.client.delete(&url).send().await?;
    Self::check_status(response, Some(id)).await?;
    Ok(())
  }
}
