// 该文件是 InsightX （洞察） 项目的一部分。
// src/detail.rs - 单图详情视图
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

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::gateway::{Gateway, GatewayError};
use crate::notice::{Notice, NoticeSink};
use crate::record::{ImageId, ImageRecord};
use crate::refresh::{Reconcile, RefreshController, RefreshOutcome};

#[derive(Error, Debug)]
pub enum DetailError {
  #[error("没有已打开的图像")]
  NothingOpen,
  #[error("网关错误: {0}")]
  Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailState {
  Closed,
  Loading(ImageId),
  Loaded(ImageRecord),
  /// 记录不存在或加载失败，界面提供返回列表的入口
  NotFound(ImageId),
}

pub struct DetailView<G> {
  gateway: Arc<G>,
  state: Mutex<DetailState>,
  notices: Arc<dyn NoticeSink>,
}

impl<G: Gateway> DetailView<G> {
  pub fn new(gateway: Arc<G>, notices: Arc<dyn NoticeSink>) -> Self {
    DetailView {
      gateway,
      state: Mutex::new(DetailState::Closed),
      notices,
    }
  }

  pub async fn open(&self, id: ImageId) -> Result<ImageRecord, DetailError> {
    *self.state.lock() = DetailState::Loading(id);
    info!(image_id = %id, "打开图像详情");

    let result = self.gateway.get_by_id(id).await;

    let mut state = self.state.lock();
    // 加载期间可能已经切换到别的记录
    if *state != DetailState::Loading(id) {
      return Ok(result?);
    }
    match &result {
      Ok(record) => *state = DetailState::Loaded(record.clone()),
      Err(e) => {
        warn!(image_id = %id, "加载图像详情失败: {}", e);
        *state = DetailState::NotFound(id);
        drop(state);
        self
          .notices
          .notify(Notice::error("Failed to load image details. Please try again."));
      }
    }
    Ok(result?)
  }

  /// 手动刷新当前记录，失败时保留原来的内容
  pub async fn refresh(&self, refresher: &RefreshController<G>) -> Result<RefreshOutcome, DetailError> {
    let id = self.current_id().ok_or(DetailError::NothingOpen)?;
    Ok(refresher.refresh(id, &[self as &dyn Reconcile]).await?)
  }
}

impl<G> DetailView<G> {
  pub fn close(&self) {
    *self.state.lock() = DetailState::Closed;
  }

  pub fn state(&self) -> DetailState {
    self.state.lock().clone()
  }

  pub fn current_id(&self) -> Option<ImageId> {
    match &*self.state.lock() {
      DetailState::Loaded(record) => Some(record.id),
      _ => None,
    }
  }

  pub fn is_refreshing(&self, refresher: &RefreshController<G>) -> bool {
    self
      .current_id()
      .is_some_and(|id| refresher.is_in_flight(id))
  }
}

impl<G: Send + Sync> Reconcile for DetailView<G> {
  fn reconcile_one(&self, record: &ImageRecord) -> bool {
    let mut state = self.state.lock();
    match &mut *state {
      DetailState::Loaded(current) if current.id == record.id => {
        *current = record.clone();
        true
      }
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::gateway::{MockGateway, ProgressFn, TransferProgress, UploadFile};
  use crate::notice::NoticeBoard;
  use crate::record::timestamp;
  use std::time::Duration;

  fn setup() -> (Arc<MockGateway>, ManualClock, NoticeBoard) {
    let clock = ManualClock::starting_at(timestamp::parse("2025-06-01T00:00:00").unwrap());
    let gateway = MockGateway::new(Arc::new(clock.clone())).with_latency(Duration::ZERO);
    (Arc::new(gateway), clock, NoticeBoard::new())
  }

  #[tokio::test]
  async fn missing_record_shows_not_found() {
    let (gateway, _, board) = setup();
    let detail = DetailView::new(gateway, Arc::new(board.clone()));

    assert!(matches!(
      detail.open(ImageId(999)).await,
      Err(DetailError::Gateway(e)) if e.is_not_found()
    ));
    assert_eq!(detail.state(), DetailState::NotFound(ImageId(999)));
    assert!(board.drain()[0].is_error());
  }

  #[tokio::test]
  async fn refresh_observes_processing_completion() {
    let (gateway, clock, board) = setup();
    let progress: ProgressFn = Arc::new(|_: TransferProgress| {});
    let created = gateway
      .create(UploadFile::new("new.png", "image/png", vec![7u8; 32]), progress)
      .await
      .unwrap();

    let notices: Arc<dyn NoticeSink> = Arc::new(board.clone());
    let detail = DetailView::new(gateway.clone(), notices.clone());
    let refresher = RefreshController::new(gateway.clone(), notices);

    detail.open(created.id).await.unwrap();
    assert!(matches!(detail.state(), DetailState::Loaded(r) if !r.is_processed));

    clock.advance(Duration::from_secs(5));
    detail.refresh(&refresher).await.unwrap();

    match detail.state() {
      DetailState::Loaded(record) => {
        assert!(record.is_processed);
        assert!(!record.detected_objects.is_empty());
      }
      other => panic!("unexpected state {other:?}"),
    }
    assert!(!detail.is_refreshing(&refresher));
  }

  #[tokio::test]
  async fn failed_refresh_keeps_previous_record() {
    let (gateway, _, board) = setup();
    let notices: Arc<dyn NoticeSink> = Arc::new(board.clone());
    let detail = DetailView::new(gateway.clone(), notices.clone());
    let refresher = RefreshController::new(gateway.clone(), notices);

    let before = detail.open(ImageId(4)).await.unwrap();
    gateway.delete_by_id(ImageId(4)).await.unwrap();

    assert!(matches!(
      detail.refresh(&refresher).await,
      Err(DetailError::Gateway(_))
    ));
    assert_eq!(detail.state(), DetailState::Loaded(before));
  }

  #[test]
  fn reconcile_ignores_other_records() {
    let (gateway, _, board) = setup();
    let detail = DetailView::new(gateway, Arc::new(board));
    let record = ImageRecord {
      id: ImageId(1),
      name: "city_street.jpg".to_string(),
      is_processed: false,
      is_nsfw: false,
      input_image_url: String::new(),
      output_image_url: String::new(),
      detected_objects: Vec::new(),
      detected_nsfw: Vec::new(),
      created_at: timestamp::parse("2025-05-01T00:00:00").unwrap(),
      updated_at: timestamp::parse("2025-05-01T00:00:00").unwrap(),
    };

    assert!(!detail.reconcile_one(&record));
    assert_eq!(detail.state(), DetailState::Closed);
    assert!(detail.current_id().is_none());
  }
}
