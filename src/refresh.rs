// 该文件是 InsightX （洞察） 项目的一部分。
// src/refresh.rs - 单条记录刷新
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

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, GatewayError};
use crate::notice::{Notice, NoticeSink};
use crate::record::{ImageId, ImageRecord};

/// 用新取回的记录原地替换本地副本
pub trait Reconcile: Send + Sync {
  /// 返回是否找到并替换了对应记录
  fn reconcile_one(&self, record: &ImageRecord) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
  Applied(ImageRecord),
  /// 同一记录有更新的刷新请求，本次结果被丢弃
  Superseded,
}

#[derive(Debug, Default)]
struct InFlight {
  outstanding: u32,
  latest: u64,
}

#[derive(Default)]
struct RefreshState {
  in_flight: HashMap<ImageId, InFlight>,
  issued: u64,
}

pub struct RefreshController<G> {
  gateway: Arc<G>,
  state: Mutex<RefreshState>,
  notices: Arc<dyn NoticeSink>,
}

impl<G: Gateway> RefreshController<G> {
  pub fn new(gateway: Arc<G>, notices: Arc<dyn NoticeSink>) -> Self {
    RefreshController {
      gateway,
      state: Mutex::new(RefreshState::default()),
      notices,
    }
  }

  /// 重新获取一条记录并同步到各个视图。
  ///
  /// 同一编号的多次刷新各自发出请求，只有最后发出的那次会被应用。
  /// 失败不会重试，视图保持原样。
  pub async fn refresh(&self, id: ImageId, targets: &[&dyn Reconcile]) -> Result<RefreshOutcome, GatewayError> {
    let ticket = {
      let mut state = self.state.lock();
      state.issued += 1;
      let ticket = state.issued;
      let entry = state.in_flight.entry(id).or_default();
      entry.outstanding += 1;
      entry.latest = ticket;
      ticket
    };
    info!(image_id = %id, ticket, "刷新图像记录");

    let result = self.gateway.get_by_id(id).await;

    let is_latest = {
      let mut state = self.state.lock();
      let mut is_latest = false;
      if let Some(entry) = state.in_flight.get_mut(&id) {
        is_latest = entry.latest == ticket;
        entry.outstanding = entry.outstanding.saturating_sub(1);
        if entry.outstanding == 0 {
          state.in_flight.remove(&id);
        }
      }
      is_latest
    };

    match result {
      Ok(record) if is_latest => {
        let applied = targets
          .iter()
          .filter(|target| target.reconcile_one(&record))
          .count();
        debug!(image_id = %id, applied, "记录已同步");
        self
          .notices
          .notify(Notice::success("Image details refreshed successfully."));
        Ok(RefreshOutcome::Applied(record))
      }
      Ok(_) => {
        debug!(image_id = %id, ticket, "丢弃过期的刷新响应");
        Ok(RefreshOutcome::Superseded)
      }
      Err(e) => {
        warn!(image_id = %id, "刷新图像记录失败: {}", e);
        self
          .notices
          .notify(Notice::error("Failed to refresh image details. Please try again."));
        Err(e)
      }
    }
  }
}

impl<G> RefreshController<G> {
  pub fn is_in_flight(&self, id: ImageId) -> bool {
    self.state.lock().in_flight.contains_key(&id)
  }

  pub fn in_flight(&self) -> Vec<ImageId> {
    let mut ids: Vec<ImageId> = self.state.lock().in_flight.keys().copied().collect();
    ids.sort();
    ids
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gateway::{ListQuery, ProgressFn, UploadFile};
  use crate::notice::NoticeBoard;
  use crate::record::{PagedResult, timestamp};
  use tokio::sync::oneshot;

  /// 每次 get_by_id 都挂起，直到测试给出响应
  #[derive(Default)]
  struct ScriptedGateway {
    replies: Mutex<Vec<oneshot::Sender<Result<ImageRecord, GatewayError>>>>,
  }

  impl ScriptedGateway {
    fn take_replies(&self) -> Vec<oneshot::Sender<Result<ImageRecord, GatewayError>>> {
      std::mem::take(&mut *self.replies.lock())
    }
  }

  impl Gateway for ScriptedGateway {
    async fn list(&self, _query: &ListQuery) -> Result<PagedResult, GatewayError> {
      unimplemented!()
    }

    async fn get_by_id(&self, _id: ImageId) -> Result<ImageRecord, GatewayError> {
      let (tx, rx) = oneshot::channel();
      self.replies.lock().push(tx);
      rx.await.expect("test replies")
    }

    async fn create(&self, _file: UploadFile, _on_progress: ProgressFn) -> Result<ImageRecord, GatewayError> {
      unimplemented!()
    }

    async fn delete_by_id(&self, _id: ImageId) -> Result<(), GatewayError> {
      unimplemented!()
    }
  }

  fn record(id: u64, name: &str) -> ImageRecord {
    let at = timestamp::parse("2025-05-01T00:00:00").unwrap();
    ImageRecord {
      id: ImageId(id),
      name: name.to_string(),
      is_processed: false,
      is_nsfw: false,
      input_image_url: String::new(),
      output_image_url: String::new(),
      detected_objects: Vec::new(),
      detected_nsfw: Vec::new(),
      created_at: at,
      updated_at: at,
    }
  }

  #[derive(Default)]
  struct Recorder {
    seen: Mutex<Vec<ImageRecord>>,
  }

  impl Reconcile for Recorder {
    fn reconcile_one(&self, record: &ImageRecord) -> bool {
      self.seen.lock().push(record.clone());
      true
    }
  }

  #[tokio::test]
  async fn latest_issued_refresh_wins_out_of_order() {
    let gateway = Arc::new(ScriptedGateway::default());
    let board = NoticeBoard::new();
    let refresher = RefreshController::new(gateway.clone(), Arc::new(board.clone()));
    let recorder = Recorder::default();
    let targets: [&dyn Reconcile; 1] = [&recorder];

    let mut first = Box::pin(refresher.refresh(ImageId(1), &targets));
    assert!(futures::poll!(&mut first).is_pending());
    let mut second = Box::pin(refresher.refresh(ImageId(1), &targets));
    assert!(futures::poll!(&mut second).is_pending());
    assert!(refresher.is_in_flight(ImageId(1)));

    let mut replies = gateway.take_replies();
    let fresh = replies.pop().unwrap();
    let stale = replies.pop().unwrap();
    fresh.send(Ok(record(1, "fresh.png"))).ok();
    let second = second.await;
    assert!(refresher.is_in_flight(ImageId(1)));
    stale.send(Ok(record(1, "stale.png"))).ok();
    let first = first.await;

    assert_eq!(first.unwrap(), RefreshOutcome::Superseded);
    assert!(matches!(second.unwrap(), RefreshOutcome::Applied(r) if r.name == "fresh.png"));
    let seen = recorder.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].name, "fresh.png");
    assert!(!refresher.is_in_flight(ImageId(1)));
  }

  #[tokio::test]
  async fn failure_clears_in_flight_and_keeps_views() {
    let gateway = Arc::new(ScriptedGateway::default());
    let board = NoticeBoard::new();
    let refresher = RefreshController::new(gateway.clone(), Arc::new(board.clone()));
    let recorder = Recorder::default();
    let targets: [&dyn Reconcile; 1] = [&recorder];

    let mut refresh = Box::pin(refresher.refresh(ImageId(9), &targets));
    assert!(futures::poll!(&mut refresh).is_pending());
    assert_eq!(refresher.in_flight(), vec![ImageId(9)]);

    gateway
      .take_replies()
      .remove(0)
      .send(Err(GatewayError::NotFound(ImageId(9))))
      .ok();
    let result = refresh.await;

    assert!(result.unwrap_err().is_not_found());
    assert!(refresher.in_flight().is_empty());
    assert!(recorder.seen.lock().is_empty());
    assert!(board.drain()[0].is_error());
  }
}
