// 该文件是 InsightX （洞察） 项目的一部分。
// src/list.rs - 图像列表状态
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

use std::cmp::Ordering;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, GatewayError, ListQuery};
use crate::notice::{Notice, NoticeSink};
use crate::record::{ImageId, ImageRecord};
use crate::refresh::Reconcile;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Error, Debug)]
pub enum ListError {
  #[error("分页大小必须在 1 到 {MAX_LIMIT} 之间: {0}")]
  InvalidLimit(u32),
  #[error("未知的排序字段: {0}")]
  UnknownSortField(String),
  #[error("网关错误: {0}")]
  Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
  Id,
  Name,
  IsProcessed,
  IsNsfw,
  CreatedAt,
  UpdatedAt,
}

impl SortField {
  pub fn as_str(&self) -> &'static str {
    match self {
      SortField::Id => "image_id",
      SortField::Name => "name",
      SortField::IsProcessed => "is_processed",
      SortField::IsNsfw => "is_nsfw",
      SortField::CreatedAt => "created_at",
      SortField::UpdatedAt => "updated_at",
    }
  }

  fn compare(&self, a: &ImageRecord, b: &ImageRecord) -> Ordering {
    match self {
      SortField::Id => a.id.cmp(&b.id),
      SortField::Name => a.name.cmp(&b.name),
      SortField::IsProcessed => a.is_processed.cmp(&b.is_processed),
      SortField::IsNsfw => a.is_nsfw.cmp(&b.is_nsfw),
      SortField::CreatedAt => a.created_at.cmp(&b.created_at),
      SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
  }
}

impl FromStr for SortField {
  type Err = ListError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "id" | "image_id" => Ok(SortField::Id),
      "name" => Ok(SortField::Name),
      "status" | "processed" | "is_processed" => Ok(SortField::IsProcessed),
      "nsfw" | "is_nsfw" => Ok(SortField::IsNsfw),
      "date" | "created" | "created_at" => Ok(SortField::CreatedAt),
      "updated" | "updated_at" => Ok(SortField::UpdatedAt),
      other => Err(ListError::UnknownSortField(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
  Ascending,
  Descending,
}

impl SortDirection {
  pub fn toggled(self) -> Self {
    match self {
      SortDirection::Ascending => SortDirection::Descending,
      SortDirection::Descending => SortDirection::Ascending,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
  pub field: SortField,
  pub direction: SortDirection,
}

impl Default for SortConfig {
  fn default() -> Self {
    SortConfig {
      field: SortField::CreatedAt,
      direction: SortDirection::Descending,
    }
  }
}

impl SortConfig {
  /// 同一字段切换方向，新字段从升序开始。
  pub fn select(self, field: SortField) -> Self {
    let direction = if self.field == field {
      self.direction.toggled()
    } else {
      SortDirection::Ascending
    };
    SortConfig { field, direction }
  }

  /// 稳定排序，相等的键保持原有顺序。
  pub fn sort(&self, items: &mut [ImageRecord]) {
    items.sort_by(|a, b| {
      let ordering = self.field.compare(a, b);
      match self.direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
      }
    });
  }
}

/// 渲染用的列表快照，条目已按当前排序排列
#[derive(Debug, Clone, PartialEq)]
pub struct ListSnapshot {
  pub items: Vec<ImageRecord>,
  pub total: u64,
  pub page: u32,
  pub limit: u32,
  pub search: String,
  pub sort: SortConfig,
  pub loading: bool,
}

impl ListSnapshot {
  pub fn total_pages(&self) -> u64 {
    self.total.div_ceil(self.limit.max(1) as u64)
  }

  /// "Showing start–end of total"，列表为空时返回 `None`
  pub fn page_window(&self) -> Option<(u64, u64, u64)> {
    if self.total == 0 {
      return None;
    }
    let start = (self.page.max(1) as u64 - 1) * self.limit as u64 + 1;
    let end = (self.page as u64 * self.limit as u64).min(self.total);
    (start <= end).then_some((start, end, self.total))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  Applied,
  /// 更新的加载请求已经发出，本次响应被丢弃
  Superseded,
}

struct ListState {
  items: Vec<ImageRecord>,
  total: u64,
  page: u32,
  limit: u32,
  search: String,
  sort: SortConfig,
  loading: bool,
  issued: u64,
}

impl ListState {
  fn query(&self) -> ListQuery {
    ListQuery::new(self.page, self.limit, self.search.clone())
  }
}

/// 触发列表重新加载的能力，上传完成后使用。
pub trait Reload: Send + Sync {
  fn reload(&self) -> impl Future<Output = ()> + Send;
}

pub struct ListController<G> {
  gateway: Arc<G>,
  state: Mutex<ListState>,
  notices: Arc<dyn NoticeSink>,
}

impl<G: Gateway> ListController<G> {
  pub fn new(gateway: Arc<G>, notices: Arc<dyn NoticeSink>) -> Self {
    ListController {
      gateway,
      state: Mutex::new(ListState {
        items: Vec::new(),
        total: 0,
        page: 1,
        limit: DEFAULT_LIMIT,
        search: String::new(),
        sort: SortConfig::default(),
        loading: false,
        issued: 0,
      }),
      notices,
    }
  }

  /// 按当前页码、分页大小与搜索词加载一页。
  ///
  /// 失败时保留原有列表。只有最近一次发出的请求的响应会被应用。
  pub async fn load(&self) -> Result<LoadOutcome, ListError> {
    let (ticket, query) = {
      let mut state = self.state.lock();
      state.issued += 1;
      state.loading = true;
      (state.issued, state.query())
    };
    info!(
      page = query.page,
      limit = query.limit,
      search = %query.search,
      "加载图像列表"
    );

    let result = self.gateway.list(&query).await;

    {
      let mut state = self.state.lock();
      if ticket != state.issued {
        debug!(ticket, latest = state.issued, "丢弃过期的列表响应");
        return Ok(LoadOutcome::Superseded);
      }
      state.loading = false;
      if let Ok(page) = &result {
        state.items = page.items.clone();
        state.total = page.total;
      }
    }

    match result {
      Ok(_) => Ok(LoadOutcome::Applied),
      Err(e) => {
        warn!("加载图像列表失败: {}", e);
        self
          .notices
          .notify(Notice::error("Failed to load images. Please try again."));
        Err(e.into())
      }
    }
  }

  /// 删除一条记录并从当前页移除
  pub async fn delete(&self, id: ImageId) -> Result<(), ListError> {
    let result = self.gateway.delete_by_id(id).await;

    match &result {
      Ok(()) => self.notices.notify(Notice::success("Image deleted successfully.")),
      Err(e) if e.is_not_found() => self
        .notices
        .notify(Notice::error("Image not found or has been deleted.")),
      Err(_) => self
        .notices
        .notify(Notice::error("Failed to delete image. Please try again.")),
    }

    match result {
      Ok(()) => {
        self.remove_local(id);
        Ok(())
      }
      Err(e) if e.is_not_found() => {
        self.remove_local(id);
        Err(e.into())
      }
      Err(e) => {
        warn!(image_id = %id, "删除图像失败: {}", e);
        Err(e.into())
      }
    }
  }

  fn remove_local(&self, id: ImageId) {
    let mut state = self.state.lock();
    let before = state.items.len();
    state.items.retain(|record| record.id != id);
    if state.items.len() != before {
      state.total = state.total.saturating_sub(1);
    }
  }
}

impl<G> ListController<G> {
  pub fn set_page(&self, page: u32) {
    self.state.lock().page = page.max(1);
  }

  /// 修改分页大小，页码重置为 1
  pub fn set_limit(&self, limit: u32) -> Result<(), ListError> {
    if limit == 0 || limit > MAX_LIMIT {
      return Err(ListError::InvalidLimit(limit));
    }
    let mut state = self.state.lock();
    state.limit = limit;
    state.page = 1;
    Ok(())
  }

  /// 修改搜索词，页码重置为 1
  pub fn set_search(&self, term: impl Into<String>) {
    let mut state = self.state.lock();
    state.search = term.into().trim().to_string();
    state.page = 1;
  }

  pub fn sort_by(&self, field: SortField) -> SortConfig {
    let mut state = self.state.lock();
    state.sort = state.sort.select(field);
    state.sort
  }

  pub fn set_sort(&self, sort: SortConfig) {
    self.state.lock().sort = sort;
  }

  pub fn is_loading(&self) -> bool {
    self.state.lock().loading
  }

  pub fn snapshot(&self) -> ListSnapshot {
    let state = self.state.lock();
    let mut items = state.items.clone();
    state.sort.sort(&mut items);
    ListSnapshot {
      items,
      total: state.total,
      page: state.page,
      limit: state.limit,
      search: state.search.clone(),
      sort: state.sort,
      loading: state.loading,
    }
  }

  /// 后端返回的原始顺序
  pub fn items(&self) -> Vec<ImageRecord> {
    self.state.lock().items.clone()
  }

  pub fn contains(&self, id: ImageId) -> bool {
    self.state.lock().items.iter().any(|record| record.id == id)
  }
}

impl<G: Send + Sync> Reconcile for ListController<G> {
  fn reconcile_one(&self, record: &ImageRecord) -> bool {
    let mut state = self.state.lock();
    match state.items.iter_mut().find(|item| item.id == record.id) {
      Some(item) => {
        *item = record.clone();
        true
      }
      None => false,
    }
  }
}

impl<G: Gateway> Reload for ListController<G> {
  async fn reload(&self) {
    let _ = self.load().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::gateway::MockGateway;
  use crate::notice::NoticeBoard;
  use crate::gateway::{ProgressFn, UploadFile};
  use crate::record::{PagedResult, timestamp};
  use std::time::Duration;
  use tokio::sync::oneshot;

  fn controller() -> (ListController<MockGateway>, NoticeBoard) {
    let clock = ManualClock::starting_at(timestamp::parse("2025-06-01T00:00:00").unwrap());
    let gateway = MockGateway::new(Arc::new(clock)).with_latency(Duration::ZERO);
    let board = NoticeBoard::new();
    (ListController::new(Arc::new(gateway), Arc::new(board.clone())), board)
  }

  #[test]
  fn same_field_toggles_and_new_field_resets() {
    for field in [SortField::Name, SortField::IsProcessed, SortField::CreatedAt] {
      let other = if field == SortField::Name {
        SortField::CreatedAt
      } else {
        SortField::Name
      };
      let start = SortConfig {
        field: other,
        direction: SortDirection::Descending,
      };

      let first = start.select(field);
      assert_eq!(first.direction, SortDirection::Ascending);
      let second = first.select(field);
      assert_eq!(second.direction, SortDirection::Descending);
      let third = second.select(field);
      assert_eq!(third.direction, SortDirection::Ascending);
    }
  }

  #[test]
  fn sort_field_parses_aliases() {
    assert_eq!("Name".parse::<SortField>().unwrap(), SortField::Name);
    assert_eq!("status".parse::<SortField>().unwrap(), SortField::IsProcessed);
    assert_eq!("created_at".parse::<SortField>().unwrap(), SortField::CreatedAt);
    assert!("size".parse::<SortField>().is_err());
  }

  #[tokio::test]
  async fn sort_is_stable_for_equal_keys() {
    let (list, _) = controller();
    list.set_limit(10).unwrap();
    list.load().await.unwrap();

    list.set_sort(SortConfig {
      field: SortField::IsProcessed,
      direction: SortDirection::Descending,
    });
    let ids: Vec<u64> = list.snapshot().items.iter().map(|r| r.id.0).collect();

    assert_eq!(ids, vec![1, 2, 3, 4, 6, 7, 8, 9, 10, 5]);
  }

  #[tokio::test]
  async fn load_respects_limit_and_total() {
    let (list, _) = controller();
    for (limit, search) in [(5, ""), (3, "jpg"), (20, "o"), (1, "beach"), (5, "nothing")] {
      list.set_limit(limit).unwrap();
      list.set_search(search);
      list.load().await.unwrap();
      let snapshot = list.snapshot();
      assert!(snapshot.items.len() <= limit as usize);
      assert!(snapshot.total >= snapshot.items.len() as u64);
      assert!(!snapshot.loading);
    }
  }

  #[tokio::test]
  async fn limit_and_search_reset_page() {
    let (list, _) = controller();
    list.set_page(2);
    list.set_limit(5).unwrap();
    assert_eq!(list.snapshot().page, 1);

    list.set_page(2);
    list.set_search("beach");
    assert_eq!(list.snapshot().page, 1);

    assert!(matches!(list.set_limit(0), Err(ListError::InvalidLimit(0))));
  }

  #[tokio::test]
  async fn reconcile_of_absent_id_is_a_noop() {
    let (list, _) = controller();
    list.set_limit(5).unwrap();
    list.load().await.unwrap();
    let before = list.items();

    let mut stranger = before[0].clone();
    stranger.id = ImageId(999);
    stranger.name = "stranger.png".to_string();

    assert!(!list.reconcile_one(&stranger));
    assert_eq!(list.items(), before);
  }

  #[tokio::test]
  async fn reconcile_replaces_in_place() {
    let (list, _) = controller();
    list.set_limit(5).unwrap();
    list.load().await.unwrap();

    let mut updated = list.items()[2].clone();
    updated.name = "renamed.jpg".to_string();
    assert!(list.reconcile_one(&updated));

    let items = list.items();
    assert_eq!(items.len(), 5);
    assert_eq!(items[2].name, "renamed.jpg");
    assert_eq!(items[2].id, updated.id);
  }

  #[tokio::test]
  async fn delete_removes_from_page_and_total() {
    let (list, board) = controller();
    list.set_limit(5).unwrap();
    list.load().await.unwrap();

    list.delete(ImageId(2)).await.unwrap();
    let snapshot = list.snapshot();
    assert_eq!(snapshot.total, 9);
    assert!(!list.contains(ImageId(2)));
    assert!(!board.drain()[0].is_error());

    assert!(list.delete(ImageId(2)).await.is_err());
    assert!(board.drain()[0].is_error());
  }

  #[test]
  fn page_window_and_total_pages() {
    let snapshot = ListSnapshot {
      items: Vec::new(),
      total: 23,
      page: 3,
      limit: 10,
      search: String::new(),
      sort: SortConfig::default(),
      loading: false,
    };
    assert_eq!(snapshot.total_pages(), 3);
    assert_eq!(snapshot.page_window(), Some((21, 23, 23)));
  }

  type PageReply = oneshot::Sender<Result<PagedResult, GatewayError>>;

  /// 每次 list 都挂起，直到测试给出响应
  #[derive(Default)]
  struct ScriptedGateway {
    replies: Mutex<Vec<PageReply>>,
  }

  impl ScriptedGateway {
    fn take_replies(&self) -> Vec<PageReply> {
      std::mem::take(&mut *self.replies.lock())
    }
  }

  impl Gateway for ScriptedGateway {
    async fn list(&self, _query: &ListQuery) -> Result<PagedResult, GatewayError> {
      let (tx, rx) = oneshot::channel();
      self.replies.lock().push(tx);
      rx.await.expect("test replies")
    }

    async fn get_by_id(&self, _id: ImageId) -> Result<ImageRecord, GatewayError> {
      unimplemented!()
    }

    async fn create(&self, _file: UploadFile, _on_progress: ProgressFn) -> Result<ImageRecord, GatewayError> {
      unimplemented!()
    }

    async fn delete_by_id(&self, _id: ImageId) -> Result<(), GatewayError> {
      unimplemented!()
    }
  }

  fn page_of(total: u64, ids: &[u64]) -> PagedResult {
    let at = timestamp::parse("2025-05-01T00:00:00").unwrap();
    let items = ids
      .iter()
      .map(|&id| ImageRecord {
        id: ImageId(id),
        name: format!("image_{id}.png"),
        is_processed: false,
        is_nsfw: false,
        input_image_url: String::new(),
        output_image_url: String::new(),
        detected_objects: Vec::new(),
        detected_nsfw: Vec::new(),
        created_at: at,
        updated_at: at,
      })
      .collect();
    PagedResult {
      page: 1,
      limit: DEFAULT_LIMIT,
      total,
      items,
    }
  }

  #[tokio::test]
  async fn stale_list_response_is_dropped() {
    let gateway = Arc::new(ScriptedGateway::default());
    let board = NoticeBoard::new();
    let list = ListController::new(gateway.clone(), Arc::new(board.clone()));

    let mut older = Box::pin(list.load());
    assert!(futures::poll!(&mut older).is_pending());
    let mut newer = Box::pin(list.load());
    assert!(futures::poll!(&mut newer).is_pending());
    assert!(list.snapshot().loading);

    let mut replies = gateway.take_replies();
    let fresh = replies.pop().unwrap();
    let stale = replies.pop().unwrap();
    fresh.send(Ok(page_of(7, &[4, 5, 6]))).ok();
    assert_eq!(newer.await.unwrap(), LoadOutcome::Applied);
    stale.send(Ok(page_of(3, &[1, 2, 3]))).ok();
    assert_eq!(older.await.unwrap(), LoadOutcome::Superseded);

    let snapshot = list.snapshot();
    assert_eq!(snapshot.total, 7);
    assert_eq!(list.items().iter().map(|r| r.id.0).collect::<Vec<_>>(), vec![4, 5, 6]);
    assert!(!snapshot.loading);
    assert!(board.is_empty());
  }

  #[tokio::test]
  async fn failed_load_keeps_previous_page() {
    let gateway = Arc::new(ScriptedGateway::default());
    let board = NoticeBoard::new();
    let list = ListController::new(gateway.clone(), Arc::new(board.clone()));

    let mut first = Box::pin(list.load());
    assert!(futures::poll!(&mut first).is_pending());
    gateway.take_replies().remove(0).send(Ok(page_of(7, &[1, 2]))).ok();
    first.await.unwrap();
    let before = list.items();

    let mut failing = Box::pin(list.load());
    assert!(futures::poll!(&mut failing).is_pending());
    gateway
      .take_replies()
      .remove(0)
      .send(Err(GatewayError::Status {
        status: 500,
        body: "boom".to_string(),
      }))
      .ok();
    assert!(matches!(failing.await, Err(ListError::Gateway(_))));

    let snapshot = list.snapshot();
    assert_eq!(snapshot.total, 7);
    assert_eq!(list.items(), before);
    assert!(!snapshot.loading);
    let notices = board.drain();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].is_error());
    assert_eq!(notices[0].description, "Failed to load images. Please try again.");
  }
}
