// 该文件是 InsightX （洞察） 项目的一部分。
// tests/mock_lifecycle.rs - 模拟后端端到端测试
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
use std::time::Duration;

use insightx::clock::ManualClock;
use insightx::detail::{DetailState, DetailView};
use insightx::gateway::mock::DEFAULT_PROCESSING_DELAY;
use insightx::gateway::{Gateway, MockGateway, UploadFile};
use insightx::list::{ListController, SortField};
use insightx::notice::{NoticeBoard, NoticeSink};
use insightx::record::{ImageId, timestamp};
use insightx::refresh::{Reconcile, RefreshController, RefreshOutcome};
use insightx::upload::{UploadController, UploadMode};

struct Dashboard {
  clock: ManualClock,
  board: NoticeBoard,
  gateway: Arc<MockGateway>,
  list: ListController<MockGateway>,
  detail: DetailView<MockGateway>,
  refresher: RefreshController<MockGateway>,
  uploads: UploadController<MockGateway>,
}

fn dashboard() -> Dashboard {
  let clock = ManualClock::starting_at(timestamp::parse("2025-06-01T12:00:00").unwrap());
  let gateway = Arc::new(MockGateway::new(Arc::new(clock.clone())).with_latency(Duration::ZERO));
  let board = NoticeBoard::new();
  let notices: Arc<dyn NoticeSink> = Arc::new(board.clone());

  Dashboard {
    list: ListController::new(gateway.clone(), notices.clone()),
    detail: DetailView::new(gateway.clone(), notices.clone()),
    refresher: RefreshController::new(gateway.clone(), notices.clone()),
    uploads: UploadController::new(gateway.clone(), UploadMode::Single, notices),
    clock,
    board,
    gateway,
  }
}

#[tokio::test]
async fn first_page_of_five() {
  let dash = dashboard();
  dash.list.set_limit(5).unwrap();
  dash.list.load().await.unwrap();

  let snapshot = dash.list.snapshot();
  assert_eq!(snapshot.items.len(), 5);
  assert_eq!(snapshot.total, 10);
  assert_eq!(snapshot.total_pages(), 2);
}

#[tokio::test]
async fn search_for_beach() {
  let dash = dashboard();
  dash.list.set_limit(5).unwrap();
  dash.list.set_search("beach");
  dash.list.load().await.unwrap();

  let snapshot = dash.list.snapshot();
  assert_eq!(snapshot.total, 1);
  assert_eq!(snapshot.items[0].id, ImageId(2));
  assert_eq!(snapshot.items[0].name, "beach_sunset.png");
}

#[tokio::test]
async fn unknown_id_is_not_found() {
  let dash = dashboard();
  assert!(dash.gateway.get_by_id(ImageId(999)).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn every_seed_record_is_consistent() {
  let dash = dashboard();
  dash.list.set_limit(100).unwrap();
  dash.list.load().await.unwrap();

  for record in dash.list.items() {
    assert_eq!(
      !record.is_processed,
      record.detected_objects.is_empty() && record.output_image_url.is_empty(),
      "record {} violates the processing invariant",
      record.id
    );
  }
}

#[tokio::test]
async fn uploaded_image_is_processed_after_the_delay() {
  let dash = dashboard();
  dash.list.set_limit(20).unwrap();
  dash.list.load().await.unwrap();

  let outcome = dash
    .uploads
    .drop_files(
      vec![UploadFile::new("new.png", "image/png", vec![9u8; 2048])],
      &dash.list,
    )
    .await;
  assert_eq!(outcome.upload.unwrap().unwrap(), 1);

  // 上传成功后列表已经重新加载，新记录按创建时间排在最前
  let snapshot = dash.list.snapshot();
  assert_eq!(snapshot.total, 11);
  assert_eq!(snapshot.sort.field, SortField::CreatedAt);
  let created = snapshot.items[0].clone();
  assert_eq!(created.name, "new.png");
  assert!(!created.is_processed);

  dash.detail.open(created.id).await.unwrap();

  let targets: [&dyn Reconcile; 2] = [&dash.list, &dash.detail];
  let early = dash.refresher.refresh(created.id, &targets).await.unwrap();
  assert!(matches!(early, RefreshOutcome::Applied(ref r) if !r.is_processed));

  dash.clock.advance(DEFAULT_PROCESSING_DELAY);
  dash.refresher.refresh(created.id, &targets).await.unwrap();

  let in_list = dash
    .list
    .items()
    .into_iter()
    .find(|r| r.id == created.id)
    .unwrap();
  assert!(in_list.is_processed);
  assert!(!in_list.detected_objects.is_empty());
  match dash.detail.state() {
    DetailState::Loaded(record) => assert_eq!(record, in_list),
    other => panic!("unexpected detail state {other:?}"),
  }
  assert!(dash.refresher.in_flight().is_empty());
  assert!(dash.board.drain().iter().all(|n| !n.is_error()));
}

#[tokio::test]
async fn deleted_image_disappears_everywhere() {
  let dash = dashboard();
  dash.list.load().await.unwrap();
  dash.detail.open(ImageId(7)).await.unwrap();

  dash.list.delete(ImageId(7)).await.unwrap();
  assert!(!dash.list.contains(ImageId(7)));

  let targets: [&dyn Reconcile; 2] = [&dash.list, &dash.detail];
  assert!(dash.refresher.refresh(ImageId(7), &targets).await.is_err());
  dash.list.load().await.unwrap();
  assert_eq!(dash.list.snapshot().total, 9);
}
