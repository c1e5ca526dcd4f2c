// 该文件是 InsightX （洞察） 项目的一部分。
// src/gateway/mock.rs - 内存模拟后端
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

//! 没有配置后端时使用的内存网关。
//!
//! 预置十条样例记录（编号 1–10）。新建记录立即以“未处理”状态返回，
//! 经过处理延迟后（由注入的 [`Clock`] 判断）在下一次访问时变为“已处理”，
//! 并带上合成的检测结果。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info};
use url::Url;

use super::{Gateway, GatewayError, ListQuery, ProgressFn, TransferProgress, UploadFile};
use crate::clock::{Clock, SystemClock};
use crate::record::{DetectedObject, ImageId, ImageRecord, NsfwDetection, PagedResult, timestamp};
use crate::{FromUrl, FromUrlWithScheme};

pub const DEFAULT_LATENCY: Duration = Duration::from_millis(500);
pub const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_secs(5);

const PLACEHOLDER_URL: &str = "/placeholder.svg?height=400&width=600";
const PROGRESS_STEPS: u64 = 4;

struct MockEntry {
  record: ImageRecord,
  completes_at: Option<DateTime<Utc>>,
}

struct MockStore {
  entries: Vec<MockEntry>,
  next_id: u64,
}

impl MockStore {
  /// 完成所有到期的处理任务
  fn settle(&mut self, now: DateTime<Utc>) {
    for entry in &mut self.entries {
      let Some(due) = entry.completes_at else {
        continue;
      };
      if due > now {
        continue;
      }
      entry.completes_at = None;
      let record = &mut entry.record;
      record.is_processed = true;
      record.is_nsfw = false;
      record.detected_objects = synthesize_detections(record.id);
      record.detected_nsfw.clear();
      record.output_image_url = PLACEHOLDER_URL.to_string();
      record.updated_at = due;
      info!(image_id = %record.id, "模拟处理完成");
    }
  }
}

#[derive(Clone)]
pub struct MockGateway {
  store: Arc<Mutex<MockStore>>,
  clock: Arc<dyn Clock>,
  latency: Duration,
  processing_delay: Duration,
}

impl FromUrlWithScheme for MockGateway {
  const SCHEME: &'static str = "mock";
}

impl FromUrl for MockGateway {
  type Error = GatewayError;

  /// `mock://local?latency_ms=500&processing_ms=5000`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GatewayError::SchemeMismatch);
    }

    let mut gateway = MockGateway::new(Arc::new(SystemClock));
    for (k, v) in url.query_pairs() {
      let Ok(millis) = v.parse::<u64>() else {
        continue;
      };
      match k.as_ref() {
        "latency_ms" => gateway.latency = Duration::from_millis(millis),
        "processing_ms" => gateway.processing_delay = Duration::from_millis(millis),
        _ => {}
      }
    }
    info!(
      latency = ?gateway.latency,
      processing = ?gateway.processing_delay,
      "使用内存模拟后端"
    );
    Ok(gateway)
  }
}

impl MockGateway {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    let entries = seed_records()
      .into_iter()
      .map(|record| MockEntry {
        record,
        completes_at: None,
      })
      .collect::<Vec<_>>();
    let next_id = entries.len() as u64 + 1;

    MockGateway {
      store: Arc::new(Mutex::new(MockStore { entries, next_id })),
      clock,
      latency: DEFAULT_LATENCY,
      processing_delay: DEFAULT_PROCESSING_DELAY,
    }
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  pub fn with_processing_delay(mut self, delay: Duration) -> Self {
    self.processing_delay = delay;
    self
  }

  async fn simulate_latency(&self) {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
  }
}

impl Gateway for MockGateway {
  async fn list(&self, query: &ListQuery) -> Result<PagedResult, GatewayError> {
    self.simulate_latency().await;

    let mut store = self.store.lock();
    store.settle(self.clock.now());

    let term = query.search.to_lowercase();
    let matching: Vec<&ImageRecord> = store
      .entries
      .iter()
      .map(|entry| &entry.record)
      .filter(|record| term.is_empty() || record.name.to_lowercase().contains(&term))
      .collect();

    let start = (query.page.max(1) as usize - 1).saturating_mul(query.limit as usize);
    let items = matching
      .iter()
      .skip(start)
      .take(query.limit as usize)
      .map(|record| (*record).clone())
      .collect();

    Ok(PagedResult {
      page: query.page,
      limit: query.limit,
      total: matching.len() as u64,
      items,
    })
  }

  async fn get_by_id(&self, id: ImageId) -> Result<ImageRecord, GatewayError> {
    self.simulate_latency().await;

    let mut store = self.store.lock();
    store.settle(self.clock.now());
    store
      .entries
      .iter()
      .find(|entry| entry.record.id == id)
      .map(|entry| entry.record.clone())
      .ok_or(GatewayError::NotFound(id))
  }

  async fn create(&self, file: UploadFile, on_progress: ProgressFn) -> Result<ImageRecord, GatewayError> {
    let total = file.size();
    for step in 1..=PROGRESS_STEPS {
      on_progress(TransferProgress {
        sent: total * step / PROGRESS_STEPS,
        total,
      });
    }
    self.simulate_latency().await;

    let now = self.clock.now();
    let delay = TimeDelta::from_std(self.processing_delay).unwrap_or(TimeDelta::zero());

    let mut store = self.store.lock();
    let id = ImageId(store.next_id);
    store.next_id += 1;

    let record = ImageRecord {
      id,
      name: file.name,
      is_processed: false,
      is_nsfw: false,
      input_image_url: PLACEHOLDER_URL.to_string(),
      output_image_url: String::new(),
      detected_objects: Vec::new(),
      detected_nsfw: Vec::new(),
      created_at: now,
      updated_at: now,
    };
    store.entries.push(MockEntry {
      record: record.clone(),
      completes_at: now.checked_add_signed(delay),
    });
    debug!(image_id = %id, name = %record.name, "模拟创建图像记录");

    Ok(record)
  }

  async fn delete_by_id(&self, id: ImageId) -> Result<(), GatewayError> {
    self.simulate_latency().await;

    let mut store = self.store.lock();
    let before = store.entries.len();
    store.entries.retain(|entry| entry.record.id != id);
    if store.entries.len() == before {
      return Err(GatewayError::NotFound(id));
    }
    debug!(image_id = %id, "模拟删除图像记录");
    Ok(())
  }
}

const SYNTHETIC_OBJECTS: [(&str, f32, [f32; 4]); 6] = [
  ("person", 0.92, [120.0, 100.0, 220.0, 350.0]),
  ("car", 0.88, [300.0, 200.0, 500.0, 300.0]),
  ("dog", 0.86, [300.0, 250.0, 380.0, 320.0]),
  ("chair", 0.81, [120.0, 200.0, 180.0, 380.0]),
  ("laptop", 0.87, [180.0, 250.0, 280.0, 300.0]),
  ("bicycle", 0.76, [50.0, 250.0, 150.0, 350.0]),
];

/// 根据编号确定性地合成 1–3 个检测目标
fn synthesize_detections(id: ImageId) -> Vec<DetectedObject> {
  let count = 1 + (id.0 % 3) as usize;
  (0..count)
    .map(|offset| {
      let (class, confidence, bbox) = SYNTHETIC_OBJECTS[(id.0 as usize + offset) % SYNTHETIC_OBJECTS.len()];
      DetectedObject {
        class: class.to_string(),
        confidence,
        bbox,
      }
    })
    .collect()
}

fn at(raw: &str) -> DateTime<Utc> {
  timestamp::parse(raw).unwrap_or_default()
}

fn object(class: &str, confidence: f32, bbox: [f32; 4]) -> DetectedObject {
  DetectedObject {
    class: class.to_string(),
    confidence,
    bbox,
  }
}

fn processed(id: u64, name: &str, created: &str, updated: &str, objects: Vec<DetectedObject>) -> ImageRecord {
  ImageRecord {
    id: ImageId(id),
    name: name.to_string(),
    is_processed: true,
    is_nsfw: false,
    input_image_url: PLACEHOLDER_URL.to_string(),
    output_image_url: PLACEHOLDER_URL.to_string(),
    detected_objects: objects,
    detected_nsfw: Vec::new(),
    created_at: at(created),
    updated_at: at(updated),
  }
}

fn seed_records() -> Vec<ImageRecord> {
  let mut kitchen = processed(
    5,
    "kitchen_cooking.jpg",
    "2025-05-05T08:45:12.006323",
    "2025-05-05T08:45:12.006323",
    Vec::new(),
  );
  kitchen.is_processed = false;
  kitchen.output_image_url.clear();

  let mut nsfw = processed(
    7,
    "nsfw_content.jpg",
    "2025-05-07T12:15:22.006323",
    "2025-05-07T12:15:27.962234",
    vec![object("person", 0.97, [150.0, 100.0, 350.0, 400.0])],
  );
  nsfw.is_nsfw = true;
  nsfw.detected_nsfw.push(NsfwDetection {
    class: "explicit_content".to_string(),
    confidence: 0.89,
  });

  vec![
    processed(
      1,
      "city_street.jpg",
      "2025-05-01T14:32:10.006323",
      "2025-05-01T14:32:15.962234",
      vec![
        object("person", 0.92, [120.0, 100.0, 220.0, 350.0]),
        object("car", 0.88, [300.0, 200.0, 500.0, 300.0]),
        object("bicycle", 0.76, [50.0, 250.0, 150.0, 350.0]),
      ],
    ),
    processed(
      2,
      "beach_sunset.png",
      "2025-05-02T09:44:42.006323",
      "2025-05-02T09:44:47.962234",
      vec![
        object("person", 0.85, [200.0, 150.0, 300.0, 400.0]),
        object("umbrella", 0.79, [350.0, 100.0, 450.0, 200.0]),
      ],
    ),
    processed(
      3,
      "office_meeting.jpg",
      "2025-05-03T11:22:33.006323",
      "2025-05-03T11:22:38.962234",
      vec![
        object("person", 0.94, [100.0, 120.0, 200.0, 350.0]),
        object("person", 0.91, [250.0, 120.0, 350.0, 350.0]),
        object("laptop", 0.87, [180.0, 250.0, 280.0, 300.0]),
        object("chair", 0.82, [120.0, 200.0, 180.0, 380.0]),
      ],
    ),
    processed(
      4,
      "park_picnic.webp",
      "2025-05-04T15:10:22.006323",
      "2025-05-04T15:10:27.962234",
      vec![
        object("person", 0.89, [150.0, 100.0, 250.0, 350.0]),
        object("dog", 0.86, [300.0, 250.0, 380.0, 320.0]),
        object("tree", 0.92, [50.0, 50.0, 150.0, 400.0]),
      ],
    ),
    kitchen,
    processed(
      6,
      "concert_crowd.png",
      "2025-05-06T19:30:42.006323",
      "2025-05-06T19:30:47.962234",
      vec![
        object("person", 0.95, [100.0, 150.0, 180.0, 350.0]),
        object("person", 0.93, [200.0, 150.0, 280.0, 350.0]),
        object("person", 0.91, [300.0, 150.0, 380.0, 350.0]),
        object("microphone", 0.84, [250.0, 100.0, 270.0, 130.0]),
      ],
    ),
    nsfw,
    processed(
      8,
      "airport_terminal.jpg",
      "2025-05-08T07:20:12.006323",
      "2025-05-08T07:20:17.962234",
      vec![
        object("person", 0.88, [120.0, 150.0, 200.0, 350.0]),
        object("suitcase", 0.82, [220.0, 300.0, 280.0, 350.0]),
        object("chair", 0.79, [300.0, 250.0, 350.0, 350.0]),
      ],
    ),
    processed(
      9,
      "restaurant_dinner.webp",
      "2025-05-09T20:45:32.006323",
      "2025-05-09T20:45:37.962234",
      vec![
        object("person", 0.91, [100.0, 150.0, 200.0, 350.0]),
        object("wine glass", 0.87, [250.0, 200.0, 280.0, 250.0]),
        object("fork", 0.76, [220.0, 250.0, 240.0, 280.0]),
        object("plate", 0.94, [200.0, 250.0, 300.0, 300.0]),
      ],
    ),
    processed(
      10,
      "gym_workout.jpg",
      "2025-05-10T16:30:22.006323",
      "2025-05-10T16:30:27.962234",
      vec![
        object("person", 0.96, [150.0, 100.0, 300.0, 400.0]),
        object("dumbbell", 0.89, [320.0, 250.0, 380.0, 280.0]),
      ],
    ),
  ]
}
