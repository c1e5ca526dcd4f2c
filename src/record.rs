// 该文件是 InsightX （洞察） 项目的一部分。
// src/record.rs - 图像记录定义
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

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 后端分配的图像编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub u64);

impl fmt::Display for ImageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl FromStr for ImageId {
  type Err = ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim().parse().map(ImageId)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
  pub class: String,
  pub confidence: f32,
  #[serde(rename = "box")]
  pub bbox: [f32; 4], // [x1, y1, x2, y2]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NsfwDetection {
  pub class: String,
  pub confidence: f32,
}

impl NsfwDetection {
  /// 后端的 NSFW 结果没有固定结构，这里只接受带类别名与数值置信度的条目。
  fn from_wire(value: &serde_json::Value) -> Option<Self> {
    let object = value.as_object()?;
    let class = object
      .get("class")
      .or_else(|| object.get("label"))
      .and_then(|v| v.as_str())?;
    let confidence = object.get("confidence").and_then(|v| v.as_f64())?;
    Some(NsfwDetection {
      class: class.to_string(),
      confidence: clamp_confidence(confidence as f32),
    })
  }
}

/// 一张图像及其处理状态与检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireImageRecord")]
pub struct ImageRecord {
  #[serde(rename = "image_id")]
  pub id: ImageId,
  pub name: String,
  pub is_processed: bool,
  pub is_nsfw: bool,
  pub input_image_url: String,
  pub output_image_url: String,
  pub detected_objects: Vec<DetectedObject>,
  pub detected_nsfw: Vec<NsfwDetection>,
  #[serde(with = "timestamp")]
  pub created_at: DateTime<Utc>,
  #[serde(with = "timestamp")]
  pub updated_at: DateTime<Utc>,
}

/// 同类检测目标的计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectBadge {
  pub class: String,
  pub count: usize,
}

impl ImageRecord {
  pub fn status_label(&self) -> &'static str {
    if self.is_processed {
      "Processed"
    } else {
      "Processing ..."
    }
  }

  /// 按类别统计检测目标，顺序为类别首次出现的顺序。
  pub fn object_badges(&self) -> Vec<ObjectBadge> {
    let mut badges: Vec<ObjectBadge> = Vec::new();
    for object in &self.detected_objects {
      match badges.iter_mut().find(|b| b.class == object.class) {
        Some(badge) => badge.count += 1,
        None => badges.push(ObjectBadge {
          class: object.class.clone(),
          count: 1,
        }),
      }
    }
    badges
  }

  pub fn is_consistent(&self) -> bool {
    let pending_is_empty = self.is_processed
      || (self.detected_objects.is_empty()
        && self.detected_nsfw.is_empty()
        && self.output_image_url.is_empty());
    let nsfw_is_processed = !self.is_nsfw || self.is_processed;
    pending_is_empty && nsfw_is_processed
  }
}

/// 后端返回的原始记录，转换为 [`ImageRecord`] 时修正不一致的字段。
#[derive(Debug, Deserialize)]
struct WireImageRecord {
  image_id: ImageId,
  name: String,
  #[serde(default)]
  is_processed: bool,
  #[serde(default)]
  is_nsfw: bool,
  #[serde(default)]
  input_image_url: Option<String>,
  #[serde(default)]
  output_image_url: Option<String>,
  #[serde(default)]
  detected_objects: Option<Vec<DetectedObject>>,
  #[serde(default)]
  detected_nsfw: Option<Vec<serde_json::Value>>,
  #[serde(with = "timestamp")]
  created_at: DateTime<Utc>,
  #[serde(with = "timestamp")]
  updated_at: DateTime<Utc>,
}

impl From<WireImageRecord> for ImageRecord {
  fn from(wire: WireImageRecord) -> Self {
    let id = wire.image_id;

    let raw_nsfw = wire.detected_nsfw.unwrap_or_default();
    let mut detected_nsfw: Vec<NsfwDetection> =
      raw_nsfw.iter().filter_map(NsfwDetection::from_wire).collect();
    if detected_nsfw.len() != raw_nsfw.len() {
      warn!(
        image_id = %id,
        dropped = raw_nsfw.len() - detected_nsfw.len(),
        "忽略无法识别的 NSFW 检测条目"
      );
    }

    let mut detected_objects = wire.detected_objects.unwrap_or_default();
    for object in &mut detected_objects {
      object.confidence = clamp_confidence(object.confidence);
    }

    let mut output_image_url = wire.output_image_url.unwrap_or_default();
    let mut is_nsfw = wire.is_nsfw;

    if !wire.is_processed {
      if !detected_objects.is_empty() || !detected_nsfw.is_empty() || !output_image_url.is_empty() {
        warn!(image_id = %id, "未处理的记录携带了检测结果，已清空");
      }
      detected_objects.clear();
      detected_nsfw.clear();
      output_image_url.clear();
      is_nsfw = false;
    } else if !is_nsfw {
      detected_nsfw.clear();
    }

    ImageRecord {
      id,
      name: wire.name,
      is_processed: wire.is_processed,
      is_nsfw,
      input_image_url: wire.input_image_url.unwrap_or_default(),
      output_image_url,
      detected_objects,
      detected_nsfw,
      created_at: wire.created_at,
      updated_at: wire.updated_at,
    }
  }
}

fn clamp_confidence(value: f32) -> f32 {
  if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// 一页图像记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult {
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  #[serde(rename = "data")]
  pub items: Vec<ImageRecord>,
}

/// 后端时间戳可能不带时区（按 UTC 处理），也接受 RFC 3339。
pub mod timestamp {
  use chrono::{DateTime, NaiveDateTime, Utc};
  use serde::{Deserialize, Deserializer, Serializer};

  const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

  pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
      return Ok(datetime.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
  }

  pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format(WIRE_FORMAT))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
  }
}
