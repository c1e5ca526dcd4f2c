// 该文件是 InsightX （洞察） 项目的一部分。
// src/render.rs - 终端文本渲染
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

use std::io::{self, Write};
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::list::{ListSnapshot, SortDirection};
use crate::record::{ImageId, ImageRecord};

pub const TABLE_NAME_WIDTH: usize = 20;
pub const CARD_NAME_WIDTH: usize = 40;

pub trait Render {
  type Input: ?Sized;

  /// `now` 用于计算相对时间
  fn render(&self, out: &mut dyn Write, input: &Self::Input, now: DateTime<Utc>) -> io::Result<()>;
}

/// 超过 `max` 个字符时截断并追加 `...`
pub fn truncate_text(text: &str, max: usize) -> String {
  match text.char_indices().nth(max) {
    Some((cut, _)) => format!("{}...", &text[..cut]),
    None => text.to_string(),
  }
}

pub fn format_date(at: DateTime<Utc>) -> String {
  at.format("%b %-d, %Y, %I:%M %p").to_string()
}

fn plural(n: i64, unit: &str) -> String {
  if n == 1 {
    format!("1 {unit} ago")
  } else {
    format!("{n} {unit}s ago")
  }
}

pub fn relative_time(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
  let elapsed = now.signed_duration_since(then);
  let seconds = elapsed.num_seconds();
  if seconds < 60 {
    return "just now".to_string();
  }
  let minutes = elapsed.num_minutes();
  if minutes < 60 {
    return plural(minutes, "minute");
  }
  let hours = elapsed.num_hours();
  if hours < 24 {
    return plural(hours, "hour");
  }
  let days = elapsed.num_days();
  if days < 30 {
    return plural(days, "day");
  }
  if days < 365 {
    return plural(days / 30, "month");
  }
  plural(days / 365, "year")
}

/// `person ×3  car ×1`
pub fn badges_text(record: &ImageRecord) -> String {
  record
    .object_badges()
    .iter()
    .map(|badge| format!("{} ×{}", badge.class, badge.count))
    .collect::<Vec<_>>()
    .join("  ")
}

pub fn page_window_text(snapshot: &ListSnapshot) -> String {
  match snapshot.page_window() {
    Some((start, end, total)) => format!("Showing {start}–{end} of {total}"),
    None => "No images found".to_string(),
  }
}

fn sort_marker(snapshot: &ListSnapshot) -> String {
  let arrow = match snapshot.sort.direction {
    SortDirection::Ascending => "↑",
    SortDirection::Descending => "↓",
  };
  format!("sorted by {} {}", snapshot.sort.field.as_str(), arrow)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListView {
  #[default]
  Table,
  Card,
}

impl FromStr for ListView {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "table" => Ok(ListView::Table),
      "card" | "cards" | "grid" => Ok(ListView::Card),
      other => Err(format!("未知的视图: {other}")),
    }
  }
}

pub struct TableRender;

impl Render for TableRender {
  type Input = ListSnapshot;

  fn render(&self, out: &mut dyn Write, snapshot: &ListSnapshot, _now: DateTime<Utc>) -> io::Result<()> {
    if snapshot.items.is_empty() {
      writeln!(out, "No images found")?;
      return writeln!(out, "Upload some images to get started");
    }

    writeln!(
      out,
      "{:>5}  {:<30}  {:<10}  {:<10}  {}",
      "ID", "Name", "Status", "Objects", "Date"
    )?;
    for record in &snapshot.items {
      let mut name = truncate_text(&record.name, TABLE_NAME_WIDTH);
      if record.is_nsfw {
        name.push_str(" [NSFW]");
      }
      let status = if record.is_processed {
        "Processed"
      } else {
        "Processing"
      };
      let objects = if record.is_processed {
        format!("{} objects", record.detected_objects.len())
      } else {
        "-".to_string()
      };
      writeln!(
        out,
        "{:>5}  {:<30}  {:<10}  {:<10}  {}",
        record.id,
        name,
        status,
        objects,
        format_date(record.created_at)
      )?;
    }
    writeln!(
      out,
      "{}  (page {}/{}, {})",
      page_window_text(snapshot),
      snapshot.page,
      snapshot.total_pages().max(1),
      sort_marker(snapshot)
    )
  }
}

/// 卡片视图，正在刷新的记录带有标记
#[derive(Default)]
pub struct CardRender {
  pub refreshing: Vec<ImageId>,
}

impl Render for CardRender {
  type Input = ListSnapshot;

  fn render(&self, out: &mut dyn Write, snapshot: &ListSnapshot, now: DateTime<Utc>) -> io::Result<()> {
    if snapshot.items.is_empty() {
      return writeln!(out, "No images found");
    }

    for record in &snapshot.items {
      let nsfw = if record.is_nsfw { " [NSFW]" } else { "" };
      writeln!(
        out,
        "#{} {}{}  {}",
        record.id,
        truncate_text(&record.name, CARD_NAME_WIDTH),
        nsfw,
        record.status_label()
      )?;
      if record.is_processed && !record.detected_objects.is_empty() {
        writeln!(out, "    {}", badges_text(record))?;
      }
      let spinner = if self.refreshing.contains(&record.id) {
        "  (refreshing...)"
      } else {
        ""
      };
      writeln!(out, "    {}{}", relative_time(now, record.created_at), spinner)?;
    }
    writeln!(out, "{}", page_window_text(snapshot))
  }
}

pub struct DetailRender;

impl Render for DetailRender {
  type Input = ImageRecord;

  fn render(&self, out: &mut dyn Write, record: &ImageRecord, now: DateTime<Utc>) -> io::Result<()> {
    writeln!(out, "Image #{}  {}", record.id, record.name)?;
    writeln!(out, "  Status:   {}", record.status_label())?;
    writeln!(out, "  NSFW:     {}", if record.is_nsfw { "yes" } else { "no" })?;
    writeln!(out, "  Input:    {}", record.input_image_url)?;
    if record.output_image_url.is_empty() {
      writeln!(out, "  Output:   -")?;
    } else {
      writeln!(out, "  Output:   {}", record.output_image_url)?;
    }
    writeln!(
      out,
      "  Created:  {} ({})",
      format_date(record.created_at),
      relative_time(now, record.created_at)
    )?;
    writeln!(out, "  Updated:  {}", format_date(record.updated_at))?;

    if !record.is_processed {
      return writeln!(out, "  Still processing. Refresh later to see the results.");
    }

    writeln!(out, "  Detected objects ({}):", record.detected_objects.len())?;
    for object in &record.detected_objects {
      let [x1, y1, x2, y2] = object.bbox;
      writeln!(
        out,
        "    - {:<12} {:>5.1}%  [{x1:.0}, {y1:.0}, {x2:.0}, {y2:.0}]",
        object.class,
        object.confidence * 100.0
      )?;
    }
    if !record.detected_nsfw.is_empty() {
      writeln!(out, "  NSFW detections:")?;
      for nsfw in &record.detected_nsfw {
        writeln!(out, "    - {:<12} {:>5.1}%", nsfw.class, nsfw.confidence * 100.0)?;
      }
    }
    Ok(())
  }
}
