// 该文件是 InsightX （洞察） 项目的一部分。
// src/notice.rs - 面向用户的提示消息
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
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Success,
  Error,
}

/// 一条提示（相当于界面上的 toast）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub title: &'static str,
  pub description: String,
}

impl Notice {
  pub fn success(description: impl Into<String>) -> Self {
    Notice {
      level: NoticeLevel::Success,
      title: "Success",
      description: description.into(),
    }
  }

  pub fn error(description: impl Into<String>) -> Self {
    Notice {
      level: NoticeLevel::Error,
      title: "Error",
      description: description.into(),
    }
  }

  pub fn is_error(&self) -> bool {
    self.level == NoticeLevel::Error
  }
}

impl fmt::Display for Notice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {}", self.title, self.description)
  }
}

pub trait NoticeSink: Send + Sync {
  fn notify(&self, notice: Notice);
}

/// 收集提示消息，等待界面取走。
#[derive(Debug, Default, Clone)]
pub struct NoticeBoard {
  pending: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeBoard {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn drain(&self) -> Vec<Notice> {
    std::mem::take(&mut *self.pending.lock())
  }

  pub fn len(&self) -> usize {
    self.pending.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.lock().is_empty()
  }
}

impl NoticeSink for NoticeBoard {
  fn notify(&self, notice: Notice) {
    match notice.level {
      NoticeLevel::Success => info!("{}", notice),
      NoticeLevel::Error => warn!("{}", notice),
    }
    self.pending.lock().push(notice);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drain_empties_the_board() {
    let board = NoticeBoard::new();
    board.notify(Notice::success("Image uploaded successfully."));
    board.notify(Notice::error("Failed to load images. Please try again."));

    let notices = board.drain();
    assert_eq!(notices.len(), 2);
    assert!(notices[1].is_error());
    assert_eq!(notices[0].to_string(), "[Success] Image uploaded successfully.");
    assert!(board.is_empty());
  }
}
