// 该文件是 InsightX （洞察） 项目的一部分。
// src/clock.rs - 可替换的时钟
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

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// 手动推进的时钟，克隆体共享同一时间。
#[derive(Debug, Clone)]
pub struct ManualClock {
  now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
  pub fn starting_at(start: DateTime<Utc>) -> Self {
    ManualClock {
      now: Arc::new(Mutex::new(start)),
    }
  }

  pub fn advance(&self, by: Duration) {
    let Ok(delta) = TimeDelta::from_std(by) else {
      return;
    };
    let mut now = self.now.lock();
    *now = now.checked_add_signed(delta).unwrap_or(*now);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_clock_advances_all_clones() {
    let start = DateTime::parse_from_rfc3339("2025-05-01T00:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    let clock = ManualClock::starting_at(start);
    let shared = clock.clone();

    shared.advance(Duration::from_secs(5));

    assert_eq!(clock.now() - start, TimeDelta::seconds(5));
  }
}
