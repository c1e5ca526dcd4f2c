// 该文件是 InsightX （洞察） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;
mod session;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use insightx::FromUrl;
use insightx::clock::{Clock, SystemClock};
use insightx::detail::DetailView;
use insightx::gateway::{Gateway, GatewayWrapper};
use insightx::list::{ListController, SortConfig, SortDirection};
use insightx::notice::{NoticeBoard, NoticeSink};
use insightx::refresh::{RefreshController, RefreshOutcome};
use insightx::render::{CardRender, DetailRender, Render, TableRender};
use insightx::upload::{UploadController, UploadMode, read_upload_file};

use args::{Args, Command};
use session::Session;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = args.apply(insightx::config::Config::from_env().context("读取配置失败")?);
  let url = config.gateway_url();
  info!("后端地址: {}", url);

  let gateway = GatewayWrapper::from_url(&url).with_context(|| format!("无法创建后端网关: {url}"))?;
  if gateway.is_mock() {
    info!("未配置后端，使用内存模拟数据");
  }
  let gateway = Arc::new(gateway);
  let board = NoticeBoard::new();

  let result = run(args.command, gateway, board.clone()).await;
  for notice in board.drain() {
    eprintln!("{notice}");
  }
  result
}

async fn run<G: Gateway + 'static>(command: Command, gateway: Arc<G>, board: NoticeBoard) -> Result<()> {
  let notices: Arc<dyn NoticeSink> = Arc::new(board.clone());
  let now = SystemClock.now();

  match command {
    Command::List {
      page,
      limit,
      search,
      sort,
      desc,
      cards,
    } => {
      let list = ListController::new(gateway, notices);
      list.set_limit(limit)?;
      list.set_search(search);
      list.set_page(page);
      if let Some(field) = sort {
        let direction = if desc {
          SortDirection::Descending
        } else {
          SortDirection::Ascending
        };
        list.set_sort(SortConfig { field, direction });
      }
      list.load().await?;

      let snapshot = list.snapshot();
      let mut out = std::io::stdout().lock();
      if cards {
        CardRender::default().render(&mut out, &snapshot, now)?;
      } else {
        TableRender.render(&mut out, &snapshot, now)?;
      }
    }
    Command::Show { id } => {
      let detail = DetailView::new(gateway, notices);
      let record = detail.open(id).await?;
      DetailRender.render(&mut std::io::stdout().lock(), &record, now)?;
    }
    Command::Refresh { ids } => {
      let refresher = RefreshController::new(gateway, notices);
      let results = futures::future::join_all(ids.iter().map(|id| refresher.refresh(*id, &[]))).await;
      let mut out = std::io::stdout().lock();
      let mut failed = 0;
      for (id, result) in ids.iter().zip(results) {
        match result {
          Ok(RefreshOutcome::Applied(record)) => DetailRender.render(&mut out, &record, now)?,
          Ok(RefreshOutcome::Superseded) => {}
          Err(e) => {
            writeln!(out, "图像 {id}: {e}")?;
            failed += 1;
          }
        }
      }
      if failed > 0 {
        bail!("{failed} 张图像刷新失败");
      }
    }
    Command::Upload { files, single } => {
      let mode = if single {
        UploadMode::Single
      } else {
        UploadMode::Batch
      };
      let list = ListController::new(gateway.clone(), notices.clone());
      let uploads = UploadController::new(gateway, mode, notices).with_progress_observer(Arc::new(|fraction: f64| {
        eprint!("\rUploading... {:.0}%", fraction * 100.0);
      }));

      let mut queued = Vec::new();
      for path in &files {
        queued.push(read_upload_file(path).await?);
      }
      let outcome = uploads.drop_files(queued, &list).await;
      for rejection in &outcome.rejected {
        eprintln!("{}: {}", rejection.name, rejection.reason);
      }
      let uploaded = match outcome.upload {
        Some(result) => result,
        None if outcome.accepted > 0 => uploads.start(&list).await,
        None => bail!("没有可上传的文件"),
      };
      eprintln!();
      let uploaded = uploaded?;
      info!(uploaded, "上传完成");

      TableRender.render(&mut std::io::stdout().lock(), &list.snapshot(), now)?;
    }
    Command::Delete { id } => {
      let list = ListController::new(gateway, notices);
      list.delete(id).await?;
    }
    Command::Session { single } => {
      let mode = if single {
        UploadMode::Single
      } else {
        UploadMode::Batch
      };
      Session::new(gateway, board, mode).run().await?
    }
  }
  Ok(())
}
