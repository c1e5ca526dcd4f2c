// 该文件是 InsightX （洞察） 项目的一部分。
// src/session.rs - 交互式会话
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use insightx::clock::{Clock, SystemClock};
use insightx::detail::{DetailState, DetailView};
use insightx::gateway::Gateway;
use insightx::list::{ListController, LoadOutcome, SortField};
use insightx::notice::{NoticeBoard, NoticeSink};
use insightx::record::ImageId;
use insightx::refresh::{Reconcile, RefreshController};
use insightx::render::{CardRender, DetailRender, ListView, Render, TableRender};
use insightx::upload::{UploadController, UploadMode, read_upload_file};

/// 会话内的命令，每行一条
#[derive(Parser, Debug)]
#[command(multicall = true)]
enum Line {
  /// 重新加载并显示当前页
  List,
  /// 跳转到第 N 页
  Page { page: u32 },
  /// 修改每页条数（回到第 1 页）
  Limit { limit: u32 },
  /// 按文件名搜索，不带参数表示清除搜索
  Search { term: Vec<String> },
  /// 按字段排序，重复同一字段切换升降序
  Sort { field: SortField },
  /// 在后台刷新若干图像
  Refresh {
    #[arg(required = true)]
    ids: Vec<ImageId>,
  },
  /// 打开图像详情
  Show { id: ImageId },
  /// 把文件加入上传队列并在后台开始上传
  Upload {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
  },
  /// 只把文件加入上传队列（单文件模式下同样立即上传）
  Add {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
  },
  /// 开始上传队列中的文件
  Start,
  /// 查看上传队列
  Queue,
  /// 从上传队列移除第 N 个文件（从 1 开始）
  Remove { index: usize },
  /// 清空上传队列
  Clear,
  /// 删除一张图像
  Delete { id: ImageId },
  /// 切换列表视图: table 或 card
  View { view: ListView },
  /// 退出
  #[command(alias = "exit")]
  Quit,
}

pub struct Session<G> {
  list: Arc<ListController<G>>,
  detail: Arc<DetailView<G>>,
  refresher: Arc<RefreshController<G>>,
  uploads: Arc<UploadController<G>>,
  board: NoticeBoard,
  view: ListView,
  tasks: JoinSet<()>,
}

impl<G: Gateway + 'static> Session<G> {
  pub fn new(gateway: Arc<G>, board: NoticeBoard, mode: UploadMode) -> Self {
    let notices: Arc<dyn NoticeSink> = Arc::new(board.clone());
    Session {
      list: Arc::new(ListController::new(gateway.clone(), notices.clone())),
      detail: Arc::new(DetailView::new(gateway.clone(), notices.clone())),
      refresher: Arc::new(RefreshController::new(gateway.clone(), notices.clone())),
      uploads: Arc::new(UploadController::new(gateway, mode, notices)),
      board,
      view: ListView::default(),
      tasks: JoinSet::new(),
    }
  }

  pub async fn run(mut self) -> Result<()> {
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = shutdown_tx.send(());
    })
    .context("无法设置 Ctrl-C 处理函数")?;

    println!("InsightX 交互式会话，输入 help 查看命令");
    self.list.load().await.ok();
    self.show_list()?;
    self.flush_notices();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
      print!("insightx> ");
      std::io::stdout().flush()?;

      tokio::select! {
        line = lines.next_line() => {
          let Some(line) = line.context("读取标准输入失败")? else {
            break;
          };
          if !self.handle(&line)? {
            break;
          }
        }
        Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
          if let Err(e) = joined {
            warn!("后台任务异常结束: {}", e);
          }
          println!();
        }
        _ = shutdown_rx.recv() => break,
      }
      self.flush_notices();
    }

    if !self.tasks.is_empty() {
      info!("等待 {} 个后台任务结束", self.tasks.len());
      while self.tasks.join_next().await.is_some() {}
      self.flush_notices();
    }
    Ok(())
  }

  /// 返回 false 表示退出会话
  fn handle(&mut self, line: &str) -> Result<bool> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
      return Ok(true);
    }
    let command = match Line::try_parse_from(words.iter().copied()) {
      Ok(command) => command,
      Err(e) => {
        e.print()?;
        return Ok(true);
      }
    };
    debug!(?command, "执行会话命令");

    match command {
      Line::List => self.spawn_load(),
      Line::Page { page } => {
        self.list.set_page(page);
        self.spawn_load();
      }
      Line::Limit { limit } => match self.list.set_limit(limit) {
        Ok(()) => self.spawn_load(),
        Err(e) => println!("{e}"),
      },
      Line::Search { term } => {
        self.list.set_search(term.join(" "));
        self.spawn_load();
      }
      Line::Sort { field } => {
        self.list.sort_by(field);
        self.show_list()?;
      }
      Line::Refresh { ids } => {
        for id in ids {
          if self.refresher.is_in_flight(id) {
            println!("图像 {id} 正在刷新");
          }
          self.spawn_refresh(id);
        }
      }
      Line::Show { id } => self.spawn_show(id),
      Line::Upload { paths } => self.spawn_queue(paths, true),
      Line::Add { paths } => self.spawn_queue(paths, false),
      Line::Start => self.spawn_upload(),
      Line::Queue => self.show_queue(),
      Line::Remove { index } => match index.checked_sub(1).and_then(|i| self.uploads.remove(i)) {
        Some(file) => println!("已移除 {}", file.name),
        None => println!("无法移除第 {index} 个文件"),
      },
      Line::Clear => {
        if !self.uploads.clear() {
          println!("上传进行中，无法清空队列");
        }
      }
      Line::Delete { id } => self.spawn_delete(id),
      Line::View { view } => {
        self.view = view;
        self.show_list()?;
      }
      Line::Quit => return Ok(false),
    }
    Ok(true)
  }

  /// 在后台加载当前页，只有最新一次加载的结果会被显示
  fn spawn_load(&mut self) {
    let list = self.list.clone();
    let refresher = self.refresher.clone();
    let view = self.view;
    self.tasks.spawn(async move {
      if let Ok(LoadOutcome::Applied) = list.load().await {
        print_list(&list, &refresher, view);
      }
    });
  }

  fn spawn_show(&mut self, id: ImageId) {
    let detail = self.detail.clone();
    self.tasks.spawn(async move {
      detail.open(id).await.ok();
      if detail.current_id() == Some(id) {
        print_detail(&detail);
      }
    });
  }

  fn spawn_delete(&mut self, id: ImageId) {
    let list = self.list.clone();
    let detail = self.detail.clone();
    let refresher = self.refresher.clone();
    let view = self.view;
    self.tasks.spawn(async move {
      list.delete(id).await.ok();
      if detail.current_id() == Some(id) {
        detail.close();
      }
      print_list(&list, &refresher, view);
    });
  }

  fn spawn_refresh(&mut self, id: ImageId) {
    let list = self.list.clone();
    let detail = self.detail.clone();
    let refresher = self.refresher.clone();
    self.tasks.spawn(async move {
      let targets: [&dyn Reconcile; 2] = [&*list, &*detail];
      let _ = refresher.refresh(id, &targets).await;
    });
  }

  fn spawn_upload(&mut self) {
    let uploads = self.uploads.clone();
    let list = self.list.clone();
    self.tasks.spawn(async move {
      if let Ok(count) = uploads.start(&*list).await {
        debug!(count, "上传任务完成");
      }
    });
  }

  /// 读取文件并放入上传队列。单文件模式下放入即开始上传，
  /// 批量模式下 `start` 为真时接着上传整个队列。
  fn spawn_queue(&mut self, paths: Vec<PathBuf>, start: bool) {
    let uploads = self.uploads.clone();
    let list = self.list.clone();
    self.tasks.spawn(async move {
      let mut files = Vec::new();
      for path in paths {
        match read_upload_file(&path).await {
          Ok(file) => files.push(file),
          Err(e) => println!("{e}"),
        }
      }
      let outcome = uploads.drop_files(files, &*list).await;
      for rejection in &outcome.rejected {
        println!("{}: {}", rejection.name, rejection.reason);
      }
      match outcome.upload {
        Some(result) => {
          if let Ok(count) = result {
            debug!(count, "上传任务完成");
          }
        }
        None if start && outcome.accepted > 0 => {
          if let Ok(count) = uploads.start(&*list).await {
            debug!(count, "上传任务完成");
          }
        }
        None => print_queue(&uploads),
      }
    });
  }

  fn show_list(&self) -> Result<()> {
    print_list(&self.list, &self.refresher, self.view);
    Ok(())
  }

  fn show_queue(&self) {
    print_queue(&self.uploads);
  }

  fn flush_notices(&self) {
    for notice in self.board.drain() {
      println!("{notice}");
    }
  }
}

fn print_list<G: Gateway>(list: &ListController<G>, refresher: &RefreshController<G>, view: ListView) {
  let snapshot = list.snapshot();
  let now = SystemClock.now();
  let mut out = std::io::stdout().lock();
  let rendered = match view {
    ListView::Table => TableRender.render(&mut out, &snapshot, now),
    ListView::Card => CardRender {
      refreshing: refresher.in_flight(),
    }
    .render(&mut out, &snapshot, now),
  };
  if let Err(e) = rendered {
    warn!("无法输出图像列表: {}", e);
  }
}

fn print_detail<G: Gateway>(detail: &DetailView<G>) {
  match detail.state() {
    DetailState::Loaded(record) => {
      let mut out = std::io::stdout().lock();
      if let Err(e) = DetailRender.render(&mut out, &record, SystemClock.now()) {
        warn!("无法输出图像详情: {}", e);
      }
    }
    DetailState::NotFound(id) => println!("Image {id} not found. Use `list` to go back."),
    DetailState::Loading(_) | DetailState::Closed => {}
  }
}

fn print_queue<G: Gateway>(uploads: &UploadController<G>) {
  let queued = uploads.queued();
  if uploads.is_uploading() {
    println!("Uploading... {:.0}%", uploads.progress() * 100.0);
  } else if uploads.is_success() {
    println!("Upload complete!");
  }
  if queued.is_empty() {
    println!("上传队列为空");
  }
  for (index, (name, size)) in queued.iter().enumerate() {
    println!("{:>3}. {}  {:.1} KB", index + 1, name, *size as f64 / 1024.0);
  }
  if let Some(error) = uploads.error() {
    println!("{error}");
  }
}
