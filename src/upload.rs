// 该文件是 InsightX （洞察） 项目的一部分。
// src/upload.rs - 上传队列与校验
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
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::ImageFormat;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, GatewayError, ProgressFn, TransferProgress, UploadFile};
use crate::list::Reload;
use crate::notice::{Notice, NoticeSink};

/// 单个文件大小上限 10 MiB
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const MIN_FILE_SIZE: u64 = 1;
/// 单文件模式下成功状态的保持时间
pub const SUCCESS_RESET_DELAY: Duration = Duration::from_secs(2);

const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("已有上传任务正在进行")]
  AlreadyUploading,
  #[error("上传队列为空")]
  EmptyQueue,
  #[error("无法读取文件 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("上传 {file} 失败: {source}")]
  Gateway { file: String, source: GatewayError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
  /// 多文件排队，显式开始上传
  Batch,
  /// 每次一个文件，放入后立即上传
  Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
  TooLarge,
  InvalidType,
  TooManyFiles,
  TooSmall,
  Other,
}

impl RejectionReason {
  pub fn message(&self) -> &'static str {
    match self {
      RejectionReason::TooLarge => "File is too large. Maximum size is 10MB.",
      RejectionReason::InvalidType => "Invalid file type. Only JPG, JPEG, PNG, and WEBP files are supported.",
      RejectionReason::TooManyFiles => "Too many files. Please upload one image at a time.",
      RejectionReason::TooSmall => "File is too small.",
      RejectionReason::Other => "This file could not be accepted. Please try again.",
    }
  }
}

impl fmt::Display for RejectionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.message())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
  pub name: String,
  pub reason: RejectionReason,
}

#[derive(Debug)]
pub struct DropOutcome {
  pub accepted: usize,
  pub rejected: Vec<Rejection>,
  /// 单文件模式下自动开始的上传结果
  pub upload: Option<Result<usize, UploadError>>,
}

/// 客户端校验：先看类型（扩展名与 MIME 都要在白名单内），再看大小。
pub fn validate(file: &UploadFile) -> Result<(), RejectionReason> {
  let extension_ok = Path::new(&file.name)
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
  let mime_ok = matches!(
    ImageFormat::from_mime_type(mime_essence(&file.mime)),
    Some(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)
  );
  if !extension_ok || !mime_ok {
    return Err(RejectionReason::InvalidType);
  }

  let size = file.size();
  if size > MAX_FILE_SIZE {
    return Err(RejectionReason::TooLarge);
  }
  if size < MIN_FILE_SIZE {
    return Err(RejectionReason::TooSmall);
  }
  Ok(())
}

/// MIME 的主体部分（去掉参数），统一小写，`image/jpg` 视为 `image/jpeg`
fn mime_essence(mime: &str) -> String {
  let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
  if essence == "image/jpg" {
    "image/jpeg".to_string()
  } else {
    essence
  }
}

/// 读取本地文件。MIME 优先按内容识别，识别不了再按扩展名猜测。
pub async fn read_upload_file(path: impl AsRef<Path>) -> Result<UploadFile, UploadError> {
  let path = path.as_ref();
  let data = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
    path: path.to_path_buf(),
    source,
  })?;

  let mime = image::guess_format(&data)
    .or_else(|_| ImageFormat::from_path(path))
    .map(|format| format.to_mime_type())
    .unwrap_or(FALLBACK_MIME);
  let name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string());
  debug!(name = %name, mime, bytes = data.len(), "读取待上传文件");

  Ok(UploadFile::new(name, mime, data))
}

#[derive(Default)]
struct UploadState {
  queue: Vec<UploadFile>,
  uploading: bool,
  progress: f64,
  error: Option<String>,
  succeeded_at: Option<Instant>,
}

pub type ProgressObserver = Arc<dyn Fn(f64) + Send + Sync>;

pub struct UploadController<G> {
  gateway: Arc<G>,
  mode: UploadMode,
  state: Arc<Mutex<UploadState>>,
  notices: Arc<dyn NoticeSink>,
  observer: Option<ProgressObserver>,
}

impl<G: Gateway> UploadController<G> {
  pub fn new(gateway: Arc<G>, mode: UploadMode, notices: Arc<dyn NoticeSink>) -> Self {
    UploadController {
      gateway,
      mode,
      state: Arc::new(Mutex::new(UploadState::default())),
      notices,
      observer: None,
    }
  }

  /// 每次整体进度变化时回调，取值 0.0–1.0
  pub fn with_progress_observer(mut self, observer: ProgressObserver) -> Self {
    self.observer = Some(observer);
    self
  }

  /// 放入一批文件。被拒绝的文件不会进入队列，错误信息取本批第一个拒绝原因。
  pub async fn drop_files<R: Reload>(&self, files: Vec<UploadFile>, reloader: &R) -> DropOutcome {
    let (accepted, rejected) = self.admit(files);

    let upload = if self.mode == UploadMode::Single && accepted > 0 {
      Some(self.start(reloader).await)
    } else {
      None
    };

    DropOutcome {
      accepted,
      rejected,
      upload,
    }
  }

  fn admit(&self, files: Vec<UploadFile>) -> (usize, Vec<Rejection>) {
    let mut state = self.state.lock();
    let busy = state.uploading;
    let too_many = self.mode == UploadMode::Single && files.len() > 1;

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for file in files {
      let verdict = if busy {
        Err(RejectionReason::Other)
      } else if too_many {
        Err(RejectionReason::TooManyFiles)
      } else {
        validate(&file)
      };
      match verdict {
        Ok(()) => accepted.push(file),
        Err(reason) => {
          debug!(name = %file.name, ?reason, "拒绝文件");
          rejected.push(Rejection {
            name: file.name,
            reason,
          });
        }
      }
    }

    state.error = rejected.first().map(|r| r.reason.message().to_string());
    if let Some(first) = rejected.first() {
      warn!(rejected = rejected.len(), "部分文件未通过校验: {}", first.reason);
    }

    let count = accepted.len();
    if self.mode == UploadMode::Single && count > 0 {
      state.queue = accepted;
    } else {
      state.queue.extend(accepted);
    }
    (count, rejected)
  }

  /// 依次上传队列中的文件。
  ///
  /// 全部成功后清空队列并通知列表重新加载；任何一个失败则停止，
  /// 已经上传的文件移出队列但不回滚，失败的文件与其后的文件保留。
  pub async fn start<R: Reload>(&self, reloader: &R) -> Result<usize, UploadError> {
    let files = {
      let mut state = self.state.lock();
      if state.uploading {
        return Err(UploadError::AlreadyUploading);
      }
      if state.queue.is_empty() {
        return Err(UploadError::EmptyQueue);
      }
      state.uploading = true;
      state.progress = 0.0;
      state.error = None;
      state.succeeded_at = None;
      state.queue.clone()
    };
    let total = files.len();
    info!(files = total, "开始上传");

    for (index, file) in files.into_iter().enumerate() {
      let name = file.name.clone();
      let state = self.state.clone();
      let observer = self.observer.clone();
      let on_progress: ProgressFn = Arc::new(move |progress: TransferProgress| {
        let overall = (index as f64 + progress.fraction()) / total as f64;
        state.lock().progress = overall;
        if let Some(observer) = &observer {
          observer(overall);
        }
      });

      match self.gateway.create(file, on_progress).await {
        Ok(record) => info!(image_id = %record.id, name = %name, "上传完成"),
        Err(source) => {
          warn!(name = %name, "上传失败: {}", source);
          let message = format!("Failed to upload {name}. Please try again.");
          {
            let mut state = self.state.lock();
            state.uploading = false;
            state.queue.drain(..index);
            state.error = Some(message.clone());
          }
          self.notices.notify(Notice::error(message));
          return Err(UploadError::Gateway { file: name, source });
        }
      }
    }

    {
      let mut state = self.state.lock();
      state.queue.clear();
      state.uploading = false;
      state.progress = 1.0;
      state.succeeded_at = Some(Instant::now());
    }
    let message = match self.mode {
      UploadMode::Single => "Image uploaded successfully.",
      UploadMode::Batch => "All images uploaded successfully!",
    };
    self.notices.notify(Notice::success(message));
    reloader.reload().await;
    Ok(total)
  }
}

impl<G> UploadController<G> {
  pub fn mode(&self) -> UploadMode {
    self.mode
  }

  /// 上传过程中不能修改队列
  pub fn remove(&self, index: usize) -> Option<UploadFile> {
    let mut state = self.state.lock();
    if state.uploading || index >= state.queue.len() {
      return None;
    }
    Some(state.queue.remove(index))
  }

  pub fn clear(&self) -> bool {
    let mut state = self.state.lock();
    if state.uploading {
      return false;
    }
    state.queue.clear();
    true
  }

  pub fn queued(&self) -> Vec<(String, u64)> {
    self
      .state
      .lock()
      .queue
      .iter()
      .map(|file| (file.name.clone(), file.size()))
      .collect()
  }

  pub fn is_uploading(&self) -> bool {
    self.state.lock().uploading
  }

  pub fn progress(&self) -> f64 {
    self.state.lock().progress
  }

  pub fn error(&self) -> Option<String> {
    self.state.lock().error.clone()
  }

  /// 单文件模式下成功状态在 [`SUCCESS_RESET_DELAY`] 后自动消失
  pub fn is_success(&self) -> bool {
    let state = self.state.lock();
    match (state.succeeded_at, self.mode) {
      (None, _) => false,
      (Some(_), UploadMode::Batch) => true,
      (Some(at), UploadMode::Single) => at.elapsed() < SUCCESS_RESET_DELAY,
    }
  }
}
