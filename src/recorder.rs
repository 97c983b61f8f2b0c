// ===============================
// src/recorder.rs
// ===============================
//
// Append-only run log:
// - In memory: every OptimizerResult, in completion order, never mutated.
// - On disk (optional, RECORD_FILE): one JSON line per result.
//   BufWriter, periodic flush, parent directory auto-created,
//   reopen once on write error.
//
use std::path::Path;
use std::sync::{Arc, RwLock};

use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::domain::OptimizerResult;

#[derive(Clone, Default)]
pub struct RunLog {
    entries: Arc<RwLock<Vec<Arc<OptimizerResult>>>>,
    sink: Option<mpsc::Sender<Arc<OptimizerResult>>>,
}

impl RunLog {
    pub fn in_memory() -> Self { Self::default() }

    /// Also forwards every entry to a JSONL recorder task.
    pub fn with_sink(sink: mpsc::Sender<Arc<OptimizerResult>>) -> Self {
        Self { entries: Arc::default(), sink: Some(sink) }
    }

    pub fn append(&self, result: OptimizerResult) -> Arc<OptimizerResult> {
        let entry = Arc::new(result);
        match self.entries.write() {
            Ok(mut v) => v.push(entry.clone()),
            Err(poisoned) => poisoned.into_inner().push(entry.clone()),
        }
        if let Some(tx) = &self.sink {
            if let Err(e) = tx.try_send(entry.clone()) {
                warn!(error = %e, "recorder: queue full or closed, entry kept in memory only");
            }
        }
        entry
    }

    pub fn snapshot(&self) -> Vec<Arc<OptimizerResult>> {
        match self.entries.read() {
            Ok(v) => v.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize { self.snapshot().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

async fn open_writer(path: &str) -> std::io::Result<BufWriter<tokio::fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<tokio::fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::Receiver<Arc<OptimizerResult>>, path: String) {
    info!(%path, "recorder: started");
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(?e, %path, "recorder: open failed, run log stays in memory");
            return;
        }
    };

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(entry) = maybe else {
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let line = match serde_json::to_string(entry.as_ref()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip entry");
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    match open_writer(&path).await {
                        Ok(w) => {
                            writer = w;
                            if let Err(e2) = write_line(&mut writer, &line).await {
                                error!(?e2, "recorder: write failed again after reopen, drop entry");
                            }
                        }
                        Err(e2) => error!(?e2, "recorder: reopen failed, drop entry"),
                    }
                }
                // results are rare; flush each one
                let _ = writer.flush().await;
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
            }
        }
    }
}
