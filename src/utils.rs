use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use indicatif::{ProgressBar, ProgressStyle};
use tempfile::NamedTempFile;

/// Whole seconds since the Unix epoch, truncated toward zero.
/// Sub-second differences between the two sides never trigger a transfer.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

/// Open a temp file next to `dst` so the final write is a same-filesystem rename.
pub fn staging_file(dst: &Path) -> io::Result<NamedTempFile> {
    let parent = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(parent)
}

/// Atomically replace `dst` with the staged contents.
pub fn commit(staged: NamedTempFile, dst: &Path) -> io::Result<()> {
    staged.as_file().sync_all()?;
    staged.persist(dst).map_err(|e| e.error)?;
    Ok(())
}

/// Progress reporting for a reconciliation pass.
///
/// Per-file lines always reach stdout: through the bar when one is drawn,
/// directly otherwise (disabled, or stdout is not a terminal).
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn bar(len: u64, disabled: bool) -> Self {
        if disabled {
            return Self { bar: None };
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        Self::visible(pb)
    }

    pub fn spinner(message: &'static str, disabled: bool) -> Self {
        if disabled {
            return Self { bar: None };
        }
        let pb = ProgressBar::new_spinner();
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self::visible(pb)
    }

    fn visible(pb: ProgressBar) -> Self {
        if pb.is_hidden() {
            Self { bar: None }
        } else {
            Self { bar: Some(pb) }
        }
    }

    pub fn println(&self, line: impl AsRef<str>) {
        match &self.bar {
            Some(pb) => pb.println(line),
            None => println!("{}", line.as_ref()),
        }
    }

    pub fn inc(&self, delta: u64) {
        if let Some(pb) = &self.bar {
            pb.inc(delta);
        }
    }

    /// Hide the bar while `f` runs, e.g. to ask the user something.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        match &self.bar {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    pub fn finish(&self, message: &'static str) {
        if let Some(pb) = &self.bar {
            pb.finish_with_message(message);
        }
    }

    /// Stop drawing, leaving the bar where it stopped with `message`.
    pub fn abandon(&self, message: &'static str) {
        if let Some(pb) = &self.bar {
            pb.abandon_with_message(message);
        }
    }
}
