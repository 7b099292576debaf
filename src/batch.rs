//! Batch walks over asset folders
//!
//! Every item is preceded by a short delay and a cancellation check.
//! `extract_folder` and `save_folder` record per-item failures and keep
//! going; `export_folder` and `extract_selected` stop at the first failure.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cancel::CancellationToken;
use crate::dispatch::{AssetDispatcher, ContentKind, DispatchOptions, DispatchResult, Message};
use crate::error::{Error, Result};
use crate::provider::ArchiveEngine;
use crate::settings::DEFAULT_BATCH_DELAY_MS;
use crate::tree::AssetFolder;
use crate::utils::{file_name, output_path, strip_extension};

/// Companion files written alongside a package by [`export_data`]
pub const PACKAGE_SIBLINGS: &[&str] = &["uexp", "ubulk"];

/// What a successful item produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSummary {
    pub kind: ContentKind,
    pub saved: Vec<PathBuf>,
    pub artifacts: usize,
    pub messages: Vec<Message>,
}

impl From<DispatchResult> for ItemSummary {
    fn from(result: DispatchResult) -> Self {
        Self {
            kind: result.kind,
            saved: result.saved,
            artifacts: result.artifacts.len(),
            messages: result.messages,
        }
    }
}

#[derive(Debug)]
pub struct BatchItem {
    pub path: String,
    pub result: Result<ItemSummary>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.items.len()
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.processed() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.items.iter().filter_map(|item| match &item.result {
            Err(e) => Some((item.path.as_str(), e)),
            Ok(_) => None,
        })
    }
}

/// Write a package and its companion files under `<output>/Exports`.
///
/// Returns the written paths. The package itself must exist; companions
/// are optional.
pub fn export_data(
    engine: &mut dyn ArchiveEngine,
    options: &DispatchOptions,
    path: &str,
) -> Result<Vec<PathBuf>> {
    let directory = options.output_directory.join("Exports");
    let mut assets = vec![(path.to_string(), engine.read_raw(path)?)];
    let stem = strip_extension(path);
    for ext in PACKAGE_SIBLINGS {
        let sibling = format!("{}.{}", stem, ext);
        if sibling != path && engine.contains(&sibling) {
            assets.push((sibling.clone(), engine.read_raw(&sibling)?));
        }
    }

    let mut written = Vec::with_capacity(assets.len());
    for (asset, data) in assets {
        let target = output_path(&directory, &asset, options.keep_directory_structure);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
        written.push(target);
    }

    info!(files = written.len(), "{} successfully exported", file_name(path));
    Ok(written)
}

type ItemCallback<'a> = Box<dyn FnMut(&BatchItem) + 'a>;

/// Settings for one batch walk
pub struct Batch<'a> {
    cancel: CancellationToken,
    delay: Duration,
    on_item: Option<ItemCallback<'a>>,
}

impl<'a> Batch<'a> {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
            on_item: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Observe each finished item, e.g. to drive a progress bar
    pub fn on_item(mut self, callback: impl FnMut(&BatchItem) + 'a) -> Self {
        self.on_item = Some(Box::new(callback));
        self
    }

    /// Wait out the delay, then fail if cancellation was requested
    fn pace(&self) -> Result<()> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.cancel.check()
    }

    fn record(&mut self, report: &mut BatchReport, item: BatchItem) {
        if let Err(e) = &item.result {
            error!(path = %item.path, "Item failed: {}", e);
        }
        if let Some(callback) = self.on_item.as_mut() {
            callback(&item);
        }
        report.items.push(item);
    }

    fn dispatch_all<'p>(
        &mut self,
        dispatcher: &mut AssetDispatcher<'_>,
        paths: impl IntoIterator<Item = &'p str>,
        bulk_save: bool,
        stop_on_error: bool,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for path in paths {
            self.pace()?;

            let result = match dispatcher.dispatch(path, bulk_save) {
                Err(e) if stop_on_error => {
                    error!(path, "Item failed: {}", e);
                    return Err(e);
                }
                result => result,
            };
            self.record(
                &mut report,
                BatchItem {
                    path: path.to_string(),
                    result: result.map(ItemSummary::from),
                },
            );
        }

        info!(
            processed = report.processed(),
            failed = report.failed(),
            "Batch complete"
        );
        Ok(report)
    }

    /// Dispatch every asset under `folder`; failures are recorded, not raised
    pub fn extract_folder(
        &mut self,
        dispatcher: &mut AssetDispatcher<'_>,
        folder: &AssetFolder,
    ) -> Result<BatchReport> {
        debug!(folder = %folder.path, "Extracting folder");
        self.dispatch_all(dispatcher, folder.walk(), false, false)
    }

    /// Like [`Batch::extract_folder`], writing documents to disk instead of
    /// previewing
    pub fn save_folder(
        &mut self,
        dispatcher: &mut AssetDispatcher<'_>,
        folder: &AssetFolder,
    ) -> Result<BatchReport> {
        debug!(folder = %folder.path, "Saving folder");
        self.dispatch_all(dispatcher, folder.walk(), true, false)
    }

    /// Dispatch the given paths in order, stopping at the first failure
    pub fn extract_selected(
        &mut self,
        dispatcher: &mut AssetDispatcher<'_>,
        paths: &[String],
    ) -> Result<BatchReport> {
        self.dispatch_all(dispatcher, paths.iter().map(String::as_str), false, true)
    }

    /// Export the raw data of every asset under `folder`, stopping at the
    /// first failure
    pub fn export_folder(
        &mut self,
        engine: &mut dyn ArchiveEngine,
        options: &DispatchOptions,
        folder: &AssetFolder,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for path in folder.walk() {
            self.pace()?;

            let saved = export_data(engine, options, path)?;
            let message = Message::info(format!("Successfully exported '{}'", file_name(path)));
            self.record(
                &mut report,
                BatchItem {
                    path: path.to_string(),
                    result: Ok(ItemSummary {
                        kind: ContentKind::Binary,
                        saved,
                        artifacts: 0,
                        messages: vec![message],
                    }),
                },
            );
        }

        info!(processed = report.processed(), "Export complete");
        Ok(report)
    }
}
