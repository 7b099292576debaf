//! # pakscope
//!
//! A Rust library for mounting encrypted game `.pak` archives into a virtual
//! file system and decoding the assets inside them.
//!
//! ## Overview
//!
//! Game content ships as ZIP-based pak files, some of them AES-256 encrypted
//! under per-archive keys identified by a GUID. This library provides:
//!
//! - Reading pak archives (Store, Deflate and ZSTD entries)
//! - A key registry that tracks which keys the user changed
//! - A mount coordinator that submits keys and reconciles the archive catalog
//! - An asset dispatcher that turns a virtual path into a document, image,
//!   sound or preview request
//! - Batch extract, save and export over folders, with cancellation
//!
//! ## Example
//!
//! ```rust,no_run
//! use pakscope::{CancellationToken, Session};
//!
//! fn main() -> pakscope::Result<()> {
//!     let session = Session::open("Game/Content/Paks", "pakscope.json")?;
//!
//!     session.with_core(|core| -> pakscope::Result<()> {
//!         let cancel = CancellationToken::new();
//!         core.initialize(&cancel)?;
//!         core.update_provider(true, &cancel)?;
//!
//!         for path in core.files() {
//!             println!("{}", path);
//!         }
//!
//!         let result = core.dispatch("Game/Content/Localization/Game/en/Game.locres");
//!         println!("{}", result.document.unwrap_or_default());
//!         Ok(())
//!     })
//! }
//! ```

pub mod batch;
pub mod cancel;
pub mod catalog;
pub mod creator;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod exports;
pub mod formats;
pub mod guid;
pub mod iostore;
pub mod keys;
pub mod media;
pub mod mount;
pub mod pak;
#[cfg(test)]
pub(crate) mod pak_writer;
pub mod provider;
pub mod session;
pub mod settings;
pub mod surface;
pub mod tree;
pub mod utils;
pub mod worker;

pub use batch::{Batch, BatchItem, BatchReport, ItemSummary};
pub use cancel::CancellationToken;
pub use catalog::{ArchiveCatalog, ArchiveEntry};
pub use crypto::AesKey;
pub use dispatch::{
    Artifact, AssetClass, AssetDispatcher, ContentKind, DispatchOptions, DispatchResult, Level,
    Message,
};
pub use error::{Error, Result};
pub use exports::{Export, ExportKind};
pub use guid::Guid;
pub use keys::{normalize_key, DynamicKey, KeyEntry, KeyRegistry, KeySet};
pub use mount::{MountReport, VfsMountCoordinator};
pub use pak::{CompressionMethod, PakFile, PakHeader};
pub use provider::{ArchiveEngine, DirectoryProvider};
pub use session::{FileKeySource, RemoteKeySource, Session, SessionCore};
pub use settings::{AudioMode, UserSettings};
pub use surface::{HeadlessSurface, PresentationSurface};
pub use tree::AssetFolder;
pub use utils::{collect_files, create_glob_matcher, format_size, matches_filter};
pub use worker::{TaskHandle, Worker};
